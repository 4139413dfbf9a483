//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for interacting with the Microsoft Graph API.
//! Handles authentication headers, status classification into [`GraphError`],
//! JSON deserialization, and rate-limit header observation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spsync_graph::client::GraphClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), spsync_graph::GraphError> {
//! let client = GraphClient::new("access-token-here", "graph.microsoft.com");
//! let site: serde_json::Value = client
//!     .get_json("/sites/contoso.sharepoint.com:/sites/Engineering")
//!     .await?;
//! println!("{}", site["id"]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::rate_limit::{retry_after_from, RateLimitMonitor, RateLimitSummary};
use crate::GraphError;

/// Longest response body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 300;

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication headers and base URL
/// construction. Every response passes through [`GraphClient::send`], which
/// feeds the [`RateLimitMonitor`] and turns error statuses into
/// [`GraphError`] variants.
#[derive(Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, e.g. `https://graph.microsoft.com/v1.0`
    base_url: String,
    /// OAuth2 access token
    access_token: String,
    monitor: Arc<RateLimitMonitor>,
}

impl GraphClient {
    /// Creates a new GraphClient for the given Graph host
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token for Microsoft Graph
    /// * `graph_endpoint` - Graph host name, e.g. `graph.microsoft.com`
    pub fn new(access_token: impl Into<String>, graph_endpoint: &str) -> Self {
        Self::with_base_url(access_token, format!("https://{graph_endpoint}/v1.0"))
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token
    /// * `base_url` - Custom base URL for API requests
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            monitor: Arc::new(RateLimitMonitor::new()),
        }
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Automatically prepends the base URL and adds the Authorization header.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, PUT, DELETE, etc.)
    /// * `path` - API path relative to base URL (e.g., "/sites/root")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Creates an authenticated request to an absolute URL
    ///
    /// Used for `@odata.nextLink` pagination URLs.
    pub fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    /// Creates an unauthenticated request to an absolute URL
    ///
    /// Upload session URLs are pre-authorized; sending the bearer token to
    /// them is rejected by the service.
    pub fn request_anonymous(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Sends a request and classifies the response status
    ///
    /// # Errors
    /// Returns the [`GraphError`] matching the status code for any non-2xx
    /// response, or `NetworkError` if the request could not be sent.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, GraphError> {
        let response = request.send().await?;
        self.monitor.observe(response.status(), response.headers());
        check_status(response).await
    }

    /// `GET` a path and deserialize the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GraphError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        parse_json(response).await
    }

    /// Rate-limit observations collected so far
    pub fn rate_limit_summary(&self) -> RateLimitSummary {
        self.monitor.summary()
    }

    /// Shared rate-limit monitor
    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.monitor
    }
}

/// Deserializes a JSON response body
pub async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, GraphError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GraphError::InvalidResponse(format!("Failed to parse response: {e}")))
}

/// Maps a non-success response onto a [`GraphError`]
async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_from(response.headers());
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("{status} for {url}: {excerpt}");
    debug!(%status, url = %url, "Graph request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED => GraphError::Unauthorized(message),
        StatusCode::FORBIDDEN => GraphError::Forbidden(message),
        StatusCode::NOT_FOUND => GraphError::NotFound(message),
        StatusCode::CONFLICT => GraphError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            GraphError::TooManyRequests { retry_after }
        }
        s if s.is_server_error() => GraphError::ServerError(message),
        _ => GraphError::BadRequest(message),
    })
}
