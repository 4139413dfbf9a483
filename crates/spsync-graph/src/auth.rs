//! OAuth2 client-credentials authentication for Microsoft Graph
//!
//! Unattended sync runs authenticate as an application registered in the
//! tenant, using the client-credentials grant against the tenant's v2.0
//! token endpoint with the `https://{graph}/.default` scope.
//!
//! ## Components
//!
//! - [`ClientCredentials`] - Tenant, client id/secret and endpoints
//! - [`AccessToken`] - The acquired bearer token and its expiry

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use oauth2::{basic::BasicClient, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use tracing::{debug, info};

/// Default Microsoft identity platform host
pub const DEFAULT_LOGIN_ENDPOINT: &str = "login.microsoftonline.com";

/// Default Microsoft Graph host
pub const DEFAULT_GRAPH_ENDPOINT: &str = "graph.microsoft.com";

// ============================================================================
// ClientCredentials
// ============================================================================

/// Application credentials for the client-credentials grant
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    client_secret: String,
    pub login_endpoint: String,
    pub graph_endpoint: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("login_endpoint", &self.login_endpoint)
            .field("graph_endpoint", &self.graph_endpoint)
            .finish()
    }
}

/// Bearer token obtained from the token endpoint
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Returns true if the token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

impl ClientCredentials {
    /// Creates credentials using the public-cloud endpoints
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            graph_endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
        }
    }

    /// Overrides the login and Graph hosts (sovereign clouds)
    pub fn with_endpoints(mut self, login: impl Into<String>, graph: impl Into<String>) -> Self {
        self.login_endpoint = login.into();
        self.graph_endpoint = graph.into();
        self
    }

    /// `https://{login}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "https://{}/{}/oauth2/v2.0/token",
            self.login_endpoint, self.tenant_id
        )
    }

    /// `https://{graph}/.default`
    pub fn scope(&self) -> String {
        format!("https://{}/.default", self.graph_endpoint)
    }

    /// Requests an access token from the token endpoint
    ///
    /// # Errors
    /// Returns an error if the token endpoint is unreachable or rejects the
    /// credentials.
    pub async fn acquire_token(&self) -> Result<AccessToken> {
        info!(tenant = %self.tenant_id, client_id = %self.client_id, "Acquiring access token");

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(TokenUrl::new(self.token_url()).context("Invalid token URL")?);

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        let token_result = client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope()))
            .request_async(&http_client)
            .await
            .context("Failed to acquire access token")?;

        let expires_at = token_result
            .expires_in()
            .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
            .unwrap_or_else(|| Utc::now() + Duration::hours(1));

        debug!(%expires_at, "Access token acquired");
        Ok(AccessToken {
            secret: token_result.access_token().secret().to_string(),
            expires_at,
        })
    }
}
