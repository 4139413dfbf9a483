//! spsync Graph - Microsoft Graph adapter for SharePoint document libraries
//!
//! Provides the [`IRemoteLibrary`](spsync_core::ports::IRemoteLibrary)
//! implementation used by the sync engine:
//! - OAuth2 client-credentials token acquisition
//! - Site, drive and list resolution
//! - Recursive inventory listing with the fingerprint column expanded
//! - Direct and session-based chunked uploads
//! - Batched fingerprint column writes and column creation
//! - Folder creation and deletes
//!
//! ## Modules
//!
//! - [`auth`] - Client-credentials token acquisition
//! - [`client`] - Microsoft Graph API HTTP client
//! - [`library`] - Site/drive/list resolution and item addressing
//! - [`inventory`] - Recursive listing of the remote root
//! - [`upload`] - File upload operations (direct and chunked)
//! - [`metadata`] - `$batch` fingerprint writes and column management
//! - [`items`] - Folder creation and deletes
//! - [`rate_limit`] - `Retry-After` parsing and throttling header monitor
//! - [`provider`] - The `IRemoteLibrary` adapter

pub mod auth;
pub mod client;
pub mod inventory;
pub mod items;
pub mod library;
pub mod metadata;
pub mod provider;
pub mod rate_limit;
pub mod upload;

use std::time::Duration;

use spsync_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conflict was detected (e.g., the item already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded (429, or 503 with the service asking callers to back off)
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Server-provided wait, if the response carried a `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other rejected request (4xx)
    #[error("Request rejected: {0}")]
    BadRequest(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<GraphError> for RemoteError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Unauthorized(m) => RemoteError::Auth(m),
            GraphError::Forbidden(m) => RemoteError::Permission(m),
            GraphError::NotFound(m) => RemoteError::NotFound(m),
            GraphError::Conflict(m) => RemoteError::Conflict(m),
            GraphError::TooManyRequests { retry_after } => RemoteError::Throttled { retry_after },
            GraphError::ServerError(m) => RemoteError::Transient(m),
            GraphError::NetworkError(e) if e.is_decode() || e.is_builder() => {
                RemoteError::Other(e.to_string())
            }
            GraphError::NetworkError(e) => RemoteError::Transient(e.to_string()),
            GraphError::BadRequest(m) | GraphError::InvalidResponse(m) => RemoteError::Other(m),
        }
    }
}
