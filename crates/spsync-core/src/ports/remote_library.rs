//! Remote library port (driven/secondary port)
//!
//! This module defines the interface the sync engine uses to talk to the
//! remote document library. The primary implementation targets SharePoint
//! document libraries via Microsoft Graph.
//!
//! ## Design Notes
//!
//! - Unlike most adapter errors, remote failures are returned as the typed
//!   [`RemoteError`]: the engine retries, degrades or aborts depending on
//!   the variant, so the classification belongs at the port.
//! - All paths are relative to the configured remote root. Implementations
//!   must never read or modify anything outside it.
//! - Uses `#[async_trait]` for async trait methods.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{Fingerprint, RelativePath};
use crate::domain::remote::RemoteEntry;

// ============================================================================
// Errors
// ============================================================================

/// Failure classes reported by a remote library adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Rate limited; `retry_after` carries the server's hint when present
    #[error("Throttled by remote service (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    /// Network failure or 5xx response
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// Credentials missing, expired or rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The caller lacks permission for this operation
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The item is locked or still being processed (co-authoring, scans)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Anything else, not worth retrying
    #[error("Remote error: {0}")]
    Other(String),
}

impl RemoteError {
    /// Whether the same request may succeed if repeated later
    ///
    /// A conflict usually means the item is briefly locked, so it is retried
    /// like a transient failure. Folder creation treats 409 as success and
    /// never sees it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Transient(_) | Self::Conflict(_)
        )
    }

    /// Whether this is a rate-limit signal
    #[must_use]
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// The server's retry-after hint, if any
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// Server-held state of a chunked upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Opaque URL (or id) the chunks are sent to
    pub upload_url: String,
    /// Total number of bytes the session expects
    pub total_size: u64,
}

/// Acknowledgement of an uploaded chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAck {
    /// The chunk was stored; more bytes are expected
    Accepted,
    /// The final chunk was stored and the file was committed
    Completed,
}

/// One fingerprint column write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataWrite {
    pub path: RelativePath,
    pub fingerprint: Fingerprint,
}

/// Per-item outcome of a batched metadata write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataWriteResult {
    pub path: RelativePath,
    /// `None` on success, otherwise the item's error message
    pub error: Option<String>,
}

impl MetadataWriteResult {
    #[must_use]
    pub fn ok(path: RelativePath) -> Self {
        Self { path, error: None }
    }

    #[must_use]
    pub fn failed(path: RelativePath, error: impl Into<String>) -> Self {
        Self {
            path,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// IRemoteLibrary trait
// ============================================================================

/// Remote document library operations used by the sync engine
#[async_trait]
pub trait IRemoteLibrary: Send + Sync {
    /// List every file and folder under the remote root, recursively
    ///
    /// # Returns
    /// Entries with paths relative to the remote root, including the stored
    /// fingerprint when the metadata column is available.
    async fn list_inventory(&self) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Upload a small file in a single request, replacing any existing item
    async fn upload_direct(&self, path: &RelativePath, bytes: Vec<u8>) -> Result<(), RemoteError>;

    /// Start a chunked upload for a file of `total_size` bytes
    async fn open_chunked_session(
        &self,
        path: &RelativePath,
        total_size: u64,
    ) -> Result<SessionHandle, RemoteError>;

    /// Upload the byte range starting at `offset`
    ///
    /// # Errors
    /// Returns `Throttled` with the server's retry-after hint when rate
    /// limited.
    async fn upload_chunk(
        &self,
        session: &SessionHandle,
        offset: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck, RemoteError>;

    /// Cancel an unfinished chunked upload
    async fn abort_session(&self, session: &SessionHandle) -> Result<(), RemoteError>;

    /// Write fingerprint column values for several items in one request
    ///
    /// # Returns
    /// One result per input write. A failed item does not fail the call.
    ///
    /// # Errors
    /// Returns an error only if the batch as a whole could not be submitted.
    async fn batch_write_metadata(
        &self,
        writes: &[MetadataWrite],
    ) -> Result<Vec<MetadataWriteResult>, RemoteError>;

    /// Delete a file
    async fn delete(&self, path: &RelativePath) -> Result<(), RemoteError>;

    /// Create a folder if it does not exist yet
    ///
    /// The parent folder must already exist.
    async fn ensure_folder(&self, path: &RelativePath) -> Result<(), RemoteError>;

    /// Make sure the fingerprint column exists, creating it if needed
    ///
    /// # Returns
    /// `false` if the column is unavailable (e.g. insufficient permission).
    /// Never fails the run.
    async fn try_create_metadata_column(&self) -> bool;
}
