//! Planning decisions and upload results

use std::fmt;

use serde::Serialize;

use super::newtypes::RelativePath;

/// Why a candidate was left out of the upload phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// A folder already exists at the target path
    FolderConflict,
    /// The content transform failed and conversion is required
    TransformFailed(String),
    /// Another local file maps to the same remote path; holds that file
    DuplicateTarget(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FolderConflict => write!(f, "a folder exists at the target path"),
            Self::TransformFailed(e) => write!(f, "content transform failed: {e}"),
            Self::DuplicateTarget(kept) => write!(f, "same remote path as {kept}"),
        }
    }
}

/// Classification of a candidate against the remote inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Not present remotely
    New,
    /// Present remotely with different content
    Updated,
    /// Present remotely with the same content
    Unchanged,
    /// Not uploaded, for the given reason
    Skipped(SkipReason),
}

impl SyncDecision {
    /// Whether the upload pool should transfer this candidate
    #[must_use]
    pub fn needs_upload(&self) -> bool {
        matches!(self, Self::New | Self::Updated)
    }

    /// Short lowercase label used in reports
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped(_) => "skipped",
        }
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Why an upload ended in failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient or throttling errors persisted past the retry limit
    RetriesExhausted(String),
    /// A non-retryable error from the remote library
    Remote(String),
    /// The local content could not be read during upload
    Read(String),
    /// Credentials were rejected
    Auth(String),
    /// The run was cancelled while the upload was in flight
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted(e) => write!(f, "retries exhausted: {e}"),
            Self::Remote(e) => write!(f, "remote error: {e}"),
            Self::Read(e) => write!(f, "read error: {e}"),
            Self::Auth(e) => write!(f, "authentication failed: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final state of one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Success,
    Failed(FailureKind),
}

impl UploadOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of transferring one candidate
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub target_relative_path: RelativePath,
    pub bytes_transferred: u64,
    /// Number of acknowledged chunks (1 for a direct upload)
    pub chunk_count: u32,
    pub outcome: UploadOutcome,
}
