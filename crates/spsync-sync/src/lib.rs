//! spsync Sync - Smart sync engine
//!
//! Provides:
//! - Include/exclude glob resolution over the local sync root
//! - Parallel xxh3-128 content fingerprinting
//! - Fingerprint-first change planning against a remote inventory snapshot
//! - Bounded-concurrency direct and chunked uploads with retry and a shared
//!   throttle cooldown
//! - Batched fingerprint column writes
//! - Orphan reconciliation with a dry-run mode
//!
//! ## Modules
//!
//! - [`matcher`] - Include/exclude pattern resolution
//! - [`hasher`] - Hash worker pool
//! - [`transform`] - External-command content transform and staging
//! - [`planner`] - Pure change planner
//! - [`throttle`] - Shared cooldown gate and retry with backoff
//! - [`uploader`] - Upload worker pool
//! - [`committer`] - Metadata batch committer
//! - [`reconcile`] - Orphan detection and deletion
//! - [`engine`] - Run orchestration
//! - [`summary`] - Run summary returned to the caller

pub mod committer;
pub mod engine;
pub mod hasher;
pub mod matcher;
pub mod planner;
pub mod reconcile;
pub mod summary;
pub mod throttle;
pub mod transform;
pub mod uploader;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use spsync_core::ports::RemoteError;
use thiserror::Error;

/// Errors that abort a sync run
///
/// Failures local to one file, chunk, batch item or orphan are recorded in
/// the [`summary::SyncSummary`] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The include patterns resolved to no files
    #[error("No files matched {patterns:?} under {}", root.display())]
    NoMatch {
        root: PathBuf,
        patterns: Vec<String>,
    },

    /// An include or exclude pattern could not be parsed
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// Credentials were rejected; retrying cannot help
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The remote inventory could not be listed
    #[error("Failed to list remote inventory: {0}")]
    Inventory(RemoteError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync run cancelled")]
    Cancelled,

    /// An I/O error occurred while scanning the sync root
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A domain-level error propagated from spsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] spsync_core::domain::DomainError),
}
