//! Run summary returned to the caller

use serde::Serialize;
use spsync_core::domain::{OrphanCandidate, RelativePath, SyncDecision, UploadOutcome};
use spsync_core::ports::MetadataWriteResult;
use spsync_core::stats::StatsSnapshot;

use crate::hasher::ReadFailure;
use crate::transform::SkippedFile;

/// What happened to one fingerprinted candidate
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub relative_path: RelativePath,
    pub target_relative_path: RelativePath,
    pub decision: SyncDecision,
    /// Present for candidates that went through the upload pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<UploadOutcome>,
    pub bytes_transferred: u64,
    pub chunk_count: u32,
}

impl FileReport {
    /// Whether the file needed an upload and the upload did not succeed
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Some(UploadOutcome::Failed(_)))
    }
}

/// Everything a run did, in path order
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub files: Vec<FileReport>,
    /// Files that could not be read for hashing
    pub read_errors: Vec<ReadFailure>,
    /// Files left out by the content transform
    pub skipped: Vec<SkippedFile>,
    pub orphans: Vec<OrphanCandidate>,
    pub metadata_failures: Vec<MetadataWriteResult>,
    pub stats: StatsSnapshot,
    /// Whether fingerprints were stored remotely during this run
    pub metadata_enabled: bool,
    pub delete_enabled: bool,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Whether the run must exit with a failure status
    pub fn has_failures(&self) -> bool {
        self.stats.has_failures()
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_failed())
    }
}
