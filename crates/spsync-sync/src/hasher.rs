//! Hash worker pool
//!
//! Fingerprints staged files in parallel with xxh3-128. Each file is read
//! once in a streaming fashion on the blocking thread pool; the number of
//! files hashed at the same time is bounded by a semaphore sized from the
//! resolved `hash_workers` setting.
//!
//! A file that cannot be read becomes a [`ReadFailure`] and is left out of
//! the plan. It never stops the other workers.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use spsync_core::domain::{CandidateFile, ContentSource, Fingerprint, RelativePath, StagedFile};
use spsync_core::stats::SyncStats;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::SyncError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// A file that could not be fingerprinted
#[derive(Debug, Clone, Serialize)]
pub struct ReadFailure {
    pub relative_path: RelativePath,
    /// Where the file would have been uploaded; kept so reconciliation does
    /// not treat the remote copy as an orphan
    pub target_relative_path: RelativePath,
    pub error: String,
}

/// Result of hashing a batch of staged files
#[derive(Debug, Default)]
pub struct HashOutcome {
    /// Fingerprinted files, sorted by relative path
    pub candidates: Vec<CandidateFile>,
    pub failures: Vec<ReadFailure>,
}

/// Read buffer size for a file of `size` bytes
///
/// Larger files get larger buffers to cut down on read calls.
pub fn buffer_size_for(size: u64) -> usize {
    let bytes = match size {
        s if s < MIB => 64 * KIB,
        s if s < 10 * MIB => 256 * KIB,
        s if s < 100 * MIB => MIB,
        s if s < GIB => 4 * MIB,
        _ => 8 * MIB,
    };
    bytes as usize
}

/// Fingerprint of an in-memory buffer
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint::from_u128(xxhash_rust::xxh3::xxh3_128(bytes))
}

/// Streams a file through xxh3-128
///
/// # Errors
/// Returns the I/O error if the file cannot be opened or read
pub fn fingerprint_file(path: &Path, size_hint: u64) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; buffer_size_for(size_hint)];
    let mut hasher = Xxh3::new();
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Fingerprint::from_u128(hasher.digest128()))
}

fn fingerprint_content(content: &ContentSource, size_hint: u64) -> io::Result<Fingerprint> {
    match content {
        ContentSource::File(path) => fingerprint_file(path, size_hint),
        ContentSource::Buffer(bytes) => Ok(fingerprint_bytes(bytes)),
    }
}

/// Bounded pool of hashing workers
#[derive(Debug, Clone)]
pub struct HashWorkerPool {
    workers: usize,
}

impl HashWorkerPool {
    /// Creates a pool running at most `workers` hashes at once (minimum 1)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fingerprints every staged file
    ///
    /// Completion order is not preserved; candidates are returned sorted by
    /// relative path.
    ///
    /// # Errors
    /// Returns `SyncError::Cancelled` if `cancel` fires before all files are
    /// hashed
    pub async fn run(
        &self,
        staged: Vec<StagedFile>,
        stats: &SyncStats,
        cancel: &CancellationToken,
    ) -> Result<HashOutcome, SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        debug!(files = staged.len(), workers = self.workers, "Hashing candidates");

        for file in staged {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let content = file.content.clone();
                let size = file.size_bytes;
                let result =
                    tokio::task::spawn_blocking(move || fingerprint_content(&content, size)).await;
                let result = match result {
                    Ok(inner) => inner,
                    Err(e) => Err(io::Error::other(e.to_string())),
                };
                Some((file, result))
            });
        }

        let mut outcome = HashOutcome::default();
        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(SyncError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok(Some((file, Ok(fingerprint)))) => {
                    outcome.candidates.push(file.into_candidate(fingerprint));
                }
                Ok(Some((file, Err(e)))) => {
                    warn!(path = %file.relative_path, error = %e, "Failed to read file, leaving it out of the plan");
                    stats.record_read_error();
                    outcome.failures.push(ReadFailure {
                        relative_path: file.relative_path,
                        target_relative_path: file.target_relative_path,
                        error: e.to_string(),
                    });
                }
                Ok(None) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "Hash task panicked");
                }
            }
        }

        outcome
            .candidates
            .sort_by(|a, b| a.relative_path().as_str().cmp(b.relative_path().as_str()));
        outcome
            .failures
            .sort_by(|a, b| a.relative_path.as_str().cmp(b.relative_path.as_str()));
        Ok(outcome)
    }
}
