//! Smart sync engine
//!
//! The [`SyncEngine`] runs one one-way sync of the local root into the
//! remote library.
//!
//! ## Sync Flow
//!
//! 1. **Scan**: resolve include/exclude patterns under the local root
//! 2. **Prepare**: make sure the fingerprint column exists, list the remote
//!    inventory once
//! 3. **Stage + hash**: apply the content transform, fingerprint every file
//! 4. **Plan**: classify each candidate against the inventory snapshot
//! 5. **Upload**: transfer `New`/`Updated` files, queue fingerprint writes
//! 6. **Commit**: flush the remaining fingerprint writes
//! 7. **Reconcile**: report or delete orphans (only when enabled)
//!
//! Per-file failures end up in the returned [`SyncSummary`]; only failures
//! that make the whole run meaningless are returned as [`SyncError`].

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use spsync_core::config::Config;
use spsync_core::domain::{LocalFile, RelativePath, RemoteEntry, SyncDecision};
use spsync_core::ports::{IContentTransform, IRemoteLibrary, MetadataWrite, RemoteError};
use spsync_core::stats::SyncStats;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::committer::MetadataCommitter;
use crate::hasher::{HashWorkerPool, ReadFailure};
use crate::matcher::PathMatcher;
use crate::planner::{plan, PlannedFile};
use crate::reconcile::{find_orphans, reconcile};
use crate::summary::{FileReport, SyncSummary};
use crate::throttle::{Retrier, RetryError, RetryPolicy, ThrottleGate};
use crate::transform::{stage_files, SkippedFile, StageOutcome};
use crate::uploader::{UploadJob, UploadPool, UploadSettings};
use crate::SyncError;

/// Everything the engine needs from the configuration, resolved once
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub local_root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub recursive: bool,
    /// Upload every candidate regardless of its fingerprint
    pub force_all: bool,
    pub hash_workers: usize,
    pub upload: UploadSettings,
    pub retry: RetryPolicy,
    pub delete_enabled: bool,
    pub dry_run: bool,
    pub metadata_batch_size: usize,
    pub transform_required: bool,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            local_root: config.local.root.clone(),
            include: config.local.include.clone(),
            exclude: config.local.exclude.clone(),
            recursive: config.local.recursive,
            force_all: config.sync.force_upload,
            hash_workers: config.sync.resolved_hash_workers(),
            upload: UploadSettings {
                workers: config.sync.upload_workers,
                direct_threshold: config.transfer.direct_threshold_bytes,
                chunk_size: config.transfer.effective_chunk_size(),
            },
            retry: RetryPolicy::from_config(&config.sync),
            delete_enabled: config.delete.enabled,
            dry_run: config.delete.dry_run,
            metadata_batch_size: config.metadata.batch_size,
            transform_required: config.transform.required,
        }
    }
}

/// One-way sync engine for a local root and a remote library
pub struct SyncEngine {
    remote: Arc<dyn IRemoteLibrary>,
    options: EngineOptions,
    transform: Option<Arc<dyn IContentTransform>>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn IRemoteLibrary>,
        options: EngineOptions,
        transform: Option<Arc<dyn IContentTransform>>,
    ) -> Self {
        Self {
            remote,
            options,
            transform,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Runs one sync
    ///
    /// # Returns
    /// A [`SyncSummary`] of everything the run did, also when some files
    /// failed
    ///
    /// # Errors
    /// - `SyncError::NoMatch` / `SyncError::Pattern` for unusable patterns
    /// - `SyncError::Auth` if the credentials are rejected at any point
    /// - `SyncError::Inventory` if the remote inventory cannot be listed
    /// - `SyncError::Cancelled` if `cancel` fires
    #[tracing::instrument(skip_all, fields(root = %self.options.local_root.display()))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<SyncSummary, SyncError> {
        let start = Instant::now();
        let options = &self.options;

        let stats = Arc::new(SyncStats::new());
        let retrier = Retrier::new(
            options.retry,
            Arc::new(ThrottleGate::new()),
            Arc::clone(&stats),
            cancel.clone(),
        );

        // Step 1: Scan
        let files = self.scan().await?;
        info!(files = files.len(), "Local files matched");
        ensure_not_cancelled(&cancel)?;

        // Step 2: Fingerprint column and inventory snapshot
        let metadata_enabled = self.remote.try_create_metadata_column().await;
        if !metadata_enabled {
            warn!("Fingerprint column unavailable, comparing by size only");
        }

        let inventory = self.list_inventory(&retrier).await?;
        info!(entries = inventory.len(), "Remote inventory listed");

        // Step 3: Stage and hash
        let StageOutcome {
            staged,
            skipped,
            read_failures,
            retained,
        } = stage_files(
            files,
            self.transform.clone(),
            options.transform_required,
            options.hash_workers,
        )
        .await;
        for _ in &skipped {
            stats.record_skipped();
        }
        for _ in &read_failures {
            stats.record_read_error();
        }
        ensure_not_cancelled(&cancel)?;

        let mut hashed = HashWorkerPool::new(options.hash_workers)
            .run(staged, &stats, &cancel)
            .await?;
        hashed.failures.extend(read_failures);

        // Step 4: Plan
        let planned = plan(hashed.candidates, &inventory, options.force_all);

        let committer = metadata_enabled.then(|| {
            Arc::new(MetadataCommitter::new(
                Arc::clone(&self.remote),
                retrier.clone(),
                options.metadata_batch_size,
            ))
        });

        let mut jobs = Vec::new();
        let mut backfill = Vec::new();
        for file in &planned {
            match &file.decision {
                SyncDecision::New | SyncDecision::Updated => jobs.push(UploadJob {
                    candidate: file.candidate.clone(),
                    decision: file.decision.clone(),
                }),
                SyncDecision::Unchanged => {
                    stats.record_unchanged(file.candidate.size_bytes());
                    if file.remote_fingerprint_missing() {
                        backfill.push(MetadataWrite {
                            path: file.candidate.target_relative_path().clone(),
                            fingerprint: file.candidate.fingerprint().clone(),
                        });
                    }
                }
                SyncDecision::Skipped(reason) => {
                    info!(path = %file.candidate.relative_path(), reason = %reason, "Skipping file");
                    stats.record_skipped();
                }
            }
        }

        info!(
            planned = planned.len(),
            upload = jobs.len(),
            backfill = backfill.len(),
            "Change plan ready"
        );

        if let Some(committer) = &committer {
            if !backfill.is_empty() {
                debug!(count = backfill.len(), "Backfilling missing fingerprints");
            }
            for write in backfill {
                committer.enqueue(write).await;
            }
        }
        ensure_not_cancelled(&cancel)?;

        // Step 5: Upload
        let results = UploadPool::new(
            Arc::clone(&self.remote),
            options.upload,
            retrier.clone(),
            committer.clone(),
        )
        .run(jobs)
        .await?;
        ensure_not_cancelled(&cancel)?;

        // Step 6: Commit remaining fingerprints
        let (metadata_failures, metadata_enabled) = match &committer {
            Some(committer) => {
                committer.flush().await;
                (committer.failures().await, committer.is_enabled())
            }
            None => (Vec::new(), false),
        };

        // Step 7: Reconcile
        let orphans = if options.delete_enabled {
            let expected = expected_keys(&planned, &skipped, &retained, &hashed.failures);
            let orphans = find_orphans(&inventory, &expected);
            info!(count = orphans.len(), dry_run = options.dry_run, "Orphans identified");
            reconcile(&self.remote, orphans, options.dry_run, &retrier).await?
        } else {
            Vec::new()
        };

        let mut by_target: HashMap<String, _> = results
            .into_iter()
            .map(|r| (r.target_relative_path.key(), r))
            .collect();
        let files = planned
            .into_iter()
            .map(|file| {
                let result = by_target.remove(&file.candidate.target_relative_path().key());
                FileReport {
                    relative_path: file.candidate.relative_path().clone(),
                    target_relative_path: file.candidate.target_relative_path().clone(),
                    decision: file.decision,
                    bytes_transferred: result.as_ref().map_or(0, |r| r.bytes_transferred),
                    chunk_count: result.as_ref().map_or(0, |r| r.chunk_count),
                    outcome: result.map(|r| r.outcome),
                }
            })
            .collect();

        let summary = SyncSummary {
            files,
            read_errors: hashed.failures,
            skipped,
            orphans,
            metadata_failures,
            stats: stats.snapshot(),
            metadata_enabled,
            delete_enabled: options.delete_enabled,
            dry_run: options.dry_run,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            new = summary.stats.new_files,
            updated = summary.stats.updated_files,
            unchanged = summary.stats.unchanged_files,
            failed = summary.stats.failed_files,
            deleted = summary.stats.deleted,
            duration_ms = summary.duration_ms,
            "Sync complete"
        );

        Ok(summary)
    }

    async fn scan(&self) -> Result<Vec<LocalFile>, SyncError> {
        let matcher = PathMatcher::new(
            &self.options.include,
            &self.options.exclude,
            self.options.recursive,
        )?;
        let root = self.options.local_root.clone();
        tokio::task::spawn_blocking(move || matcher.scan(&root))
            .await
            .map_err(|e| SyncError::IoError(std::io::Error::other(e)))?
    }

    async fn list_inventory(&self, retrier: &Retrier) -> Result<Vec<RemoteEntry>, SyncError> {
        let result = retrier
            .run("list_inventory", || self.remote.list_inventory())
            .await;
        match result {
            Ok(inventory) => Ok(inventory),
            Err(RetryError::Cancelled) => Err(SyncError::Cancelled),
            Err(RetryError::Fatal(RemoteError::Auth(e))) => Err(SyncError::Auth(e)),
            Err(RetryError::Fatal(e)) | Err(RetryError::Exhausted { last: e, .. }) => {
                Err(SyncError::Inventory(e))
            }
        }
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

/// Keys of every remote path this run accounts for
///
/// Includes skipped and unreadable files and the transformed targets of
/// files that fell back to their original content: their remote copies are
/// kept.
fn expected_keys(
    planned: &[PlannedFile],
    skipped: &[SkippedFile],
    retained: &[RelativePath],
    unreadable: &[ReadFailure],
) -> HashSet<String> {
    planned
        .iter()
        .map(|p| p.candidate.target_relative_path().key())
        .chain(skipped.iter().map(|s| s.target_relative_path.key()))
        .chain(retained.iter().map(RelativePath::key))
        .chain(unreadable.iter().map(|f| f.target_relative_path.key()))
        .collect()
}
