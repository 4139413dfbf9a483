//! Orphan reconciliation
//!
//! A remote file is an orphan when no local candidate of this run targets
//! its path. The expected set is built from every target path the run knew
//! about, including files that were skipped or could not be read, so a
//! local problem never turns into a remote deletion.
//!
//! In dry-run mode orphans are only reported. Otherwise each one is deleted
//! once, under the retry policy; a failed delete is recorded and the rest
//! continue.

use std::collections::HashSet;
use std::sync::Arc;

use spsync_core::domain::{OrphanCandidate, OrphanState, RemoteEntry};
use spsync_core::ports::{IRemoteLibrary, RemoteError};
use tracing::{info, warn};

use crate::throttle::{Retrier, RetryError};
use crate::SyncError;

/// Remote files whose key is not in `expected_keys`, sorted by path
///
/// Folders are never orphans.
pub fn find_orphans(inventory: &[RemoteEntry], expected_keys: &HashSet<String>) -> Vec<OrphanCandidate> {
    let mut orphans: Vec<OrphanCandidate> = inventory
        .iter()
        .filter(|entry| !entry.is_folder && !expected_keys.contains(&entry.relative_path.key()))
        .cloned()
        .map(OrphanCandidate::new)
        .collect();
    orphans.sort_by(|a, b| {
        a.entry
            .relative_path
            .as_str()
            .cmp(b.entry.relative_path.as_str())
    });
    orphans
}

/// Reports or deletes `orphans`, returning them in their final state
///
/// # Errors
/// Returns `SyncError::Auth` if credentials are rejected and
/// `SyncError::Cancelled` if the run is cancelled. Other delete failures
/// are recorded on the orphan.
pub async fn reconcile(
    remote: &Arc<dyn IRemoteLibrary>,
    mut orphans: Vec<OrphanCandidate>,
    dry_run: bool,
    retrier: &Retrier,
) -> Result<Vec<OrphanCandidate>, SyncError> {
    if orphans.is_empty() {
        return Ok(orphans);
    }

    let stats = retrier.stats();

    if dry_run {
        for orphan in &mut orphans {
            orphan.transition_to(OrphanState::Reported)?;
            stats.record_orphan_reported();
            info!(path = %orphan.entry.relative_path, size = orphan.entry.size_bytes, "Orphan (dry run, not deleted)");
        }
        return Ok(orphans);
    }

    info!(count = orphans.len(), "Deleting orphaned remote files");

    for orphan in &mut orphans {
        if retrier.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        orphan.transition_to(OrphanState::DeleteRequested)?;

        let path = orphan.entry.relative_path.clone();
        let result = retrier
            .run("delete", || {
                let remote = Arc::clone(remote);
                let path = path.clone();
                async move { remote.delete(&path).await }
            })
            .await;

        match result {
            Ok(()) => {
                orphan.transition_to(OrphanState::Deleted)?;
                stats.record_deleted();
                info!(path = %path, "Deleted orphan");
            }
            Err(RetryError::Cancelled) => return Err(SyncError::Cancelled),
            Err(RetryError::Fatal(RemoteError::Auth(e))) => return Err(SyncError::Auth(e)),
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to delete orphan");
                orphan.transition_to(OrphanState::DeleteFailed(e.to_string()))?;
                stats.record_delete_failed();
            }
        }
    }

    Ok(orphans)
}
