//! Metadata batch committer
//!
//! Collects fingerprint column writes for uploaded files (and backfills for
//! unchanged files whose remote copy has no fingerprint yet) and sends them
//! in batched requests. The queue flushes on its own once it holds
//! `batch_size` writes; [`MetadataCommitter::flush`] sends the remainder at
//! the end of the run.
//!
//! A failed write never affects the upload it belongs to: the content is
//! already stored remotely. When the service refuses the writes outright
//! (permission denied), the committer turns itself off for the rest of the
//! run and later runs fall back to size comparison.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use spsync_core::config::MAX_METADATA_BATCH;
use spsync_core::ports::{IRemoteLibrary, MetadataWrite, MetadataWriteResult, RemoteError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::throttle::{Retrier, RetryError};

/// Batches fingerprint column writes
pub struct MetadataCommitter {
    remote: Arc<dyn IRemoteLibrary>,
    retrier: Retrier,
    batch_size: usize,
    queue: Mutex<Vec<MetadataWrite>>,
    failures: Mutex<Vec<MetadataWriteResult>>,
    enabled: AtomicBool,
}

impl MetadataCommitter {
    /// Creates a committer flushing every `batch_size` writes (1..=20)
    pub fn new(remote: Arc<dyn IRemoteLibrary>, retrier: Retrier, batch_size: usize) -> Self {
        Self {
            remote,
            retrier,
            batch_size: batch_size.clamp(1, MAX_METADATA_BATCH),
            queue: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Queues a write, sending a batch once the queue is full
    pub async fn enqueue(&self, write: MetadataWrite) {
        if !self.is_enabled() {
            return;
        }

        let batch = {
            let mut queue = self.queue.lock().await;
            queue.push(write);
            if queue.len() < self.batch_size {
                return;
            }
            std::mem::take(&mut *queue)
        };

        self.submit(batch).await;
    }

    /// Sends every queued write
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.queue.lock().await);
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "Flushing fingerprint writes");
        for batch in pending.chunks(self.batch_size) {
            self.submit(batch.to_vec()).await;
        }
    }

    /// Per-item write failures recorded so far
    pub async fn failures(&self) -> Vec<MetadataWriteResult> {
        self.failures.lock().await.clone()
    }

    async fn submit(&self, batch: Vec<MetadataWrite>) {
        if !self.is_enabled() {
            self.record_all_failed(&batch, "fingerprint column disabled").await;
            return;
        }

        let remote = Arc::clone(&self.remote);
        let result = self
            .retrier
            .run("batch_write_metadata", || {
                let remote = Arc::clone(&remote);
                let batch = batch.clone();
                async move { remote.batch_write_metadata(&batch).await }
            })
            .await;

        match result {
            Ok(results) => {
                let stats = self.retrier.stats();
                let mut failed = Vec::new();
                for item in results {
                    if item.is_success() {
                        stats.record_metadata_written();
                    } else {
                        warn!(
                            path = %item.path,
                            error = item.error.as_deref().unwrap_or(""),
                            "Fingerprint write failed"
                        );
                        stats.record_metadata_failed();
                        failed.push(item);
                    }
                }
                self.failures.lock().await.extend(failed);
            }
            Err(RetryError::Fatal(RemoteError::Permission(e))) => {
                info!(error = %e, "No permission to write fingerprints, disabling fingerprint writes for this run");
                self.enabled.store(false, Ordering::Release);
                self.record_all_failed(&batch, &e).await;
            }
            Err(e) => {
                warn!(count = batch.len(), error = %e, "Fingerprint batch failed");
                self.record_all_failed(&batch, &e.to_string()).await;
            }
        }
    }

    async fn record_all_failed(&self, batch: &[MetadataWrite], error: &str) {
        let stats = self.retrier.stats();
        let mut failures = self.failures.lock().await;
        for write in batch {
            stats.record_metadata_failed();
            failures.push(MetadataWriteResult::failed(write.path.clone(), error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{retrier, Calls, FakeRemote};
    use spsync_core::domain::{Fingerprint, RelativePath};

    fn write(path: &str, n: u128) -> MetadataWrite {
        MetadataWrite {
            path: RelativePath::new(path).unwrap(),
            fingerprint: Fingerprint::from_u128(n),
        }
    }

    fn setup(batch_size: usize) -> (Arc<FakeRemote>, MetadataCommitter) {
        let remote = Arc::new(FakeRemote::new());
        let committer = MetadataCommitter::new(remote.clone(), retrier(2), batch_size);
        (remote, committer)
    }

    #[tokio::test]
    async fn test_flushes_when_batch_is_full() {
        let (remote, committer) = setup(20);
        for i in 0..45u128 {
            let path = format!("f{i}.txt");
            remote.put_file(&path, b"x", None);
            committer.enqueue(write(&path, i)).await;
        }
        // Two full batches went out on their own
        assert_eq!(Calls::get(&remote.calls.batches), 2);

        committer.flush().await;
        assert_eq!(Calls::get(&remote.calls.batches), 3);
        assert_eq!(
            remote.file("f44.txt").unwrap().fingerprint,
            Some(Fingerprint::from_u128(44))
        );
        assert_eq!(committer.retrier.stats().snapshot().metadata_written, 45);
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue_sends_nothing() {
        let (remote, committer) = setup(20);
        committer.flush().await;
        assert_eq!(Calls::get(&remote.calls.batches), 0);
    }

    #[tokio::test]
    async fn test_batch_size_is_capped() {
        let (_, committer) = setup(500);
        assert_eq!(committer.batch_size, MAX_METADATA_BATCH);
    }

    #[tokio::test]
    async fn test_item_failures_do_not_fail_batch() {
        let (remote, committer) = setup(20);
        remote.put_file("a.txt", b"a", None);
        remote.put_file("b.txt", b"b", None);
        remote.fail_metadata_for("b.txt");

        committer.enqueue(write("a.txt", 1)).await;
        committer.enqueue(write("b.txt", 2)).await;
        committer.flush().await;

        assert!(remote.file("a.txt").unwrap().fingerprint.is_some());
        let failures = committer.failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path.as_str(), "b.txt");

        let stats = committer.retrier.stats().snapshot();
        assert_eq!(stats.metadata_written, 1);
        assert_eq!(stats.metadata_failed, 1);
        assert_eq!(stats.failed_files, 0);
    }

    #[tokio::test]
    async fn test_permission_denied_disables_committer() {
        let (remote, committer) = setup(1);
        remote.put_file("a.txt", b"a", None);
        remote.fail_batches(RemoteError::Permission("read-only".into()));

        committer.enqueue(write("a.txt", 1)).await;
        assert!(!committer.is_enabled());

        committer.enqueue(write("a.txt", 2)).await;
        committer.flush().await;
        // Nothing more is sent once disabled
        assert_eq!(Calls::get(&remote.calls.batches), 1);
        assert_eq!(committer.retrier.stats().snapshot().metadata_failed, 1);
    }

    #[tokio::test]
    async fn test_transient_batch_failure_is_retried() {
        let (remote, committer) = setup(20);
        remote.put_file("a.txt", b"a", None);
        remote.fail_batches(RemoteError::Transient("502".into()));

        committer.enqueue(write("a.txt", 1)).await;
        committer.flush().await;

        // retrier(2): two attempts, then the items are reported failed
        assert_eq!(Calls::get(&remote.calls.batches), 2);
        assert_eq!(committer.failures().await.len(), 1);
        assert!(committer.is_enabled());
    }
}
