//! Run-wide statistics accumulator
//!
//! Created at run start, shared by reference with every worker, updated
//! only through atomic increments and read once at the end through
//! [`SyncStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe counters for one sync run
#[derive(Debug, Default)]
pub struct SyncStats {
    new_files: AtomicU64,
    updated_files: AtomicU64,
    unchanged_files: AtomicU64,
    skipped_files: AtomicU64,
    failed_files: AtomicU64,
    read_errors: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_skipped: AtomicU64,
    chunks_uploaded: AtomicU64,
    retries: AtomicU64,
    throttle_events: AtomicU64,
    metadata_written: AtomicU64,
    metadata_failed: AtomicU64,
    orphans_reported: AtomicU64,
    deleted: AtomicU64,
    delete_failed: AtomicU64,
}

macro_rules! counter {
    ($incr:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl SyncStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_new, new_files);
    counter!(record_updated, updated_files);
    counter!(record_skipped, skipped_files);
    counter!(record_failed, failed_files);
    counter!(record_read_error, read_errors);
    counter!(record_chunk, chunks_uploaded);
    counter!(record_retry, retries);
    counter!(record_throttle, throttle_events);
    counter!(record_metadata_written, metadata_written);
    counter!(record_metadata_failed, metadata_failed);
    counter!(record_orphan_reported, orphans_reported);
    counter!(record_deleted, deleted);
    counter!(record_delete_failed, delete_failed);

    /// An unchanged file: nothing transferred, `size` bytes saved
    pub fn record_unchanged(&self, size: u64) {
        self.unchanged_files.fetch_add(1, Ordering::Relaxed);
        self.bytes_skipped.fetch_add(size, Ordering::Relaxed);
    }

    pub fn add_bytes_uploaded(&self, bytes: u64) {
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Read all counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            new_files: load(&self.new_files),
            updated_files: load(&self.updated_files),
            unchanged_files: load(&self.unchanged_files),
            skipped_files: load(&self.skipped_files),
            failed_files: load(&self.failed_files),
            read_errors: load(&self.read_errors),
            bytes_uploaded: load(&self.bytes_uploaded),
            bytes_skipped: load(&self.bytes_skipped),
            chunks_uploaded: load(&self.chunks_uploaded),
            retries: load(&self.retries),
            throttle_events: load(&self.throttle_events),
            metadata_written: load(&self.metadata_written),
            metadata_failed: load(&self.metadata_failed),
            orphans_reported: load(&self.orphans_reported),
            deleted: load(&self.deleted),
            delete_failed: load(&self.delete_failed),
        }
    }
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub new_files: u64,
    pub updated_files: u64,
    pub unchanged_files: u64,
    pub skipped_files: u64,
    pub failed_files: u64,
    pub read_errors: u64,
    pub bytes_uploaded: u64,
    pub bytes_skipped: u64,
    pub chunks_uploaded: u64,
    pub retries: u64,
    pub throttle_events: u64,
    pub metadata_written: u64,
    pub metadata_failed: u64,
    pub orphans_reported: u64,
    pub deleted: u64,
    pub delete_failed: u64,
}

impl StatsSnapshot {
    /// Files whose content was transferred
    #[must_use]
    pub fn uploaded_files(&self) -> u64 {
        self.new_files + self.updated_files
    }

    /// Share of bytes that did not need to be transferred, in percent
    #[must_use]
    pub fn efficiency_percent(&self) -> f64 {
        let total = self.bytes_uploaded + self.bytes_skipped;
        if total == 0 {
            return 0.0;
        }
        self.bytes_skipped as f64 * 100.0 / total as f64
    }

    /// Whether the run must be reported as failed
    ///
    /// Skipped and unchanged files never count; failed uploads and failed
    /// deletions do.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed_files > 0 || self.delete_failed > 0
    }
}

/// Render a byte count with binary units, e.g. `1.5 MiB`
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
