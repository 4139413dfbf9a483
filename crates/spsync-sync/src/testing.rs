//! In-memory remote library used by the engine tests
//!
//! Stores uploaded files in a map keyed case-insensitively, enforces
//! gap-free chunk offsets, counts every call and can inject failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use spsync_core::domain::{Fingerprint, RelativePath, RemoteEntry};
use spsync_core::ports::{
    ChunkAck, IRemoteLibrary, MetadataWrite, MetadataWriteResult, RemoteError, SessionHandle,
};

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: RelativePath,
    pub bytes: Vec<u8>,
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug)]
struct Session {
    path: RelativePath,
    total: u64,
    received: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Calls {
    pub list: AtomicU32,
    pub direct: AtomicU32,
    pub sessions: AtomicU32,
    pub chunks: AtomicU32,
    pub aborts: AtomicU32,
    pub batches: AtomicU32,
    pub deletes: AtomicU32,
    pub folders: AtomicU32,
}

impl Calls {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// Remote library fake
#[derive(Debug)]
pub struct FakeRemote {
    files: Mutex<BTreeMap<String, StoredFile>>,
    folders: Mutex<BTreeMap<String, RelativePath>>,
    sessions: Mutex<HashMap<String, Session>>,
    pub calls: Calls,
    pub column_available: bool,
    /// Chunk call numbers (1-based, across the run) that fail once
    chunk_failures: Mutex<HashSet<u32>>,
    /// Error returned by injected chunk failures
    chunk_error: Mutex<RemoteError>,
    /// Paths whose direct upload fails every time with this error
    upload_errors: Mutex<HashMap<String, RemoteError>>,
    /// Paths whose metadata write fails inside a batch
    metadata_item_failures: Mutex<HashSet<String>>,
    /// Error returned for whole batches
    batch_error: Mutex<Option<RemoteError>>,
    /// Paths whose delete fails
    delete_failures: Mutex<HashSet<String>>,
    /// Error returned by list_inventory
    list_error: Mutex<Option<RemoteError>>,
    /// Token cancelled while serving the given chunk call
    cancel_on_chunk: Mutex<Option<(u32, CancellationToken)>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            files: Mutex::default(),
            folders: Mutex::default(),
            sessions: Mutex::default(),
            calls: Calls::default(),
            column_available: true,
            chunk_failures: Mutex::default(),
            chunk_error: Mutex::new(RemoteError::Transient("connection reset".into())),
            upload_errors: Mutex::default(),
            metadata_item_failures: Mutex::default(),
            batch_error: Mutex::default(),
            delete_failures: Mutex::default(),
            list_error: Mutex::default(),
            cancel_on_chunk: Mutex::default(),
        }
    }
}

fn rel(path: &str) -> RelativePath {
    RelativePath::new(path).unwrap()
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_column() -> Self {
        Self {
            column_available: false,
            ..Self::default()
        }
    }

    pub fn put_file(&self, path: &str, bytes: &[u8], fingerprint: Option<Fingerprint>) {
        self.files.lock().unwrap().insert(
            path.to_lowercase(),
            StoredFile {
                path: rel(path),
                bytes: bytes.to_vec(),
                fingerprint,
            },
        );
    }

    pub fn put_folder(&self, path: &str) {
        self.folders
            .lock()
            .unwrap()
            .insert(path.to_lowercase(), rel(path));
    }

    pub fn file(&self, path: &str) -> Option<StoredFile> {
        self.files.lock().unwrap().get(&path.to_lowercase()).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.folders.lock().unwrap().contains_key(&path.to_lowercase())
    }

    pub fn fail_chunk_calls(&self, numbers: &[u32]) {
        self.chunk_failures.lock().unwrap().extend(numbers);
    }

    /// Cancels `token` while chunk call `n` (1-based) is in flight
    pub fn cancel_during_chunk(&self, n: u32, token: CancellationToken) {
        *self.cancel_on_chunk.lock().unwrap() = Some((n, token));
    }

    pub fn set_chunk_error(&self, error: RemoteError) {
        *self.chunk_error.lock().unwrap() = error;
    }

    pub fn fail_upload(&self, path: &str, error: RemoteError) {
        self.upload_errors
            .lock()
            .unwrap()
            .insert(path.to_lowercase(), error);
    }

    pub fn fail_metadata_for(&self, path: &str) {
        self.metadata_item_failures
            .lock()
            .unwrap()
            .insert(path.to_lowercase());
    }

    pub fn fail_batches(&self, error: RemoteError) {
        *self.batch_error.lock().unwrap() = Some(error);
    }

    pub fn fail_delete(&self, path: &str) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(path.to_lowercase());
    }

    pub fn fail_list(&self, error: RemoteError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    fn store(&self, path: &RelativePath, bytes: Vec<u8>) {
        let mut files = self.files.lock().unwrap();
        // Replacing content clears the column value, as a new version does
        files.insert(
            path.key(),
            StoredFile {
                path: path.clone(),
                bytes,
                fingerprint: None,
            },
        );
    }
}

#[async_trait]
impl IRemoteLibrary for FakeRemote {
    async fn list_inventory(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut entries: Vec<RemoteEntry> = self
            .folders
            .lock()
            .unwrap()
            .values()
            .map(|p| RemoteEntry::folder(p.clone()))
            .collect();
        let column = self.column_available;
        entries.extend(self.files.lock().unwrap().values().map(|f| {
            RemoteEntry::file(
                f.path.clone(),
                f.bytes.len() as u64,
                if column { f.fingerprint.clone() } else { None },
            )
        }));
        Ok(entries)
    }

    async fn upload_direct(&self, path: &RelativePath, bytes: Vec<u8>) -> Result<(), RemoteError> {
        self.calls.direct.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.upload_errors.lock().unwrap().get(&path.key()) {
            return Err(err.clone());
        }
        self.store(path, bytes);
        Ok(())
    }

    async fn open_chunked_session(
        &self,
        path: &RelativePath,
        total_size: u64,
    ) -> Result<SessionHandle, RemoteError> {
        let n = self.calls.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let url = format!("session-{n}");
        self.sessions.lock().unwrap().insert(
            url.clone(),
            Session {
                path: path.clone(),
                total: total_size,
                received: Vec::new(),
            },
        );
        Ok(SessionHandle {
            upload_url: url,
            total_size,
        })
    }

    async fn upload_chunk(
        &self,
        session: &SessionHandle,
        offset: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck, RemoteError> {
        let n = self.calls.chunks.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = self.cancel_on_chunk.lock().unwrap().as_ref() {
            if *at == n {
                token.cancel();
            }
        }
        if self.chunk_failures.lock().unwrap().remove(&n) {
            return Err(self.chunk_error.lock().unwrap().clone());
        }

        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(&session.upload_url)
            .ok_or_else(|| RemoteError::NotFound(session.upload_url.clone()))?;
        if offset != state.received.len() as u64 {
            return Err(RemoteError::Other(format!(
                "expected offset {}, got {offset}",
                state.received.len()
            )));
        }
        state.received.extend_from_slice(&bytes);

        if state.received.len() as u64 == state.total {
            let done = sessions
                .remove(&session.upload_url)
                .ok_or_else(|| RemoteError::NotFound(session.upload_url.clone()))?;
            drop(sessions);
            self.store(&done.path, done.received);
            Ok(ChunkAck::Completed)
        } else {
            Ok(ChunkAck::Accepted)
        }
    }

    async fn abort_session(&self, session: &SessionHandle) -> Result<(), RemoteError> {
        self.calls.aborts.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().remove(&session.upload_url);
        Ok(())
    }

    async fn batch_write_metadata(
        &self,
        writes: &[MetadataWrite],
    ) -> Result<Vec<MetadataWriteResult>, RemoteError> {
        self.calls.batches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.batch_error.lock().unwrap().clone() {
            return Err(err);
        }
        let failures = self.metadata_item_failures.lock().unwrap().clone();
        let mut files = self.files.lock().unwrap();
        Ok(writes
            .iter()
            .map(|w| {
                let key = w.path.key();
                match files.get_mut(&key) {
                    Some(_) if failures.contains(&key) => {
                        MetadataWriteResult::failed(w.path.clone(), "status 500")
                    }
                    Some(file) => {
                        file.fingerprint = Some(w.fingerprint.clone());
                        MetadataWriteResult::ok(w.path.clone())
                    }
                    None => MetadataWriteResult::failed(w.path.clone(), "status 404"),
                }
            })
            .collect())
    }

    async fn delete(&self, path: &RelativePath) -> Result<(), RemoteError> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        if self.delete_failures.lock().unwrap().contains(&path.key()) {
            return Err(RemoteError::Permission(format!("locked: {path}")));
        }
        self.files.lock().unwrap().remove(&path.key());
        Ok(())
    }

    async fn ensure_folder(&self, path: &RelativePath) -> Result<(), RemoteError> {
        self.calls.folders.fetch_add(1, Ordering::SeqCst);
        self.folders
            .lock()
            .unwrap()
            .entry(path.key())
            .or_insert_with(|| path.clone());
        Ok(())
    }

    async fn try_create_metadata_column(&self) -> bool {
        self.column_available
    }
}

/// Retry policy without real waiting
pub fn fast_policy(attempts: u32) -> crate::throttle::RetryPolicy {
    crate::throttle::RetryPolicy::new(attempts, Duration::from_millis(1))
}

/// Retrier with fresh statistics, gate and cancellation
pub fn retrier(attempts: u32) -> crate::throttle::Retrier {
    crate::throttle::Retrier::new(
        fast_policy(attempts),
        std::sync::Arc::new(crate::throttle::ThrottleGate::new()),
        std::sync::Arc::new(spsync_core::stats::SyncStats::new()),
        tokio_util::sync::CancellationToken::new(),
    )
}
