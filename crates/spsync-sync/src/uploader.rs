//! Upload worker pool
//!
//! Transfers every candidate planned as `New` or `Updated`:
//!
//! - Files up to the direct threshold go up in a single request.
//! - Larger files use an upload session and are sent as sequential
//!   fixed-size chunks, the last one sized to the remainder.
//!
//! Each unit of work (the whole file for a direct upload, each chunk for a
//! session) is retried on its own through the shared [`Retrier`]. A failing
//! chunk is retried at the same offset, so acknowledged bytes are never
//! sent twice. A session that cannot finish is aborted on the remote side.
//!
//! Parent folders of each target are created before the first byte is sent,
//! at most once per folder per run.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use dashmap::DashMap;
use spsync_core::config::MAX_UPLOAD_WORKERS;
use spsync_core::domain::{
    CandidateFile, ContentSource, FailureKind, RelativePath, SyncDecision, UploadOutcome,
    UploadResult,
};
use spsync_core::ports::{ChunkAck, IRemoteLibrary, MetadataWrite, RemoteError, SessionHandle};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::committer::MetadataCommitter;
use crate::throttle::{Retrier, RetryError};
use crate::SyncError;

/// Pool sizing and transfer mode thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    /// Concurrent uploads, capped at [`MAX_UPLOAD_WORKERS`]
    pub workers: usize,
    /// Files of at most this many bytes use a direct upload
    pub direct_threshold: u64,
    /// Bytes per chunk in a session upload
    pub chunk_size: u64,
}

impl UploadSettings {
    fn effective_workers(&self) -> usize {
        self.workers.clamp(1, MAX_UPLOAD_WORKERS)
    }
}

/// A planned upload
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub candidate: CandidateFile,
    pub decision: SyncDecision,
}

/// Server-side session plus the offset the next chunk starts at
///
/// Passed by value into each chunk attempt; resuming after a failure is a
/// matter of sending the chunk at `next_offset` again.
#[derive(Debug, Clone)]
pub struct ChunkedSession {
    pub handle: SessionHandle,
    pub next_offset: u64,
    pub chunks_sent: u32,
}

impl ChunkedSession {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            next_offset: 0,
            chunks_sent: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_offset >= self.handle.total_size
    }

    /// Length of the next chunk
    pub fn next_len(&self, chunk_size: u64) -> u64 {
        chunk_size.min(self.handle.total_size.saturating_sub(self.next_offset))
    }

    /// The session after the chunk at `next_offset` was acknowledged
    #[must_use]
    pub fn advanced(self, len: u64) -> Self {
        Self {
            next_offset: self.next_offset + len,
            chunks_sent: self.chunks_sent + 1,
            handle: self.handle,
        }
    }
}

/// Number of chunks a file of `size` bytes is split into
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size.max(1))
}

/// Creates each remote folder at most once per run
#[derive(Default)]
struct FolderCache {
    folders: DashMap<String, Arc<OnceCell<()>>>,
}

impl FolderCache {
    async fn ensure(
        &self,
        remote: &Arc<dyn IRemoteLibrary>,
        retrier: &Retrier,
        folder: &RelativePath,
    ) -> Result<(), RetryError> {
        let cell = self
            .folders
            .entry(folder.key())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| async {
            retrier
                .run("ensure_folder", || {
                    let remote = Arc::clone(remote);
                    let folder = folder.clone();
                    async move { remote.ensure_folder(&folder).await }
                })
                .await?;
            debug!(folder = %folder, "Remote folder ready");
            Ok::<(), RetryError>(())
        })
        .await
        .map(|_| ())
    }
}

/// Why a file upload stopped
#[derive(Debug)]
enum TransferError {
    Read(io::Error),
    Remote(RetryError),
}

impl From<RetryError> for TransferError {
    fn from(err: RetryError) -> Self {
        Self::Remote(err)
    }
}

impl TransferError {
    fn into_failure(self) -> FailureKind {
        match self {
            Self::Read(e) => FailureKind::Read(e.to_string()),
            Self::Remote(RetryError::Cancelled) => FailureKind::Cancelled,
            Self::Remote(RetryError::Exhausted { attempts, last }) => {
                FailureKind::RetriesExhausted(format!("{last} (after {attempts} attempts)"))
            }
            Self::Remote(RetryError::Fatal(RemoteError::Auth(e))) => FailureKind::Auth(e),
            Self::Remote(RetryError::Fatal(e)) => FailureKind::Remote(e.to_string()),
        }
    }
}

/// State shared by every upload worker of a run
struct PoolContext {
    remote: Arc<dyn IRemoteLibrary>,
    settings: UploadSettings,
    retrier: Retrier,
    committer: Option<Arc<MetadataCommitter>>,
    folders: FolderCache,
}

/// Bounded pool of upload workers
pub struct UploadPool {
    remote: Arc<dyn IRemoteLibrary>,
    settings: UploadSettings,
    retrier: Retrier,
    committer: Option<Arc<MetadataCommitter>>,
}

impl UploadPool {
    pub fn new(
        remote: Arc<dyn IRemoteLibrary>,
        settings: UploadSettings,
        retrier: Retrier,
        committer: Option<Arc<MetadataCommitter>>,
    ) -> Self {
        Self {
            remote,
            settings,
            retrier,
            committer,
        }
    }

    /// Uploads every job, returning one result per job
    ///
    /// Successful uploads queue their fingerprint on the committer.
    ///
    /// # Errors
    /// Returns `SyncError::Auth` as soon as any worker's credentials are
    /// rejected; the remaining workers are stopped.
    pub async fn run(&self, jobs: Vec<UploadJob>) -> Result<Vec<UploadResult>, SyncError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        // Child token: an auth failure stops this pool without cancelling
        // the caller's run token
        let pool_cancel = self.retrier.cancel_token().child_token();
        let context = Arc::new(PoolContext {
            remote: Arc::clone(&self.remote),
            settings: self.settings,
            retrier: self.retrier.with_cancel(pool_cancel.clone()),
            committer: self.committer.clone(),
            folders: FolderCache::default(),
        });

        let workers = self.settings.effective_workers();
        info!(files = jobs.len(), workers, "Uploading files");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for job in jobs {
            let context = Arc::clone(&context);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                upload_one(&context, job).await
            });
        }

        let mut results = Vec::new();
        let mut auth_failure = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Upload task panicked");
                    continue;
                }
            };
            if let UploadOutcome::Failed(FailureKind::Auth(e)) = &result.outcome {
                if auth_failure.is_none() {
                    warn!(error = %e, "Credentials rejected, stopping uploads");
                    pool_cancel.cancel();
                    auth_failure = Some(e.clone());
                }
            }
            results.push(result);
        }

        if let Some(e) = auth_failure {
            return Err(SyncError::Auth(e));
        }

        results.sort_by(|a, b| {
            a.target_relative_path
                .as_str()
                .cmp(b.target_relative_path.as_str())
        });
        Ok(results)
    }
}

async fn upload_one(context: &PoolContext, job: UploadJob) -> UploadResult {
    let candidate = &job.candidate;
    let target = candidate.target_relative_path().clone();
    let stats = context.retrier.stats();

    let transfer = async {
        if context.retrier.is_cancelled() {
            return Err(TransferError::Remote(RetryError::Cancelled));
        }
        for folder in target.ancestors() {
            context
                .folders
                .ensure(&context.remote, &context.retrier, &folder)
                .await?;
        }
        if candidate.size_bytes() <= context.settings.direct_threshold {
            upload_direct(context, candidate).await
        } else {
            upload_chunked(context, candidate).await
        }
    };

    match transfer.await {
        Ok((bytes, chunks)) => {
            match job.decision {
                SyncDecision::New => stats.record_new(),
                _ => stats.record_updated(),
            }
            stats.add_bytes_uploaded(bytes);
            info!(path = %target, bytes, chunks, decision = job.decision.label(), "Uploaded");

            if let Some(committer) = &context.committer {
                committer
                    .enqueue(MetadataWrite {
                        path: target.clone(),
                        fingerprint: candidate.fingerprint().clone(),
                    })
                    .await;
            }

            UploadResult {
                target_relative_path: target,
                bytes_transferred: bytes,
                chunk_count: chunks,
                outcome: UploadOutcome::Success,
            }
        }
        Err(e) => {
            let failure = e.into_failure();
            if failure != FailureKind::Cancelled {
                stats.record_failed();
                warn!(path = %target, error = %failure, "Upload failed");
            }
            UploadResult {
                target_relative_path: target,
                bytes_transferred: 0,
                chunk_count: 0,
                outcome: UploadOutcome::Failed(failure),
            }
        }
    }
}

async fn upload_direct(
    context: &PoolContext,
    candidate: &CandidateFile,
) -> Result<(u64, u32), TransferError> {
    let bytes = read_all(candidate.content()).await.map_err(TransferError::Read)?;
    let len = bytes.len() as u64;
    let target = candidate.target_relative_path();

    context
        .retrier
        .run("upload_direct", || {
            let remote = Arc::clone(&context.remote);
            let bytes = bytes.clone();
            async move { remote.upload_direct(target, bytes).await }
        })
        .await?;

    Ok((len, 1))
}

async fn upload_chunked(
    context: &PoolContext,
    candidate: &CandidateFile,
) -> Result<(u64, u32), TransferError> {
    let target = candidate.target_relative_path();
    let total = candidate.size_bytes();
    let chunk_size = context.settings.chunk_size.max(1);

    let handle = context
        .retrier
        .run("open_chunked_session", || {
            let remote = Arc::clone(&context.remote);
            async move { remote.open_chunked_session(target, total).await }
        })
        .await?;

    debug!(
        path = %target,
        total,
        chunks = chunk_count(total, chunk_size),
        "Upload session opened"
    );

    let mut session = ChunkedSession::new(handle);
    let result = send_chunks(context, candidate, &mut session, chunk_size).await;

    if let Err(e) = &result {
        let cleanup = context.remote.abort_session(&session.handle).await;
        match cleanup {
            Ok(()) => debug!(path = %target, "Upload session aborted"),
            Err(abort_err) => {
                warn!(path = %target, error = %abort_err, "Failed to abort upload session")
            }
        }
        debug!(path = %target, offset = session.next_offset, error = ?e, "Chunked upload stopped");
    }

    result.map(|()| (session.next_offset, session.chunks_sent))
}

async fn send_chunks(
    context: &PoolContext,
    candidate: &CandidateFile,
    session: &mut ChunkedSession,
    chunk_size: u64,
) -> Result<(), TransferError> {
    let stats = context.retrier.stats();

    while !session.is_complete() {
        let offset = session.next_offset;
        let len = session.next_len(chunk_size);
        let bytes = read_range(candidate.content(), offset, len)
            .await
            .map_err(TransferError::Read)?;

        let handle = &session.handle;
        let ack = context
            .retrier
            .run("upload_chunk", || {
                let remote = Arc::clone(&context.remote);
                let bytes = bytes.clone();
                async move { remote.upload_chunk(handle, offset, bytes).await }
            })
            .await?;

        stats.record_chunk();
        *session = session.clone().advanced(len);

        if ack == ChunkAck::Completed && !session.is_complete() {
            return Err(TransferError::Remote(RetryError::Fatal(RemoteError::Other(
                format!("session completed early at offset {}", session.next_offset),
            ))));
        }
    }
    Ok(())
}

async fn read_all(content: &ContentSource) -> io::Result<Vec<u8>> {
    match content {
        ContentSource::File(path) => tokio::fs::read(path).await,
        ContentSource::Buffer(bytes) => Ok(bytes.to_vec()),
    }
}

/// Reads `len` bytes at `offset`, failing if the content is shorter
async fn read_range(content: &ContentSource, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    let short = || {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("content ended before byte {}", offset + len),
        )
    };

    match content {
        ContentSource::File(path) => {
            let mut file = tokio::fs::File::open(path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buffer = vec![0u8; len as usize];
            file.read_exact(&mut buffer).await.map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    short()
                } else {
                    e
                }
            })?;
            Ok(buffer)
        }
        ContentSource::Buffer(bytes) => {
            let start = usize::try_from(offset).map_err(|_| short())?;
            let end = usize::try_from(offset + len).map_err(|_| short())?;
            bytes.get(start..end).map(<[u8]>::to_vec).ok_or_else(short)
        }
    }
}
