//! Content transform stage
//!
//! Runs before hashing. Files the configured [`IContentTransform`] applies
//! to have their bytes replaced by the transform output and are renamed to
//! the output path; everything else is staged with its own content.
//!
//! When a transform fails the original content is staged instead, unless
//! conversion is required, in which case the file is skipped.
//!
//! [`CommandTransform`] is the built-in transform: an external command that
//! reads the original bytes on stdin and writes the converted bytes to
//! stdout, e.g. `pandoc -f gfm -t html`.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Serialize;
use spsync_core::config::TransformConfig;
use spsync_core::domain::{sanitize_path, LocalFile, RelativePath, SkipReason, StagedFile};
use spsync_core::ports::{IContentTransform, TransformOutput};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::hasher::ReadFailure;
use crate::SyncError;

/// Longest stderr excerpt kept in a transform error
const MAX_STDERR: usize = 300;

// ============================================================================
// CommandTransform
// ============================================================================

/// Transform backed by an external command (stdin to stdout)
#[derive(Debug, Clone)]
pub struct CommandTransform {
    argv: Vec<String>,
    extensions: Vec<String>,
    target_extension: String,
}

impl CommandTransform {
    /// Creates a command transform
    ///
    /// # Errors
    /// Returns `SyncError::Config` if `argv` is empty
    pub fn new(
        argv: Vec<String>,
        extensions: Vec<String>,
        target_extension: impl Into<String>,
    ) -> Result<Self, SyncError> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(SyncError::Config(
                "transform.command must name a program".to_string(),
            ));
        }
        Ok(Self {
            argv,
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            target_extension: target_extension.into().trim_start_matches('.').to_string(),
        })
    }

    /// Builds the transform from configuration, `None` when no command is set
    pub fn from_config(config: &TransformConfig) -> Result<Option<Self>, SyncError> {
        if config.command.is_empty() {
            return Ok(None);
        }
        Self::new(
            config.command.clone(),
            config.extensions.clone(),
            config.target_extension.clone(),
        )
        .map(Some)
    }
}

#[async_trait]
impl IContentTransform for CommandTransform {
    fn applies_to(&self, path: &RelativePath) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e == &ext.to_lowercase()))
    }

    fn target_path(&self, path: &RelativePath) -> RelativePath {
        path.with_extension(&self.target_extension)
    }

    async fn transform(&self, path: &RelativePath, bytes: Vec<u8>) -> anyhow::Result<TransformOutput> {
        let (program, args) = self
            .argv
            .split_first()
            .context("transform command is empty")?;

        let mut child = Command::new(program)
            .args(args)
            .env("SPSYNC_SOURCE_PATH", path.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start transform command '{program}'"))?;

        // Feed stdin concurrently so a chatty command cannot block on a full
        // stdout pipe while we are still writing
        let mut stdin = child.stdin.take().context("transform stdin unavailable")?;
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&bytes).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for transform command")?;
        writer
            .await
            .context("transform stdin writer failed")?
            .context("failed to write transform input")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(MAX_STDERR).collect();
            bail!("transform command exited with {}: {excerpt}", output.status);
        }

        Ok(TransformOutput {
            relative_path: self.target_path(path),
            bytes: output.stdout,
        })
    }
}

// ============================================================================
// Staging
// ============================================================================

/// A file left out of the run before hashing
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub relative_path: RelativePath,
    pub target_relative_path: RelativePath,
    pub reason: SkipReason,
}

/// Files ready for hashing plus the ones left out on the way
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub staged: Vec<StagedFile>,
    pub skipped: Vec<SkippedFile>,
    /// Files the transform applies to that could not be read
    pub read_failures: Vec<ReadFailure>,
    /// Transformed targets of files that fell back to their original
    /// content; the remote copies stay in place
    pub retained: Vec<RelativePath>,
}

enum Staged {
    Ready(StagedFile),
    Fallback { staged: StagedFile, retained: RelativePath },
    Skipped(SkippedFile),
    Unreadable(ReadFailure),
}

/// Stages matched files, applying `transform` where it applies
///
/// At most `workers` transforms run at once.
pub async fn stage_files(
    files: Vec<LocalFile>,
    transform: Option<Arc<dyn IContentTransform>>,
    required: bool,
    workers: usize,
) -> StageOutcome {
    let mut outcome = StageOutcome::default();

    let Some(transform) = transform else {
        outcome.staged = files.into_iter().map(LocalFile::stage).collect();
        return outcome;
    };

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for file in files {
        if !transform.applies_to(&file.relative_path) {
            outcome.staged.push(file.stage());
            continue;
        }
        let transform = Arc::clone(&transform);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            stage_one(file, transform.as_ref(), required).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Staged::Ready(staged)) => outcome.staged.push(staged),
            Ok(Staged::Fallback { staged, retained }) => {
                outcome.staged.push(staged);
                outcome.retained.push(retained);
            }
            Ok(Staged::Skipped(skipped)) => outcome.skipped.push(skipped),
            Ok(Staged::Unreadable(failure)) => outcome.read_failures.push(failure),
            Err(e) => warn!(error = %e, "Transform task panicked"),
        }
    }

    outcome
}

async fn stage_one(file: LocalFile, transform: &dyn IContentTransform, required: bool) -> Staged {
    let target = sanitize_path(&transform.target_path(&file.relative_path));

    let bytes = match tokio::fs::read(&file.absolute_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %file.relative_path, error = %e, "Failed to read file, leaving it out of the plan");
            return Staged::Unreadable(ReadFailure {
                relative_path: file.relative_path,
                target_relative_path: target,
                error: e.to_string(),
            });
        }
    };

    match transform.transform(&file.relative_path, bytes).await {
        Ok(output) => {
            debug!(
                path = %file.relative_path,
                target = %output.relative_path,
                bytes = output.bytes.len(),
                "Transformed content"
            );
            Staged::Ready(file.stage_transformed(&output.relative_path, output.bytes))
        }
        Err(e) if required => {
            warn!(path = %file.relative_path, error = %e, "Transform failed and conversion is required, skipping file");
            Staged::Skipped(SkippedFile {
                target_relative_path: target,
                relative_path: file.relative_path,
                reason: SkipReason::TransformFailed(format!("{e:#}")),
            })
        }
        Err(e) => {
            warn!(path = %file.relative_path, error = %e, "Transform failed, uploading original content");
            Staged::Fallback {
                staged: file.stage(),
                retained: target,
            }
        }
    }
}
