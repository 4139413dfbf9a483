//! Content transform port
//!
//! A transform rewrites a file's bytes (and usually its extension) before
//! the file is fingerprinted and uploaded, e.g. rendering Markdown to HTML.
//! Uses `anyhow::Result` since any failure is handled the same way: report
//! it and fall back to the original content, or skip the file when
//! conversion is required.

use async_trait::async_trait;

use crate::domain::newtypes::RelativePath;

/// Result of a successful transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// New sync-root-relative path (e.g. `docs/readme.html`)
    pub relative_path: RelativePath,
    pub bytes: Vec<u8>,
}

/// Rewrites file content before it enters the hashing stage
#[async_trait]
pub trait IContentTransform: Send + Sync {
    /// Whether this transform handles the given file
    fn applies_to(&self, path: &RelativePath) -> bool;

    /// Path the transformed file is uploaded under
    ///
    /// Used to keep the remote copy when the transform fails and the file is
    /// skipped.
    fn target_path(&self, path: &RelativePath) -> RelativePath {
        path.clone()
    }

    /// Transform `bytes` read from `path`
    async fn transform(&self, path: &RelativePath, bytes: Vec<u8>)
        -> anyhow::Result<TransformOutput>;
}
