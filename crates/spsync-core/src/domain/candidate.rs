//! Local candidate files
//!
//! A local file moves through three stages during a run, each its own type
//! so that the fingerprint can only be attached once:
//!
//! ```text
//! LocalFile ──transform──▶ StagedFile ──hash──▶ CandidateFile
//! (matched)               (target path,         (fingerprint,
//!                          content source)       immutable)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::newtypes::{Fingerprint, RelativePath};
use super::sanitize::sanitize_path;

/// Where the bytes to hash and upload come from
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// The file on disk, read in streaming fashion
    File(PathBuf),
    /// Bytes produced by a content transform, held in memory
    Buffer(Arc<[u8]>),
}

impl ContentSource {
    /// Whether the content was produced by a transform
    #[must_use]
    pub fn is_transformed(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }
}

/// A file selected by the path matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalFile {
    pub absolute_path: PathBuf,
    pub relative_path: RelativePath,
    pub size_bytes: u64,
}

impl LocalFile {
    /// Stage the file with its own content and name
    #[must_use]
    pub fn stage(self) -> StagedFile {
        let target_relative_path = sanitize_path(&self.relative_path);
        StagedFile {
            content: ContentSource::File(self.absolute_path.clone()),
            target_relative_path,
            size_bytes: self.size_bytes,
            absolute_path: self.absolute_path,
            relative_path: self.relative_path,
        }
    }

    /// Stage the file with content replaced by a transform
    #[must_use]
    pub fn stage_transformed(self, target: &RelativePath, bytes: Vec<u8>) -> StagedFile {
        StagedFile {
            target_relative_path: sanitize_path(target),
            size_bytes: bytes.len() as u64,
            content: ContentSource::Buffer(Arc::from(bytes)),
            absolute_path: self.absolute_path,
            relative_path: self.relative_path,
        }
    }
}

/// A file whose target path and content are fixed, waiting to be hashed
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub absolute_path: PathBuf,
    pub relative_path: RelativePath,
    /// Sanitized remote path relative to the remote root
    pub target_relative_path: RelativePath,
    /// Size of the content that will be uploaded
    pub size_bytes: u64,
    pub content: ContentSource,
}

impl StagedFile {
    /// Attach the fingerprint, producing an immutable candidate
    #[must_use]
    pub fn into_candidate(self, fingerprint: Fingerprint) -> CandidateFile {
        CandidateFile {
            absolute_path: self.absolute_path,
            relative_path: self.relative_path,
            target_relative_path: self.target_relative_path,
            size_bytes: self.size_bytes,
            content: self.content,
            fingerprint,
        }
    }
}

/// A fingerprinted local file, ready for planning
///
/// Fields are private so the fingerprint cannot change after hashing.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    absolute_path: PathBuf,
    relative_path: RelativePath,
    target_relative_path: RelativePath,
    size_bytes: u64,
    content: ContentSource,
    fingerprint: Fingerprint,
}

impl CandidateFile {
    #[must_use]
    pub fn absolute_path(&self) -> &std::path::Path {
        &self.absolute_path
    }

    #[must_use]
    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    #[must_use]
    pub fn target_relative_path(&self) -> &RelativePath {
        &self.target_relative_path
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[must_use]
    pub fn content(&self) -> &ContentSource {
        &self.content
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}
