//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for sync-root-relative paths
//! and content fingerprints. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RelativePath
// ============================================================================

/// A path relative to the sync root (locally) or the remote root (remotely)
///
/// Always forward-slash separated, never empty, with no leading slash and no
/// `.` or `..` segments. Both the local inventory and the remote inventory
/// are expressed with this type so the planner can compare them directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath, normalizing separators
    ///
    /// Backslashes become forward slashes, and leading `./` or `/` as well as
    /// empty segments are dropped.
    ///
    /// # Errors
    /// Returns error if the path is empty or contains `.`/`..` segments
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let raw: String = path.into();
        let normalized = raw.replace('\\', "/");

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" => continue,
                "." if segments.is_empty() => continue,
                "." | ".." => {
                    return Err(DomainError::InvalidPath(format!(
                        "Relative path contains traversal segment: {raw}"
                    )));
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(DomainError::InvalidPath(format!(
                "Relative path cannot be empty: {raw:?}"
            )));
        }

        Ok(Self(segments.join("/")))
    }

    /// Build a RelativePath from an absolute path under `root`
    ///
    /// # Errors
    /// Returns `PathNotInSyncRoot` if `path` is not under `root`, or
    /// `InvalidPath` if a component is not valid UTF-8
    pub fn from_path(root: &Path, path: &Path) -> Result<Self, DomainError> {
        let stripped = path
            .strip_prefix(root)
            .map_err(|_| DomainError::PathNotInSyncRoot(path.display().to_string()))?;

        let mut segments = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(os) => {
                    let s = os.to_str().ok_or_else(|| {
                        DomainError::InvalidPath(format!(
                            "Path is not valid UTF-8: {}",
                            path.display()
                        ))
                    })?;
                    segments.push(s);
                }
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidPath(format!(
                        "Unexpected path component in {}",
                        path.display()
                    )));
                }
            }
        }

        Self::new(segments.join("/"))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `/`-separated segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The last segment (file or folder name)
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the last segment, without the dot
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// The parent path, `None` for a top-level entry
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Every folder prefix of this path, shallowest first
    ///
    /// `a/b/c.txt` yields `a` and `a/b`.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut result = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            result.push(p);
        }
        result.reverse();
        result
    }

    /// Append a single segment
    ///
    /// # Errors
    /// Returns error if `segment` is empty or contains a separator
    pub fn join(&self, segment: &str) -> Result<Self, DomainError> {
        if segment.is_empty() || segment.contains('/') || segment == ".." || segment == "." {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path segment: {segment:?}"
            )));
        }
        Ok(Self(format!("{}/{segment}", self.0)))
    }

    /// Replace (or add) the extension of the last segment
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> Self {
        let name = self.file_name();
        let stem = match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        let renamed = if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{ext}")
        };
        match self.parent() {
            Some(parent) => Self(format!("{}/{renamed}", parent.0)),
            None => Self(renamed),
        }
    }

    /// Comparison key for the remote library, which treats names
    /// case-insensitively
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// A 128-bit content fingerprint rendered as 32 lowercase hex digits
///
/// This is the exact text stored in the remote `FileHash` column, so two
/// fingerprints are equal iff their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex rendering
    pub const HEX_LEN: usize = 32;

    /// Parse a fingerprint from its hex rendering
    ///
    /// Surrounding whitespace is trimmed and upper-case digits are accepted.
    ///
    /// # Errors
    /// Returns error if the value is not exactly 32 hex digits
    pub fn new(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.len() != Self::HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidFingerprint(format!(
                "expected {} hex digits, got {trimmed:?}",
                Self::HEX_LEN
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Render a raw 128-bit digest
    #[must_use]
    pub fn from_u128(digest: u128) -> Self {
        Self(format!("{digest:032x}"))
    }

    /// Get the hex string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}
