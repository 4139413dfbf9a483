//! Remote inventory entries

use serde::{Deserialize, Serialize};

use super::newtypes::{Fingerprint, RelativePath};

/// An item that exists in the remote library under the configured root
///
/// Produced once per run by the remote inventory listing and treated as a
/// read-only snapshot afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Path relative to the remote root
    pub relative_path: RelativePath,
    /// Size in bytes (0 for folders)
    pub size_bytes: u64,
    /// Value of the fingerprint column, absent when the column is missing
    /// or was never written for this item
    pub stored_fingerprint: Option<Fingerprint>,
    pub is_folder: bool,
}

impl RemoteEntry {
    /// Build a file entry
    #[must_use]
    pub fn file(relative_path: RelativePath, size_bytes: u64, fp: Option<Fingerprint>) -> Self {
        Self {
            relative_path,
            size_bytes,
            stored_fingerprint: fp,
            is_folder: false,
        }
    }

    /// Build a folder entry
    #[must_use]
    pub fn folder(relative_path: RelativePath) -> Self {
        Self {
            relative_path,
            size_bytes: 0,
            stored_fingerprint: None,
            is_folder: true,
        }
    }
}
