//! Domain entities and business rules
//!
//! This module contains the core domain types for spsync:
//! - Newtypes for validated paths and content fingerprints
//! - Local candidate files, from discovery through fingerprinting
//! - Remote inventory entries
//! - Planning decisions, upload results and orphan state
//! - SharePoint name sanitization
//! - Domain-specific error types

pub mod candidate;
pub mod decision;
pub mod errors;
pub mod newtypes;
pub mod orphan;
pub mod remote;
pub mod sanitize;

// Re-export commonly used types
pub use candidate::{CandidateFile, ContentSource, LocalFile, StagedFile};
pub use decision::{FailureKind, SkipReason, SyncDecision, UploadOutcome, UploadResult};
pub use errors::DomainError;
pub use newtypes::{Fingerprint, RelativePath};
pub use orphan::{OrphanCandidate, OrphanState};
pub use remote::RemoteEntry;
pub use sanitize::{sanitize_name, sanitize_path};
