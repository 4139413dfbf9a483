//! Orphan candidates and their reconciliation state machine
//!
//! ```text
//! Identified ──▶ Reported                      (dry-run)
//!     │
//!     └──────▶ DeleteRequested ──▶ Deleted     (live)
//!                     │
//!                     └──────────▶ DeleteFailed
//! ```

use std::fmt;

use serde::Serialize;

use super::errors::DomainError;
use super::remote::RemoteEntry;

/// Where an orphan is in the reconciliation state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum OrphanState {
    Identified,
    Reported,
    DeleteRequested,
    Deleted,
    DeleteFailed(String),
}

impl OrphanState {
    /// Whether the state is final
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reported | Self::Deleted | Self::DeleteFailed(_))
    }

    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (Self::Identified, Self::Reported)
                | (Self::Identified, Self::DeleteRequested)
                | (Self::DeleteRequested, Self::Deleted)
                | (Self::DeleteRequested, Self::DeleteFailed(_))
        )
    }
}

impl fmt::Display for OrphanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identified => write!(f, "Identified"),
            Self::Reported => write!(f, "Reported"),
            Self::DeleteRequested => write!(f, "DeleteRequested"),
            Self::Deleted => write!(f, "Deleted"),
            Self::DeleteFailed(_) => write!(f, "DeleteFailed"),
        }
    }
}

/// A remote file with no corresponding local candidate in this run
#[derive(Debug, Clone, Serialize)]
pub struct OrphanCandidate {
    pub entry: RemoteEntry,
    state: OrphanState,
}

impl OrphanCandidate {
    #[must_use]
    pub fn new(entry: RemoteEntry) -> Self {
        Self {
            entry,
            state: OrphanState::Identified,
        }
    }

    #[must_use]
    pub fn state(&self) -> &OrphanState {
        &self.state
    }

    /// Move to `target`
    ///
    /// # Errors
    /// Returns `InvalidState` if the transition is not allowed
    pub fn transition_to(&mut self, target: OrphanState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.state = target;
        Ok(())
    }
}
