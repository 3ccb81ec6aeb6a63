//! Save status state machine.
//!
//! Each open document carries exactly one [`SaveStatus`], owned exclusively
//! by its scheduler session. The transition table encodes the autosave
//! lifecycle: `clean -> dirty -> saving -> {saved, error, conflicted}`,
//! with `offline` reachable from any non-conflicted state and `conflicted`
//! terminal until an explicit external resolve.

use crate::conflict::ConflictRecord;
use crate::error::{Error, Result};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible save status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// No unsaved changes and nothing ever failed
    Clean,
    /// Edits are pending a debounced save attempt
    Dirty,
    /// A save attempt is in flight
    Saving,
    /// The latest attempt landed
    Saved,
    /// The latest attempt failed; retried on the next debounce cycle
    Error,
    /// No connectivity; writes are queued, not failed
    Offline,
    /// A version conflict was detected; frozen until externally resolved
    Conflicted,
}

impl SaveStatus {
    /// Whether a transition to `next` is allowed.
    ///
    /// Self-transitions are permitted no-ops. `Conflicted` admits only the
    /// explicit resolve edge back to `Clean`.
    pub fn can_transition_to(self, next: SaveStatus) -> bool {
        use SaveStatus::*;

        if self == next {
            return true;
        }

        match (self, next) {
            // edits dirty the document
            (Clean | Saved | Error | Offline, Dirty) => true,
            // debounce fire, explicit trigger, or timer retry
            (Dirty | Error | Offline, Saving) => true,
            // attempt outcomes
            (Saving, Saved | Error | Conflicted) => true,
            // queue flush landing a write for an offline document
            (Offline, Saved) => true,
            // saved decays once the payload matches the store
            (Saved | Offline, Clean) => true,
            // connectivity loss is expected from any non-terminal state
            (Clean | Dirty | Saving | Saved | Error, Offline) => true,
            // the only way out of a conflict is an explicit resolve
            (Conflicted, Clean) => true,
            _ => false,
        }
    }

    /// Validate and perform a transition.
    pub fn transition(self, next: SaveStatus) -> Result<SaveStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Whether new save attempts may be scheduled from this status.
    ///
    /// `Conflicted` freezes the document; `Saving` is excluded by the
    /// single-flight rule.
    pub fn allows_attempt(self) -> bool {
        !matches!(self, SaveStatus::Conflicted | SaveStatus::Saving)
    }

    /// Whether this status represents unsaved local changes.
    pub fn has_unsaved_changes(self) -> bool {
        matches!(
            self,
            SaveStatus::Dirty | SaveStatus::Error | SaveStatus::Offline
        )
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveStatus::Clean => "clean",
            SaveStatus::Dirty => "dirty",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved => "saved",
            SaveStatus::Error => "error",
            SaveStatus::Offline => "offline",
            SaveStatus::Conflicted => "conflicted",
        };
        f.write_str(s)
    }
}

/// The observable tuple the UI renders as a save indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveIndicator {
    /// Current status
    pub status: SaveStatus,
    /// When the last save landed (milliseconds since epoch)
    pub last_saved_at: Option<Timestamp>,
    /// The blocking conflict, if any
    pub conflict: Option<ConflictRecord>,
}

impl SaveIndicator {
    /// Indicator for a freshly opened document.
    pub fn clean() -> Self {
        Self {
            status: SaveStatus::Clean,
            last_saved_at: None,
            conflict: None,
        }
    }

    /// Whether the UI should render the form read-only.
    pub fn is_frozen(&self) -> bool {
        self.status == SaveStatus::Conflicted
    }
}

impl Default for SaveIndicator {
    fn default() -> Self {
        Self::clean()
    }
}
