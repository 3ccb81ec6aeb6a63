//! Optimistic-concurrency conflict detection.
//!
//! The detector compares the version token a local edit session holds
//! against the token the store reports at write time. Strict inequality on
//! the token declares a conflict - there is no timestamp window and no
//! automatic merge. Business documents here are structured forms a human
//! is actively editing; a field-level merge would silently discard the
//! user's intent, so the conflict is packaged and surfaced instead.

use crate::document::VersionToken;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// A detected version conflict, surfaced to the caller.
///
/// Cleared only by an explicit reload/resolve action from outside the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Version the local edit session was based on
    pub local_version: VersionToken,
    /// Version the store currently holds
    pub remote_version: VersionToken,
    /// When the conflict was detected (milliseconds since epoch)
    pub detected_at: Timestamp,
    /// Human-readable description for the conflict banner
    pub message: String,
}

/// Outcome of a conflict check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CheckOutcome {
    /// No divergence; `version` is the token to adopt locally
    Clean { version: VersionToken },
    /// Divergence; the write must not proceed
    Conflict(ConflictRecord),
}

impl CheckOutcome {
    /// Whether the check passed.
    pub fn is_clean(&self) -> bool {
        matches!(self, CheckOutcome::Clean { .. })
    }
}

/// Classifies a save attempt as clean or conflicting.
///
/// Stateless; the scheduler owns all per-document state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// Compare the locally held version against the store's current one.
    ///
    /// A document that has never been saved has no local version and is
    /// always clean - there is nothing to diverge from.
    pub fn check(
        &self,
        local: Option<VersionToken>,
        remote: VersionToken,
        now: Timestamp,
    ) -> CheckOutcome {
        match local {
            None => CheckOutcome::Clean { version: remote },
            Some(local) if local == remote => CheckOutcome::Clean { version: remote },
            Some(local) => CheckOutcome::Conflict(ConflictRecord {
                local_version: local,
                remote_version: remote,
                detected_at: now,
                message: format!(
                    "document was modified elsewhere: local {local}, store has {remote}"
                ),
            }),
        }
    }
}
