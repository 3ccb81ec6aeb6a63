//! Error taxonomy surfaced by the save scheduler.

use draftsync_engine::ConflictRecord;
use std::time::Duration;
use thiserror::Error;

/// Failures a caller of the scheduler can observe.
///
/// `Offline` is an expected, auto-retried condition and is normally seen
/// as a status rather than an error; it appears here only for paths that
/// must report why a forced save did not reach the store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SaveError {
    #[error("store is unreachable while offline; write queued")]
    Offline,

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("save timed out after {0:?}")]
    Timeout(Duration),

    #[error("version conflict: local {}, store has {}", .0.local_version, .0.remote_version)]
    Conflict(ConflictRecord),

    #[error("document has unsaved changes that could not be flushed")]
    UnsavedChanges,

    #[error("document session is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsync_engine::VersionToken;

    #[test]
    fn error_display() {
        assert_eq!(
            SaveError::Transient("boom".into()).to_string(),
            "transient store failure: boom"
        );

        let conflict = SaveError::Conflict(ConflictRecord {
            local_version: VersionToken(2),
            remote_version: VersionToken(4),
            detected_at: 0,
            message: String::new(),
        });
        assert_eq!(
            conflict.to_string(),
            "version conflict: local v2, store has v4"
        );
    }
}
