//! Error types for the Draftsync engine.

use crate::status::SaveStatus;
use thiserror::Error;

/// All possible errors from the Draftsync engine.
///
/// The engine is infallible almost everywhere by construction; the one
/// thing that can go wrong is asking the status machine for an edge it
/// does not have.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: SaveStatus, to: SaveStatus },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::InvalidTransition {
            from: SaveStatus::Conflicted,
            to: SaveStatus::Saving,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition: conflicted -> saving"
        );
    }
}
