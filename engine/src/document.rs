//! Document types for the autosave data model.

use crate::{DocumentId, DocumentKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A store-supplied revision token.
///
/// The token is monotonically comparable (a revision counter or a
/// timestamp, at the store's discretion), but conflict detection uses
/// strict equality only - any divergence is a conflict, there is no
/// tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub u64);

impl VersionToken {
    /// The first token a store typically issues.
    pub fn initial() -> Self {
        VersionToken(1)
    }

    /// The token after one more committed write.
    pub fn next(self) -> Self {
        VersionToken(self.0 + 1)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Routing key for a logical document.
///
/// A document has no server-assigned identifier until its first successful
/// create, but it still needs a stable key for queueing and status
/// tracking. `Draft` is the client-generated sentinel used until the store
/// issues a real id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "lowercase")]
pub enum DocumentKey {
    /// Store-assigned identifier
    Assigned(DocumentId),
    /// Client-generated sentinel for a not-yet-created document
    Draft(String),
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Assigned(id) => write!(f, "{id}"),
            DocumentKey::Draft(key) => write!(f, "draft:{key}"),
        }
    }
}

/// A single logical document under edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Store-assigned identifier, `None` until the first successful create
    pub id: Option<DocumentId>,
    /// Document kind (certificate, CRM record, ...)
    pub kind: DocumentKind,
    /// Version the local edit session is based on
    pub version: Option<VersionToken>,
    /// The actual form contents; opaque to the engine
    pub payload: serde_json::Value,
}

impl Document {
    /// Create a draft document that has never been saved.
    pub fn draft(kind: impl Into<DocumentKind>, payload: serde_json::Value) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            version: None,
            payload,
        }
    }

    /// Create a document loaded from the store.
    pub fn existing(
        id: impl Into<DocumentId>,
        kind: impl Into<DocumentKind>,
        version: VersionToken,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Some(id.into()),
            kind: kind.into(),
            version: Some(version),
            payload,
        }
    }

    /// Whether the store has assigned an id yet.
    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    /// Adopt the identity returned by a successful create.
    pub fn assign(&mut self, id: impl Into<DocumentId>, version: VersionToken) {
        self.id = Some(id.into());
        self.version = Some(version);
    }
}

/// An ephemeral record of one save attempt.
///
/// Produced by the scheduler, consumed by the conflict detector and the
/// create-or-update collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAttempt {
    /// Target document id, `None` when the attempt must create
    pub document_id: Option<DocumentId>,
    /// Payload as of the attempt
    pub payload: serde_json::Value,
    /// Version the local session held when the attempt was formed
    pub observed_version: Option<VersionToken>,
    /// When the attempt was formed (milliseconds since epoch)
    pub enqueued_at: Timestamp,
}

impl SaveAttempt {
    /// Form an attempt from the current document state.
    pub fn for_document(doc: &Document, now: Timestamp) -> Self {
        Self {
            document_id: doc.id.clone(),
            payload: doc.payload.clone(),
            observed_version: doc.version,
            enqueued_at: now,
        }
    }

    /// Whether this attempt must go through the create collaborator.
    pub fn is_create(&self) -> bool {
        self.document_id.is_none()
    }
}
