//! # Draftsync Engine
//!
//! The deterministic core of the Draftsync autosave and offline-sync engine.
//!
//! This crate holds the pure logic for keeping a single logical form
//! document (an in-progress certificate or CRM record) correctly persisted
//! while it is being edited: the document/version data model, the save
//! status state machine, the per-document offline write buffer, and the
//! optimistic-concurrency conflict detector.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of timers, network, or platform
//! - **Deterministic**: the same inputs always produce the same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Documents
//!
//! A [`Document`] is a single logical row the user is editing. Its `id` is
//! `None` until the store assigns one on the first successful create; its
//! [`VersionToken`] is supplied by the store on every read/write and is the
//! sole basis for conflict detection. The payload is opaque JSON - the
//! engine owns no knowledge of document schema.
//!
//! ### Save status
//!
//! Each open document carries exactly one [`SaveStatus`]. The allowed
//! transitions encode the autosave lifecycle: edits dirty the document,
//! debounced attempts move it through `saving`, and the outcome lands on
//! `saved`, `error`, `offline`, or the terminal-until-resolved
//! `conflicted`.
//!
//! ### Offline queue
//!
//! The [`OfflineQueue`] buffers writes made without connectivity. It holds
//! at most one entry per document (last-write-wins - only the latest
//! payload of a logical row matters) and drains in FIFO order of original
//! enqueue, restoring a failed entry at the front so per-document causal
//! order is never violated.
//!
//! ### Conflict detection
//!
//! [`ConflictDetector`] compares the locally held version token against the
//! one the store reports at write time. Any divergence is a conflict; the
//! detector packages both versions and hands control back - it never
//! merges, because payloads here are user-authored forms, not mergeable
//! structured data.

pub mod conflict;
pub mod document;
pub mod error;
pub mod queue;
pub mod status;

pub use conflict::{CheckOutcome, ConflictDetector, ConflictRecord};
pub use document::{Document, DocumentKey, SaveAttempt, VersionToken};
pub use error::Error;
pub use queue::{OfflineQueue, QueueEntry};
pub use status::{SaveIndicator, SaveStatus};

/// Type aliases for clarity
pub type DocumentId = String;
pub type DocumentKind = String;
pub type Timestamp = u64;
