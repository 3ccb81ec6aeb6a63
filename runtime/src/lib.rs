//! # Draftsync Runtime
//!
//! The async host for the Draftsync autosave engine. It wires the pure
//! core from `draftsync-engine` to a tokio event loop: debounced save
//! scheduling, at-most-one-in-flight save per document, offline routing
//! through the shared write queue, and replay when connectivity returns.
//!
//! ## Components
//!
//! - [`ConnectivityMonitor`] - observes online/offline transitions and
//!   notifies subscribers exactly once per actual change.
//! - [`DocumentStore`] - the seam to the remote store: create, update with
//!   optimistic concurrency, and version reads. [`MemoryStore`] is the
//!   in-process reference implementation.
//! - [`SaveScheduler`] - the orchestrator. [`SaveScheduler::open`] spawns a
//!   per-document session task and hands back a [`DocumentHandle`] the UI
//!   drives with `notify_dirty`/`trigger_save` and observes through a
//!   [`SaveIndicator`] watch channel.
//!
//! No error ever escapes to the caller except through the indicator and
//! the `Result`s of the explicit calls; the UI only observes state.
//!
//! ## Example
//!
//! ```no_run
//! use draftsync_engine::Document;
//! use draftsync_runtime::{AutosaveConfig, ConnectivityMonitor, MemoryStore, SaveScheduler};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let store = Arc::new(MemoryStore::new());
//! let connectivity = ConnectivityMonitor::shared(true);
//! let scheduler = SaveScheduler::new(store, connectivity, AutosaveConfig::default());
//!
//! let handle = scheduler.open(Document::draft("certificate", json!({})));
//! handle.notify_dirty(json!({"name": "Ada"}));
//! // ... the debounce timer fires and the document is created ...
//! let indicator = handle.trigger_save().await.unwrap();
//! println!("status: {}", indicator.status);
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod scheduler;
pub mod store;

pub use config::AutosaveConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, ProbeError};
pub use error::SaveError;
pub use scheduler::{DocumentHandle, SaveScheduler};
pub use store::{CreatedDocument, DocumentStore, MemoryStore, StoreError, StoreOp};

// The observable surface re-exported for embedders that only link the
// runtime crate.
pub use draftsync_engine::{ConflictRecord, Document, SaveIndicator, SaveStatus, VersionToken};

/// Current wall-clock time in milliseconds since epoch.
pub(crate) fn now_millis() -> draftsync_engine::Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
