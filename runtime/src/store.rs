//! The store seam: create-or-update collaborators.
//!
//! The remote store is an opaque collaborator reached through this trait.
//! Updates are optimistic-concurrency writes: the caller sends the version
//! it expects to overwrite and the store rejects the write if that
//! expectation is stale. Failures are reported, never retried
//! automatically mid-attempt - retry policy belongs to the scheduler.
//!
//! [`MemoryStore`] is the in-process reference implementation, also used
//! by the integration tests: it can simulate a concurrent writer, inject
//! transient failures, add artificial latency, and expose a call log plus
//! an in-flight gauge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use draftsync_engine::{DocumentId, DocumentKind, VersionToken};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of a store call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic-concurrency rejection: the stored version differs from
    /// the one the write expected.
    #[error("version conflict: store holds {current_version}")]
    Conflict { current_version: VersionToken },

    /// Anything else: transport failure, 5xx, serialization trouble.
    #[error("transient store failure: {0}")]
    Transient(String),
}

/// Identity issued by a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDocument {
    pub id: DocumentId,
    pub version: VersionToken,
}

/// The create-or-update collaborator contract.
///
/// Object-safe so the scheduler can hold `Arc<dyn DocumentStore>`.
pub trait DocumentStore: Send + Sync {
    /// Create a new document. Safe to call at most once per logical
    /// document; the scheduler's single-flight rule enforces that.
    fn create_document(
        &self,
        kind: DocumentKind,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<CreatedDocument, StoreError>>;

    /// Update an existing document, rejecting with [`StoreError::Conflict`]
    /// when the stored version differs from `expected_version`.
    fn update_document(
        &self,
        id: DocumentId,
        payload: serde_json::Value,
        expected_version: VersionToken,
    ) -> BoxFuture<'_, Result<VersionToken, StoreError>>;

    /// Read the current version of a document.
    fn read_version(&self, id: DocumentId) -> BoxFuture<'_, Result<VersionToken, StoreError>>;
}

/// One observed store call, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create { id: DocumentId },
    Update { id: DocumentId, ok: bool },
    ReadVersion { id: DocumentId },
}

#[derive(Debug, Clone)]
struct StoredDocument {
    kind: DocumentKind,
    version: VersionToken,
    payload: serde_json::Value,
}

/// In-memory reference store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: DashMap<DocumentId, StoredDocument>,
    /// Artificial latency per call, for exercising in-flight windows
    latency: Option<Duration>,
    /// Remaining injected failures, per document
    update_failures: DashMap<DocumentId, usize>,
    /// Remaining injected create failures
    create_failures: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add artificial latency to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` updates for `id` fail transiently.
    pub fn inject_update_failures(&self, id: impl Into<DocumentId>, count: usize) {
        self.update_failures.insert(id.into(), count);
    }

    /// Make the next `count` creates fail transiently.
    pub fn inject_create_failures(&self, count: usize) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    /// Overwrite a document as if another tab or device saved it.
    ///
    /// Bumps the version without any expectation check; subsequent
    /// optimistic updates based on the old version will conflict.
    pub fn overwrite(&self, id: &str, payload: serde_json::Value) -> Option<VersionToken> {
        let mut doc = self.documents.get_mut(id)?;
        doc.version = doc.version.next();
        doc.payload = payload;
        Some(doc.version)
    }

    /// Current payload of a document.
    pub fn payload(&self, id: &str) -> Option<serde_json::Value> {
        self.documents.get(id).map(|d| d.payload.clone())
    }

    /// Current version of a document.
    pub fn version(&self, id: &str) -> Option<VersionToken> {
        self.documents.get(id).map(|d| d.version)
    }

    /// Ids of all stored documents.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|e| e.key().clone()).collect()
    }

    /// Total create calls observed.
    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Total update calls observed (including failed ones).
    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently in-flight calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The call log, oldest first.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, op: StoreOp) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(op);
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        InFlightGuard { store: self }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

struct InFlightGuard<'a> {
    store: &'a MemoryStore,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DocumentStore for MemoryStore {
    fn create_document(
        &self,
        kind: DocumentKind,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<CreatedDocument, StoreError>> {
        Box::pin(async move {
            let _guard = self.enter();
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            if self
                .create_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Transient("injected create failure".into()));
            }

            let id = uuid::Uuid::new_v4().to_string();
            let version = VersionToken::initial();
            self.documents.insert(
                id.clone(),
                StoredDocument {
                    kind,
                    version,
                    payload,
                },
            );
            self.record(StoreOp::Create { id: id.clone() });

            Ok(CreatedDocument { id, version })
        })
    }

    fn update_document(
        &self,
        id: DocumentId,
        payload: serde_json::Value,
        expected_version: VersionToken,
    ) -> BoxFuture<'_, Result<VersionToken, StoreError>> {
        Box::pin(async move {
            let _guard = self.enter();
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            if let Some(mut remaining) = self.update_failures.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    self.record(StoreOp::Update {
                        id: id.clone(),
                        ok: false,
                    });
                    return Err(StoreError::Transient("injected update failure".into()));
                }
            }

            let mut doc = self
                .documents
                .get_mut(&id)
                .ok_or_else(|| StoreError::Transient(format!("document not found: {id}")))?;

            if doc.version != expected_version {
                self.record(StoreOp::Update {
                    id: id.clone(),
                    ok: false,
                });
                return Err(StoreError::Conflict {
                    current_version: doc.version,
                });
            }

            doc.version = doc.version.next();
            doc.payload = payload;
            let version = doc.version;
            drop(doc);

            self.record(StoreOp::Update { id, ok: true });
            Ok(version)
        })
    }

    fn read_version(&self, id: DocumentId) -> BoxFuture<'_, Result<VersionToken, StoreError>> {
        Box::pin(async move {
            let _guard = self.enter();
            self.simulate_latency().await;

            let version = self
                .documents
                .get(&id)
                .map(|d| d.version)
                .ok_or_else(|| StoreError::Transient(format!("document not found: {id}")))?;

            self.record(StoreOp::ReadVersion { id });
            Ok(version)
        })
    }
}
