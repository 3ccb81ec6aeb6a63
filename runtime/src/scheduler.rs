//! The save scheduler: debounce, single-flight, offline routing.
//!
//! [`SaveScheduler`] is the orchestrator. Each open document gets its own
//! session task (one command channel in, one status watch out); the task's
//! command loop is what enforces single-flight - a save attempt runs
//! inline in the loop, so a second trigger or edit arriving mid-save is
//! buffered and acted on when the in-flight attempt completes, never run
//! in parallel with it.
//!
//! Offline attempts are redirected into the shared [`OfflineQueue`]. A
//! background flush worker subscribes to the [`ConnectivityMonitor`] and,
//! on each offline-to-online transition, drains the queue in FIFO order by
//! replaying every entry through its owning session's normal save path.

use std::future::pending;
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use draftsync_engine::{
    CheckOutcome, ConflictDetector, ConflictRecord, Document, DocumentKey, OfflineQueue,
    SaveIndicator, SaveStatus, VersionToken,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::config::AutosaveConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::SaveError;
use crate::now_millis;
use crate::store::{DocumentStore, StoreError};

/// Commands a [`DocumentHandle`] sends to its session task.
enum Command {
    Dirty(serde_json::Value),
    Trigger(oneshot::Sender<Result<SaveIndicator, SaveError>>),
    Replay(oneshot::Sender<Result<(), SaveError>>),
    Resolve {
        version: VersionToken,
        payload: serde_json::Value,
        ack: oneshot::Sender<SaveIndicator>,
    },
    Close(oneshot::Sender<Result<(), SaveError>>),
}

struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

struct SchedulerInner {
    store: Arc<dyn DocumentStore>,
    connectivity: Arc<ConnectivityMonitor>,
    queue: Mutex<OfflineQueue>,
    sessions: DashMap<DocumentKey, SessionHandle>,
    config: AutosaveConfig,
}

impl SchedulerInner {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, OfflineQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Orchestrates autosave for all open documents.
pub struct SaveScheduler {
    inner: Arc<SchedulerInner>,
}

impl SaveScheduler {
    /// Create a scheduler and start its queue flush worker.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        connectivity: Arc<ConnectivityMonitor>,
        config: AutosaveConfig,
    ) -> Self {
        let rx = connectivity.subscribe();
        let inner = Arc::new(SchedulerInner {
            store,
            connectivity,
            queue: Mutex::new(OfflineQueue::new()),
            sessions: DashMap::new(),
            config,
        });

        tokio::spawn(flush_worker(Arc::downgrade(&inner), rx));

        Self { inner }
    }

    /// Open a document for editing and start its autosave session.
    ///
    /// Exactly one session exists per open document; the session
    /// exclusively owns the document's save status and version.
    pub fn open(&self, document: Document) -> DocumentHandle {
        let key = match &document.id {
            Some(id) => DocumentKey::Assigned(id.clone()),
            None => DocumentKey::Draft(uuid::Uuid::new_v4().to_string()),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveIndicator::clean());

        self.inner
            .sessions
            .insert(key.clone(), SessionHandle { tx: tx.clone() });

        let session = Session {
            key: key.clone(),
            doc: document,
            status: SaveStatus::Clean,
            conflict: None,
            last_saved_at: None,
            inner: Arc::clone(&self.inner),
            status_tx,
        };
        tokio::spawn(session.run(rx));

        tracing::info!(key = %key, "document session opened");

        DocumentHandle { key, tx, status_rx }
    }

    /// Pending queued writes for one document (0 or 1).
    pub fn pending_count(&self, key: &DocumentKey) -> usize {
        self.inner.lock_queue().pending_count(key)
    }

    /// Total queued writes across all documents.
    pub fn total_pending(&self) -> usize {
        self.inner.lock_queue().total_pending()
    }

    /// Number of open document sessions.
    pub fn open_documents(&self) -> usize {
        self.inner.sessions.len()
    }
}

/// The UI-facing surface for one open document.
pub struct DocumentHandle {
    key: DocumentKey,
    tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<SaveIndicator>,
}

impl DocumentHandle {
    /// Routing key of this document.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Record an edit. Resets the debounce timer; during an in-flight
    /// save the edit is retained and acted on when the save completes.
    /// Accepted in every state so no user input is ever lost.
    pub fn notify_dirty(&self, payload: serde_json::Value) {
        let _ = self.tx.send(Command::Dirty(payload));
    }

    /// Force an immediate save attempt, bypassing the debounce timer but
    /// not the single-flight rule: a trigger arriving while a save is in
    /// flight runs after that save completes.
    ///
    /// Offline is reported through the indicator, not as an error.
    pub async fn trigger_save(&self) -> Result<SaveIndicator, SaveError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Trigger(ack))
            .map_err(|_| SaveError::Closed)?;
        rx.await.map_err(|_| SaveError::Closed)?
    }

    /// Current save indicator.
    pub fn status(&self) -> SaveIndicator {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to indicator changes.
    pub fn watch_status(&self) -> watch::Receiver<SaveIndicator> {
        self.status_rx.clone()
    }

    /// Resolve a conflict by adopting a fresh baseline (typically the
    /// reloaded store copy). Clears the conflict record and returns the
    /// document to `clean`.
    pub async fn resolve_conflict(
        &self,
        version: VersionToken,
        payload: serde_json::Value,
    ) -> Result<SaveIndicator, SaveError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Resolve {
                version,
                payload,
                ack,
            })
            .map_err(|_| SaveError::Closed)?;
        rx.await.map_err(|_| SaveError::Closed)
    }

    /// Close the document, flushing unsaved changes first.
    ///
    /// A document that cannot be flushed (offline, store failure) is not
    /// silently discarded: the error is returned and the session stays
    /// alive so its queued write can still land on reconnect; the caller
    /// may retry `close` later.
    pub async fn close(&self) -> Result<(), SaveError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Close(ack))
            .map_err(|_| SaveError::Closed)?;
        rx.await.map_err(|_| SaveError::Closed)?
    }
}

/// Per-document autosave session state, owned by its task.
struct Session {
    key: DocumentKey,
    doc: Document,
    status: SaveStatus,
    conflict: Option<ConflictRecord>,
    last_saved_at: Option<draftsync_engine::Timestamp>,
    inner: Arc<SchedulerInner>,
    status_tx: watch::Sender<SaveIndicator>,
}

impl Session {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut deadline: Option<Instant> = None;

        loop {
            let at = deadline;
            let timer = async move {
                match at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = rx.recv() => match cmd {
                    None => {
                        self.discard().await;
                        break;
                    }
                    Some(Command::Dirty(payload)) => {
                        self.doc.payload = payload;
                        if self.status == SaveStatus::Conflicted {
                            // input retained, but no attempt while frozen
                            continue;
                        }
                        self.set_status(SaveStatus::Dirty);
                        deadline = Some(Instant::now() + self.inner.config.debounce);
                    }
                    Some(Command::Trigger(ack)) => {
                        deadline = None;
                        let result = self.triggered_save().await;
                        if self.status == SaveStatus::Error {
                            deadline = Some(Instant::now() + self.inner.config.debounce);
                        }
                        let _ = ack.send(result);
                    }
                    Some(Command::Replay(ack)) => {
                        let result = self.attempt_save().await.map(|_| ());
                        let _ = ack.send(result);
                    }
                    Some(Command::Resolve { version, payload, ack }) => {
                        self.resolve(version, payload);
                        deadline = None;
                        let _ = ack.send(self.indicator());
                    }
                    Some(Command::Close(ack)) => {
                        match self.close_requested().await {
                            Ok(()) => {
                                let _ = ack.send(Ok(()));
                                break;
                            }
                            Err(err) => {
                                // stay alive; queued work can still land
                                let _ = ack.send(Err(err));
                            }
                        }
                    }
                },
                _ = timer => {
                    deadline = None;
                    if self.status.allows_attempt() && self.status.has_unsaved_changes() {
                        let _ = self.attempt_save().await;
                        if self.status == SaveStatus::Error {
                            // retry on the next debounce cycle, never immediately
                            deadline = Some(Instant::now() + self.inner.config.debounce);
                        }
                    }
                }
            }
        }

        self.inner.sessions.remove(&self.key);
        tracing::debug!(key = %self.key, "document session ended");
    }

    /// An explicit trigger: offline is an expected outcome, not an error.
    async fn triggered_save(&mut self) -> Result<SaveIndicator, SaveError> {
        if self.status == SaveStatus::Clean || self.status == SaveStatus::Saved {
            // nothing to save
            return Ok(self.indicator());
        }
        match self.attempt_save().await {
            Ok(indicator) => Ok(indicator),
            Err(SaveError::Offline) => Ok(self.indicator()),
            Err(err) => Err(err),
        }
    }

    /// One save attempt: the only suspension points are the store calls.
    async fn attempt_save(&mut self) -> Result<SaveIndicator, SaveError> {
        if let Some(conflict) = &self.conflict {
            return Err(SaveError::Conflict(conflict.clone()));
        }

        if !self.inner.connectivity.is_online() {
            self.inner.lock_queue().enqueue(
                self.key.clone(),
                self.doc.payload.clone(),
                now_millis(),
            );
            self.set_status(SaveStatus::Offline);
            tracing::debug!(key = %self.key, "offline; write queued");
            return Err(SaveError::Offline);
        }

        self.set_status(SaveStatus::Saving);
        let timeout = self.inner.config.save_timeout;
        let payload = self.doc.payload.clone();

        let result = if !self.doc.is_created() {
            self.create(payload, timeout).await
        } else {
            self.update(payload, timeout).await
        };

        match &result {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "save attempt failed");
            }
        }
        result
    }

    async fn create(
        &mut self,
        payload: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<SaveIndicator, SaveError> {
        let store = Arc::clone(&self.inner.store);
        let call = store.create_document(self.doc.kind.clone(), payload);
        match tokio::time::timeout(timeout, call).await {
            Err(_) => {
                self.set_status(SaveStatus::Error);
                Err(SaveError::Timeout(timeout))
            }
            Ok(Err(err)) => {
                // a create has no expected version, so any rejection is
                // transient from the scheduler's point of view
                self.set_status(SaveStatus::Error);
                Err(SaveError::Transient(err.to_string()))
            }
            Ok(Ok(created)) => {
                tracing::info!(key = %self.key, id = %created.id, "document created");
                self.doc.assign(created.id, created.version);
                Ok(self.finish_saved())
            }
        }
    }

    async fn update(
        &mut self,
        payload: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<SaveIndicator, SaveError> {
        let (Some(id), Some(expected)) = (self.doc.id.clone(), self.doc.version) else {
            // update without identity means corrupted session state
            self.set_status(SaveStatus::Error);
            return Err(SaveError::Transient("document has no version baseline".into()));
        };

        let store = Arc::clone(&self.inner.store);
        let call = store.update_document(id.clone(), payload, expected);
        match tokio::time::timeout(timeout, call).await {
            Err(_) => {
                self.set_status(SaveStatus::Error);
                Err(SaveError::Timeout(timeout))
            }
            Ok(Err(StoreError::Transient(msg))) => {
                self.set_status(SaveStatus::Error);
                Err(SaveError::Transient(msg))
            }
            Ok(Err(StoreError::Conflict { current_version })) => {
                self.classify_conflict(id, expected, current_version).await
            }
            Ok(Ok(version)) => {
                self.doc.version = Some(version);
                Ok(self.finish_saved())
            }
        }
    }

    /// The store rejected an optimistic write; confirm against an
    /// authoritative version read before declaring the conflict.
    async fn classify_conflict(
        &mut self,
        id: draftsync_engine::DocumentId,
        expected: VersionToken,
        reported: VersionToken,
    ) -> Result<SaveIndicator, SaveError> {
        let store = Arc::clone(&self.inner.store);
        let remote = match store.read_version(id).await {
            Ok(version) => version,
            Err(_) => reported,
        };

        match ConflictDetector::new().check(Some(expected), remote, now_millis()) {
            CheckOutcome::Clean { .. } => {
                // rejected but the token matches again: a racing writer
                // came and went; retry later rather than overwrite blind
                self.set_status(SaveStatus::Error);
                Err(SaveError::Transient(
                    "store rejected write but version matches; retrying".into(),
                ))
            }
            CheckOutcome::Conflict(record) => {
                tracing::warn!(
                    key = %self.key,
                    local = %record.local_version,
                    remote = %record.remote_version,
                    "version conflict detected; freezing document"
                );
                self.conflict = Some(record.clone());
                self.set_status(SaveStatus::Conflicted);
                Err(SaveError::Conflict(record))
            }
        }
    }

    fn finish_saved(&mut self) -> SaveIndicator {
        self.last_saved_at = Some(now_millis());
        self.set_status(SaveStatus::Saved);
        self.inner.lock_queue().clear(&self.key);
        tracing::debug!(key = %self.key, version = ?self.doc.version, "saved");
        self.indicator()
    }

    fn resolve(&mut self, version: VersionToken, payload: serde_json::Value) {
        tracing::info!(key = %self.key, version = %version, "conflict resolved; adopting baseline");
        self.doc.version = Some(version);
        self.doc.payload = payload;
        self.conflict = None;
        // a queued write is based on the stale baseline
        self.inner.lock_queue().clear(&self.key);
        self.set_status(SaveStatus::Clean);
    }

    async fn close_requested(&mut self) -> Result<(), SaveError> {
        if !self.status.has_unsaved_changes() {
            return Ok(());
        }
        match self.attempt_save().await {
            Ok(_) => Ok(()),
            Err(_) => Err(SaveError::UnsavedChanges),
        }
    }

    /// All handles dropped without close: never discard silently.
    async fn discard(&mut self) {
        if self.status.has_unsaved_changes() {
            tracing::warn!(key = %self.key, "handles dropped with unsaved changes; flushing");
            if self.attempt_save().await.is_err() && self.status != SaveStatus::Offline {
                tracing::warn!(key = %self.key, "unsaved changes could not be flushed");
            }
        }
    }

    fn set_status(&mut self, next: SaveStatus) {
        match self.status.transition(next) {
            Ok(status) => {
                self.status = status;
                self.publish();
            }
            Err(err) => {
                // every internal edge is in the table; reaching this is a bug
                tracing::error!(key = %self.key, error = %err, "refused status transition");
            }
        }
    }

    fn indicator(&self) -> SaveIndicator {
        SaveIndicator {
            status: self.status,
            last_saved_at: self.last_saved_at,
            conflict: self.conflict.clone(),
        }
    }

    fn publish(&self) {
        let _ = self.status_tx.send(self.indicator());
    }
}

/// Drains the offline queue on every offline-to-online transition.
///
/// Entries flush strictly in FIFO order of original enqueue. A failed
/// entry is restored at the front and the cycle halts, retrying after
/// `flush_retry` while connectivity holds; a conflicting entry is dropped
/// (the conflict is already surfaced on its session and a retry cannot
/// succeed until the user resolves it).
async fn flush_worker(inner: Weak<SchedulerInner>, mut rx: watch::Receiver<bool>) {
    loop {
        let online = *rx.borrow_and_update();
        if !online {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        let Some(inner) = inner.upgrade() else { return };
        let halted = flush_queue(&inner).await;
        let retry = inner.config.flush_retry;
        drop(inner);

        if halted {
            tokio::select! {
                _ = tokio::time::sleep(retry) => {}
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        } else if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Returns whether the flush cycle halted with work still queued.
async fn flush_queue(inner: &SchedulerInner) -> bool {
    loop {
        if !inner.connectivity.is_online() {
            return false;
        }

        let entry = inner.lock_queue().pop_front();
        let Some(entry) = entry else { return false };

        let tx = inner.sessions.get(&entry.key).map(|h| h.tx.clone());
        let Some(tx) = tx else {
            tracing::warn!(key = %entry.key, "dropping queued write for closed document");
            continue;
        };

        let (ack, ack_rx) = oneshot::channel();
        if tx.send(Command::Replay(ack)).is_err() {
            tracing::warn!(key = %entry.key, "dropping queued write for ended session");
            continue;
        }

        match ack_rx.await {
            Ok(Ok(())) => {
                tracing::debug!(key = %entry.key, "queued write flushed");
            }
            Ok(Err(SaveError::Conflict(_))) => {
                tracing::warn!(key = %entry.key, "queued write conflicted; awaiting resolve");
            }
            Ok(Err(err)) => {
                tracing::warn!(key = %entry.key, error = %err, "flush halted; will retry");
                inner.lock_queue().restore_front(entry);
                return true;
            }
            Err(_) => {
                tracing::warn!(key = %entry.key, "session ended mid-flush; dropping entry");
            }
        }
    }
}
