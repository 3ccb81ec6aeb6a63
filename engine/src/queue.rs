//! Offline write buffer with per-document deduplication.
//!
//! The queue holds writes made without connectivity. A document is a
//! single logical row, so only its latest payload matters: enqueueing for
//! a document that is already queued replaces the payload in place
//! (last-write-wins) and keeps the document's original position, so the
//! flush order stays FIFO by oldest enqueue.
//!
//! Draining happens through [`OfflineQueue::pop_front`] and
//! [`OfflineQueue::restore_front`] (for async sinks) or the synchronous
//! [`OfflineQueue::flush_with`]. In both forms an entry is removed only
//! once its sink succeeds; a failed entry goes back to the front and the
//! cycle halts, so a document's write is never skipped over in favour of
//! one enqueued later.

use crate::document::DocumentKey;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A buffered write for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Document this write belongs to
    pub key: DocumentKey,
    /// Latest payload for the document
    pub payload: serde_json::Value,
    /// When the held payload was enqueued (milliseconds since epoch)
    pub enqueued_at: Timestamp,
}

/// In-memory, per-document deduplicating write buffer.
///
/// Invariant: at most one entry per [`DocumentKey`] at any time.
#[derive(Debug, Clone, Default)]
pub struct OfflineQueue {
    /// Entries by document key
    entries: HashMap<DocumentKey, QueueEntry>,
    /// Flush order; keys appear exactly once, oldest enqueue first
    order: VecDeque<DocumentKey>,
}

impl OfflineQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a write, or replace the payload of an already queued one.
    ///
    /// Replacement keeps the document's original queue position; the
    /// timestamp is refreshed to describe the payload actually held.
    /// Never fails.
    pub fn enqueue(&mut self, key: DocumentKey, payload: serde_json::Value, now: Timestamp) {
        let entry = QueueEntry {
            key: key.clone(),
            payload,
            enqueued_at: now,
        };
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push_back(key);
        }
    }

    /// Take the oldest entry off the queue.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        let key = self.order.pop_front()?;
        self.entries.remove(&key)
    }

    /// Put a failed entry back at the front of the queue.
    ///
    /// If a newer payload for the same document was enqueued meanwhile the
    /// newer payload wins, but the document takes the front slot so it is
    /// retried before anything enqueued later.
    pub fn restore_front(&mut self, entry: QueueEntry) {
        let key = entry.key.clone();
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else {
            self.entries.insert(key.clone(), entry);
        }
        self.order.push_front(key);
    }

    /// Drain the queue through a synchronous sink.
    ///
    /// Entries are visited strictly in FIFO order of original enqueue and
    /// removed only after the sink succeeds. On the first failure the
    /// entry is restored at the front and the flush halts for this cycle;
    /// the error is returned alongside the number of entries that did
    /// land.
    pub fn flush_with<E>(
        &mut self,
        mut sink: impl FnMut(&DocumentKey, &serde_json::Value) -> std::result::Result<(), E>,
    ) -> (usize, Option<E>) {
        let mut flushed = 0;
        while let Some(entry) = self.pop_front() {
            match sink(&entry.key, &entry.payload) {
                Ok(()) => flushed += 1,
                Err(err) => {
                    self.restore_front(entry);
                    return (flushed, Some(err));
                }
            }
        }
        (flushed, None)
    }

    /// Remove any pending entry for a document.
    ///
    /// Used once a save for that document definitively lands through
    /// another path. Returns whether an entry was removed.
    pub fn clear(&mut self, key: &DocumentKey) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Number of pending entries for a document (0 or 1).
    pub fn pending_count(&self, key: &DocumentKey) -> usize {
        usize::from(self.entries.contains_key(key))
    }

    /// Total pending entries across all documents.
    pub fn total_pending(&self) -> usize {
        self.entries.len()
    }

    /// Whether a document has a pending entry.
    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn key(name: &str) -> DocumentKey {
        DocumentKey::Assigned(name.to_string())
    }

    #[test]
    fn enqueue_and_pop() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({"n": 1}), 100);

        assert_eq!(queue.total_pending(), 1);
        assert_eq!(queue.pending_count(&key("a")), 1);

        let entry = queue.pop_front().unwrap();
        assert_eq!(entry.key, key("a"));
        assert_eq!(entry.payload, json!({"n": 1}));
        assert!(queue.is_empty());
    }

    #[test]
    fn dedup_keeps_latest_payload() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({"n": 1}), 100);
        queue.enqueue(key("a"), json!({"n": 2}), 200);
        queue.enqueue(key("a"), json!({"n": 3}), 300);

        assert_eq!(queue.total_pending(), 1);
        let entry = queue.pop_front().unwrap();
        assert_eq!(entry.payload, json!({"n": 3}));
        assert_eq!(entry.enqueued_at, 300);
    }

    #[test]
    fn dedup_keeps_original_position() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({"n": 1}), 100);
        queue.enqueue(key("b"), json!({"n": 1}), 200);
        // re-enqueue for "a" must not move it behind "b"
        queue.enqueue(key("a"), json!({"n": 2}), 300);

        assert_eq!(queue.pop_front().unwrap().key, key("a"));
        assert_eq!(queue.pop_front().unwrap().key, key("b"));
    }

    #[test]
    fn clear_removes_entry() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({}), 100);
        queue.enqueue(key("b"), json!({}), 200);

        assert!(queue.clear(&key("a")));
        assert!(!queue.clear(&key("a")));
        assert_eq!(queue.total_pending(), 1);
        assert_eq!(queue.pop_front().unwrap().key, key("b"));
    }

    #[test]
    fn flush_fifo_order() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({"d": "a"}), 100);
        queue.enqueue(key("b"), json!({"d": "b"}), 200);
        queue.enqueue(key("c"), json!({"d": "c"}), 300);

        let mut seen = Vec::new();
        let (flushed, err) = queue.flush_with(|k, _| {
            seen.push(k.clone());
            Ok::<_, ()>(())
        });

        assert_eq!(flushed, 3);
        assert!(err.is_none());
        assert_eq!(seen, vec![key("a"), key("b"), key("c")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_halts_on_failure_and_restores_front() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({}), 100);
        queue.enqueue(key("b"), json!({}), 200);
        queue.enqueue(key("c"), json!({}), 300);

        let mut seen = Vec::new();
        let (flushed, err) = queue.flush_with(|k, _| {
            seen.push(k.clone());
            if k == &key("b") {
                Err("sink failed")
            } else {
                Ok(())
            }
        });

        assert_eq!(flushed, 1);
        assert_eq!(err, Some("sink failed"));
        // b failed, so b is back at the front and c was never visited
        assert_eq!(seen, vec![key("a"), key("b")]);
        assert_eq!(queue.total_pending(), 2);

        // retry cycle: b before c
        let mut retry_seen = Vec::new();
        let (flushed, err) = queue.flush_with(|k, _| {
            retry_seen.push(k.clone());
            Ok::<_, ()>(())
        });
        assert_eq!(flushed, 2);
        assert!(err.is_none());
        assert_eq!(retry_seen, vec![key("b"), key("c")]);
    }

    #[test]
    fn restore_front_prefers_newer_payload() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(key("a"), json!({"n": 1}), 100);
        let entry = queue.pop_front().unwrap();

        // a newer write arrives while the popped entry is in flight
        queue.enqueue(key("a"), json!({"n": 2}), 200);
        queue.enqueue(key("b"), json!({"n": 1}), 300);
        queue.restore_front(entry);

        assert_eq!(queue.total_pending(), 2);
        let front = queue.pop_front().unwrap();
        assert_eq!(front.key, key("a"));
        assert_eq!(front.payload, json!({"n": 2}));
    }

    proptest! {
        /// For any interleaving of enqueues, each document holds at most
        /// one entry, that entry carries the last payload written, and the
        /// drain order matches first-enqueue order.
        #[test]
        fn dedup_invariant(writes in proptest::collection::vec((0u8..5, 0u32..1000), 1..50)) {
            let mut queue = OfflineQueue::new();
            let mut latest: HashMap<DocumentKey, u32> = HashMap::new();
            let mut first_seen: Vec<DocumentKey> = Vec::new();

            for (i, (doc, value)) in writes.iter().enumerate() {
                let k = key(&format!("doc-{doc}"));
                queue.enqueue(k.clone(), json!({ "value": value }), i as Timestamp);
                if latest.insert(k.clone(), *value).is_none() {
                    first_seen.push(k);
                }
            }

            prop_assert_eq!(queue.total_pending(), latest.len());

            let mut drained = Vec::new();
            while let Some(entry) = queue.pop_front() {
                let expected = latest[&entry.key];
                prop_assert_eq!(&entry.payload, &json!({ "value": expected }));
                drained.push(entry.key);
            }
            prop_assert_eq!(drained, first_seen);
        }
    }
}
