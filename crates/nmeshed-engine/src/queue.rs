// Copyright (C) 2026 The Nmeshed Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The offline Operation Queue: an ordered, bounded, persistent FIFO of
//! local ops that have not yet been handed off to the transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::subscribers::{SubscriberList, Unsubscribe};

#[derive(Clone, Debug, PartialEq)]
pub struct QueueEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    Changed { size: usize },
    Overflow { bound: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum QueueStoreError {
    #[error("queue persistence failed: {0}")]
    Backend(String),
}

/// The injected durable backend for the queue, keyed by workspace id.
/// Persistence failures are logged and swallowed by [`OperationQueue`]
/// itself -- implementations should simply report what went wrong.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    async fn load(&self, workspace_id: &str) -> Result<Vec<QueueEntry>, QueueStoreError>;
    async fn save(&self, workspace_id: &str, entries: &[QueueEntry]) -> Result<(), QueueStoreError>;
    async fn delete(&self, workspace_id: &str) -> Result<(), QueueStoreError>;
}

/// A non-durable [`QueueStore`] backed by an in-memory map. Useful for
/// tests and for embedders that have no persistence layer of their own.
#[derive(Default)]
pub struct InMemoryQueueStore {
    data: Mutex<std::collections::HashMap<String, Vec<QueueEntry>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn load(&self, workspace_id: &str) -> Result<Vec<QueueEntry>, QueueStoreError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, workspace_id: &str, entries: &[QueueEntry]) -> Result<(), QueueStoreError> {
        self.data
            .lock()
            .unwrap()
            .insert(workspace_id.to_string(), entries.to_vec());
        Ok(())
    }

    async fn delete(&self, workspace_id: &str) -> Result<(), QueueStoreError> {
        self.data.lock().unwrap().remove(workspace_id);
        Ok(())
    }
}

pub struct OperationQueue {
    workspace_id: String,
    bound: usize,
    entries: Mutex<VecDeque<QueueEntry>>,
    store: Arc<dyn QueueStore>,
    on_change: SubscriberList<QueueEvent>,
}

impl OperationQueue {
    /// Construct a queue and populate it from the durable backend. Per the
    /// persistence contract, this must run to completion before any
    /// caller-visible `set` so writes issued before this resolves are
    /// appended after previously-persisted entries.
    pub async fn load(workspace_id: impl Into<String>, bound: usize, store: Arc<dyn QueueStore>) -> Self {
        let workspace_id = workspace_id.into();
        let entries = match store.load(&workspace_id).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to load persisted queue; starting empty");
                Vec::new()
            }
        };
        Self {
            workspace_id,
            bound,
            entries: Mutex::new(entries.into()),
            store,
            on_change: SubscriberList::new(),
        }
    }

    pub fn on_change<F>(&self, callback: F) -> Unsubscribe<QueueEvent>
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.on_change.subscribe(callback)
    }

    pub fn size(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Append `entry`. If the queue now exceeds its bound, evict the oldest
    /// entry and emit [`QueueEvent::Overflow`]. A `bound` of 0 means
    /// unbounded. Persists the new state asynchronously; persistence
    /// failures are logged, never propagated.
    pub async fn enqueue(&self, entry: QueueEntry) {
        let overflowed = {
            let mut entries = self.entries.lock().unwrap();
            entries.push_back(entry);
            if self.bound > 0 && entries.len() > self.bound {
                entries.pop_front();
                true
            } else {
                false
            }
        };
        if overflowed {
            self.on_change.dispatch(&QueueEvent::Overflow { bound: self.bound });
        }
        self.on_change.dispatch(&QueueEvent::Changed { size: self.size() });
        self.persist().await;
    }

    /// Hand every currently-queued entry to the caller in insertion order,
    /// removing them from the queue. Strictly FIFO.
    pub async fn drain(&self) -> Vec<QueueEntry> {
        let drained: Vec<QueueEntry> = {
            let mut entries = self.entries.lock().unwrap();
            entries.drain(..).collect()
        };
        self.on_change.dispatch(&QueueEvent::Changed { size: 0 });
        self.persist().await;
        drained
    }

    /// Return an entry to the head of the queue, e.g. after a failed send
    /// mid-flush. Does not re-check the bound: a returned entry was already
    /// counted against it before the drain.
    pub async fn return_to_head(&self, entry: QueueEntry) {
        {
            let mut entries = self.entries.lock().unwrap();
            entries.push_front(entry);
        }
        self.persist().await;
    }

    async fn persist(&self) {
        let snapshot: Vec<QueueEntry> = self.entries.lock().unwrap().iter().cloned().collect();
        let result = if snapshot.is_empty() {
            self.store.delete(&self.workspace_id).await
        } else {
            self.store.save(&self.workspace_id, &snapshot).await
        };
        if let Err(e) = result {
            warn!(error = %e, workspace_id = %self.workspace_id, "queue persistence failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(key: &str, ts: u64) -> QueueEntry {
        QueueEntry {
            key: key.to_string(),
            value: vec![1],
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn enqueue_then_drain_preserves_insertion_order() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        let queue = OperationQueue::load("ws", 0, store).await;
        for i in 0..5 {
            queue.enqueue(entry("k", i)).await;
        }
        let drained = queue.drain().await;
        let timestamps: Vec<u64> = drained.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.size(), 0);
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_and_emits_exactly_one_event_per_eviction() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        let queue = OperationQueue::load("ws", 1000, store).await;

        let overflow_count = Arc::new(AtomicUsize::new(0));
        let oc = overflow_count.clone();
        queue.on_change(move |event| {
            if matches!(event, QueueEvent::Overflow { .. }) {
                oc.fetch_add(1, Ordering::SeqCst);
            }
        });

        for i in 0..1001u64 {
            queue.enqueue(entry("a", i)).await;
        }

        assert_eq!(overflow_count.load(Ordering::SeqCst), 1);
        assert_eq!(queue.size(), 1000);
        let drained = queue.drain().await;
        // earliest timestamp (0) was evicted; the oldest surviving entry is 1.
        assert_eq!(drained.first().unwrap().timestamp, 1);
    }

    #[tokio::test]
    async fn persisted_entries_are_reloaded_on_construction() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        {
            let queue = OperationQueue::load("ws", 0, store.clone()).await;
            queue.enqueue(entry("k", 1)).await;
            queue.enqueue(entry("k", 2)).await;
        }
        let reloaded = OperationQueue::load("ws", 0, store).await;
        assert_eq!(reloaded.size(), 2);
    }

    #[tokio::test]
    async fn empty_queue_deletes_persisted_state() {
        let store = Arc::new(InMemoryQueueStore::new());
        let dyn_store: Arc<dyn QueueStore> = store.clone();
        let queue = OperationQueue::load("ws", 0, dyn_store).await;
        queue.enqueue(entry("k", 1)).await;
        queue.drain().await;
        assert!(store.load("ws").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn return_to_head_puts_entry_back_in_front() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        let queue = OperationQueue::load("ws", 0, store).await;
        queue.enqueue(entry("a", 1)).await;
        let mut drained = queue.drain().await;
        let failed = drained.remove(0);
        queue.return_to_head(failed.clone()).await;
        assert_eq!(queue.size(), 1);
        let redrained = queue.drain().await;
        assert_eq!(redrained[0], failed);
    }
}
