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

//! The Sync Engine: the sole owner and mutator of the [`Store`], applying
//! local writes, merging remote packets under the configured
//! [`MergePolicy`], and fanning out typed events to subscribers.

use std::collections::BTreeMap;
use std::sync::Mutex;

use nmeshed_codec::{Message, MessageRouter, Packet, decode_packet, encode_packet};
use tracing::{trace, warn};

use crate::merge::{MergePolicy, lww_accepts};
use crate::store::Store;
use crate::subscribers::{SubscriberList, Unsubscribe};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("key must not be empty")]
    EmptyKey,
}

/// A store mutation. `value: None` means the key was deleted.
#[derive(Clone, Debug, PartialEq)]
pub struct OpEvent {
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub is_local: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EphemeralEvent {
    pub payload: Vec<u8>,
    pub sender_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitEvent {
    pub entries: BTreeMap<String, Vec<u8>>,
}

/// Outcome of [`SyncEngine::merge_remote`].
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyResult {
    Op { key: String, is_local: bool },
    Init,
    Ephemeral,
    Ignored,
}

pub struct SyncEngine {
    store: Mutex<Store>,
    policy: MergePolicy,
    router: MessageRouter,
    op_subscribers: SubscriberList<OpEvent>,
    init_subscribers: SubscriberList<InitEvent>,
    ready_subscribers: SubscriberList<()>,
    ephemeral_subscribers: SubscriberList<EphemeralEvent>,
}

impl SyncEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            store: Mutex::new(Store::new()),
            policy,
            router: MessageRouter::new(false),
            op_subscribers: SubscriberList::new(),
            init_subscribers: SubscriberList::new(),
            ready_subscribers: SubscriberList::new(),
            ephemeral_subscribers: SubscriberList::new(),
        }
    }

    pub fn on_op<F>(&self, callback: F) -> Unsubscribe<OpEvent>
    where
        F: Fn(&OpEvent) + Send + Sync + 'static,
    {
        self.op_subscribers.subscribe(callback)
    }

    pub fn on_init<F>(&self, callback: F) -> Unsubscribe<InitEvent>
    where
        F: Fn(&InitEvent) + Send + Sync + 'static,
    {
        self.init_subscribers.subscribe(callback)
    }

    pub fn on_ready<F>(&self, callback: F) -> Unsubscribe<()>
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.ready_subscribers.subscribe(callback)
    }

    pub fn on_ephemeral<F>(&self, callback: F) -> Unsubscribe<EphemeralEvent>
    where
        F: Fn(&EphemeralEvent) + Send + Sync + 'static,
    {
        self.ephemeral_subscribers.subscribe(callback)
    }

    /// Apply a local write under the engine's resolution policy, emit an
    /// `op` event with `is_local=true`, and return the encoded `Op` packet
    /// ready for the transport. Empty `value_bytes` denotes deletion.
    pub async fn apply_local(
        &self,
        key: &str,
        value_bytes: Vec<u8>,
        timestamp: u64,
    ) -> Result<Vec<u8>, EngineError> {
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }
        let deleted = value_bytes.is_empty();

        match &self.policy {
            MergePolicy::Lww => {
                let mut store = self.store.lock().unwrap();
                if deleted {
                    store.remove(key);
                } else {
                    store.set(key, value_bytes.clone(), timestamp);
                }
            }
            MergePolicy::Collaborative(core) => {
                let resolved = core.apply_local(key, &value_bytes, timestamp).await;
                let mut store = self.store.lock().unwrap();
                for (k, v) in resolved {
                    if v.is_empty() {
                        store.remove(&k);
                    } else {
                        store.set(k, v, timestamp);
                    }
                }
            }
        }

        self.op_subscribers.dispatch(&OpEvent {
            key: key.to_string(),
            value: if deleted { None } else { Some(value_bytes.clone()) },
            is_local: true,
        });

        Ok(encode_packet(&Packet::Op {
            key: key.to_string(),
            value: value_bytes,
            timestamp,
            workspace_id: None,
        }))
    }

    /// Parse and merge a remote packet. Unknown or malformed frames produce
    /// [`ApplyResult::Ignored`] without mutating the store.
    pub async fn merge_remote(&self, packet_bytes: &[u8]) -> ApplyResult {
        let Some(message) = self.router.parse(packet_bytes) else {
            return ApplyResult::Ignored;
        };
        match message {
            Message::Op {
                key,
                value,
                timestamp,
            } => self.merge_remote_op(key, value, timestamp).await,
            Message::Init { entries } => {
                {
                    let mut store = self.store.lock().unwrap();
                    store.replace_all(entries.clone(), 0);
                }
                self.init_subscribers
                    .dispatch(&InitEvent { entries: entries.clone() });
                self.ready_subscribers.dispatch(&());
                ApplyResult::Init
            }
            Message::Signal { payload, from } => {
                self.ephemeral_subscribers.dispatch(&EphemeralEvent {
                    payload,
                    sender_id: from,
                });
                ApplyResult::Ephemeral
            }
            Message::Sync { .. } => {
                // Sync packets carry transport-level bookkeeping (snapshot
                // requests, state vectors, ack sequences) that the
                // Connection Manager interprets directly; the engine does
                // not own that semantics, so this is a deliberate no-op.
                ApplyResult::Ignored
            }
        }
    }

    async fn merge_remote_op(&self, key: String, value: Vec<u8>, timestamp: u64) -> ApplyResult {
        let deleted = value.is_empty();
        match &self.policy {
            MergePolicy::Lww => {
                let mut store = self.store.lock().unwrap();
                let stored_ts = store.timestamp_of(&key);
                if !lww_accepts(stored_ts, timestamp) {
                    trace!(key = %key, "dropping stale remote op under LWW");
                    return ApplyResult::Ignored;
                }
                if deleted {
                    store.remove(&key);
                } else {
                    store.set(key.clone(), value.clone(), timestamp);
                }
            }
            MergePolicy::Collaborative(core) => {
                let delta = encode_packet(&Packet::Op {
                    key: key.clone(),
                    value: value.clone(),
                    timestamp,
                    workspace_id: None,
                });
                let resolved = core.merge_remote(&delta).await;
                let mut store = self.store.lock().unwrap();
                for (k, v) in resolved {
                    if v.is_empty() {
                        store.remove(&k);
                    } else {
                        store.set(k, v, timestamp);
                    }
                }
            }
        }
        self.op_subscribers.dispatch(&OpEvent {
            key: key.clone(),
            value: if deleted { None } else { Some(value) },
            is_local: false,
        });
        ApplyResult::Op {
            key,
            is_local: false,
        }
    }

    /// Replace the store's contents from a bulk encoding (same wire shape as
    /// an `Init` packet).
    pub fn load_snapshot(&self, bytes: &[u8]) {
        match decode_packet(bytes) {
            Ok(Packet::Init { entries }) => {
                self.store.lock().unwrap().replace_all(entries, 0);
            }
            _ => warn!("load_snapshot given a non-Init payload; ignoring"),
        }
    }

    pub fn get_snapshot(&self) -> Vec<u8> {
        let entries = self.store.lock().unwrap().all_values();
        encode_packet(&Packet::Init { entries })
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(key).map(|v| v.to_vec())
    }

    pub fn all_values(&self) -> BTreeMap<String, Vec<u8>> {
        self.store.lock().unwrap().all_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmeshed_codec::encode_packet as pkt;
    use pretty_assertions::assert_eq;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn apply_local_updates_store_and_emits_op_event() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        let seen: StdArc<Mutex<Vec<OpEvent>>> = StdArc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        engine.on_op(move |e| seen2.lock().unwrap().push(e.clone()));

        engine.apply_local("a", vec![1, 2], 10).await.unwrap();
        assert_eq!(engine.get("a"), Some(vec![1, 2]));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].is_local);
    }

    #[tokio::test]
    async fn apply_local_with_empty_key_fails() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        assert!(matches!(
            engine.apply_local("", vec![1], 1).await,
            Err(EngineError::EmptyKey)
        ));
    }

    #[tokio::test]
    async fn empty_value_bytes_denotes_deletion() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        engine.apply_local("a", vec![1], 1).await.unwrap();
        engine.apply_local("a", vec![], 2).await.unwrap();
        assert_eq!(engine.get("a"), None);
    }

    #[tokio::test]
    async fn lww_merge_picks_newer_timestamp_regardless_of_arrival_order() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        let op_newer = pkt(&Packet::Op {
            key: "k".into(),
            value: vec![42],
            timestamp: 100,
            workspace_id: None,
        });
        let op_older = pkt(&Packet::Op {
            key: "k".into(),
            value: vec![7],
            timestamp: 50,
            workspace_id: None,
        });
        engine.merge_remote(&op_newer).await;
        engine.merge_remote(&op_older).await;
        assert_eq!(engine.get("k"), Some(vec![42]));
    }

    #[tokio::test]
    async fn stale_remote_op_is_dropped_silently() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        engine.apply_local("k", vec![1], 100).await.unwrap();
        let stale = pkt(&Packet::Op {
            key: "k".into(),
            value: vec![9],
            timestamp: 50,
            workspace_id: None,
        });
        let result = engine.merge_remote(&stale).await;
        assert_eq!(result, ApplyResult::Ignored);
        assert_eq!(engine.get("k"), Some(vec![1]));
    }

    #[tokio::test]
    async fn init_message_replaces_store_and_fires_init_then_ready() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        let order: StdArc<Mutex<Vec<&'static str>>> = StdArc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        engine.on_init(move |_| o1.lock().unwrap().push("init"));
        let o2 = order.clone();
        engine.on_ready(move |_| o2.lock().unwrap().push("ready"));

        let mut entries = BTreeMap::new();
        entries.insert("x".to_string(), vec![1]);
        let init = pkt(&Packet::Init { entries });
        let result = engine.merge_remote(&init).await;
        assert_eq!(result, ApplyResult::Init);
        assert_eq!(engine.get("x"), Some(vec![1]));
        assert_eq!(*order.lock().unwrap(), vec!["init", "ready"]);
    }

    #[tokio::test]
    async fn signal_message_fires_ephemeral_and_does_not_mutate_store() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        let seen: StdArc<Mutex<Vec<EphemeralEvent>>> = StdArc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        engine.on_ephemeral(move |e| seen2.lock().unwrap().push(e.clone()));

        let signal = pkt(&Packet::Signal {
            payload: vec![9, 9],
            sender_id: Some("peer-1".into()),
        });
        let result = engine.merge_remote(&signal).await;
        assert_eq!(result, ApplyResult::Ephemeral);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(engine.all_values().len(), 0);
    }

    #[tokio::test]
    async fn malformed_frame_is_ignored() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        let result = engine.merge_remote(&[0xff]).await;
        assert_eq!(result, ApplyResult::Ignored);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_load_snapshot() {
        let engine = SyncEngine::new(MergePolicy::Lww);
        engine.apply_local("a", vec![1], 1).await.unwrap();
        engine.apply_local("b", vec![2], 1).await.unwrap();
        let snapshot = engine.get_snapshot();

        let other = SyncEngine::new(MergePolicy::Lww);
        other.load_snapshot(&snapshot);
        assert_eq!(other.all_values(), engine.all_values());
    }
}
