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

//! The public client surface. Thin: validates config, wires the Engine, the
//! Queue, and the Connection Manager together, and exposes
//! `set`/`get`/`delete`/`subscribe`/`connect`/`disconnect`/`destroy`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nmeshed_codec::{Packet, decode, encode, encode_packet};
use nmeshed_common::Value;
use nmeshed_engine::{
    EphemeralEvent, MergePolicy, OpEvent, OperationQueue, PassthroughMergeCore, QueueEntry,
    QueueEvent, QueueStore, SyncEngine, Unsubscribe as EngineUnsubscribe,
};
use nmeshed_transport::{
    ConnectionError, ConnectionManager, ConnectionStatus, ManagerConfig, TransportFactory,
    Unsubscribe as TransportUnsubscribe,
};
use tracing::warn;

use crate::config::{Auth, ClientConfig};
use crate::error::NmeshedError;

pub struct NmeshedClient {
    config: ClientConfig,
    engine: Arc<SyncEngine>,
    queue: Arc<OperationQueue>,
    manager: Arc<ConnectionManager>,
    last_timestamp: AtomicU64,
}

impl NmeshedClient {
    /// Validate `config`, load the persisted queue for its workspace, and
    /// construct the Engine and the Connection Manager. The Engine is live
    /// synchronously -- there is no pre-connect buffering dictionary; a
    /// `set` before `connect()` goes straight into the Engine's Store and,
    /// once disconnected, into the Queue.
    pub async fn new(
        config: ClientConfig,
        queue_store: Arc<dyn QueueStore>,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Result<Arc<Self>, NmeshedError> {
        let token = match &config.auth {
            Auth::Token(t) => t.clone(),
            Auth::Provider(provider) => provider
                .token()
                .await
                .map_err(|reason| crate::config::ConfigurationError {
                    field: "token",
                    reason,
                })?,
        };

        let policy = match config.sync_mode {
            crate::config::SyncMode::Lww => MergePolicy::Lww,
            crate::config::SyncMode::Crdt => MergePolicy::Collaborative(
                config
                    .merge_core
                    .clone()
                    .unwrap_or_else(|| Arc::new(PassthroughMergeCore)),
            ),
        };
        let engine = Arc::new(SyncEngine::new(policy));

        let queue = Arc::new(
            OperationQueue::load(config.workspace_id.clone(), config.max_queue_size, queue_store)
                .await,
        );

        let manager_config = ManagerConfig {
            server_url: config.server_url.clone(),
            workspace_id: config.workspace_id.clone(),
            token,
            user_id: config.user_id.clone(),
            sync_mode: config.sync_mode.as_str().to_string(),
            auto_reconnect: config.auto_reconnect,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_base_delay_ms: config.reconnect_base_delay_ms,
            max_reconnect_delay_ms: config.max_reconnect_delay_ms,
            connection_timeout_ms: config.connection_timeout_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            debug: config.debug,
        };
        let manager = ConnectionManager::new(manager_config, transport_factory);

        let client = Arc::new(Self {
            config,
            engine,
            queue,
            manager,
            last_timestamp: AtomicU64::new(0),
        });
        client.wire_internal_listeners();
        Ok(client)
    }

    fn wire_internal_listeners(self: &Arc<Self>) {
        let engine = self.engine.clone();
        self.manager.on_message(move |bytes| {
            let engine = engine.clone();
            let bytes = bytes.clone();
            tokio::spawn(async move {
                engine.merge_remote(&bytes).await;
            });
        });

        let this = self.clone();
        self.manager.on_status(move |status| {
            if *status == ConnectionStatus::Connected {
                let this = this.clone();
                tokio::spawn(async move {
                    this.flush_queue().await;
                });
            }
        });
    }

    /// Drains the offline queue and hands each entry to the transport in
    /// order. A send failure restores the failed entry and everything after
    /// it (in order) to the head of the queue and aborts the flush.
    async fn flush_queue(&self) {
        let entries = self.queue.drain().await;
        for (i, entry) in entries.iter().enumerate() {
            let bytes = encode_packet(&Packet::Op {
                key: entry.key.clone(),
                value: entry.value.clone(),
                timestamp: entry.timestamp,
                workspace_id: None,
            });
            if let Err(e) = self.manager.send(bytes).await {
                warn!(error = %e, key = %entry.key, "queue flush send failed; restoring remaining entries");
                for remaining in entries[i..].iter().rev() {
                    self.queue.return_to_head(remaining.clone()).await;
                }
                return;
            }
        }
    }

    fn next_timestamp(&self) -> u64 {
        let wall_clock = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        loop {
            let prev = self.last_timestamp.load(Ordering::SeqCst);
            let next = wall_clock.max(prev + 1);
            if self
                .last_timestamp
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    async fn apply_and_dispatch(
        self: &Arc<Self>,
        key: String,
        value_bytes: Vec<u8>,
    ) -> Result<(), NmeshedError> {
        let timestamp = self.next_timestamp();
        let packet_bytes = self
            .engine
            .apply_local(&key, value_bytes.clone(), timestamp)
            .await?;

        if self.manager.status() == ConnectionStatus::Ready {
            if let Err(e) = self.manager.send(packet_bytes).await {
                warn!(error = %e, key = %key, "direct send failed; falling back to the offline queue");
                self.queue
                    .enqueue(QueueEntry {
                        key,
                        value: value_bytes,
                        timestamp,
                    })
                    .await;
            }
        } else {
            self.queue
                .enqueue(QueueEntry {
                    key,
                    value: value_bytes,
                    timestamp,
                })
                .await;
        }
        Ok(())
    }

    /// Encode `value` and write it. Read-your-writes: `get(key)` reflects
    /// this write before `set` returns, regardless of connection status.
    pub async fn set(self: &Arc<Self>, key: impl Into<String>, value: &Value) -> Result<(), NmeshedError> {
        let bytes = encode(value)?;
        self.apply_and_dispatch(key.into(), bytes).await
    }

    pub async fn delete(self: &Arc<Self>, key: impl Into<String>) -> Result<(), NmeshedError> {
        self.apply_and_dispatch(key.into(), Vec::new()).await
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let bytes = self.engine.get(key)?;
        match decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, key = %key, "stored value failed to decode");
                None
            }
        }
    }

    pub fn all_values(&self) -> BTreeMap<String, Value> {
        self.engine
            .all_values()
            .into_iter()
            .filter_map(|(k, bytes)| match decode(&bytes) {
                Ok(v) => Some((k, v)),
                Err(e) => {
                    warn!(error = %e, key = %k, "stored value failed to decode");
                    None
                }
            })
            .collect()
    }

    pub async fn connect(self: &Arc<Self>) -> Result<(), NmeshedError> {
        self.manager.connect().await.map_err(NmeshedError::from)
    }

    pub async fn disconnect(self: &Arc<Self>) {
        self.manager.disconnect().await;
    }

    pub async fn destroy(self: &Arc<Self>) {
        self.manager.destroy().await;
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Sends a `Signal` frame carrying `payload`. Dropped with a warning if
    /// the connection is not `Ready`.
    pub async fn broadcast(&self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        if self.manager.status() != ConnectionStatus::Ready {
            warn!("dropping broadcast: connection not ready");
            return Ok(());
        }
        let bytes = encode_packet(&Packet::Signal {
            payload,
            sender_id: Some(self.config.user_id.clone()),
        });
        self.manager.send(bytes).await
    }

    pub fn on_message<F>(&self, callback: F) -> EngineUnsubscribe<OpEvent>
    where
        F: Fn(&OpEvent) + Send + Sync + 'static,
    {
        self.engine.on_op(callback)
    }

    /// Invoked immediately with the current status, then on every
    /// subsequent transition (duplicate statuses are coalesced upstream by
    /// the Connection Manager).
    pub fn on_status<F>(&self, callback: F) -> TransportUnsubscribe<ConnectionStatus>
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        callback(&self.manager.status());
        self.manager.on_status(callback)
    }

    pub fn on_presence<F>(&self, callback: F) -> EngineUnsubscribe<EphemeralEvent>
    where
        F: Fn(&EphemeralEvent) + Send + Sync + 'static,
    {
        self.engine.on_ephemeral(callback)
    }

    pub fn on_broadcast<F>(&self, callback: F) -> EngineUnsubscribe<EphemeralEvent>
    where
        F: Fn(&EphemeralEvent) + Send + Sync + 'static,
    {
        self.engine.on_ephemeral(callback)
    }

    pub fn on_queue<F>(&self, callback: F) -> EngineUnsubscribe<QueueEvent>
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.queue.on_change(callback)
    }
}
