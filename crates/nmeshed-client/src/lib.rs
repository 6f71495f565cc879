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

//! The Client Facade: the single public entry point into a workspace's sync
//! session. Validates configuration, wires the Sync Engine, the offline
//! Operation Queue, and the Connection Manager together, and exposes
//! `set`/`get`/`delete`/`subscribe`/`connect`/`disconnect`/`destroy`.

mod config;
mod error;
mod facade;

pub use config::{
    Auth, AuthTokenProvider, ClientConfig, ClientConfigBuilder, ConfigurationError, SyncMode,
};
pub use error::NmeshedError;
pub use facade::NmeshedClient;

// Re-exported so downstream crates (and the demo binary) do not need a
// direct dependency on every leaf crate just to build a config and wire a
// transport/queue store.
pub use nmeshed_common::Value;
pub use nmeshed_engine::{
    EphemeralEvent, InMemoryQueueStore, OpEvent, QueueEvent, QueueStore,
};
pub use nmeshed_transport::{
    ConnectionStatus, Transport, TransportError, TransportEvent, TransportFactory,
};

#[cfg(test)]
mod tests {
    use super::*;
    use nmeshed_engine::InMemoryQueueStore;
    use nmeshed_transport::{TransportEvent as TEvent};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    struct LoopbackTransport {
        sent: std::sync::Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl Transport for LoopbackTransport {
        async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(bytes);
            Ok(())
        }

        async fn close(&self, _code: u16) {}
    }

    /// Opens immediately and never sends anything further -- enough to
    /// drive the facade from `Idle` through `Connected`.
    struct LoopbackFactory {
        sent: std::sync::Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    impl TransportFactory for LoopbackFactory {
        fn connect(
            &self,
            _url: &str,
        ) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            tx.send(TEvent::Open).unwrap();
            (
                Box::new(LoopbackTransport {
                    sent: self.sent.clone(),
                }),
                rx,
            )
        }
    }

    async fn test_client() -> std::sync::Arc<NmeshedClient> {
        let config = ClientConfigBuilder::new()
            .workspace_id("ws-1")
            .token("t")
            .sync_mode("lww")
            .connection_timeout_ms(200)
            .heartbeat_interval_ms(0)
            .build()
            .unwrap();
        let queue_store = std::sync::Arc::new(InMemoryQueueStore::new());
        let factory = std::sync::Arc::new(LoopbackFactory {
            sent: std::sync::Arc::new(StdMutex::new(Vec::new())),
        });
        NmeshedClient::new(config, queue_store, factory).await.unwrap()
    }

    #[tokio::test]
    async fn read_your_writes_regardless_of_connection_status() {
        let client = test_client().await;
        client.set("a", &Value::Number(1.0)).await.unwrap();
        assert_eq!(client.get("a"), Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn set_before_connect_is_queued() {
        let client = test_client().await;
        assert_eq!(client.status(), ConnectionStatus::Idle);

        let seen = std::sync::Arc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        client.on_queue(move |event| seen2.lock().unwrap().push(event.clone()));

        client.set("a", &Value::Number(1.0)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![QueueEvent::Changed { size: 1 }]);
    }

    #[tokio::test]
    async fn delete_clears_the_value() {
        let client = test_client().await;
        client.set("a", &Value::Bool(true)).await.unwrap();
        client.delete("a").await.unwrap();
        assert_eq!(client.get("a"), None);
    }

    #[tokio::test]
    async fn on_status_fires_immediately_with_current_status() {
        let client = test_client().await;
        let seen = std::sync::Arc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        client.on_status(move |s| seen2.lock().unwrap().push(*s));
        assert_eq!(*seen.lock().unwrap(), vec![ConnectionStatus::Idle]);
    }

    #[tokio::test]
    async fn connect_reaches_connected_against_a_loopback_transport() {
        let client = test_client().await;
        client.connect().await.unwrap();
        assert_eq!(client.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn config_rejects_empty_workspace_id() {
        let err = ClientConfigBuilder::new().token("t").build();
        assert!(err.is_err());
    }
}
