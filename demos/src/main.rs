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

//! Exercises [`NmeshedClient`] end-to-end against an in-process loopback
//! transport: no real socket, no real server. A background task plays the
//! part of the relay server -- it opens the session, sends an empty `Init`
//! so the client reaches `Ready`, and echoes every frame it receives back
//! out so a second, independent client observes the first one's writes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use nmeshed_client::{
    ClientConfigBuilder, ConnectionStatus, NmeshedClient, Transport, TransportError,
    TransportEvent, TransportFactory, Value,
};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

/// A single shared relay: every connected peer's outbound frame is
/// broadcast to every other peer's inbound event stream, the way a real
/// sync server rebroadcasts operations to the rest of a workspace.
struct RelayFactory {
    bus: broadcast::Sender<Vec<u8>>,
}

impl RelayFactory {
    fn new() -> Self {
        let (bus, _) = broadcast::channel(256);
        Self { bus }
    }
}

struct RelayTransport {
    bus: broadcast::Sender<Vec<u8>>,
}

#[async_trait::async_trait]
impl Transport for RelayTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        // A real relay would stamp an origin id and skip echoing back to the
        // sender; the demo relays to everyone, itself included, since
        // nmeshed's merge policies are idempotent under redundant applies.
        let _ = self.bus.send(bytes);
        Ok(())
    }

    async fn close(&self, _code: u16) {}
}

impl TransportFactory for RelayFactory {
    fn connect(&self, url: &str) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>) {
        info!(%url, "demo relay: peer connecting");
        let (tx, rx) = mpsc::unbounded_channel();
        let mut incoming = self.bus.subscribe();

        let _ = tx.send(TransportEvent::Open);
        let init_bytes = nmeshed_codec::encode_packet(&nmeshed_codec::Packet::Init {
            entries: BTreeMap::new(),
        });
        let _ = tx.send(TransportEvent::Message(init_bytes));

        tokio::spawn(async move {
            while let Ok(bytes) = incoming.recv().await {
                if tx.send(TransportEvent::Message(bytes)).is_err() {
                    break;
                }
            }
        });

        (
            Box::new(RelayTransport {
                bus: self.bus.clone(),
            }),
            rx,
        )
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_max_level(tracing::Level::INFO)
        .init();

    let factory = Arc::new(RelayFactory::new());

    let alice = new_peer("alice", factory.clone()).await;
    let bob = new_peer("bob", factory.clone()).await;

    alice.connect().await.expect("alice connect");
    bob.connect().await.expect("bob connect");

    // Give both peers a beat to reach Ready before writing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(status = ?alice.status(), "alice ready");
    info!(status = ?bob.status(), "bob ready");

    alice
        .set("document.title", &Value::String("Shared Notes".into()))
        .await
        .expect("alice set");

    // Let the relay fan the write back out to bob.
    tokio::time::sleep(Duration::from_millis(50)).await;

    match bob.get("document.title") {
        Some(value) => info!(?value, "bob observed alice's write"),
        None => info!("bob has not observed alice's write yet"),
    }

    bob.broadcast(b"cursor:42".to_vec())
        .await
        .expect("bob broadcast");

    tokio::time::sleep(Duration::from_millis(50)).await;

    alice.destroy().await;
    bob.destroy().await;
    info!("demo complete");
}

async fn new_peer(user_id: &str, factory: Arc<RelayFactory>) -> Arc<NmeshedClient> {
    let config = ClientConfigBuilder::new()
        .workspace_id("demo-workspace")
        .token("demo-token")
        .user_id(user_id)
        .sync_mode("lww")
        .heartbeat_interval_ms(0)
        .build()
        .expect("valid demo config");

    let queue_store = Arc::new(nmeshed_client::InMemoryQueueStore::new());
    let client = NmeshedClient::new(config, queue_store, factory)
        .await
        .expect("client construction");

    client.on_status(|status: &ConnectionStatus| {
        info!(?status, "status changed");
    });
    client
}
