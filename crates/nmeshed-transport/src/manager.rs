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

//! The Connection Manager: owns the transport session, the status machine,
//! and the heartbeat/reconnect timers. It never parses wire bytes itself --
//! it only peeks at [`MessageRouter`] output long enough to notice the first
//! `Init` frame and drive `Syncing -> Ready`; the `Connected -> Syncing` leg
//! fires unconditionally as soon as the transport opens, so a peer that
//! never sends `Init` leaves the connection parked in `Syncing` forever
//! rather than stuck at `Connected`. Raw bytes are handed to subscribers
//! unmodified for the Sync Engine to parse and merge authoritatively.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nmeshed_codec::{Message, MessageRouter};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::backoff::jittered_delay_ms;
use crate::status::ConnectionStatus;
use crate::subscribers::{SubscriberList, Unsubscribe};
use crate::transport::{Transport, TransportEvent, TransportFactory};
use crate::url::{build_connect_url, redact_for_log};

/// Close codes in this band are authentication refusals: no reconnection is
/// attempted and the status goes straight to `Error`.
const AUTH_CLOSE_BAND: (u16, u16) = (4000, 4100);

fn is_auth_close(code: u16) -> bool {
    code >= AUTH_CLOSE_BAND.0 && code < AUTH_CLOSE_BAND.1
}

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub server_url: String,
    pub workspace_id: String,
    pub token: String,
    pub user_id: String,
    pub sync_mode: String,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    /// 0 disables the connection timeout.
    pub connection_timeout_ms: u64,
    /// 0 disables the heartbeat.
    pub heartbeat_interval_ms: u64,
    pub debug: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport construction failed: {0}")]
    ConstructionFailed(String),
    #[error("connection attempt timed out after {0}ms")]
    Timeout(u64),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("authentication refused (close code {code})")]
    AuthenticationRefused { code: u16 },
    #[error("no active connection")]
    NotConnected,
    #[error("client was destroyed")]
    Destroyed,
}

impl ConnectionError {
    /// `false` for auth refusals, destruction, and construction failures --
    /// matching `ConnectionError{retryable}` in the spec.
    pub fn retryable(&self) -> bool {
        !matches!(
            self,
            ConnectionError::AuthenticationRefused { .. }
                | ConnectionError::Destroyed
                | ConnectionError::ConstructionFailed(_)
        )
    }
}

struct Session {
    transport: Arc<dyn Transport>,
    generation: u64,
}

/// Owns at most one live [`Transport`] session at a time. A reconnect
/// attempt tears the previous session down (bumping `generation`, which
/// invalidates any in-flight event-loop or heartbeat task from a prior
/// attempt) before a new one is constructed.
pub struct ConnectionManager {
    config: ManagerConfig,
    factory: Arc<dyn TransportFactory>,
    router: MessageRouter,
    status: Mutex<ConnectionStatus>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    attempt: AtomicU32,
    destroyed: AtomicBool,
    seen_init: AtomicBool,
    status_subscribers: SubscriberList<ConnectionStatus>,
    message_subscribers: SubscriberList<Vec<u8>>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig, factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        let router = MessageRouter::new(config.debug);
        Arc::new(Self {
            config,
            factory,
            router,
            status: Mutex::new(ConnectionStatus::Idle),
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            attempt: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
            seen_init: AtomicBool::new(false),
            status_subscribers: SubscriberList::new(),
            message_subscribers: SubscriberList::new(),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    pub fn on_status<F>(&self, callback: F) -> Unsubscribe<ConnectionStatus>
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.status_subscribers.subscribe(callback)
    }

    pub fn on_message<F>(&self, callback: F) -> Unsubscribe<Vec<u8>>
    where
        F: Fn(&Vec<u8>) + Send + Sync + 'static,
    {
        self.message_subscribers.subscribe(callback)
    }

    /// Idempotent: if a connection attempt is already underway or live, this
    /// returns `Ok(())` immediately without side effect.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Destroyed);
        }
        if self.status().is_active_attempt() {
            return Ok(());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_init.store(false, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Connecting);

        let url = build_connect_url(
            &self.config.server_url,
            &self.config.workspace_id,
            &self.config.token,
            &self.config.user_id,
            &self.config.sync_mode,
        );
        if self.config.debug {
            debug!(
                url = %redact_for_log(
                    &self.config.server_url,
                    &self.config.workspace_id,
                    &self.config.user_id,
                    &self.config.sync_mode,
                ),
                "opening connection"
            );
        }

        let (boxed_transport, mut events) = self.factory.connect(&url);
        let transport: Arc<dyn Transport> = Arc::from(boxed_transport);

        let wait_for_open = async {
            loop {
                match events.recv().await {
                    Some(TransportEvent::Open) => return Ok(()),
                    Some(TransportEvent::Close { code, reason }) => return Err((code, reason)),
                    Some(TransportEvent::Message(_)) => continue,
                    None => return Err((0, "transport closed before opening".to_string())),
                }
            }
        };

        let opened = if self.config.connection_timeout_ms > 0 {
            match timeout(
                Duration::from_millis(self.config.connection_timeout_ms),
                wait_for_open,
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    transport.close(0).await;
                    self.set_status(ConnectionStatus::Error);
                    return Err(ConnectionError::Timeout(self.config.connection_timeout_ms));
                }
            }
        } else {
            wait_for_open.await
        };

        if let Err((code, reason)) = opened {
            self.set_status(ConnectionStatus::Error);
            if is_auth_close(code) {
                return Err(ConnectionError::AuthenticationRefused { code });
            }
            return Err(ConnectionError::ConstructionFailed(format!(
                "transport closed before opening (code {code}): {reason}"
            )));
        }

        {
            let mut session = self.session.lock().unwrap();
            *session = Some(Session {
                transport: transport.clone(),
                generation,
            });
        }
        self.attempt.store(0, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Connected);
        self.set_status(ConnectionStatus::Syncing);

        if self.destroyed.load(Ordering::SeqCst) {
            self.disconnect().await;
            return Err(ConnectionError::Destroyed);
        }

        self.spawn_heartbeat(generation, transport);
        self.spawn_event_loop(generation, events);

        Ok(())
    }

    /// Cancels timers, detaches the transport's callbacks, closes it, and
    /// transitions to `Disconnected`. Does not schedule a reconnect.
    pub async fn disconnect(self: &Arc<Self>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let session = self.session.lock().unwrap().take();
        if let Some(session) = session {
            session.transport.close(1000).await;
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// `disconnect()` plus a permanent terminal flag: every subsequent
    /// `connect()` call fails with [`ConnectionError::Destroyed`].
    pub async fn destroy(self: &Arc<Self>) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.disconnect().await;
    }

    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), ConnectionError> {
        let transport = {
            let session = self.session.lock().unwrap();
            session.as_ref().map(|s| s.transport.clone())
        };
        match transport {
            Some(transport) => transport
                .send(bytes)
                .await
                .map_err(|e| ConnectionError::SendFailed(e.to_string())),
            None => Err(ConnectionError::NotConnected),
        }
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_status(&self, new: ConnectionStatus) {
        let changed = {
            let mut status = self.status.lock().unwrap();
            if *status == new {
                false
            } else {
                *status = new;
                true
            }
        };
        if changed {
            if self.config.debug {
                debug!(?new, "connection status transition");
            }
            self.status_subscribers.dispatch(&new);
        }
    }

    fn handle_message(&self, bytes: Vec<u8>) {
        if self.config.debug {
            trace!(len = bytes.len(), "transport message");
        }
        if !self.seen_init.load(Ordering::SeqCst)
            && matches!(self.router.parse(&bytes), Some(Message::Init { .. }))
        {
            self.seen_init.store(true, Ordering::SeqCst);
            self.set_status(ConnectionStatus::Ready);
        }
        self.message_subscribers.dispatch(&bytes);
    }

    fn spawn_event_loop(
        self: &Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !manager.is_current_generation(generation) {
                    break;
                }
                match event {
                    TransportEvent::Open => {}
                    TransportEvent::Message(bytes) => manager.handle_message(bytes),
                    TransportEvent::Close { code, reason } => {
                        manager.handle_close(generation, code, reason).await;
                        break;
                    }
                }
            }
        });
    }

    fn spawn_heartbeat(self: &Arc<Self>, generation: u64, transport: Arc<dyn Transport>) {
        if self.config.heartbeat_interval_ms == 0 {
            return;
        }
        let manager = self.clone();
        let interval_ms = self.config.heartbeat_interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if !manager.is_current_generation(generation) {
                    break;
                }
                if manager.status() != ConnectionStatus::Ready {
                    continue;
                }
                if let Err(e) = transport.send(vec![0x00]).await {
                    warn!(error = %e, "heartbeat send failed");
                }
            }
        });
    }

    async fn handle_close(self: &Arc<Self>, generation: u64, code: u16, reason: String) {
        if !self.is_current_generation(generation) {
            return;
        }
        {
            let mut session = self.session.lock().unwrap();
            if session.as_ref().map(|s| s.generation) == Some(generation) {
                *session = None;
            }
        }
        if self.config.debug {
            debug!(code, reason = %reason, "transport closed");
        }

        if is_auth_close(code) {
            self.set_status(ConnectionStatus::Error);
            return;
        }

        self.set_status(ConnectionStatus::Disconnected);

        if self.destroyed.load(Ordering::SeqCst) || !self.config.auto_reconnect {
            return;
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.config.max_reconnect_attempts {
            self.set_status(ConnectionStatus::Error);
            return;
        }
        self.set_status(ConnectionStatus::Reconnecting);

        let delay = jittered_delay_ms(
            self.config.reconnect_base_delay_ms,
            attempt,
            self.config.max_reconnect_delay_ms,
        );
        let manager = self.clone();
        let scheduled_generation = generation;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if manager.generation.load(Ordering::SeqCst) == scheduled_generation {
                let _ = manager.connect().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmeshed_codec::{Packet, encode_packet};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct FakeTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, bytes: Vec<u8>) -> Result<(), crate::transport::TransportError> {
            self.sent.lock().unwrap().push(bytes);
            Ok(())
        }

        async fn close(&self, _code: u16) {}
    }

    /// Opens immediately on every `connect()` call and hands the test a
    /// clone of the event sender for the most recent session, so tests can
    /// push `Message`/`Close` events after the manager has connected.
    struct FakeFactory {
        sender_slot: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        connect_count: AtomicUsize,
    }

    impl FakeFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sender_slot: Mutex::new(None),
                sent: Arc::new(Mutex::new(Vec::new())),
                connect_count: AtomicUsize::new(0),
            })
        }

        fn current_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
            self.sender_slot.lock().unwrap().clone().unwrap()
        }
    }

    impl TransportFactory for FakeFactory {
        fn connect(
            &self,
            _url: &str,
        ) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>) {
            self.connect_count.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            tx.send(TransportEvent::Open).unwrap();
            *self.sender_slot.lock().unwrap() = Some(tx);
            (
                Box::new(FakeTransport {
                    sent: self.sent.clone(),
                }),
                rx,
            )
        }
    }

    /// Never sends `Open`; `connect()` must time out. Keeps the sender half
    /// alive (rather than letting it drop and close the channel) so the
    /// receiver genuinely stalls instead of observing an immediate `None`.
    #[derive(Default)]
    struct StallingFactory {
        senders: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    }

    impl TransportFactory for StallingFactory {
        fn connect(
            &self,
            _url: &str,
        ) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            (
                Box::new(FakeTransport {
                    sent: Arc::new(Mutex::new(Vec::new())),
                }),
                rx,
            )
        }
    }

    fn config(factory_url: &str) -> ManagerConfig {
        ManagerConfig {
            server_url: factory_url.to_string(),
            workspace_id: "ws-1".to_string(),
            token: "t".to_string(),
            user_id: "u-1".to_string(),
            sync_mode: "lww".to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 10,
            max_reconnect_delay_ms: 100,
            connection_timeout_ms: 200,
            heartbeat_interval_ms: 0,
            debug: false,
        }
    }

    #[tokio::test]
    async fn connect_transitions_to_connected_on_open() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory);
        manager.connect().await.unwrap();
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn overlapping_connect_calls_are_idempotent() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory.clone());
        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        assert_eq!(factory.connect_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stays_syncing_without_an_init_frame() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory.clone());
        manager.connect().await.unwrap();
        factory
            .current_sender()
            .send(TransportEvent::Message(vec![9, 9, 9]))
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(manager.status(), ConnectionStatus::Syncing);
    }

    #[tokio::test]
    async fn init_frame_drives_connected_to_ready() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        manager.on_status(move |s| seen2.lock().unwrap().push(*s));
        manager.connect().await.unwrap();

        let init = encode_packet(&Packet::Init {
            entries: Default::default(),
        });
        factory
            .current_sender()
            .send(TransportEvent::Message(init))
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert_eq!(manager.status(), ConnectionStatus::Ready);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionStatus::Connected, ConnectionStatus::Syncing, ConnectionStatus::Ready]
        );
    }

    #[tokio::test]
    async fn connect_times_out_without_open() {
        let mut cfg = config("wss://example");
        cfg.connection_timeout_ms = 20;
        let manager = ConnectionManager::new(cfg, Arc::new(StallingFactory::default()));
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(20)));
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn auth_band_close_code_goes_to_error_without_reconnect() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory.clone());
        manager.connect().await.unwrap();
        factory
            .current_sender()
            .send(TransportEvent::Close {
                code: 4001,
                reason: "unauthorized".to_string(),
            })
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(factory.connect_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_auth_close_schedules_a_reconnect_when_enabled() {
        let factory = FakeFactory::new();
        let mut cfg = config("wss://example");
        cfg.reconnect_base_delay_ms = 5;
        cfg.max_reconnect_delay_ms = 10;
        let manager = ConnectionManager::new(cfg, factory.clone());
        manager.connect().await.unwrap();
        factory
            .current_sender()
            .send(TransportEvent::Close {
                code: 1001,
                reason: "going away".to_string(),
            })
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(60)).await;
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(factory.connect_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disconnect_suppresses_a_pending_reconnect() {
        let factory = FakeFactory::new();
        let mut cfg = config("wss://example");
        cfg.reconnect_base_delay_ms = 30;
        cfg.max_reconnect_delay_ms = 30;
        let manager = ConnectionManager::new(cfg, factory.clone());
        manager.connect().await.unwrap();
        factory
            .current_sender()
            .send(TransportEvent::Close {
                code: 1001,
                reason: "going away".to_string(),
            })
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        manager.disconnect().await;
        tokio::time::sleep(StdDuration::from_millis(60)).await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(factory.connect_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destroyed_client_rejects_further_connects() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory);
        manager.connect().await.unwrap();
        manager.destroy().await;
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Destroyed));
    }

    #[tokio::test]
    async fn send_without_a_session_fails() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory);
        let err = manager.send(vec![1]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected));
    }

    #[tokio::test]
    async fn send_after_connect_reaches_the_transport() {
        let factory = FakeFactory::new();
        let manager = ConnectionManager::new(config("wss://example"), factory.clone());
        manager.connect().await.unwrap();
        manager.send(vec![7, 8]).await.unwrap();
        assert_eq!(factory.sent.lock().unwrap().as_slice(), &[vec![7u8, 8]]);
    }
}
