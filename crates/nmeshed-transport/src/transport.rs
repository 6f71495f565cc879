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

//! The injected transport seam. The Connection Manager never constructs a
//! concrete socket itself -- it asks a [`TransportFactory`] for one and
//! only ever talks to the returned [`Transport`] handle and its event
//! stream.

use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(Vec<u8>),
    Close { code: u16, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// A single, one-shot connection session. A new `Transport` is constructed
/// for every connection attempt; there is never more than one live at a
/// time per [`crate::ConnectionManager`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
    async fn close(&self, code: u16);
}

/// Constructs [`Transport`] sessions against a URL. Implementations wrap a
/// concrete socket (a real WebSocket in a browser or native host); tests
/// substitute a scripted fake.
pub trait TransportFactory: Send + Sync {
    /// Begin opening a session against `url`. Returns the live handle
    /// immediately and a channel of events the session will emit over its
    /// lifetime: `Open` at most once, then any number of `Message`, then
    /// `Close` at most once.
    fn connect(&self, url: &str) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>);
}
