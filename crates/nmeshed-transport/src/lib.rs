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

//! Connection lifecycle: the status machine, the jittered reconnect timer,
//! the heartbeat, and connect-URL assembly. This crate never decodes wire
//! bytes -- it delegates to [`nmeshed_codec::MessageRouter`] just enough to
//! notice an `Init` frame, and otherwise forwards raw bytes to subscribers.

mod backoff;
mod manager;
mod status;
mod subscribers;
mod transport;
mod url;

pub use backoff::{exponential_delay_ms, jittered_delay_ms};
pub use manager::{ConnectionError, ConnectionManager, ManagerConfig};
pub use status::ConnectionStatus;
pub use subscribers::{SubscriberList, Unsubscribe};
pub use transport::{Transport, TransportError, TransportEvent, TransportFactory};
pub use url::{TOKEN_REDACTED, build_connect_url, redact_for_log};
