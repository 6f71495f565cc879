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

//! The single gate through which raw transport bytes become a typed
//! [`Message`]. No other component in the workspace decodes wire bytes
//! directly; the Sync Engine and Connection Manager only ever see the
//! output of [`MessageRouter::parse`].

use crate::packet::{Packet, decode as decode_packet};
use tracing::warn;

/// A parsed, routed message. Distinct from [`Packet`]: the router narrows
/// `Op` to the fields the engine actually needs and drops anything it
/// could not make sense of.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Op {
        key: String,
        value: Vec<u8>,
        timestamp: u64,
    },
    Sync {
        snapshot: Option<Vec<u8>>,
        state_vector: Option<Vec<u8>>,
        ack_seq: Option<u64>,
    },
    Init {
        entries: std::collections::BTreeMap<String, Vec<u8>>,
    },
    Signal {
        payload: Vec<u8>,
        from: Option<String>,
    },
}

/// Stateless, side-effect-free parsing gate. `debug` only controls whether
/// malformed input is logged; it never changes parsing behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageRouter {
    debug: bool,
}

impl MessageRouter {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Parse `bytes` into a [`Message`]. Returns `None` for empty input,
    /// an unrecognized MsgType, or any structurally invalid frame --- never
    /// propagates a parse error to the caller.
    pub fn parse(&self, bytes: &[u8]) -> Option<Message> {
        if bytes.is_empty() {
            return None;
        }
        match decode_packet(bytes) {
            Ok(Packet::Op {
                key,
                value,
                timestamp,
                ..
            }) => Some(Message::Op {
                key,
                value,
                timestamp,
            }),
            Ok(Packet::Sync {
                snapshot,
                state_vector,
                ack_sequence,
            }) => Some(Message::Sync {
                snapshot,
                state_vector,
                ack_seq: ack_sequence,
            }),
            Ok(Packet::Init { entries }) => Some(Message::Init { entries }),
            Ok(Packet::Signal { payload, sender_id }) => Some(Message::Signal {
                payload,
                from: sender_id,
            }),
            Err(e) => {
                if self.debug {
                    warn!(error = %e, "dropping malformed frame");
                }
                None
            }
        }
    }
}
