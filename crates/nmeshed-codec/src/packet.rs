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

//! Envelope framing for the four wire packet variants: `Op`, `Sync`, `Init`,
//! `Signal`. Every packet starts with a one-byte `MsgType` discriminator
//! followed by a variant-specific, self-contained body.
//!
//! `MsgType` assignment (fixed here; not otherwise pinned down by the source):
//! `0 = Op`, `1 = Sync`, `2 = Init`, `3 = Signal`.

use std::collections::BTreeMap;

const MSG_OP: u8 = 0;
const MSG_SYNC: u8 = 1;
const MSG_INIT: u8 = 2;
const MSG_SIGNAL: u8 = 3;

const SYNC_FLAG_SNAPSHOT: u8 = 0b001;
const SYNC_FLAG_STATE_VECTOR: u8 = 0b010;
const SYNC_FLAG_ACK_SEQUENCE: u8 = 0b100;

const SIGNAL_FLAG_SENDER: u8 = 0b001;

/// A parsed packet. `Op` carries an optional `workspace_id` because the wire
/// body allows it to be omitted when the transport already scopes the
/// connection to a single workspace.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Op {
        key: String,
        value: Vec<u8>,
        timestamp: u64,
        workspace_id: Option<String>,
    },
    Sync {
        snapshot: Option<Vec<u8>>,
        state_vector: Option<Vec<u8>>,
        ack_sequence: Option<u64>,
    },
    Init {
        entries: BTreeMap<String, Vec<u8>>,
    },
    Signal {
        payload: Vec<u8>,
        sender_id: Option<String>,
    },
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum PacketError {
    #[error("packet is empty")]
    Empty,
    #[error("unrecognized MsgType byte {0}")]
    UnknownMsgType(u8),
    #[error("frame ended before the {0} body was fully read")]
    Truncated(&'static str),
    #[error("key or sender id was not valid UTF-8")]
    InvalidUtf8,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, ctx: &'static str) -> Result<&'a [u8], PacketError> {
        if self.pos + n > self.bytes.len() {
            return Err(PacketError::Truncated(ctx));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, ctx: &'static str) -> Result<u8, PacketError> {
        Ok(self.take(1, ctx)?[0])
    }

    fn u16(&mut self, ctx: &'static str) -> Result<u16, PacketError> {
        Ok(u16::from_le_bytes(self.take(2, ctx)?.try_into().unwrap()))
    }

    fn u32(&mut self, ctx: &'static str) -> Result<u32, PacketError> {
        Ok(u32::from_le_bytes(self.take(4, ctx)?.try_into().unwrap()))
    }

    fn u64(&mut self, ctx: &'static str) -> Result<u64, PacketError> {
        Ok(u64::from_le_bytes(self.take(8, ctx)?.try_into().unwrap()))
    }

    fn string16(&mut self, ctx: &'static str) -> Result<String, PacketError> {
        let len = self.u16(ctx)? as usize;
        let bytes = self.take(len, ctx)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PacketError::InvalidUtf8)
    }

    fn string32(&mut self, ctx: &'static str) -> Result<String, PacketError> {
        let len = self.u32(ctx)? as usize;
        let bytes = self.take(len, ctx)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PacketError::InvalidUtf8)
    }

    fn bytes32(&mut self, ctx: &'static str) -> Result<Vec<u8>, PacketError> {
        let len = self.u32(ctx)? as usize;
        Ok(self.take(len, ctx)?.to_vec())
    }
}

pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    match packet {
        Packet::Op {
            key,
            value,
            timestamp,
            workspace_id,
        } => {
            out.push(MSG_OP);
            match workspace_id {
                Some(ws) => {
                    out.extend_from_slice(&(ws.len() as u16).to_le_bytes());
                    out.extend_from_slice(ws.as_bytes());
                }
                None => out.extend_from_slice(&0u16.to_le_bytes()),
            }
            out.extend_from_slice(&(key.len() as u32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&timestamp.to_le_bytes());
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value);
        }
        Packet::Sync {
            snapshot,
            state_vector,
            ack_sequence,
        } => {
            out.push(MSG_SYNC);
            let mut flags = 0u8;
            if snapshot.is_some() {
                flags |= SYNC_FLAG_SNAPSHOT;
            }
            if state_vector.is_some() {
                flags |= SYNC_FLAG_STATE_VECTOR;
            }
            if ack_sequence.is_some() {
                flags |= SYNC_FLAG_ACK_SEQUENCE;
            }
            out.push(flags);
            if let Some(snapshot) = snapshot {
                out.extend_from_slice(&(snapshot.len() as u32).to_le_bytes());
                out.extend_from_slice(snapshot);
            }
            if let Some(state_vector) = state_vector {
                out.extend_from_slice(&(state_vector.len() as u32).to_le_bytes());
                out.extend_from_slice(state_vector);
            }
            if let Some(ack) = ack_sequence {
                out.extend_from_slice(&ack.to_le_bytes());
            }
        }
        Packet::Init { entries } => {
            out.push(MSG_INIT);
            out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (key, value) in entries {
                out.extend_from_slice(&(key.len() as u32).to_le_bytes());
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                out.extend_from_slice(value);
            }
        }
        Packet::Signal { payload, sender_id } => {
            out.push(MSG_SIGNAL);
            match sender_id {
                Some(id) => {
                    out.push(SIGNAL_FLAG_SENDER);
                    out.extend_from_slice(&(id.len() as u16).to_le_bytes());
                    out.extend_from_slice(id.as_bytes());
                }
                None => out.push(0),
            }
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
        }
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<Packet, PacketError> {
    if bytes.is_empty() {
        return Err(PacketError::Empty);
    }
    let mut r = Reader::new(bytes);
    let msg_type = r.u8("msg type")?;
    match msg_type {
        MSG_OP => {
            let ws_len = r.u16("op workspace id")? as usize;
            let workspace_id = if ws_len > 0 {
                let bytes = r.take(ws_len, "op workspace id")?;
                Some(String::from_utf8(bytes.to_vec()).map_err(|_| PacketError::InvalidUtf8)?)
            } else {
                None
            };
            let key = r.string32("op key")?;
            let timestamp = r.u64("op timestamp")?;
            let value = r.bytes32("op value")?;
            Ok(Packet::Op {
                key,
                value,
                timestamp,
                workspace_id,
            })
        }
        MSG_SYNC => {
            let flags = r.u8("sync flags")?;
            let snapshot = if flags & SYNC_FLAG_SNAPSHOT != 0 {
                Some(r.bytes32("sync snapshot")?)
            } else {
                None
            };
            let state_vector = if flags & SYNC_FLAG_STATE_VECTOR != 0 {
                Some(r.bytes32("sync state vector")?)
            } else {
                None
            };
            let ack_sequence = if flags & SYNC_FLAG_ACK_SEQUENCE != 0 {
                Some(r.u64("sync ack sequence")?)
            } else {
                None
            };
            Ok(Packet::Sync {
                snapshot,
                state_vector,
                ack_sequence,
            })
        }
        MSG_INIT => {
            let count = r.u32("init count")?;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let key = r.string32("init key")?;
                let value = r.bytes32("init value")?;
                entries.insert(key, value);
            }
            Ok(Packet::Init { entries })
        }
        MSG_SIGNAL => {
            let flag = r.u8("signal flag")?;
            let sender_id = if flag & SIGNAL_FLAG_SENDER != 0 {
                Some(r.string16("signal sender")?)
            } else {
                None
            };
            let payload = r.bytes32("signal payload")?;
            Ok(Packet::Signal { payload, sender_id })
        }
        other => Err(PacketError::UnknownMsgType(other)),
    }
}
