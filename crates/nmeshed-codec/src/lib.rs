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

//! Wire codec: a self-describing value encoding plus the framed packet
//! envelope, and the single parsing gate ([`MessageRouter`]) that turns raw
//! transport bytes into a typed [`Message`].

mod packet;
mod router;
mod value_codec;

pub use packet::{Packet, PacketError, decode as decode_packet, encode as encode_packet};
pub use router::{Message, MessageRouter};
pub use value_codec::{DecodingError, DecodingErrorKind, EncodingError, decode, encode};
