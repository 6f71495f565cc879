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

//! Self-describing little-endian binary encoding for [`Value`].
//!
//! | Tag | Semantics | Body |
//! |---|---|---|
//! | 0 | null | (none) |
//! | 1 | false | (none) |
//! | 2 | true | (none) |
//! | 3 | number | 8-byte IEEE-754 float |
//! | 4 | string | u32 length, UTF-8 bytes |
//! | 5 | list | u32 count, then recursively encoded values |
//! | 6 | mapping | u32 count, then (u16 key-length, UTF-8 key, value) |
//! | 7 | bytes | u32 length, raw bytes |

use std::collections::BTreeMap;

use nmeshed_common::{MAX_VALUE_DEPTH, Value};

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_MAP: u8 = 6;
const TAG_BYTES: u8 = 7;

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("value nesting exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },
    #[error("value cannot be encoded: {reason}")]
    Unsupported { reason: String },
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum DecodingErrorKind {
    #[error("unrecognized tag byte")]
    UnknownTag,
    #[error("input ended before the value was fully read")]
    UnexpectedEof,
    #[error("value nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),
}

#[derive(Debug, thiserror::Error)]
#[error("decode failed at offset {offset}: {kind}")]
pub struct DecodingError {
    pub kind: DecodingErrorKind,
    pub offset: usize,
}

/// Encode `value` to its wire representation. Fails if nesting exceeds
/// [`MAX_VALUE_DEPTH`] (which also bounds cyclic structures, since a cycle
/// would otherwise recurse forever).
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(64);
    encode_into(value, &mut out, 0)?;
    Ok(out)
}

fn grow_for(out: &mut Vec<u8>, additional: usize) {
    if out.capacity() < out.len() + additional {
        let doubled = out.capacity().max(64) * 2;
        out.reserve(doubled.max(additional).saturating_sub(out.len()));
    }
}

fn encode_into(value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<(), EncodingError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(EncodingError::DepthExceeded {
            max: MAX_VALUE_DEPTH,
        });
    }
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Number(n) => {
            grow_for(out, 9);
            out.push(TAG_NUMBER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::String(s) => {
            let bytes = s.as_bytes();
            grow_for(out, 5 + bytes.len());
            out.push(TAG_STRING);
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        Value::Bytes(b) => {
            grow_for(out, 5 + b.len());
            out.push(TAG_BYTES);
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            grow_for(out, 5);
            out.push(TAG_LIST);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_into(item, out, depth + 1)?;
            }
        }
        Value::Map(entries) => {
            grow_for(out, 5);
            out.push(TAG_MAP);
            out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (key, val) in entries {
                let key_bytes = key.as_bytes();
                if key_bytes.len() > u16::MAX as usize {
                    return Err(EncodingError::Unsupported {
                        reason: format!("map key {key:?} exceeds 65535 bytes"),
                    });
                }
                out.extend_from_slice(&(key_bytes.len() as u16).to_le_bytes());
                out.extend_from_slice(key_bytes);
                encode_into(val, out, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Decode a single value from `bytes`. Empty input decodes to `Value::Null`.
pub fn decode(bytes: &[u8]) -> Result<Value, DecodingError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    let mut cursor = Cursor { bytes, pos: 0 };
    let value = decode_value(&mut cursor, 0)?;
    Ok(value)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodingError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodingError {
                kind: DecodingErrorKind::UnexpectedEof,
                offset: self.pos,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, DecodingError> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16, DecodingError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn take_u32(&mut self) -> Result<u32, DecodingError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn take_f64(&mut self) -> Result<f64, DecodingError> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

fn decode_value(cursor: &mut Cursor, depth: usize) -> Result<Value, DecodingError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(DecodingError {
            kind: DecodingErrorKind::DepthExceeded(MAX_VALUE_DEPTH),
            offset: cursor.pos,
        });
    }
    let tag_offset = cursor.pos;
    let tag = cursor.take_u8()?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_NUMBER => Ok(Value::Number(cursor.take_f64()?)),
        TAG_STRING => {
            let len = cursor.take_u32()? as usize;
            let bytes = cursor.take(len)?;
            let s = String::from_utf8(bytes.to_vec()).map_err(|_| DecodingError {
                kind: DecodingErrorKind::UnexpectedEof,
                offset: tag_offset,
            })?;
            Ok(Value::String(s))
        }
        TAG_BYTES => {
            let len = cursor.take_u32()? as usize;
            Ok(Value::Bytes(cursor.take(len)?.to_vec()))
        }
        TAG_LIST => {
            let count = cursor.take_u32()?;
            let mut items = Vec::with_capacity(count.min(4096) as usize);
            for _ in 0..count {
                items.push(decode_value(cursor, depth + 1)?);
            }
            Ok(Value::List(items))
        }
        TAG_MAP => {
            let count = cursor.take_u32()?;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let key_len = cursor.take_u16()? as usize;
                let key_bytes = cursor.take(key_len)?;
                let key = String::from_utf8(key_bytes.to_vec()).map_err(|_| DecodingError {
                    kind: DecodingErrorKind::UnexpectedEof,
                    offset: tag_offset,
                })?;
                let val = decode_value(cursor, depth + 1)?;
                entries.insert(key, val);
            }
            Ok(Value::Map(entries))
        }
        _ => Err(DecodingError {
            kind: DecodingErrorKind::UnknownTag,
            offset: tag_offset,
        }),
    }
}
