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

//! The two conflict resolution policies the engine can be built with, chosen
//! once at construction and never switched at runtime.

use std::sync::Arc;

use nmeshed_codec::{Packet, decode_packet};

/// A handle to an opaque collaborative merge implementation -- a native
/// library or a WebAssembly-hosted one. The engine's only contract is to
/// hand it every local op and every remote delta, and to accept whatever
/// `(key, resolved_value)` pairs it reports back as authoritative; the
/// engine adds no ordering or arbitration of its own on top.
#[async_trait::async_trait]
pub trait CollaborativeMergeCore: Send + Sync {
    /// Fold a local write into the core's state, returning the resolved
    /// `(key, value)` pairs that changed.
    async fn apply_local(&self, key: &str, value: &[u8], timestamp: u64) -> Vec<(String, Vec<u8>)>;

    /// Fold a remote delta into the core's state, returning the resolved
    /// `(key, value)` pairs that changed.
    async fn merge_remote(&self, delta: &[u8]) -> Vec<(String, Vec<u8>)>;

    /// Serialize the core's full state for cold-start snapshotting.
    async fn snapshot(&self) -> Vec<u8>;
}

/// A [`CollaborativeMergeCore`] that performs no arbitration of its own: it
/// reflects whatever it is handed back verbatim. Useful for unit tests and
/// for embedding applications that do not yet have a real CRDT core wired
/// in.
pub struct PassthroughMergeCore;

#[async_trait::async_trait]
impl CollaborativeMergeCore for PassthroughMergeCore {
    async fn apply_local(
        &self,
        key: &str,
        value: &[u8],
        _timestamp: u64,
    ) -> Vec<(String, Vec<u8>)> {
        vec![(key.to_string(), value.to_vec())]
    }

    async fn merge_remote(&self, delta: &[u8]) -> Vec<(String, Vec<u8>)> {
        match decode_packet(delta) {
            Ok(Packet::Op { key, value, .. }) => vec![(key, value)],
            _ => Vec::new(),
        }
    }

    async fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// The engine's chosen conflict resolution policy.
pub enum MergePolicy {
    /// Last-writer-wins by op timestamp; ties prefer the incoming op.
    Lww,
    Collaborative(Arc<dyn CollaborativeMergeCore>),
}

impl MergePolicy {
    pub fn is_lww(&self) -> bool {
        matches!(self, MergePolicy::Lww)
    }
}

/// `true` if an incoming remote op with `incoming_ts` should overwrite a
/// stored value last written at `stored_ts` (or there was no stored value).
/// Ties prefer the incoming op so that idempotent replay is stable.
pub fn lww_accepts(stored_ts: Option<u64>, incoming_ts: u64) -> bool {
    match stored_ts {
        None => true,
        Some(stored) => incoming_ts >= stored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, 5, true; "no prior value always accepts")]
    #[test_case(Some(10), 10, true; "tie prefers incoming")]
    #[test_case(Some(10), 11, true; "strictly newer accepts")]
    #[test_case(Some(10), 9, false; "stale op is dropped")]
    fn lww_decision(stored: Option<u64>, incoming: u64, expected: bool) {
        assert_eq!(lww_accepts(stored, incoming), expected);
    }

    #[tokio::test]
    async fn passthrough_core_reflects_local_and_remote_ops_verbatim() {
        let core = PassthroughMergeCore;
        assert_eq!(
            core.apply_local("k", &[1, 2], 1).await,
            vec![("k".to_string(), vec![1, 2])]
        );

        let delta = nmeshed_codec::encode_packet(&Packet::Op {
            key: "k".into(),
            value: vec![9],
            timestamp: 2,
            workspace_id: None,
        });
        assert_eq!(
            core.merge_remote(&delta).await,
            vec![("k".to_string(), vec![9])]
        );

        assert_eq!(core.merge_remote(&[0xff]).await, Vec::new());
    }
}
