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

/// The connection status machine.
///
/// ```text
/// Idle ──connect()──▶ Connecting
/// Connecting ──open──▶ Connected ──▶ Syncing ──snapshot loaded──▶ Ready
/// Connecting ──timeout / construction-fail──▶ Error
/// Connected|Syncing|Ready ──close(code)──▶ {auth band: Error; else: Disconnected→Reconnecting}
/// Reconnecting ──delay elapses──▶ Connecting
/// Any ──destroy()──▶ terminal, no further transitions
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ConnectionStatus {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Syncing = 3,
    Ready = 4,
    Disconnected = 5,
    Reconnecting = 6,
    Error = 7,
}

impl ConnectionStatus {
    pub fn is_active_attempt(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::Syncing
                | ConnectionStatus::Ready
        )
    }

    pub fn is_terminal_for_attempt(self) -> bool {
        matches!(self, ConnectionStatus::Error | ConnectionStatus::Disconnected)
    }
}
