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

//! Connect URL assembly: `{serverUrl}/v1/sync/{workspaceId}?token={t}&userId={u}&sync_mode={m}`.
//! The workspace id is path-segment percent-encoded; query parameters are
//! percent-encoded individually. The token must never reach a log line --
//! [`redact_token`] exists for call sites that want to print the URL.

use urlencoding::encode;

/// The sentinel substituted for the auth token in any logged or displayed
/// form of a connect URL.
pub const TOKEN_REDACTED: &str = "***";

pub fn build_connect_url(
    server_url: &str,
    workspace_id: &str,
    token: &str,
    user_id: &str,
    sync_mode: &str,
) -> String {
    format!(
        "{}/v1/sync/{}?token={}&userId={}&sync_mode={}",
        server_url.trim_end_matches('/'),
        encode(workspace_id),
        encode(token),
        encode(user_id),
        encode(sync_mode),
    )
}

/// The same URL, but with the token query parameter value replaced by
/// [`TOKEN_REDACTED`]. Intended for `debug!`/`trace!` log lines -- the live
/// URL returned by [`build_connect_url`] must never be logged verbatim.
pub fn redact_for_log(
    server_url: &str,
    workspace_id: &str,
    user_id: &str,
    sync_mode: &str,
) -> String {
    build_connect_url(server_url, workspace_id, TOKEN_REDACTED, user_id, sync_mode)
}
