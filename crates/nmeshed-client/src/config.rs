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

//! Client configuration: recognized options, defaults, and the
//! synchronous-at-construction validation the facade performs before
//! building any subcomponent.

use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;

use nmeshed_engine::CollaborativeMergeCore;

const DEFAULT_SERVER_URL: &str = "wss://api.nmeshed.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Crdt,
    Lww,
}

impl SyncMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "crdt" => Some(Self::Crdt),
            "lww" => Some(Self::Lww),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Crdt => "crdt",
            SyncMode::Lww => "lww",
        }
    }
}

/// Exactly one of these must be supplied: a static bearer token, or a
/// provider that is asked for a fresh one at connect time.
pub enum Auth {
    Token(String),
    Provider(Arc<dyn AuthTokenProvider>),
}

#[async_trait::async_trait]
pub trait AuthTokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, String>;
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration for `{field}`: {reason}")]
pub struct ConfigurationError {
    pub field: &'static str,
    pub reason: String,
}

pub struct ClientConfig {
    pub workspace_id: String,
    pub auth: Auth,
    pub user_id: String,
    pub server_url: String,
    pub sync_mode: SyncMode,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub connection_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_queue_size: usize,
    pub debug: bool,
    pub merge_core: Option<Arc<dyn CollaborativeMergeCore>>,
}

pub struct ClientConfigBuilder {
    workspace_id: Option<String>,
    auth: Option<Auth>,
    user_id: Option<String>,
    server_url: String,
    sync_mode_raw: String,
    auto_reconnect: bool,
    max_reconnect_attempts: u32,
    reconnect_base_delay_ms: u64,
    max_reconnect_delay_ms: u64,
    connection_timeout_ms: u64,
    heartbeat_interval_ms: u64,
    max_queue_size: usize,
    debug: bool,
    merge_core: Option<Arc<dyn CollaborativeMergeCore>>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            workspace_id: None,
            auth: None,
            user_id: None,
            server_url: DEFAULT_SERVER_URL.to_string(),
            sync_mode_raw: "crdt".to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            connection_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            max_queue_size: 1000,
            debug: false,
            merge_core: None,
        }
    }
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspace_id(mut self, id: impl Into<String>) -> Self {
        self.workspace_id = Some(id.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Auth::Token(token.into()));
        self
    }

    pub fn auth_provider(mut self, provider: Arc<dyn AuthTokenProvider>) -> Self {
        self.auth = Some(Auth::Provider(provider));
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn sync_mode(mut self, mode: impl Into<String>) -> Self {
        self.sync_mode_raw = mode.into();
        self
    }

    pub fn auto_reconnect(mut self, v: bool) -> Self {
        self.auto_reconnect = v;
        self
    }

    pub fn max_reconnect_attempts(mut self, v: u32) -> Self {
        self.max_reconnect_attempts = v;
        self
    }

    pub fn reconnect_base_delay_ms(mut self, v: u64) -> Self {
        self.reconnect_base_delay_ms = v;
        self
    }

    pub fn max_reconnect_delay_ms(mut self, v: u64) -> Self {
        self.max_reconnect_delay_ms = v;
        self
    }

    pub fn connection_timeout_ms(mut self, v: u64) -> Self {
        self.connection_timeout_ms = v;
        self
    }

    pub fn heartbeat_interval_ms(mut self, v: u64) -> Self {
        self.heartbeat_interval_ms = v;
        self
    }

    pub fn max_queue_size(mut self, v: usize) -> Self {
        self.max_queue_size = v;
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.debug = v;
        self
    }

    pub fn merge_core(mut self, core: Arc<dyn CollaborativeMergeCore>) -> Self {
        self.merge_core = Some(core);
        self
    }

    /// Validate and finalize. Mirrors the facade's synchronous
    /// construction-time validation: workspace id and auth non-empty,
    /// `syncMode` one of `crdt`/`lww`.
    pub fn build(self) -> Result<ClientConfig, ConfigurationError> {
        let workspace_id = self.workspace_id.ok_or(ConfigurationError {
            field: "workspaceId",
            reason: "is required".to_string(),
        })?;
        if workspace_id.is_empty() {
            return Err(ConfigurationError {
                field: "workspaceId",
                reason: "must not be empty".to_string(),
            });
        }

        let auth = self.auth.ok_or(ConfigurationError {
            field: "token",
            reason: "exactly one of token or an auth provider is required".to_string(),
        })?;
        if let Auth::Token(ref t) = auth {
            if t.is_empty() {
                return Err(ConfigurationError {
                    field: "token",
                    reason: "must not be empty".to_string(),
                });
            }
        }

        let sync_mode = SyncMode::parse(&self.sync_mode_raw).ok_or(ConfigurationError {
            field: "syncMode",
            reason: format!(
                "must be `crdt` or `lww`, got `{}`",
                self.sync_mode_raw
            ),
        })?;

        let user_id = self.user_id.unwrap_or_else(generate_user_id);

        Ok(ClientConfig {
            workspace_id,
            auth,
            user_id,
            server_url: self.server_url,
            sync_mode,
            auto_reconnect: self.auto_reconnect,
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            max_reconnect_delay_ms: self.max_reconnect_delay_ms,
            connection_timeout_ms: self.connection_timeout_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            max_queue_size: self.max_queue_size,
            debug: self.debug,
            merge_core: self.merge_core,
        })
    }
}

fn generate_user_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("user-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_workspace_id_fails_validation() {
        let err = ClientConfigBuilder::new().token("t").build().unwrap_err();
        assert_eq!(err.field, "workspaceId");
    }

    #[test]
    fn missing_auth_fails_validation() {
        let err = ClientConfigBuilder::new()
            .workspace_id("ws-1")
            .build()
            .unwrap_err();
        assert_eq!(err.field, "token");
    }

    #[test]
    fn empty_token_fails_validation() {
        let err = ClientConfigBuilder::new()
            .workspace_id("ws-1")
            .token("")
            .build()
            .unwrap_err();
        assert_eq!(err.field, "token");
    }

    #[test]
    fn unrecognized_sync_mode_fails_validation() {
        let err = ClientConfigBuilder::new()
            .workspace_id("ws-1")
            .token("t")
            .sync_mode("crdt_performance")
            .build()
            .unwrap_err();
        assert_eq!(err.field, "syncMode");
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = ClientConfigBuilder::new()
            .workspace_id("ws-1")
            .token("t")
            .build()
            .unwrap();
        assert_eq!(cfg.server_url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.sync_mode, SyncMode::Crdt);
        assert!(cfg.user_id.starts_with("user-"));
        assert_eq!(cfg.user_id.len(), "user-".len() + 8);
        assert_eq!(cfg.max_queue_size, 1000);
    }

    #[test]
    fn explicit_user_id_is_kept() {
        let cfg = ClientConfigBuilder::new()
            .workspace_id("ws-1")
            .token("t")
            .user_id("fixed-id")
            .build()
            .unwrap();
        assert_eq!(cfg.user_id, "fixed-id");
    }
}
