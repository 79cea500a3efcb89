//! Startup configuration.
//!
//! Everything here is assembled once at process start (CLI flags with env
//! fallbacks) and validated eagerly: an invalid value is a hard startup
//! failure raised before any transport binds.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

/// HTTP request body limit, header names, and well-known paths.
pub mod wire {
    /// Default path for the single-shot JSON-RPC endpoint.
    pub const DEFAULT_RPC_PATH: &str = "/rpc";
    /// Legacy n8n-compatible SSE stream endpoint.
    pub const DEFAULT_SSE_PATH: &str = "/sse";
    /// Legacy n8n-compatible POST endpoint bound to an SSE session.
    pub const DEFAULT_MESSAGES_PATH: &str = "/messages";
    /// WebSocket upgrade endpoint.
    pub const DEFAULT_WS_PATH: &str = "/ws";
    /// Liveness endpoint.
    pub const DEFAULT_HEALTH_PATH: &str = "/health";
    /// Header the SSE session id is echoed on (CORS must expose it).
    pub const SESSION_HEADER: &str = "Mcp-Session-Id";
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address shared by all three transports: one listener, one
    /// `axum::Router` with every route mounted.
    pub bind_addr: SocketAddr,

    pub rpc_path: String,
    pub sse_path: String,
    pub messages_path: String,
    pub ws_path: String,
    pub health_path: String,

    /// Default request deadline, absent any tool-specific or
    /// client-requested override.
    pub request_timeout_default: Duration,
    /// Maximum accepted HTTP/WS body size in bytes. Oversize -> 413 (HTTP)
    /// or close 1009 (WS).
    pub max_request_bytes: usize,
    /// Keepalive interval for WS pings and SSE `event: ping`.
    pub ping_interval: Duration,

    /// `G`: global concurrent tool-call limit.
    pub global_in_flight_limit: usize,
    /// `C` for WS/SSE connections.
    pub connection_in_flight_limit_streaming: usize,
    /// `C` for HTTP connections (1: HTTP is one-shot).
    pub connection_in_flight_limit_http: usize,
    /// `T[name]` default, overridable per tool.
    pub default_tool_in_flight_limit: usize,
    /// `Q`: bounded backpressure queue depth.
    pub queue_depth: usize,
    /// `hard_kill_after = hard_kill_multiplier * deadline`.
    pub hard_kill_multiplier: u32,

    pub cors_allow_origins: Vec<String>,

    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,

    pub auth_enabled: bool,
    /// Shared-secret credential for the bundled `StaticTokenAuthenticator`.
    /// A real deployment plugs in its own `Authenticator`;
    /// credential storage is explicitly out of scope for the core.
    pub auth_token: Option<String>,

    pub log_level: String,
    pub json_logs: bool,

    /// Grace period `Session::drain_all` waits before force-closing.
    pub drain_grace_period: Duration,
}

impl Config {
    #[must_use]
    pub fn defaults_for(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            rpc_path: wire::DEFAULT_RPC_PATH.to_string(),
            sse_path: wire::DEFAULT_SSE_PATH.to_string(),
            messages_path: wire::DEFAULT_MESSAGES_PATH.to_string(),
            ws_path: wire::DEFAULT_WS_PATH.to_string(),
            health_path: wire::DEFAULT_HEALTH_PATH.to_string(),
            request_timeout_default: Duration::from_secs(30),
            max_request_bytes: 2 * 1024 * 1024,
            ping_interval: Duration::from_secs(30),
            global_in_flight_limit: 200,
            connection_in_flight_limit_streaming: 32,
            connection_in_flight_limit_http: 1,
            default_tool_in_flight_limit: 32,
            queue_depth: 256,
            hard_kill_multiplier: 2,
            cors_allow_origins: vec!["*".to_string()],
            rate_limit_per_sec: 20,
            rate_limit_burst: 40,
            auth_enabled: false,
            auth_token: None,
            log_level: "info".to_string(),
            json_logs: false,
            drain_grace_period: Duration::from_secs(10),
        }
    }

    /// Deadline for one request, given an optional tool-specific timeout
    /// and an optional client-requested timeout. The smallest wins:
    /// nothing can make a request run longer than the server's default
    /// ceiling.
    #[must_use]
    pub fn effective_deadline(
        &self,
        tool_timeout: Option<Duration>,
        client_requested: Option<Duration>,
    ) -> Duration {
        [Some(self.request_timeout_default), tool_timeout, client_requested]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.request_timeout_default)
    }

    #[must_use]
    pub fn hard_kill_after(&self, deadline: Duration) -> Duration {
        deadline * self.hard_kill_multiplier
    }

    /// Validate every field; called once at startup. Invalid config must
    /// stop the process before any transport binds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_in_flight_limit == 0 {
            return Err(ConfigError::MustBePositive { field: "global_in_flight_limit" });
        }
        if self.connection_in_flight_limit_streaming == 0 {
            return Err(ConfigError::MustBePositive {
                field: "connection_in_flight_limit_streaming",
            });
        }
        if self.connection_in_flight_limit_http == 0 {
            return Err(ConfigError::MustBePositive { field: "connection_in_flight_limit_http" });
        }
        if self.default_tool_in_flight_limit == 0 {
            return Err(ConfigError::MustBePositive { field: "default_tool_in_flight_limit" });
        }
        if self.max_request_bytes < 1024 {
            return Err(ConfigError::BelowMinimum {
                field: "max_request_bytes",
                min: 1024,
                value: self.max_request_bytes as u64,
            });
        }
        if self.hard_kill_multiplier == 0 {
            return Err(ConfigError::MustBePositive { field: "hard_kill_multiplier" });
        }
        if self.rate_limit_per_sec == 0 {
            return Err(ConfigError::MustBePositive { field: "rate_limit_per_sec" });
        }
        if self.auth_enabled && self.auth_token.is_none() {
            return Err(ConfigError::MustBePositive { field: "auth_token" });
        }
        for (field, path) in [
            ("rpc_path", &self.rpc_path),
            ("sse_path", &self.sse_path),
            ("messages_path", &self.messages_path),
            ("ws_path", &self.ws_path),
            ("health_path", &self.health_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidBindAddress {
                    field,
                    value: path.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults_for(([0, 0, 0, 0], 8000).into())
    }
}
