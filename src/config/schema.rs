//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::AgentTag;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host, port).
    pub listener: ListenerConfig,

    /// The single upstream chat-completion endpoint.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Inbound request limits.
    pub limits: LimitsConfig,

    /// Telemetry persistence.
    pub telemetry: TelemetryConfig,

    /// Per-agent soft warning thresholds. Reloadable at runtime.
    pub token_warnings: TokenWarningConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Administrative endpoints.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Listening port.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` form suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Upstream endpoint configuration.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Full URL requests are POSTed to.
    pub url: String,

    /// Credential injected as `Authorization: Bearer ...`. Required.
    pub api_key: String,

    /// Default `X-Title` header when the caller sends none.
    pub title: String,

    /// Default `HTTP-Referer` header when the caller sends none.
    pub referer: String,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key: String::new(),
            title: "llm-relay".to_string(),
            referer: "http://localhost".to_string(),
            use_system_proxy: true,
        }
    }
}

// Keeps the credential out of debug logs.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("title", &self.title)
            .field("referer", &self.referer)
            .field("use_system_proxy", &self.use_system_proxy)
            .finish()
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound from upstream dispatch to end of the response stream.
    pub upstream_ms: u64,

    /// Maximum inactivity on the inbound connection.
    pub client_idle_ms: u64,

    /// Request timeout for the health/stats/admin routes in seconds.
    pub admin_request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_ms: 120_000,
            client_idle_ms: 120_000,
            admin_request_secs: 30,
        }
    }
}

/// Inbound request limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Telemetry persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Record telemetry at all.
    pub enabled: bool,

    /// SQLite database path. `:memory:` keeps records for the process lifetime only.
    pub db_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "telemetry.db".to_string(),
        }
    }
}

/// Estimated-token thresholds above which a warning is logged.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenWarningConfig {
    pub manager: u64,
    pub coder: u64,
    pub tester: u64,
}

impl TokenWarningConfig {
    pub fn threshold(&self, agent: AgentTag) -> u64 {
        match agent {
            AgentTag::Manager => self.manager,
            AgentTag::Coder => self.coder,
            AgentTag::Tester => self.tester,
        }
    }
}

impl Default for TokenWarningConfig {
    fn default() -> Self {
        Self {
            manager: 8_000,
            coder: 32_000,
            tester: 16_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error or a full EnvFilter string).
    pub log_level: String,

    /// `pretty` for development, `json` for production.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Administrative endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by `POST /admin/reload`. Unset leaves it open.
    pub reload_token: Option<String>,
}
