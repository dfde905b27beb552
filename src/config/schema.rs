//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits so an optional TOML file can supply them;
//! environment variables and CLI flags are layered on top by the loader.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// The single upstream every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Secret store and custom header settings.
    pub secrets: SecretsConfig,

    /// Inbound listener settings.
    pub listener: ListenerConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Logging, debug tracing and metrics.
    pub observability: ObservabilityConfig,
}

/// Upstream target configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL the inbound path and query are appended to, verbatim.
    /// Empty means "not configured".
    pub target_url: String,

    /// Total request timeout in seconds. `None` leaves requests unbounded.
    pub timeout_secs: Option<u64>,

    /// Accept self-signed or otherwise unverifiable certificates from the
    /// target. Scoped to the upstream client only.
    pub accept_invalid_certs: bool,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// How often the custom header set is rebuilt from the secret store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Resolve once before serving; failure is fatal.
    #[default]
    OnStart,
    /// Resolve on every inbound request; failure fails that request only.
    PerRequest,
    /// Resolve at startup, then again once the cached set is older than the TTL.
    Ttl,
}

impl RefreshPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnStart => "on-start",
            Self::PerRequest => "per-request",
            Self::Ttl => "ttl",
        }
    }
}

impl std::fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecretsConfig {
    /// Only secrets whose name starts with this prefix become headers.
    pub prefix: String,

    /// Key Vault endpoint, e.g. `https://my-vault.vault.azure.net`.
    pub keyvault_url: String,

    /// Key Vault REST `api-version` query parameter.
    pub api_version: String,

    /// Header refresh policy.
    pub refresh: RefreshPolicy,

    /// Max age of the cached header set under [`RefreshPolicy::Ttl`].
    pub refresh_ttl_secs: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            keyvault_url: String::new(),
            api_version: "7.4".to_string(),
            refresh: RefreshPolicy::default(),
            refresh_ttl_secs: 300,
        }
    }
}

impl SecretsConfig {
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// TCP port, bound on all interfaces.
    pub port: u16,

    /// Maximum requests proxied concurrently. Excess requests get a 503.
    pub max_in_flight: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            max_in_flight: 1024,
        }
    }
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Log output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log inbound requests, upstream responses and resolved headers.
    pub debug: bool,

    /// Include secret values in the resolved-header debug lines.
    pub reveal_secrets: bool,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus exporter bind address; metrics are off when unset.
    pub metrics_address: Option<String>,
}
