//! Configuration loading from the environment, the command line and disk.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

use crate::config::schema::{LogFormat, ProxyConfig, RefreshPolicy};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Command line for the proxy. Every flag can also be given through the
/// environment variable named next to it.
#[derive(Debug, Default, Parser)]
#[command(name = "keyvault-header-proxy", version)]
#[command(
    about = "Reverse proxy that injects headers sourced from Key Vault secrets",
    long_about = None
)]
pub struct Cli {
    /// Optional TOML file providing defaults for every setting
    #[arg(long, env = "PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upstream base URL, e.g. https://api.internal
    #[arg(long, env = "TARGET_URL")]
    pub target_url: Option<String>,

    /// Only secrets starting with this prefix become headers
    #[arg(long, env = "SECRET_PREFIX")]
    pub secret_prefix: Option<String>,

    /// Key Vault endpoint
    #[arg(long, env = "KEYVAULT_URL")]
    pub keyvault_url: Option<String>,

    /// "true" enables debug logging; any other value disables it
    #[arg(long, env = "DEBUG_MODE")]
    pub debug_mode: Option<String>,

    /// "true" includes secret values in debug logs
    #[arg(long, env = "DEBUG_REVEAL_SECRETS")]
    pub debug_reveal_secrets: Option<String>,

    #[arg(long, env = "LISTEN_PORT")]
    pub listen_port: Option<u16>,

    #[arg(long, env = "HEADER_REFRESH", value_enum)]
    pub header_refresh: Option<RefreshPolicy>,

    #[arg(long, env = "HEADER_REFRESH_TTL_SECS")]
    pub header_refresh_ttl_secs: Option<u64>,

    /// Upstream request timeout; unbounded when unset
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: Option<u64>,

    /// "true" trusts self-signed upstream certificates
    #[arg(long, env = "UPSTREAM_ACCEPT_INVALID_CERTS")]
    pub upstream_accept_invalid_certs: Option<String>,

    #[arg(long, env = "MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    #[arg(long, env = "MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,

    #[arg(long, env = "KEYVAULT_API_VERSION")]
    pub keyvault_api_version: Option<String>,

    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Load the optional file, layer flags/env on top and validate.
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => read_config_file(path)?,
            None => ProxyConfig::default(),
        };
        let config = self.apply(base);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Overlay the values present on the command line or in the environment.
    pub fn apply(self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(v) = non_empty(self.target_url) {
            config.upstream.target_url = v;
        }
        if let Some(v) = non_empty(self.secret_prefix) {
            config.secrets.prefix = v;
        }
        if let Some(v) = non_empty(self.keyvault_url) {
            config.secrets.keyvault_url = v;
        }
        if let Some(v) = self.debug_mode {
            config.observability.debug = is_true(&v);
        }
        if let Some(v) = self.debug_reveal_secrets {
            config.observability.reveal_secrets = is_true(&v);
        }
        if let Some(v) = self.listen_port {
            config.listener.port = v;
        }
        if let Some(v) = self.header_refresh {
            config.secrets.refresh = v;
        }
        if let Some(v) = self.header_refresh_ttl_secs {
            config.secrets.refresh_ttl_secs = v;
        }
        if let Some(v) = self.upstream_timeout_secs {
            config.upstream.timeout_secs = Some(v);
        }
        if let Some(v) = self.upstream_accept_invalid_certs {
            config.upstream.accept_invalid_certs = is_true(&v);
        }
        if let Some(v) = self.max_in_flight {
            config.listener.max_in_flight = v;
        }
        if let Some(v) = self.max_body_bytes {
            config.security.max_body_size = v;
        }
        if let Some(v) = non_empty(self.keyvault_api_version) {
            config.secrets.api_version = v;
        }
        if let Some(v) = non_empty(self.metrics_address) {
            config.observability.metrics_address = Some(v);
        }
        if let Some(v) = self.log_format {
            config.observability.log_format = v;
        }
        config
    }
}

/// Load and validate configuration from a TOML file alone.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let config = read_config_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

// Flags follow the `=== 'true'` convention: anything else is off.
fn is_true(value: &str) -> bool {
    value == "true"
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
