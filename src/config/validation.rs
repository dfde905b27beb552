//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and clap handle syntactic)
//! - Presence of the mandatory settings (target, prefix, vault endpoint)
//! - Validate URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before any port is bound

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, RefreshPolicy};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{setting} is required")]
    Missing { setting: &'static str },

    #[error("{setting} is not a valid http(s) URL ({value}): {reason}")]
    InvalidUrl {
        setting: &'static str,
        value: String,
        reason: String,
    },

    #[error("{setting} must be greater than zero")]
    Zero { setting: &'static str },

    #[error("{setting} is not a socket address: {value}")]
    InvalidAddress { setting: &'static str, value: String },
}

/// Validate a merged configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "TARGET_URL", &config.upstream.target_url);
    if config.secrets.prefix.is_empty() {
        errors.push(ValidationError::Missing {
            setting: "SECRET_PREFIX",
        });
    }
    check_url(&mut errors, "KEYVAULT_URL", &config.secrets.keyvault_url);

    if config.listener.max_in_flight == 0 {
        errors.push(ValidationError::Zero {
            setting: "MAX_IN_FLIGHT",
        });
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero {
            setting: "MAX_BODY_BYTES",
        });
    }
    if config.upstream.timeout_secs == Some(0) {
        errors.push(ValidationError::Zero {
            setting: "UPSTREAM_TIMEOUT_SECS",
        });
    }
    if config.secrets.refresh == RefreshPolicy::Ttl && config.secrets.refresh_ttl_secs == 0 {
        errors.push(ValidationError::Zero {
            setting: "HEADER_REFRESH_TTL_SECS",
        });
    }
    if config.secrets.api_version.is_empty() {
        errors.push(ValidationError::Missing {
            setting: "KEYVAULT_API_VERSION",
        });
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                setting: "METRICS_ADDRESS",
                value: addr.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, setting: &'static str, value: &str) {
    if value.is_empty() {
        errors.push(ValidationError::Missing { setting });
        return;
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::InvalidUrl {
            setting,
            value: value.to_string(),
            reason: format!("unsupported scheme or missing host ({})", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidUrl {
            setting,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}
