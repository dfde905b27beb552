//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the default filter from the debug flag
//! - Pretty output for terminals, JSON for log pipelines
//!
//! `RUST_LOG` always overrides the computed default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Default filter directives for the given config.
pub fn default_filter(config: &ObservabilityConfig) -> &'static str {
    if config.debug {
        "keyvault_header_proxy=debug,tower_http=debug"
    } else {
        "keyvault_header_proxy=info,tower_http=info"
    }
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(config).into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
