//! Header-injecting reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ admission ─▶ request id ─▶ proxy handler
//!                                                   │
//!                          ┌────────────────────────┤
//!                          ▼                        ▼
//!                   HeaderProvider           ProxyForwarder ──────▶ Target
//!               (on-start/per-request/ttl)          │
//!                          │                        ▼
//!                          ▼                  response relay
//!                  SecretHeaderSource               │
//!                          │                        ▼
//!                          ▼                 Client Response
//!                      Key Vault
//! ```

use clap::Parser;
use tokio::net::TcpListener;

use keyvault_header_proxy::config::{Cli, ObservabilityConfig};
use keyvault_header_proxy::lifecycle::startup;
use keyvault_header_proxy::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Please set all required environment variables");
            return Err(e.into());
        }
    };

    logging::init(&config.observability);
    tracing::info!("keyvault-header-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        target_url = %config.upstream.target_url,
        secret_prefix = %config.secrets.prefix,
        keyvault_url = %config.secrets.keyvault_url,
        refresh = %config.secrets.refresh,
        port = config.listener.port,
        max_in_flight = config.listener.max_in_flight,
        debug = config.observability.debug,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        // Validated as a socket address already.
        if let Ok(addr) = addr.parse() {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to start metrics exporter");
            }
        }
    }

    let server = match startup::prepare(&config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let listener = TcpListener::bind(config.listener.socket_addr()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Proxy server started on port {}",
        config.listener.port
    );

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
