//! Startup orchestration.
//!
//! # Responsibilities
//! - Acquire the secret store credential and client
//! - Initialize the header refresh policy (resolving secrets when required)
//! - Build the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Nothing here binds a port; the caller binds only after success

use std::sync::Arc;

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::headers::{header_provider, SecretHeaderSource};
use crate::http::{ForwardError, HttpServer};
use crate::observability::DebugObserver;
use crate::secrets::{credential_from_env, keyvault, KeyVaultStore, SecretStore, SecretsError};

/// Anything that prevents the proxy from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to fetch secrets: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Failed to initialize upstream client: {0}")]
    Forwarder(#[from] ForwardError),
}

/// Build the server against the configured Key Vault.
pub async fn prepare(config: &ProxyConfig) -> Result<HttpServer, StartupError> {
    let http = keyvault::http_client()?;
    let credential = credential_from_env(http.clone())?;
    let store = KeyVaultStore::new(
        http,
        &config.secrets.keyvault_url,
        config.secrets.api_version.clone(),
        credential,
    )?;
    prepare_with_store(config, Arc::new(store)).await
}

/// Build the server against any secret store.
pub async fn prepare_with_store(
    config: &ProxyConfig,
    store: Arc<dyn SecretStore>,
) -> Result<HttpServer, StartupError> {
    let observer = DebugObserver::new(
        config.observability.debug,
        config.observability.reveal_secrets,
    );
    let source = SecretHeaderSource::new(store, config.secrets.prefix.clone(), observer);
    let headers = header_provider(
        config.secrets.refresh,
        config.secrets.refresh_ttl(),
        source,
    )
    .await?;

    Ok(HttpServer::new(config.clone(), headers)?)
}
