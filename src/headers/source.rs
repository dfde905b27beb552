//! Secret → header resolution.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};

use crate::headers::HeaderSet;
use crate::observability::debug::DebugObserver;
use crate::observability::metrics;
use crate::secrets::{Result, SecretStore};

/// Builds a [`HeaderSet`] from every secret whose name carries the prefix.
#[derive(Debug, Clone)]
pub struct SecretHeaderSource {
    store: Arc<dyn SecretStore>,
    prefix: String,
    observer: DebugObserver,
}

impl SecretHeaderSource {
    pub fn new(
        store: Arc<dyn SecretStore>,
        prefix: impl Into<String>,
        observer: DebugObserver,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            observer,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// List, filter, fetch and derive.
    ///
    /// Matching names are visited in lexicographic order and later entries
    /// replace earlier ones, so when two secrets strip to the same header
    /// name (compared case-insensitively) the lexicographically last secret
    /// name wins.
    pub async fn resolve_headers(&self) -> Result<HeaderSet> {
        match self.resolve_inner().await {
            Ok(headers) => {
                metrics::record_secret_refresh("success");
                metrics::record_custom_headers(headers.len());
                Ok(headers)
            }
            Err(e) => {
                metrics::record_secret_refresh(e.kind());
                Err(e)
            }
        }
    }

    async fn resolve_inner(&self) -> Result<HeaderSet> {
        let mut names: Vec<String> = self
            .store
            .list_names()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(&self.prefix))
            .collect();
        names.sort();
        names.dedup();

        let mut headers = HeaderSet::new();
        for name in names {
            let Some(header_name) = derive_header_name(&self.prefix, &name) else {
                tracing::warn!(
                    secret = %name,
                    "Secret name does not yield a valid header name, skipping"
                );
                continue;
            };

            let secret = self.store.get(&name).await?;
            let Ok(value) = HeaderValue::from_str(secret.value.expose_secret()) else {
                tracing::warn!(
                    secret = %name,
                    "Secret value is not a valid header value, skipping"
                );
                continue;
            };

            if headers.insert(header_name.clone(), value).is_some() {
                tracing::warn!(
                    header = %header_name,
                    secret = %name,
                    "Header name collision, later secret name wins"
                );
            }
            self.observer.resolved_header(&header_name, &name, secret.value.expose_secret());
        }

        tracing::debug!(count = headers.len(), prefix = %self.prefix, "Resolved custom headers");
        Ok(headers)
    }
}

/// Header name for a secret: the name with the prefix stripped, nothing else.
pub fn derive_header_name(prefix: &str, secret_name: &str) -> Option<HeaderName> {
    let stripped = secret_name.strip_prefix(prefix)?;
    if stripped.is_empty() {
        return None;
    }
    HeaderName::from_bytes(stripped.as_bytes()).ok()
}
