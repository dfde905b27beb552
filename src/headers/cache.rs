//! Header refresh policies.
//!
//! Each policy is a [`HeaderProvider`]; the server only sees the trait, so
//! the policy is chosen once at startup from configuration.
//!
//! | Policy        | Startup failure | Request-time failure        | Staleness |
//! |---------------|-----------------|-----------------------------|-----------|
//! | `on-start`    | fatal           | n/a                         | unbounded |
//! | `per-request` | n/a             | that request gets a 500     | none      |
//! | `ttl`         | fatal           | last good set is kept       | ≤ TTL     |

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RefreshPolicy;
use crate::headers::source::SecretHeaderSource;
use crate::headers::HeaderSet;
use crate::secrets::Result;

/// Supplies the custom headers for one inbound request.
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    async fn current_headers(&self) -> Result<Arc<HeaderSet>>;

    fn policy(&self) -> RefreshPolicy;
}

/// Build the provider for `policy`. Policies that resolve at startup do so
/// here, so an error from this function means the proxy must not start.
pub async fn header_provider(
    policy: RefreshPolicy,
    ttl: Duration,
    source: SecretHeaderSource,
) -> Result<Arc<dyn HeaderProvider>> {
    let provider: Arc<dyn HeaderProvider> = match policy {
        RefreshPolicy::OnStart => Arc::new(StartupHeaders::resolve(&source).await?),
        RefreshPolicy::PerRequest => Arc::new(PerRequestHeaders::new(source)),
        RefreshPolicy::Ttl => Arc::new(TtlHeaders::resolve(source, ttl).await?),
    };
    tracing::info!(policy = %policy, "Header refresh policy initialized");
    Ok(provider)
}

/// Resolved once, read forever.
#[derive(Debug, Clone)]
pub struct StartupHeaders {
    headers: Arc<HeaderSet>,
}

impl StartupHeaders {
    pub async fn resolve(source: &SecretHeaderSource) -> Result<Self> {
        let headers = source.resolve_headers().await?;
        tracing::info!(count = headers.len(), "Custom headers loaded");
        Ok(Self::from_headers(headers))
    }

    pub fn from_headers(headers: HeaderSet) -> Self {
        Self {
            headers: Arc::new(headers),
        }
    }
}

#[async_trait]
impl HeaderProvider for StartupHeaders {
    async fn current_headers(&self) -> Result<Arc<HeaderSet>> {
        Ok(Arc::clone(&self.headers))
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::OnStart
    }
}

/// Resolved for every request; each request owns its own set.
#[derive(Debug, Clone)]
pub struct PerRequestHeaders {
    source: SecretHeaderSource,
}

impl PerRequestHeaders {
    pub fn new(source: SecretHeaderSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl HeaderProvider for PerRequestHeaders {
    async fn current_headers(&self) -> Result<Arc<HeaderSet>> {
        Ok(Arc::new(self.source.resolve_headers().await?))
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::PerRequest
    }
}

#[derive(Debug)]
struct Snapshot {
    headers: Arc<HeaderSet>,
    refreshed_at: Instant,
}

/// Cached set, re-resolved by the first request that finds it older than
/// the TTL. Readers never block on a fresh snapshot.
#[derive(Debug)]
pub struct TtlHeaders {
    source: SecretHeaderSource,
    ttl: Duration,
    current: ArcSwap<Snapshot>,
    refresh: Mutex<()>,
}

impl TtlHeaders {
    pub async fn resolve(source: SecretHeaderSource, ttl: Duration) -> Result<Self> {
        let headers = source.resolve_headers().await?;
        tracing::info!(count = headers.len(), ttl_secs = ttl.as_secs(), "Custom headers loaded");
        Ok(Self {
            source,
            ttl,
            current: ArcSwap::from_pointee(Snapshot {
                headers: Arc::new(headers),
                refreshed_at: Instant::now(),
            }),
            refresh: Mutex::new(()),
        })
    }

    fn fresh(&self) -> Option<Arc<HeaderSet>> {
        let snapshot = self.current.load();
        (snapshot.refreshed_at.elapsed() < self.ttl).then(|| Arc::clone(&snapshot.headers))
    }
}

#[async_trait]
impl HeaderProvider for TtlHeaders {
    async fn current_headers(&self) -> Result<Arc<HeaderSet>> {
        if let Some(headers) = self.fresh() {
            return Ok(headers);
        }

        // One refresher at a time; the others re-check once it is done.
        let _guard = self.refresh.lock().await;
        if let Some(headers) = self.fresh() {
            return Ok(headers);
        }

        let headers = match self.source.resolve_headers().await {
            Ok(headers) => {
                tracing::debug!(count = headers.len(), "Custom headers refreshed");
                Arc::new(headers)
            }
            Err(e) => {
                // Keep serving the last good set; retry after another TTL.
                tracing::warn!(error = %e, "Header refresh failed, serving previous headers");
                Arc::clone(&self.current.load().headers)
            }
        };
        self.current.store(Arc::new(Snapshot {
            headers: Arc::clone(&headers),
            refreshed_at: Instant::now(),
        }));
        Ok(headers)
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::Ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::headers::source::tests::MemoryStore;
    use crate::observability::debug::DebugObserver;

    fn source(store: &Arc<MemoryStore>) -> SecretHeaderSource {
        SecretHeaderSource::new(store.clone(), "X-Hdr-", DebugObserver::default())
    }

    #[tokio::test]
    async fn on_start_never_changes() {
        let store = MemoryStore::with(&[("X-Hdr-Key", "v1")]);
        let provider = header_provider(RefreshPolicy::OnStart, Duration::ZERO, source(&store))
            .await
            .unwrap();

        store.set("X-Hdr-Key", "v2");
        store.failing.store(true, Ordering::SeqCst);

        let headers = provider.current_headers().await.unwrap();
        assert_eq!(headers.get("Key").unwrap(), "v1");
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);
        assert_eq!(provider.policy(), RefreshPolicy::OnStart);
    }

    #[tokio::test]
    async fn on_start_failure_is_reported() {
        let store = MemoryStore::with(&[("X-Hdr-Key", "v1")]);
        store.failing.store(true, Ordering::SeqCst);
        let result = header_provider(RefreshPolicy::OnStart, Duration::ZERO, source(&store)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn per_request_sees_rotation_and_scoped_failures() {
        let store = MemoryStore::with(&[("X-Hdr-Key", "v1")]);
        let provider = header_provider(RefreshPolicy::PerRequest, Duration::ZERO, source(&store))
            .await
            .unwrap();
        // Nothing resolved until the first request.
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);

        assert_eq!(provider.current_headers().await.unwrap().get("Key").unwrap(), "v1");
        store.set("X-Hdr-Key", "v2");
        assert_eq!(provider.current_headers().await.unwrap().get("Key").unwrap(), "v2");

        store.failing.store(true, Ordering::SeqCst);
        assert!(provider.current_headers().await.is_err());

        store.failing.store(false, Ordering::SeqCst);
        assert!(provider.current_headers().await.is_ok());
    }

    #[tokio::test]
    async fn ttl_refreshes_after_expiry_and_keeps_last_good_set() {
        let store = MemoryStore::with(&[("X-Hdr-Key", "v1")]);
        let ttl = Duration::from_millis(50);
        let provider = header_provider(RefreshPolicy::Ttl, ttl, source(&store)).await.unwrap();

        store.set("X-Hdr-Key", "v2");
        assert_eq!(provider.current_headers().await.unwrap().get("Key").unwrap(), "v1");

        tokio::time::sleep(ttl * 2).await;
        assert_eq!(provider.current_headers().await.unwrap().get("Key").unwrap(), "v2");

        store.failing.store(true, Ordering::SeqCst);
        tokio::time::sleep(ttl * 2).await;
        assert_eq!(provider.current_headers().await.unwrap().get("Key").unwrap(), "v2");
    }

    #[tokio::test]
    async fn ttl_collapses_concurrent_refreshes() {
        let store = MemoryStore::with(&[("X-Hdr-Key", "v1")]);
        let ttl = Duration::from_millis(50);
        let provider = header_provider(RefreshPolicy::Ttl, ttl, source(&store)).await.unwrap();
        tokio::time::sleep(ttl * 2).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.current_headers().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        // One at startup, one refresh.
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    }
}
