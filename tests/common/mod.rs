//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use keyvault_header_proxy::config::{ProxyConfig, RefreshPolicy};
use keyvault_header_proxy::lifecycle::{prepare_with_store, Shutdown};
use keyvault_header_proxy::secrets::{self, SecretDescriptor, SecretStore, SecretsError};

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<Vec<(String, String)>>,
    pub failing: AtomicBool,
    pub lists: AtomicU32,
}

impl MemoryStore {
    pub fn with(entries: &[(&str, &str)]) -> Arc<Self> {
        let store = Self::default();
        for (name, value) in entries {
            store.set(name, value);
        }
        Arc::new(store)
    }

    pub fn set(&self, name: &str, value: &str) {
        let mut secrets = self.secrets.lock().unwrap();
        secrets.retain(|(n, _)| n != name);
        secrets.push((name.to_string(), value.to_string()));
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn list_names(&self) -> secrets::Result<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SecretsError::authentication("store unavailable"));
        }
        Ok(self.secrets.lock().unwrap().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn get(&self, name: &str) -> secrets::Result<SecretDescriptor> {
        let secrets = self.secrets.lock().unwrap();
        let (name, value) = secrets
            .iter()
            .find(|(n, _)| n == name)
            .cloned()
            .ok_or_else(|| SecretsError::malformed("get secret", "missing"))?;
        Ok(SecretDescriptor {
            name,
            value: value.into(),
        })
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Upstream that echoes what it received as JSON, plus a few canned routes:
/// `/busy` answers 503, `/slow` waits before echoing.
pub async fn start_echo_upstream() -> SocketAddr {
    async fn echo(request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        if parts.uri.path() == "/busy" {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "application/json")],
                r#"{"error":"busy"}"#,
            )
                .into_response();
        }
        if parts.uri.path() == "/slow" {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        let body = to_bytes(body, usize::MAX).await.unwrap();
        let headers: HashMap<String, String> = parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        Json(json!({
            "method": parts.method.as_str(),
            "uri": parts.uri.to_string(),
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        }))
        .into_response()
    }

    serve(Router::new().fallback(any(echo))).await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn proxy_config(target: &str, policy: RefreshPolicy) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.target_url = target.to_string();
    config.secrets.prefix = "X-Hdr-".into();
    config.secrets.keyvault_url = "https://vault.example".into();
    config.secrets.refresh = policy;
    config
}

/// Start the proxy on an ephemeral port.
pub async fn spawn_proxy(config: ProxyConfig, store: Arc<MemoryStore>) -> (SocketAddr, Shutdown) {
    let server = prepare_with_store(&config, store).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    tokio::spawn(async move {
        let _ = server.run_until(listener, signal).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[derive(Clone)]
struct VaultState {
    base: Arc<Mutex<String>>,
    secrets: Arc<Vec<(String, String, bool)>>,
    token: &'static str,
    gets: Arc<AtomicU32>,
}

/// Mock Key Vault: two listing pages linked by `nextLink`, bearer auth
/// required. Entries are `(name, value, enabled)`.
pub struct MockVault {
    pub addr: SocketAddr,
    pub gets: Arc<AtomicU32>,
}

pub async fn start_mock_vault(
    secrets: Vec<(String, String, bool)>,
    token: &'static str,
) -> MockVault {
    fn authorized(state: &VaultState, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", state.token))
            .unwrap_or(false)
    }

    fn unauthorized() -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": "Unauthorized", "message": "bad token"}})),
        )
            .into_response()
    }

    async fn list(
        State(state): State<VaultState>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        if !authorized(&state, &headers) {
            return unauthorized();
        }
        let base = state.base.lock().unwrap().clone();
        let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);
        let half = state.secrets.len() / 2;
        let (items, next): (&[(String, String, bool)], Value) = if page == 0 {
            (
                &state.secrets[..half],
                json!(format!("{base}/secrets?api-version=7.4&page=1")),
            )
        } else {
            (&state.secrets[half..], Value::Null)
        };
        let value: Vec<Value> = items
            .iter()
            .map(|(name, _, enabled)| {
                json!({"id": format!("{base}/secrets/{name}"), "attributes": {"enabled": enabled}})
            })
            .collect();
        Json(json!({"value": value, "nextLink": next})).into_response()
    }

    async fn read(
        State(state): State<VaultState>,
        Path(name): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        if !authorized(&state, &headers) {
            return unauthorized();
        }
        state.gets.fetch_add(1, Ordering::SeqCst);
        match state.secrets.iter().find(|(n, _, _)| *n == name) {
            Some((n, v, _)) => {
                Json(json!({"id": format!("/secrets/{n}/v1"), "value": v})).into_response()
            }
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": "SecretNotFound", "message": name}})),
            )
                .into_response(),
        }
    }

    let gets = Arc::new(AtomicU32::new(0));
    let state = VaultState {
        base: Arc::new(Mutex::new(String::new())),
        secrets: Arc::new(secrets),
        token,
        gets: gets.clone(),
    };
    let base = state.base.clone();
    let app = Router::new()
        .route("/secrets", get(list))
        .route("/secrets/{name}", get(read))
        .with_state(state);
    let addr = serve(app).await;
    *base.lock().unwrap() = format!("http://{addr}");
    MockVault { addr, gets }
}
