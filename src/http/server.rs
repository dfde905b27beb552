//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (admission control, request ID, tracing)
//! - Bind server to listener and run until shutdown
//! - Drive the per-request pipeline: body → headers → forward → relay

use std::error::Error as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::headers::HeaderProvider;
use crate::http::body::InboundBody;
use crate::http::forward::{ForwardError, ProxyForwarder};
use crate::http::request::{request_id, with_request_id};
use crate::http::response::relay;
use crate::lifecycle::signals::shutdown_signal;
use crate::observability::{metrics, DebugObserver};
use crate::security::{admission_control, InFlightLimit};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub headers: Arc<dyn HeaderProvider>,
    pub forwarder: ProxyForwarder,
    pub observer: DebugObserver,
    pub max_body_size: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and header policy.
    pub fn new(
        config: ProxyConfig,
        headers: Arc<dyn HeaderProvider>,
    ) -> Result<Self, ForwardError> {
        let state = AppState {
            headers,
            forwarder: ProxyForwarder::new(&config.upstream)?,
            observer: DebugObserver::new(
                config.observability.debug,
                config.observability.reveal_secrets,
            ),
            max_body_size: config.security.max_body_size,
        };
        let limit = InFlightLimit::new(config.listener.max_in_flight);

        let router = Self::build_router(state, limit);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, limit: InFlightLimit) -> Router {
        let router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(limit, admission_control));
        with_request_id(router)
    }

    /// Run until Ctrl+C / SIGTERM.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run until `signal` completes, then drain in-flight requests.
    pub async fn run_until<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target_url = %self.config.upstream.target_url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The fully layered router, for serving it some other way.
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Catch-all proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let request_id = request_id(&parts.headers).to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "Proxying request"
    );

    let raw = match read_body(body, state.max_body_size).await {
        Ok(raw) => raw,
        Err(response) => {
            tracing::warn!(
                request_id = %request_id,
                status = response.status().as_u16(),
                "Failed to read request body"
            );
            metrics::record_rejected("body");
            metrics::record_request(&method, response.status().as_u16(), start_time);
            return response;
        }
    };
    let inbound = InboundBody::parse(&parts.headers, raw);
    state.observer.inbound(&parts, &inbound);

    let result = match state.headers.current_headers().await {
        Ok(custom) => {
            state
                .forwarder
                .forward(&parts, inbound.into_bytes(), &custom)
                .await
        }
        Err(e) => Err(ForwardError::Secrets(e)),
    };

    let response = relay(result, &state.observer);
    tracing::debug!(
        request_id = %request_id,
        status = response.status().as_u16(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

/// Buffer the inbound body: 413 past `limit`, 400 when the body itself
/// fails (e.g. the client went away mid-upload).
async fn read_body(body: Body, limit: usize) -> Result<Bytes, Response> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if exceeds_limit(&e) {
            (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
        } else {
            tracing::debug!(error = %e, "Request body stream failed");
            (StatusCode::BAD_REQUEST, "Invalid request body").into_response()
        }
    })
}

fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source = error.source();
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
