//! Forwarding to the fixed upstream target.
//!
//! # Responsibilities
//! - Build the outbound URL: target base + inbound path and query, verbatim
//! - Build outbound headers: inbound headers overlaid by the custom set
//! - Issue exactly one attempt; no retries, no redirects followed
//! - Buffer the upstream response for relay and debug logging
//!
//! # Design Decisions
//! - `host` is dropped so the client derives it from the target URL
//! - `content-length` is recomputed by the client from the buffered body
//! - Certificate checks toward the target are only relaxed when configured,
//!   and only on this client

use axum::body::Bytes;
use axum::http::{header, request, HeaderMap, Method, StatusCode, Uri};
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::headers::HeaderSet;
use crate::secrets::SecretsError;
use crate::security::headers::strip_hop_by_hop;

/// A failure that produced no upstream response.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Custom headers could not be resolved for this request.
    #[error("custom header resolution failed: {0}")]
    Secrets(#[from] SecretsError),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(reqwest::Error),

    #[error("upstream connection failed: {0}")]
    Connect(reqwest::Error),

    #[error("upstream request timed out: {0}")]
    Timeout(reqwest::Error),

    #[error("upstream request failed: {0}")]
    Transport(reqwest::Error),

    #[error("failed to build upstream client: {0}")]
    Client(reqwest::Error),
}

impl ForwardError {
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else if error.is_connect() {
            Self::Connect(error)
        } else if error.is_builder() {
            Self::InvalidRequest(error)
        } else {
            Self::Transport(error)
        }
    }

    /// Short label used for metrics and non-debug logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Secrets(_) => "secrets",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Connect(_) => "connect",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Client(_) => "client",
        }
    }
}

/// What the target answered, fully buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub method: Method,
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// 4xx or 5xx from the target itself.
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }
}

/// Issues outbound requests to the configured target.
#[derive(Debug, Clone)]
pub struct ProxyForwarder {
    client: reqwest::Client,
    target: String,
}

impl ProxyForwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        if config.accept_invalid_certs {
            tracing::warn!(
                target_url = %config.target_url,
                "Certificate verification toward the target is disabled"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(ForwardError::Client)?;
        Ok(Self {
            client,
            target: config.target_url.clone(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// `target + path?query` with no normalization of either side.
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.target, path_and_query)
    }

    /// Send one request upstream and buffer the answer.
    pub async fn forward(
        &self,
        parts: &request::Parts,
        body: Bytes,
        custom: &HeaderSet,
    ) -> Result<UpstreamResponse, ForwardError> {
        let url = self.target_url(&parts.uri);
        let headers = outbound_headers(&parts.headers, custom);

        let response = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(ForwardError::from_transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(ForwardError::from_transport)?;

        Ok(UpstreamResponse {
            method: parts.method.clone(),
            url,
            status,
            headers,
            body,
        })
    }
}

/// Inbound headers minus connection-level ones, overlaid by `custom`.
pub fn outbound_headers(inbound: &HeaderMap, custom: &HeaderSet) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    custom.apply_to(&mut headers);
    headers
}
