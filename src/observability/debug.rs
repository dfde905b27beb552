//! Debug tracing of the proxy pipeline (`DEBUG_MODE=true`).
//!
//! Every method is a no-op when disabled and none of them can fail, so call
//! sites never branch on the debug flag themselves.

use axum::http::{request, HeaderMap, HeaderName};
use serde_json::{Map, Value};

use crate::http::body::InboundBody;
use crate::http::forward::{ForwardError, UpstreamResponse};

const MAX_LOGGED_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugObserver {
    enabled: bool,
    reveal_secrets: bool,
}

impl DebugObserver {
    pub fn new(enabled: bool, reveal_secrets: bool) -> Self {
        Self {
            enabled,
            reveal_secrets,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Method, path, headers and non-empty body of a request as received.
    pub fn inbound(&self, parts: &request::Parts, body: &InboundBody) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            method = %parts.method,
            path = %parts.uri.path(),
            "Received {} request on path {}",
            parts.method,
            parts.uri.path()
        );
        tracing::info!(headers = %headers_json(&parts.headers), "Request headers");
        if let Some(body) = body.debug_view() {
            tracing::info!(body = %truncate(&body), "Request body");
        }
    }

    /// A header resolved from a secret. The value is only shown on request.
    pub fn resolved_header(&self, header: &HeaderName, secret: &str, value: &str) {
        if !self.enabled {
            return;
        }
        let shown = if self.reveal_secrets {
            value
        } else {
            "[REDACTED]"
        };
        tracing::info!(
            header = %header,
            secret = %secret,
            value = %shown,
            "Fetched header from secret"
        );
    }

    /// A response from the target with a non-error status.
    pub fn forwarded(&self, upstream: &UpstreamResponse) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            method = %upstream.method,
            url = %upstream.url,
            "Forwarded {} request to {}",
            upstream.method,
            upstream.url
        );
        tracing::info!(status = upstream.status.as_u16(), "Received response");
        tracing::info!(headers = %headers_json(&upstream.headers), "Response headers");
        tracing::info!(body = %truncate(&String::from_utf8_lossy(&upstream.body)), "Response body");
    }

    /// A 4xx/5xx from the target, relayed as is.
    pub fn upstream_error(&self, upstream: &UpstreamResponse) {
        if !self.enabled {
            return;
        }
        tracing::error!(
            url = %upstream.url,
            status = upstream.status.as_u16(),
            body = %truncate(&String::from_utf8_lossy(&upstream.body)),
            "Error response from target"
        );
    }

    /// A failure with no upstream response; the caller only sees "Proxy error".
    pub fn proxy_error(&self, error: &ForwardError) {
        if !self.enabled {
            return;
        }
        tracing::error!(error = %error, "Proxy error");
    }
}

/// Header map as a JSON object; repeated headers are joined with ", ".
pub fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(map)
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_LOGGED_BODY {
        return text.to_string();
    }
    let mut end = MAX_LOGGED_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated, {} bytes)", &text[..end], text.len())
}
