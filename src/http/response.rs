//! Response relay.
//!
//! # Responsibilities
//! - Relay the upstream status and body verbatim, whatever the status
//! - Relay end-to-end upstream headers; hop-by-hop ones and
//!   `content-length` are left to this hop's transport
//! - Map failures without an upstream response to `500 Proxy error`
//!
//! # Design Decisions
//! - Error detail never reaches the caller, only the logs
//! - 4xx/5xx from the target are the target's answer, not proxy failures

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::forward::{ForwardError, UpstreamResponse};
use crate::observability::debug::DebugObserver;
use crate::security::headers::strip_hop_by_hop;

pub const PROXY_ERROR_BODY: &str = "Proxy error";

/// Turn a forwarding outcome into the response for the caller.
pub fn relay(result: Result<UpstreamResponse, ForwardError>, observer: &DebugObserver) -> Response {
    match result {
        Ok(upstream) => {
            if upstream.is_error() {
                observer.upstream_error(&upstream);
            } else {
                observer.forwarded(&upstream);
            }
            relay_upstream(upstream)
        }
        Err(error) => {
            tracing::warn!(kind = error.kind(), "Request failed without an upstream response");
            observer.proxy_error(&error);
            proxy_error()
        }
    }
}

/// Status, end-to-end headers and body of the upstream response.
pub fn relay_upstream(upstream: UpstreamResponse) -> Response {
    let mut headers = upstream.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    response
}

/// The fixed failure response.
pub fn proxy_error() -> Response {
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, PROXY_ERROR_BODY).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
