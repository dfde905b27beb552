//! Admission control.
//!
//! # Responsibilities
//! - Bound the number of requests proxied at the same time
//! - Reject the excess immediately with 503 instead of queueing
//!
//! The permit is held until the handler has produced its response; the
//! response body is already buffered at that point.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Semaphore;

use crate::observability::metrics;

pub const OVERLOADED_BODY: &str = "Proxy overloaded";

/// Shared in-flight request budget.
#[derive(Debug, Clone)]
pub struct InFlightLimit {
    permits: Arc<Semaphore>,
    max: usize,
}

impl InFlightLimit {
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Middleware: take a permit or answer 503.
pub async fn admission_control(
    State(limit): State<InFlightLimit>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Ok(_permit) = limit.permits.clone().try_acquire_owned() else {
        tracing::warn!(
            max_in_flight = limit.max,
            path = %request.uri().path(),
            "In-flight limit reached, rejecting request"
        );
        metrics::record_rejected("in_flight_limit");
        return (StatusCode::SERVICE_UNAVAILABLE, OVERLOADED_BODY).into_response();
    };
    next.run(request).await
}
