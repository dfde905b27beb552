//! Request hygiene and admission control.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → limits.rs (in-flight admission control, 503 when saturated)
//!     → [handler buffers body up to MAX_BODY_BYTES, 413 beyond]
//!     → headers.rs (hop-by-hop stripping on the way out and back)
//! ```
//!
//! # Design Decisions
//! - Reject instead of queue: a saturated proxy answers at once
//! - Hop-by-hop headers never cross the proxy in either direction

pub mod headers;
pub mod limits;

pub use limits::{admission_control, InFlightLimit};
