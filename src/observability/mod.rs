//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing subscriber, pretty or JSON)
//!     → debug.rs (request/response/secret debug lines, DEBUG_MODE only)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (when METRICS_ADDRESS is set)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) is attached to every request span
//! - Debug output is side-effect only; it never changes a response
//! - Metric updates are no-ops until an exporter is installed

pub mod debug;
pub mod logging;
pub mod metrics;

pub use debug::DebugObserver;
