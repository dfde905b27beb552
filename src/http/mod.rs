//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, admission control, request ID, tracing)
//!     → body.rs (buffer + classify the inbound body)
//!     → headers::HeaderProvider (custom headers for this request)
//!     → forward.rs (build outbound request, single attempt to the target)
//!     → response.rs (relay upstream response or synthesize "Proxy error")
//!     → Send to client
//! ```

pub mod body;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, ProxyForwarder, UpstreamResponse};
pub use request::{with_request_id, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
