//! Header-injecting reverse proxy.
//!
//! Every inbound request is forwarded to one fixed target with extra
//! headers whose names and values come from Key Vault secrets sharing a
//! configured prefix. The upstream answer is relayed back unchanged.

pub mod config;
pub mod headers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod secrets;
pub mod security;

pub use config::ProxyConfig;
pub use headers::{HeaderProvider, HeaderSet, SecretHeaderSource};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
