//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file ─┐
//!                     ├─▶ loader.rs (merge, env/CLI wins over file)
//! env vars / CLI  ────┘
//!     → validation.rs (semantic checks, all errors collected)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value/Arc with every subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the process lifetime; no reload
//! - Every optional field has a default so only the three mandatory
//!   settings need to be supplied
//! - Validation separates syntactic (serde/clap) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{Cli, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig, RefreshPolicy, SecretsConfig,
    SecurityConfig, UpstreamConfig,
};
pub use validation::ValidationError;
