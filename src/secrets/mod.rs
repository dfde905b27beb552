//! Secret store access.
//!
//! # Data Flow
//! ```text
//! credential.rs (bearer token, cached until near expiry)
//!     → keyvault.rs (list secret names page by page, fetch values)
//!     → SecretDescriptor { name, value }
//!     → headers::source (prefix filter, header derivation)
//! ```
//!
//! # Design Decisions
//! - `SecretStore` is the seam: the header pipeline never sees HTTP
//! - No retries; a failed call surfaces to the caller immediately
//! - The store client always verifies TLS, independent of upstream settings
//! - Secret values and tokens travel as `SecretString` and are only exposed
//!   where they leave the process

pub mod credential;
pub mod error;
pub mod keyvault;
pub mod store;
pub mod types;

pub use credential::{credential_from_env, TokenCredential};
pub use error::{Result, SecretsError};
pub use keyvault::KeyVaultStore;
pub use store::{SecretDescriptor, SecretStore};
pub use types::SecretString;
