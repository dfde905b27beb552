//! The secret store seam.

use async_trait::async_trait;

use crate::secrets::error::Result;
use crate::secrets::types::SecretString;

/// A secret read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDescriptor {
    pub name: String,
    pub value: SecretString,
}

/// A key/value secret service that can enumerate and read secrets.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Names of every enabled secret, in store-defined order.
    ///
    /// Paging is handled inside; the result is the complete, finite listing.
    async fn list_names(&self) -> Result<Vec<String>>;

    /// Current value of a single secret.
    async fn get(&self, name: &str) -> Result<SecretDescriptor>;
}
