//! Azure Key Vault secret store over its REST API.
//!
//! - `GET {vault}/secrets?api-version=..` lists secret items page by page,
//!   following `nextLink` until it is absent
//! - `GET {vault}/secrets/{name}?api-version=..` reads the current value

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::secrets::credential::TokenCredential;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::store::{SecretDescriptor, SecretStore};
use crate::secrets::types::SecretString;

/// Per-call deadline for secret store and identity requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on listing pages, in case a store keeps handing out links.
const MAX_PAGES: usize = 10_000;

/// HTTP client used for the vault and the identity endpoints.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(SecretsError::from)
}

#[derive(Debug, Deserialize)]
struct SecretListPage {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: SecretAttributes,
}

#[derive(Debug, Deserialize)]
struct SecretAttributes {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

impl Default for SecretAttributes {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Key Vault backed [`SecretStore`].
pub struct KeyVaultStore {
    http: reqwest::Client,
    vault_url: Url,
    api_version: String,
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for KeyVaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVaultStore")
            .field("vault_url", &self.vault_url.as_str())
            .field("api_version", &self.api_version)
            .field("credential", &self.credential.name())
            .finish()
    }
}

impl KeyVaultStore {
    pub fn new(
        http: reqwest::Client,
        vault_url: &str,
        api_version: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        let vault_url = Url::parse(vault_url)
            .map_err(|e| SecretsError::config(format!("invalid vault URL {vault_url}: {e}")))?;
        if vault_url.cannot_be_a_base() {
            return Err(SecretsError::config(format!(
                "vault URL cannot be a base: {vault_url}"
            )));
        }

        tracing::info!(
            vault_url = %vault_url,
            credential = credential.name(),
            "Initialized Key Vault secret store"
        );

        Ok(Self {
            http,
            vault_url,
            api_version: api_version.into(),
            credential,
        })
    }

    /// `{vault}/secrets[/{name}]?api-version=..`, with the name percent-encoded.
    fn secrets_url(&self, name: Option<&str>) -> Result<Url> {
        let mut url = self.vault_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SecretsError::config("vault URL cannot be a base"))?;
            segments.pop_if_empty().push("secrets");
            if let Some(name) = name {
                segments.push(name);
            }
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Parse a `nextLink`. The bearer token is sent with every page request,
    /// so only links on the vault's own origin are followed.
    fn next_page_url(&self, link: &str) -> Result<Url> {
        let url = Url::parse(link).map_err(|e| {
            SecretsError::malformed("list secrets", format!("bad nextLink {link}: {e}"))
        })?;
        if url.origin() != self.vault_url.origin() {
            return Err(SecretsError::malformed(
                "list secrets",
                format!("nextLink {link} points outside {}", self.vault_url),
            ));
        }
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url, operation: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self.credential.token().await?;
        let response = self.http.get(url).bearer_auth(token.expose_secret()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| format!("{}: {}", e.error.code, e.error.message))
                .unwrap_or(body);
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(SecretsError::authentication(format!(
                    "{operation} rejected with {status}: {message}"
                )));
            }
            return Err(SecretsError::Backend {
                operation: operation.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SecretsError::malformed(operation, e.to_string()))
    }
}

#[async_trait]
impl SecretStore for KeyVaultStore {
    async fn list_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next = Some(self.secrets_url(None)?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(SecretsError::malformed(
                    "list secrets",
                    format!("more than {MAX_PAGES} pages"),
                ));
            }

            let page: SecretListPage = self.get_json(url, "list secrets").await?;
            for item in page.value {
                if !item.attributes.enabled {
                    tracing::debug!(id = %item.id, "Skipping disabled secret");
                    continue;
                }
                let name = secret_name_from_id(&item.id).ok_or_else(|| {
                    SecretsError::malformed(
                        "list secrets",
                        format!("unexpected secret id {}", item.id),
                    )
                })?;
                names.push(name);
            }

            next = match page.next_link.filter(|link| !link.is_empty()) {
                Some(link) => Some(self.next_page_url(&link)?),
                None => None,
            };
        }

        tracing::debug!(count = names.len(), pages, "Listed secrets");
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<SecretDescriptor> {
        let url = self.secrets_url(Some(name))?;
        let bundle: SecretBundle = self.get_json(url, "get secret").await?;
        let value = bundle.value.ok_or_else(|| {
            SecretsError::malformed("get secret", format!("secret {name} has no value"))
        })?;
        Ok(SecretDescriptor {
            name: name.to_string(),
            value,
        })
    }
}

/// Secret name from an item id such as
/// `https://vault.example/secrets/My-Secret[/version]`.
pub fn secret_name_from_id(id: &str) -> Option<String> {
    let url = Url::parse(id).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "secrets")?;
    segments
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
