//! Bearer credentials for the Key Vault API.
//!
//! Resolution order mirrors the usual Azure default chain, reduced to the
//! sources that make sense for a sidecar proxy:
//! 1. `KEYVAULT_ACCESS_TOKEN`: a pre-issued bearer token, used as is
//! 2. `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET`:
//!    client-credentials grant against `AZURE_AUTHORITY_HOST`
//! 3. Managed identity: `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` when present
//!    (App Service, Container Apps), the instance metadata endpoint otherwise
//!
//! Acquired tokens are cached and renewed five minutes before they expire.
//! The token endpoints report expiry either as a lifetime (`expires_in`) or
//! as an absolute epoch (`expires_on`, App Service); both are honored.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::types::SecretString;

const KEYVAULT_SCOPE: &str = "https://vault.azure.net/.default";
const KEYVAULT_RESOURCE: &str = "https://vault.azure.net";
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Something that can produce a bearer token for the secret store.
#[async_trait]
pub trait TokenCredential: Send + Sync + std::fmt::Debug {
    /// A currently valid bearer token.
    async fn token(&self) -> Result<SecretString>;

    /// Credential source, for startup logging.
    fn name(&self) -> &'static str;
}

/// Build the credential chain from the process environment.
pub fn credential_from_env(http: reqwest::Client) -> Result<Arc<dyn TokenCredential>> {
    credential_from_lookup(|key| std::env::var(key).ok(), http)
}

/// Build the credential chain from an arbitrary variable lookup.
pub fn credential_from_lookup<F>(
    lookup: F,
    http: reqwest::Client,
) -> Result<Arc<dyn TokenCredential>>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(token) = var("KEYVAULT_ACCESS_TOKEN") {
        return Ok(Arc::new(StaticTokenCredential::new(token)));
    }

    match (
        var("AZURE_TENANT_ID"),
        var("AZURE_CLIENT_ID"),
        var("AZURE_CLIENT_SECRET"),
    ) {
        (Some(tenant), Some(client_id), Some(secret)) => {
            let authority =
                var("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
            return Ok(Arc::new(ClientSecretCredential::new(
                http,
                &authority,
                &tenant,
                client_id,
                secret.into(),
            )));
        }
        (Some(_), _, _) | (_, _, Some(_)) => {
            return Err(SecretsError::config(
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET must be set together",
            ));
        }
        _ => {}
    }

    let endpoint = var("IDENTITY_ENDPOINT");
    let header = var("IDENTITY_HEADER");
    let source = match (endpoint, header) {
        (Some(endpoint), Some(header)) => ManagedIdentitySource::AppService { endpoint, header },
        _ => ManagedIdentitySource::InstanceMetadata {
            endpoint: IMDS_ENDPOINT.to_string(),
        },
    };
    Ok(Arc::new(ManagedIdentityCredential::new(
        http,
        source,
        var("AZURE_CLIENT_ID"),
    )))
}

/// A pre-issued token, never refreshed.
#[derive(Debug)]
pub struct StaticTokenCredential {
    token: SecretString,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self) -> Result<SecretString> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &'static str {
        "static-token"
    }
}

/// Service principal with a client secret.
#[derive(Debug)]
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: String,
        client_secret: SecretString,
    ) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("scope", KEYVAULT_SCOPE),
            ])
            .send()
            .await?;
        read_token_response(response).await
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self) -> Result<SecretString> {
        self.cache.get_or_fetch(|| self.request_token()).await
    }

    fn name(&self) -> &'static str {
        "client-secret"
    }
}

/// Where a managed identity token comes from.
#[derive(Debug, Clone)]
pub enum ManagedIdentitySource {
    /// App Service / Container Apps identity endpoint.
    AppService { endpoint: String, header: String },
    /// VM instance metadata service.
    InstanceMetadata { endpoint: String },
}

/// Managed identity of the host the proxy runs on.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    source: ManagedIdentitySource,
    client_id: Option<String>,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new(
        http: reqwest::Client,
        source: ManagedIdentitySource,
        client_id: Option<String>,
    ) -> Self {
        Self {
            http,
            source,
            client_id,
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        let mut query = vec![("resource", KEYVAULT_RESOURCE)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", "2019-08-01"));
                self.http
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            ManagedIdentitySource::InstanceMetadata { endpoint } => {
                query.push(("api-version", "2018-02-01"));
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        read_token_response(request.send().await?).await
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn token(&self) -> Result<SecretString> {
        self.cache.get_or_fetch(|| self.request_token()).await
    }

    fn name(&self) -> &'static str {
        "managed-identity"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
    #[serde(default)]
    expires_on: Option<ExpiresIn>,
}

/// AAD returns a number, the identity endpoints return a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(secs) => Some(*secs),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl TokenResponse {
    /// Remaining validity: `expires_in` when present, otherwise the time
    /// left until `expires_on`. Zero when neither is usable.
    fn lifetime(&self) -> Duration {
        if let Some(secs) = self.expires_in.as_ref().and_then(ExpiresIn::seconds) {
            return Duration::from_secs(secs);
        }
        match self.expires_on.as_ref().and_then(ExpiresIn::seconds) {
            Some(epoch) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Duration::from_secs(epoch).saturating_sub(now)
            }
            None => Duration::ZERO,
        }
    }
}

async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SecretsError::authentication(format!(
            "token endpoint returned {status}: {body}"
        )));
    }
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| SecretsError::malformed("token", e.to_string()))
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

/// Single-slot token cache. The lock is held across the fetch so that
/// concurrent callers share one token request.
#[derive(Debug, Default)]
struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<SecretString>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let response = fetch().await?;
        let lifetime = response.lifetime();
        let now = Instant::now();
        let refresh_at = now
            .checked_add(lifetime.saturating_sub(EXPIRY_MARGIN))
            .unwrap_or(now);
        tracing::debug!(
            lifetime_secs = lifetime.as_secs(),
            "Acquired secret store access token"
        );
        *slot = Some(CachedToken {
            token: response.access_token.clone(),
            refresh_at,
        });
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn static_token_wins() {
        let credential = credential_from_lookup(
            lookup(&[
                ("KEYVAULT_ACCESS_TOKEN", "abc"),
                ("AZURE_TENANT_ID", "t"),
                ("AZURE_CLIENT_ID", "c"),
                ("AZURE_CLIENT_SECRET", "s"),
            ]),
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(credential.name(), "static-token");
    }

    #[test]
    fn service_principal_when_all_three_present() {
        let credential = credential_from_lookup(
            lookup(&[
                ("AZURE_TENANT_ID", "t"),
                ("AZURE_CLIENT_ID", "c"),
                ("AZURE_CLIENT_SECRET", "s"),
            ]),
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(credential.name(), "client-secret");
        assert!(!format!("{credential:?}").contains("\"s\""));
    }

    #[test]
    fn partial_service_principal_is_rejected() {
        let err = credential_from_lookup(
            lookup(&[("AZURE_TENANT_ID", "t"), ("AZURE_CLIENT_SECRET", "s")]),
            reqwest::Client::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
    }

    #[test]
    fn falls_back_to_managed_identity() {
        let credential = credential_from_lookup(lookup(&[]), reqwest::Client::new()).unwrap();
        assert_eq!(credential.name(), "managed-identity");
    }

    #[test]
    fn client_id_alone_selects_user_assigned_identity() {
        let credential = credential_from_lookup(
            lookup(&[("AZURE_CLIENT_ID", "c")]),
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(credential.name(), "managed-identity");
    }

    #[test]
    fn expires_in_accepts_number_and_string() {
        let numeric: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3599}"#).unwrap();
        assert_eq!(numeric.lifetime(), Duration::from_secs(3599));

        let text: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"86400"}"#).unwrap();
        assert_eq!(text.lifetime(), Duration::from_secs(86400));

        let absent: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(absent.lifetime(), Duration::ZERO);
    }

    fn epoch_in(offset: Duration) -> u64 {
        (SystemTime::now() + offset)
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn expires_on_is_used_when_expires_in_is_absent() {
        let body = format!(
            r#"{{"access_token":"a","expires_on":"{}","resource":"https://vault.azure.net"}}"#,
            epoch_in(Duration::from_secs(7200))
        );
        let response: TokenResponse = serde_json::from_str(&body).unwrap();
        let lifetime = response.lifetime();
        assert!(lifetime > Duration::from_secs(7190), "{lifetime:?}");
        assert!(lifetime <= Duration::from_secs(7200), "{lifetime:?}");

        let past: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_on":"1586984735"}"#).unwrap();
        assert_eq!(past.lifetime(), Duration::ZERO);
    }

    #[test]
    fn expires_in_takes_precedence_over_expires_on() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","expires_in":"600","expires_on":"1586984735"}"#,
        )
        .unwrap();
        assert_eq!(response.lifetime(), Duration::from_secs(600));
    }

    #[test]
    fn tokens_and_client_secrets_are_redacted() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"eyJbearer","expires_in":60}"#).unwrap();
        assert!(!format!("{response:?}").contains("eyJbearer"));

        let credential = ClientSecretCredential::new(
            reqwest::Client::new(),
            DEFAULT_AUTHORITY_HOST,
            "tenant",
            "app".into(),
            "s3cret-value".into(),
        );
        assert!(!format!("{credential:?}").contains("s3cret-value"));

        let credential = StaticTokenCredential::new("static-bearer");
        assert!(!format!("{credential:?}").contains("static-bearer"));
    }

    #[tokio::test]
    async fn cached_managed_identity_token_is_redacted() {
        let credential = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            ManagedIdentitySource::InstanceMetadata {
                endpoint: IMDS_ENDPOINT.into(),
            },
            None,
        );
        credential
            .cache
            .get_or_fetch(|| async {
                Ok(TokenResponse {
                    access_token: "cached-bearer".into(),
                    expires_in: Some(ExpiresIn::Seconds(3600)),
                    expires_on: None,
                })
            })
            .await
            .unwrap();
        assert!(!format!("{credential:?}").contains("cached-bearer"));
    }

    #[tokio::test]
    async fn absurd_lifetime_does_not_overflow() {
        let cache = TokenCache::default();
        let token = cache
            .get_or_fetch(|| async {
                Ok(TokenResponse {
                    access_token: "forever".into(),
                    expires_in: Some(ExpiresIn::Seconds(u64::MAX)),
                    expires_on: None,
                })
            })
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "forever");
    }

    #[tokio::test]
    async fn cache_reuses_long_lived_tokens() {
        let cache = TokenCache::default();
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let token = cache
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(TokenResponse {
                        access_token: "tok".into(),
                        expires_in: Some(ExpiresIn::Seconds(3600)),
                        expires_on: None,
                    })
                })
                .await
                .unwrap();
            assert_eq!(token.expose_secret(), "tok");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_refetches_tokens_inside_expiry_margin() {
        let cache = TokenCache::default();
        let calls = AtomicU32::new(0);
        for _ in 0..2 {
            cache
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(TokenResponse {
                        access_token: "short".into(),
                        expires_in: Some(ExpiresIn::Seconds(60)),
                        expires_on: None,
                    })
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
