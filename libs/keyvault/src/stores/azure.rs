//! Azure Key Vault backend
//!
//! Talks to the Key Vault REST API (api-version 7.4) using a service
//! principal and the OAuth2 client-credentials flow.
//! See: https://learn.microsoft.com/en-us/rest/api/keyvault/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::AzureConfig;
use crate::store::SecretStore;
use crate::types::{CertificateBundle, SecretProperties, SecretVersion};
use crate::VaultError;

const TOKEN_SCOPE: &str = "https://vault.azure.net/.default";
const PAGE_SIZE: u32 = 25;

/// Azure Key Vault store using service principal authentication
pub struct AzureStore {
    client: Client,
    vault_url: String,
    api_version: String,
    config: AzureConfig,
    /// Cached access token
    access_token: Arc<RwLock<Option<AccessToken>>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: Secret<String>,
    expires_at: std::time::Instant,
}

impl AccessToken {
    fn is_expired(&self) -> bool {
        // Consider expired 30 seconds before actual expiry for safety
        self.expires_at
            .checked_sub(std::time::Duration::from_secs(30))
            .map(|t| std::time::Instant::now() > t)
            .unwrap_or(true)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct AttributesDto {
    enabled: Option<bool>,
    nbf: Option<i64>,
    exp: Option<i64>,
    created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SecretBundleDto {
    id: String,
    value: Option<String>,
    attributes: Option<AttributesDto>,
}

#[derive(Debug, Deserialize)]
struct SecretItemDto {
    id: String,
    attributes: Option<AttributesDto>,
}

#[derive(Debug, Deserialize)]
struct SecretListDto {
    #[serde(default)]
    value: Vec<SecretItemDto>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CertificateBundleDto {
    id: String,
    cer: Option<String>,
    x5t: Option<String>,
    attributes: Option<AttributesDto>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Extract `{name}` and the optional `{version}` from a bundle id URL,
/// e.g. `https://v.vault.azure.net/secrets/db-password/9f3a...`.
fn name_and_version(id: &str, collection: &str) -> (String, Option<String>) {
    let segments: Vec<&str> = id.trim_end_matches('/').split('/').collect();
    match segments.iter().position(|s| *s == collection) {
        Some(pos) => {
            let name = segments
                .get(pos + 1)
                .map(|s| s.to_string())
                .unwrap_or_default();
            let version = segments.get(pos + 2).map(|s| s.to_string());
            (name, version)
        }
        None => (String::new(), None),
    }
}

fn secret_properties(id: &str, attributes: Option<AttributesDto>) -> SecretProperties {
    let (name, version) = name_and_version(id, "secrets");
    let attributes = attributes.unwrap_or(AttributesDto {
        enabled: None,
        nbf: None,
        exp: None,
        created: None,
    });
    SecretProperties {
        name,
        version,
        enabled: attributes.enabled.unwrap_or(false),
        not_before: timestamp(attributes.nbf),
        expires_on: timestamp(attributes.exp),
        created_on: timestamp(attributes.created),
    }
}

impl From<SecretBundleDto> for SecretVersion {
    fn from(dto: SecretBundleDto) -> Self {
        SecretVersion {
            properties: secret_properties(&dto.id, dto.attributes),
            value: dto.value.map(Secret::new),
        }
    }
}

impl TryFrom<CertificateBundleDto> for CertificateBundle {
    type Error = VaultError;

    fn try_from(dto: CertificateBundleDto) -> Result<Self, VaultError> {
        use base64::Engine;

        let (name, version) = name_and_version(&dto.id, "certificates");
        let cer = match dto.cer {
            Some(b64) => base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| {
                    VaultError::Internal(format!("Invalid certificate encoding: {e}"))
                })?,
            None => Vec::new(),
        };
        let expires_on = dto.attributes.as_ref().and_then(|a| timestamp(a.exp));
        Ok(CertificateBundle {
            name,
            version,
            cer,
            thumbprint: dto.x5t,
            expires_on,
        })
    }
}

impl AzureStore {
    /// Create a new Azure Key Vault store with the given configuration
    ///
    /// This authenticates with Entra immediately so bad credentials
    /// fail the construction, not the first lookup.
    pub async fn new(config: AzureConfig) -> Result<Self, VaultError> {
        let vault_url = config.vault_url()?;
        if !config.is_configured() {
            return Err(VaultError::InvalidConfig(
                "Azure configuration is incomplete. Required: vault_url, tenant_id, client_id, client_secret".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))?;

        let store = Self {
            client,
            vault_url,
            api_version: config.api_version(),
            config,
            access_token: Arc::new(RwLock::new(None)),
        };

        store.authenticate().await?;

        Ok(store)
    }

    /// Authenticate with Entra using the client-credentials flow
    async fn authenticate(&self) -> Result<Secret<String>, VaultError> {
        // Check if we have a valid cached token
        {
            let token_guard = self.access_token.read().await;
            if let Some(ref token) = *token_guard {
                if !token.is_expired() {
                    return Ok(Secret::new(token.token.expose_secret().clone()));
                }
            }
        }

        debug!("Authenticating with Entra");

        let tenant_id = self
            .config
            .tenant_id
            .as_ref()
            .ok_or_else(|| VaultError::InvalidConfig("Missing tenant_id".to_string()))?;
        let client_id = self
            .config
            .client_id
            .as_ref()
            .ok_or_else(|| VaultError::InvalidConfig("Missing client_id".to_string()))?;
        let client_secret = self
            .config
            .client_secret
            .as_ref()
            .ok_or_else(|| VaultError::InvalidConfig("Missing client_secret".to_string()))?;

        let token_url =
            format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");

        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.expose_secret().as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::BAD_REQUEST
        {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VaultError::AuthenticationFailed(format!(
                "Invalid service principal credentials: {body}"
            )));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(VaultError::RateLimited(
                "Too many authentication attempts".to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VaultError::AuthenticationFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await?;

        let access_token = AccessToken {
            token: Secret::new(token_response.access_token.clone()),
            expires_at: std::time::Instant::now()
                + std::time::Duration::from_secs(token_response.expires_in),
        };

        {
            let mut token_guard = self.access_token.write().await;
            *token_guard = Some(access_token);
        }

        debug!("Successfully authenticated with Entra");
        Ok(Secret::new(token_response.access_token))
    }

    fn object_url(&self, collection: &str, segments: &[&str]) -> String {
        let mut url = format!("{}/{collection}", self.vault_url);
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        format!("{url}?api-version={}", self.api_version)
    }

    /// GET a vault URL, mapping 404 to `Ok(None)` and everything else
    /// through the shared status mapping.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<Option<T>, VaultError> {
        let token = self.authenticate().await?;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .send()
            .await
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check_status(response, context).await?;
        Ok(Some(response.json().await?))
    }

    /// Map a non-success vault response to the error taxonomy.
    async fn check_status(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, VaultError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            reqwest::StatusCode::UNAUTHORIZED => {
                // Token might have expired, clear the cache so the next
                // call re-authenticates
                {
                    let mut token_guard = self.access_token.write().await;
                    *token_guard = None;
                }
                Err(VaultError::AuthenticationFailed(
                    "Token expired or invalid".to_string(),
                ))
            }
            reqwest::StatusCode::FORBIDDEN => Err(VaultError::PermissionDenied(format!(
                "Access denied for {context}"
            ))),
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                Err(VaultError::RateLimited("Rate limit exceeded".to_string()))
            }
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(VaultError::Internal(format!("HTTP {status}: {body}")))
            }
        }
    }

    /// Walk a paged listing, following `nextLink` until exhausted.
    /// A 404 on the first page lists as empty.
    async fn collect_pages(
        &self,
        first_url: String,
        context: &str,
    ) -> Result<Vec<SecretItemDto>, VaultError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let Some(page) = self.get_json::<SecretListDto>(&url, context).await? else {
                break;
            };
            items.extend(page.value);
            next = page.next_link;
        }
        Ok(items)
    }
}

#[async_trait]
impl SecretStore for AzureStore {
    async fn get_current_secret(
        &self,
        name: &str,
    ) -> Result<Option<SecretVersion>, VaultError> {
        let url = self.object_url("secrets", &[name]);
        let bundle: Option<SecretBundleDto> =
            self.get_json(&url, &format!("secret '{name}'")).await?;
        Ok(bundle.map(SecretVersion::from))
    }

    async fn list_secret_versions(
        &self,
        name: &str,
    ) -> Result<Vec<SecretProperties>, VaultError> {
        let first = format!(
            "{}/secrets/{}/versions?maxresults={PAGE_SIZE}&api-version={}",
            self.vault_url,
            urlencoding::encode(name),
            self.api_version
        );
        let items = self
            .collect_pages(first, &format!("versions of secret '{name}'"))
            .await?;
        Ok(items
            .into_iter()
            .map(|item| secret_properties(&item.id, item.attributes))
            .collect())
    }

    async fn get_secret_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<SecretVersion>, VaultError> {
        let url = self.object_url("secrets", &[name, version]);
        let bundle: Option<SecretBundleDto> = self
            .get_json(&url, &format!("secret '{name}' version '{version}'"))
            .await?;
        Ok(bundle.map(SecretVersion::from))
    }

    async fn get_certificate(
        &self,
        name: &str,
    ) -> Result<Option<CertificateBundle>, VaultError> {
        let url = self.object_url("certificates", &[name]);
        let bundle: Option<CertificateBundleDto> =
            self.get_json(&url, &format!("certificate '{name}'")).await?;
        bundle.map(CertificateBundle::try_from).transpose()
    }

    async fn list_secrets(&self) -> Result<Vec<SecretProperties>, VaultError> {
        let first = format!(
            "{}/secrets?maxresults={PAGE_SIZE}&api-version={}",
            self.vault_url, self.api_version
        );
        let items = self.collect_pages(first, "secrets listing").await?;
        Ok(items
            .into_iter()
            .map(|item| secret_properties(&item.id, item.attributes))
            .collect())
    }

    async fn set_secret(&self, name: &str, value: &Secret<String>) -> Result<(), VaultError> {
        let token = self.authenticate().await?;
        let url = self.object_url("secrets", &[name]);

        let response = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .json(&serde_json::json!({ "value": value.expose_secret() }))
            .send()
            .await
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))?;

        self.check_status(response, &format!("writing secret '{name}'"))
            .await?;
        debug!(name = %name, "Secret written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "azure-keyvault"
    }

    async fn health_check(&self) -> Result<(), VaultError> {
        // Try to authenticate - if it works, the vault is reachable
        self.authenticate().await.map(|_| ())
    }
}
