//! # Key Vault Resolution Library
//!
//! Resolves named secrets and certificates from a remote vault,
//! shielding callers from per-call network latency with a time-bounded
//! cache and from "item does not exist" conditions with a normalized
//! empty/absent result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      KeyVaultClient                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │  1. Check the cache-aside store (2 h window)          │   │
//! │  │  2. On miss → fetch current version from the vault    │   │
//! │  │  3. Current version outside its validity window?      │   │
//! │  │     → walk all versions, pick newest valid one        │   │
//! │  │  4. Vault says "not found" → empty string / None      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keyvault::{KeyVaultClient, VaultConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keyvault::VaultError> {
//!     let config = VaultConfig::from_env();
//!     let client = KeyVaultClient::new(config).await?;
//!
//!     // Empty string when the secret does not exist or has no
//!     // usable version
//!     let db_password = client.get_secret_value("DB_PASSWORD").await?;
//!
//!     // None when the certificate does not exist
//!     let cert = client.get_certificate_value("tls-cert").await?;
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod cache;
mod config;
mod error;
mod store;
mod types;

pub mod stores;

pub use cache::{compose_key, Cache};
pub use config::{AzureConfig, VaultConfig};
pub use error::VaultError;
pub use store::SecretStore;
pub use types::{CertificateBundle, NewSecret, SecretProperties, SecretVersion};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stores::AzureStore;
use tracing::{debug, info};

/// How long resolved secrets and certificates stay fresh
const CACHE_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

const SECRET_TAG: &str = "SECRET";
const CERT_TAG: &str = "CERT";

/// Client for cached secret and certificate resolution.
///
/// Holds the cache-aside stores and a reference to the vault backend;
/// stateless with respect to request handling otherwise. Cheap to
/// share behind an `Arc`; all methods take `&self`.
pub struct KeyVaultClient {
    store: Arc<dyn SecretStore>,
    secrets: Cache<SecretVersion>,
    certificates: Cache<CertificateBundle>,
}

impl KeyVaultClient {
    /// Create a client against Azure Key Vault.
    ///
    /// Fails fast on a missing/blank vault URL or bad credentials;
    /// nothing network-related is deferred to the first lookup except
    /// the lookups themselves.
    pub async fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let store = AzureStore::new(config.azure).await?;
        info!(store = store.name(), "Vault client initialized");
        Ok(Self::with_store(Arc::new(store)))
    }

    /// Create a client over any vault backend (tests, other stores).
    pub fn with_store(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            secrets: Cache::new(),
            certificates: Cache::new(),
        }
    }

    /// List name/metadata pairs for every secret in the vault.
    ///
    /// Always goes to the network; listings are not cached.
    pub async fn get_secrets_list(&self) -> Result<Vec<SecretProperties>, VaultError> {
        self.store.list_secrets().await
    }

    /// Write a batch of secrets, one store call each.
    ///
    /// Any cached value for a written name is dropped so the next read
    /// observes the new version.
    pub async fn set_secrets(&self, secrets: &[NewSecret]) -> Result<(), VaultError> {
        for secret in secrets {
            self.store.set_secret(&secret.name, &secret.value).await?;
            self.secrets
                .remove(&compose_key(&[SECRET_TAG, &secret.name]));
        }
        Ok(())
    }

    /// Resolve a secret's value, caching the current version for two
    /// hours.
    ///
    /// Returns the empty string when the secret does not exist or no
    /// version of it is currently valid. The empty string is the
    /// uniform "no usable secret" signal and cannot be told apart from
    /// a secret whose stored value is genuinely empty. Store errors
    /// other than absence propagate unchanged.
    pub async fn get_secret_value(&self, name: &str) -> Result<String, VaultError> {
        match self.resolve_secret(name).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_not_found() => {
                debug!(name = %name, "Secret not found, resolving to empty");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_secret(&self, name: &str) -> Result<String, VaultError> {
        let key = compose_key(&[SECRET_TAG, name]);

        // Absence surfaces as NotFound out of the builder so it is
        // never cached: every call for an absent secret re-consults
        // the store.
        let current = self
            .secrets
            .get_or_build_async(&key, CACHE_WINDOW, move || async move {
                self.store
                    .get_current_secret(name)
                    .await?
                    .ok_or_else(|| VaultError::NotFound(format!("secret '{name}'")))
            })
            .await?;

        let now = Utc::now();
        if current.properties.is_valid_at(now) {
            return Ok(current.value_or_empty());
        }

        debug!(
            name = %name,
            "Current version outside its validity window, walking all versions"
        );

        // The fallback always goes to the network. Listing failures
        // propagate like any other store error.
        let mut versions: Vec<SecretProperties> = self
            .store
            .list_secret_versions(name)
            .await?
            .into_iter()
            .filter(|v| v.is_valid_at(now))
            .collect();
        versions.sort_by(|a, b| b.created_on.cmp(&a.created_on));

        let Some(newest_valid) = versions.into_iter().next() else {
            debug!(name = %name, "No valid version found");
            return Ok(String::new());
        };
        let Some(version_id) = newest_valid.version.as_deref() else {
            return Ok(String::new());
        };

        // Materialize that version directly, bypassing the cache
        let secret = self.store.get_secret_version(name, version_id).await?;
        Ok(secret.map(|s| s.value_or_empty()).unwrap_or_default())
    }

    /// Resolve the current certificate bundle, cached for two hours.
    ///
    /// Absence is `Ok(None)`, never an error. No version fallback is
    /// applied; the vault's "current" bundle is authoritative.
    pub async fn get_certificate_value(
        &self,
        name: &str,
    ) -> Result<Option<CertificateBundle>, VaultError> {
        let key = compose_key(&[CERT_TAG, name]);

        let built = self
            .certificates
            .get_or_build_async(&key, CACHE_WINDOW, move || async move {
                self.store
                    .get_certificate(name)
                    .await?
                    .ok_or_else(|| VaultError::NotFound(format!("certificate '{name}'")))
            })
            .await;

        match built {
            Ok(bundle) => Ok(Some(bundle)),
            Err(e) if e.is_not_found() => {
                debug!(name = %name, "Certificate not found, resolving to None");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the cached entry for one secret (rotation hook).
    pub fn invalidate_secret(&self, name: &str) {
        self.secrets.remove(&compose_key(&[SECRET_TAG, name]));
    }

    /// Drop the cached entry for one certificate (rotation hook).
    pub fn invalidate_certificate(&self, name: &str) {
        self.certificates.remove(&compose_key(&[CERT_TAG, name]));
    }

    /// Flush both caches. Next access rebuilds from the vault.
    pub fn clear_cache(&self) {
        self.secrets.clear();
        self.certificates.clear();
        info!("Vault caches cleared");
    }

    /// Check that the backend is reachable and credentials work.
    pub async fn health_check(&self) -> Result<(), VaultError> {
        self.store.health_check().await
    }
}
