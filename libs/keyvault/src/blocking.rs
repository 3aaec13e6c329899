//! Blocking facade over the async client
//!
//! Owns a current-thread tokio runtime and drives the async client to
//! completion per call, with semantics identical to the async surface.
//! Must not be used from within an async runtime; `block_on` panics
//! there. Async callers use [`KeyVaultClient`](crate::KeyVaultClient)
//! directly.

use std::sync::Arc;

use crate::store::SecretStore;
use crate::types::{CertificateBundle, NewSecret, SecretProperties};
use crate::{KeyVaultClient, VaultConfig, VaultError};

/// Synchronous vault client for non-async callers
pub struct BlockingClient {
    inner: KeyVaultClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingClient {
    /// Create a blocking client against Azure Key Vault
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let runtime = Self::runtime()?;
        let inner = runtime.block_on(KeyVaultClient::new(config))?;
        Ok(Self { inner, runtime })
    }

    /// Create a blocking client over any vault backend
    pub fn with_store(store: Arc<dyn SecretStore>) -> Result<Self, VaultError> {
        Ok(Self {
            inner: KeyVaultClient::with_store(store),
            runtime: Self::runtime()?,
        })
    }

    fn runtime() -> Result<tokio::runtime::Runtime, VaultError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VaultError::Internal(format!("Failed to start runtime: {e}")))
    }

    /// See [`KeyVaultClient::get_secret_value`]
    pub fn get_secret_value(&self, name: &str) -> Result<String, VaultError> {
        self.runtime.block_on(self.inner.get_secret_value(name))
    }

    /// See [`KeyVaultClient::get_certificate_value`]
    pub fn get_certificate_value(
        &self,
        name: &str,
    ) -> Result<Option<CertificateBundle>, VaultError> {
        self.runtime
            .block_on(self.inner.get_certificate_value(name))
    }

    /// See [`KeyVaultClient::get_secrets_list`]
    pub fn get_secrets_list(&self) -> Result<Vec<SecretProperties>, VaultError> {
        self.runtime.block_on(self.inner.get_secrets_list())
    }

    /// See [`KeyVaultClient::set_secrets`]
    pub fn set_secrets(&self, secrets: &[NewSecret]) -> Result<(), VaultError> {
        self.runtime.block_on(self.inner.set_secrets(secrets))
    }

    /// See [`KeyVaultClient::invalidate_secret`]
    pub fn invalidate_secret(&self, name: &str) {
        self.inner.invalidate_secret(name);
    }

    /// See [`KeyVaultClient::clear_cache`]
    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }
}
