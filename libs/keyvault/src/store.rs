//! Trait definition for vault backends

use async_trait::async_trait;
use secrecy::Secret;

use crate::types::{CertificateBundle, SecretProperties, SecretVersion};
use crate::VaultError;

/// Abstraction over the remote secret store.
///
/// Implement this trait to add support for another vault backend.
/// Absence of an item is an explicit `Ok(None)` result, never an error
/// the caller has to pattern-match out of a string code; `Err` is
/// reserved for auth, permission, network and protocol failures.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current (latest) version of a secret, materialized
    /// with its value. `Ok(None)` when the secret does not exist.
    async fn get_current_secret(&self, name: &str) -> Result<Option<SecretVersion>, VaultError>;

    /// List metadata for every stored version of a secret, without
    /// values. A nonexistent secret lists as empty, the same as a
    /// secret with zero versions.
    async fn list_secret_versions(&self, name: &str)
        -> Result<Vec<SecretProperties>, VaultError>;

    /// Fetch one specific version of a secret, materialized with its
    /// value. `Ok(None)` when the secret or version does not exist.
    async fn get_secret_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<SecretVersion>, VaultError>;

    /// Fetch the current certificate bundle. `Ok(None)` when absent.
    async fn get_certificate(&self, name: &str)
        -> Result<Option<CertificateBundle>, VaultError>;

    /// List name/metadata pairs for every secret in the vault.
    async fn list_secrets(&self) -> Result<Vec<SecretProperties>, VaultError>;

    /// Create or update a secret's value (a new version in versioned
    /// stores).
    async fn set_secret(&self, name: &str, value: &Secret<String>) -> Result<(), VaultError>;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;

    /// Check that the backend is reachable and credentials work
    async fn health_check(&self) -> Result<(), VaultError> {
        Ok(())
    }
}
