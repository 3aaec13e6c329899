//! Configuration for vault backends

use secrecy::Secret;

use crate::VaultError;

const DEFAULT_API_VERSION: &str = "7.4";

/// Configuration for the keyvault client
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Azure Key Vault configuration
    pub azure: AzureConfig,
}

impl VaultConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            azure: AzureConfig::from_env(),
        }
    }
}

/// Configuration for the Azure Key Vault backend
#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    /// Vault URL (e.g. https://my-vault.vault.azure.net)
    pub vault_url: Option<String>,
    /// Entra tenant for the client-credentials flow
    pub tenant_id: Option<String>,
    /// Client ID for service principal authentication
    pub client_id: Option<String>,
    /// Client secret for service principal authentication
    pub client_secret: Option<Secret<String>>,
    /// REST api-version; defaults to 7.4
    pub api_version: Option<String>,
}

impl AzureConfig {
    /// Load Azure configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            vault_url: std::env::var("AZURE_KEYVAULT_URL").ok(),
            tenant_id: std::env::var("AZURE_TENANT_ID").ok(),
            client_id: std::env::var("AZURE_CLIENT_ID").ok(),
            client_secret: std::env::var("AZURE_CLIENT_SECRET").ok().map(Secret::new),
            api_version: std::env::var("AZURE_KEYVAULT_API_VERSION").ok(),
        }
    }

    /// Check if the backend is fully configured
    pub fn is_configured(&self) -> bool {
        self.vault_url.is_some()
            && self.tenant_id.is_some()
            && self.client_id.is_some()
            && self.client_secret.is_some()
    }

    /// The vault URL without trailing slash. Fails fast when the URL is
    /// missing or blank; a client must never be constructed against an
    /// unnamed vault.
    pub fn vault_url(&self) -> Result<String, VaultError> {
        match self.vault_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url.trim_end_matches('/').to_string()),
            _ => Err(VaultError::InvalidConfig(
                "vault URL is required (set AZURE_KEYVAULT_URL)".to_string(),
            )),
        }
    }

    /// The REST api-version, defaulting to 7.4
    pub fn api_version(&self) -> String {
        self.api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_vault_url_fails_fast() {
        let config = AzureConfig {
            vault_url: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.vault_url(),
            Err(VaultError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_vault_url_fails_fast() {
        let config = AzureConfig::default();
        assert!(config.vault_url().is_err());
        assert!(!config.is_configured());
    }

    #[test]
    fn vault_url_is_normalized() {
        let config = AzureConfig {
            vault_url: Some("https://v.vault.azure.net/".to_string()),
            ..Default::default()
        };
        assert_eq!(config.vault_url().unwrap(), "https://v.vault.azure.net");
    }

    #[test]
    fn api_version_defaults() {
        assert_eq!(AzureConfig::default().api_version(), "7.4");
    }
}
