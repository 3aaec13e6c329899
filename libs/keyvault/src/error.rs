//! Error types for the keyvault library

use thiserror::Error;

/// Errors that can occur when resolving secrets or certificates
#[derive(Error, Debug)]
pub enum VaultError {
    /// Failed to connect to the vault
    #[error("Failed to connect to vault: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Secret or certificate not found
    ///
    /// Resolvers recover this locally (empty string / absent bundle);
    /// it never reaches callers of `get_secret_value` or
    /// `get_certificate_value`.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration (fails fast at construction)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Whether this error means the requested item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }
}
