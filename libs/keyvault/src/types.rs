//! Domain types for secrets and certificates
//!
//! These are read-only projections of data owned by the remote vault.
//! Wire formats live with the store implementations; nothing here
//! depends on a particular backend.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};

/// Metadata for one version of a named secret.
///
/// Listing APIs return these without the secret value; a separate
/// materialize step is required to read the value itself.
#[derive(Debug, Clone)]
pub struct SecretProperties {
    /// Secret name, shared across all versions
    pub name: String,
    /// Version identifier, unique within `name`. Absent for entries
    /// coming from a listing of secret *names* (no version there).
    pub version: Option<String>,
    /// Whether the store reports this version as enabled
    pub enabled: bool,
    /// Activation lower bound; absent means unbounded
    pub not_before: Option<DateTime<Utc>>,
    /// Activation upper bound; absent means unbounded
    pub expires_on: Option<DateTime<Utc>>,
    /// Creation timestamp, used to order versions
    pub created_on: Option<DateTime<Utc>>,
}

impl SecretProperties {
    /// A version is usable at `at` iff it is enabled and `at` falls
    /// inside its `[not_before, expires_on]` window. A missing bound
    /// is unbounded on that side.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.enabled
            && self.not_before.map_or(true, |nbf| nbf <= at)
            && self.expires_on.map_or(true, |exp| exp >= at)
    }
}

/// One version of a secret, optionally materialized with its value.
#[derive(Debug, Clone)]
pub struct SecretVersion {
    pub properties: SecretProperties,
    /// Present only when the version has been materialized
    pub value: Option<Secret<String>>,
}

impl SecretVersion {
    /// The stored value, or the empty string when absent.
    ///
    /// Empty string is the library's uniform "no usable secret" signal;
    /// it is indistinguishable from a secret whose stored value is
    /// genuinely empty.
    pub fn value_or_empty(&self) -> String {
        self.value
            .as_ref()
            .map(|v| v.expose_secret().clone())
            .unwrap_or_default()
    }
}

/// A certificate bundle as returned by the vault's "current" notion.
///
/// Opaque to the resolver: no version fallback is applied to
/// certificates.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub name: String,
    pub version: Option<String>,
    /// DER-encoded certificate
    pub cer: Vec<u8>,
    /// Thumbprint as reported by the store
    pub thumbprint: Option<String>,
    pub expires_on: Option<DateTime<Utc>>,
}

/// Write payload for creating or updating a secret
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub name: String,
    pub value: Secret<String>,
}

impl NewSecret {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Secret::new(value.into()),
        }
    }
}
