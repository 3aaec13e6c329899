//! Vault backend implementations

mod azure;

pub use azure::AzureStore;
