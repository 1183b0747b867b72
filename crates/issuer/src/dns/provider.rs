//! DNS provider plugin trait for DNS-01 challenges
//!
//! Defines the interface that all DNS provider plugins must implement.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Result type for DNS operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

/// Errors that can occur during DNS provider operations
#[derive(Debug, Error)]
pub enum DnsProviderError {
    /// Authentication failed with the DNS provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Record creation failed
    #[error("Failed to create TXT record '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    /// Record deletion failed
    #[error("Failed to delete TXT record for change '{change_id}': {message}")]
    RecordDeletion { change_id: String, message: String },

    /// The provider reported the change as failed
    #[error("Change '{change_id}' failed to propagate: {message}")]
    Propagation { change_id: String, message: String },

    /// The change did not propagate in time
    #[error("Change '{change_id}' did not propagate within {elapsed_secs}s")]
    PropagationTimeout { change_id: String, elapsed_secs: u64 },

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Request timeout
    #[error("Request timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Trait for DNS provider plugins that support DNS-01 challenges
///
/// One plugin instance is shared read-only across every host and provider
/// account it serves, so implementations must be thread-safe. The account
/// identifier selects the provider account for providers that host several.
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Returns the plugin name
    fn name(&self) -> &str;

    /// Create a TXT record for a DNS-01 challenge
    ///
    /// # Arguments
    ///
    /// * `name` - Fully qualified record name (`_acme-challenge.<host>`)
    /// * `value` - The challenge validation value
    /// * `account_id` - Provider account, if the provider needs one
    ///
    /// # Returns
    ///
    /// A change identifier used to wait for propagation and to delete the
    /// record later
    async fn create_txt_record(
        &self,
        name: &str,
        value: &str,
        account_id: Option<&str>,
    ) -> DnsResult<String>;

    /// Block until the change has propagated
    ///
    /// Errors are fatal for the issuance and are not retried by the caller.
    async fn wait_for_dns_change(&self, change_id: &str, account_id: Option<&str>)
        -> DnsResult<()>;

    /// Delete a TXT record created by `create_txt_record`
    ///
    /// # Implementation Notes
    ///
    /// - Should not error if the record doesn't exist (idempotent)
    /// - Called during cleanup, even if validation failed
    async fn delete_txt_record(
        &self,
        change_id: &str,
        account_id: Option<&str>,
        name: &str,
        value: &str,
    ) -> DnsResult<()>;

    /// List the zones visible to the account
    async fn get_zones(&self, account_id: Option<&str>) -> DnsResult<Vec<String>>;
}

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// Recommended TTL for challenge records (60 seconds)
pub const CHALLENGE_TTL: u32 = 60;
