//! Error types for certificate issuance

use std::fmt;

use thiserror::Error;

use zonecert_common::{AuthorityId, ProviderId};

use super::account_key::AccountKeyError;
use super::client::AcmeClientError;
use super::store::StoreError;
use crate::dns::provider::DnsProviderError;

/// Errors that can abort an issuance
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// The authority has no options
    #[error("Invalid authority '{authority_id}': options not set")]
    InvalidAuthority { authority_id: AuthorityId },

    /// A provider names a plugin type nobody registered
    #[error("No such DNS provider type: {provider_type}")]
    UnknownProvider { provider_type: String },

    /// A provider id is not configured
    #[error("DNS provider '{provider_id}' is not configured")]
    ProviderNotFound { provider_id: ProviderId },

    /// No provider's suffixes match a requested domain
    #[error("No DNS providers found for domain: {domain}")]
    NoDnsProviders { domain: String },

    /// The authorizations for a host offer no DNS-01 challenge
    #[error("Unable to determine DNS challenges from authorizations for {host}")]
    NoChallenges { host: String },

    /// A computed challenge response failed local verification
    #[error("Challenge response failed local verification for {host}")]
    VerificationFailed { host: String },

    /// A provider credential blob could not be parsed
    #[error("DNS provider '{provider_id}' credentials are invalid: {source}")]
    ProviderCredentials {
        provider_id: ProviderId,
        #[source]
        source: serde_json::Error,
    },

    /// A DNS provider plugin call failed
    #[error("DNS provider '{provider_id}' failed for {target}: {source}")]
    DnsProvider {
        provider_id: ProviderId,
        target: String,
        #[source]
        source: DnsProviderError,
    },

    /// The stored or generated account key is unusable
    #[error("ACME account key error: {0}")]
    AccountKey(#[from] AccountKeyError),

    /// The stored registration could not be parsed
    #[error("Stored ACME registration is invalid: {0}")]
    Registration(#[source] serde_json::Error),

    /// The ACME client failed
    #[error(transparent)]
    Acme(#[from] AcmeClientError),

    /// Order finalization failed
    #[error("Unable to resolve ACME order {order_url}: {source}")]
    Finalization {
        order_url: String,
        #[source]
        source: AcmeClientError,
    },

    /// The returned certificate chain could not be used
    #[error("Invalid certificate returned for order {order_url}: {reason}")]
    Certificate { order_url: String, reason: String },

    /// The issuance deadline passed
    #[error("Issuance deadline exceeded during {stage}")]
    DeadlineExceeded { stage: &'static str },

    /// Success-path record deletion failed at one or more providers
    #[error("Failed to delete {} DNS validation record(s): {}", failures.len(), DisplayFailures(failures))]
    Teardown { failures: Vec<RecordFailure> },

    /// New account material could not be saved
    #[error("Failed to persist ACME account for authority '{authority_id}': {source}")]
    Persistence {
        authority_id: AuthorityId,
        #[source]
        source: StoreError,
    },
}

impl IssuanceError {
    /// Transient account/session setup failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, IssuanceError::Acme(e) if e.is_transient())
    }
}

/// One failed record deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub host: String,
    pub provider_id: ProviderId,
    pub change_id: String,
    pub error: String,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at '{}' (change {}): {}",
            self.host, self.provider_id, self.change_id, self.error
        )
    }
}

struct DisplayFailures<'a>(&'a [RecordFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IssuanceError::Acme(AcmeClientError::Network("down".into())).is_retryable());
        assert!(!IssuanceError::Acme(AcmeClientError::Validation("bad".into())).is_retryable());
        assert!(!IssuanceError::InvalidAuthority {
            authority_id: AuthorityId::new("1")
        }
        .is_retryable());
        assert!(!IssuanceError::Persistence {
            authority_id: AuthorityId::new("1"),
            source: StoreError::NotFound("1".into()),
        }
        .is_retryable());
    }

    #[test]
    fn test_teardown_message_lists_failures() {
        let err = IssuanceError::Teardown {
            failures: vec![
                RecordFailure {
                    host: "example.com".into(),
                    provider_id: ProviderId::new("a"),
                    change_id: "c1".into(),
                    error: "boom".into(),
                },
                RecordFailure {
                    host: "example.com".into(),
                    provider_id: ProviderId::new("b"),
                    change_id: "c2".into(),
                    error: "gone".into(),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("Failed to delete 2 DNS validation record(s)"));
        assert!(message.contains("'a' (change c1): boom"));
        assert!(message.contains("'b' (change c2): gone"));
    }

    #[test]
    fn test_domain_in_message() {
        let err = IssuanceError::NoDnsProviders {
            domain: "nomatch.test".into(),
        };
        assert_eq!(err.to_string(), "No DNS providers found for domain: nomatch.test");
    }
}
