//! DNS-01 orchestration across DNS provider plugins
//!
//! - [`ProviderRegistry`] maps provider types to plugin instances
//! - [`select_providers`] / [`DomainProviderMap`] pick the authoritative
//!   providers per domain
//! - [`ChallengeOrchestrator`] creates, verifies, submits and removes
//!   validation records

pub mod challenge;
pub mod provider;
pub mod providers;
mod registry;
mod resolver;

pub use challenge::{
    authorizations_for, dns_challenges_for, strip_wildcard, AuthorizationRecord,
    ChallengeOrchestrator, ChallengeState, CleanupReport, RecordChange,
};
pub use provider::{DnsProvider, DnsProviderError, DnsResult, ACME_CHALLENGE_RECORD, CHALLENGE_TTL};
pub use providers::{create_provider, WebhookProvider};
pub use registry::ProviderRegistry;
pub use resolver::{select_providers, DomainProviderMap};
