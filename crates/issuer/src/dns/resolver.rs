//! Domain to provider resolution
//!
//! A provider is authoritative for a domain when one of its suffixes equals
//! the domain or is a dot-separated tail of it. The longest matching suffix
//! wins; providers matching with a suffix of the same length are all kept.

use std::sync::Arc;

use tracing::{debug, warn};

use zonecert_common::count_event;
use zonecert_config::DnsProviderConfig;

use crate::acme::IssuanceError;

/// Providers authoritative for `domain`, in configuration order.
///
/// An empty result is valid here; callers treat it as a failure for the
/// domain.
pub fn select_providers(
    domain: &str,
    providers: &[Arc<DnsProviderConfig>],
) -> Vec<Arc<DnsProviderConfig>> {
    let mut selected: Vec<Arc<DnsProviderConfig>> = Vec::new();
    let mut match_length = 0;

    for provider in providers {
        for suffix in &provider.domains {
            if suffix.is_empty() || !suffix_matches(domain, suffix) {
                continue;
            }

            if suffix.len() > match_length {
                selected.clear();
                selected.push(Arc::clone(provider));
                match_length = suffix.len();
            } else if suffix.len() == match_length
                && !selected.iter().any(|p| p.id == provider.id)
            {
                selected.push(Arc::clone(provider));
            }
        }
    }

    selected
}

fn suffix_matches(domain: &str, suffix: &str) -> bool {
    domain == suffix
        || domain
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'))
}

/// Providers selected for every domain of one issuance
#[derive(Debug, Clone, Default)]
pub struct DomainProviderMap {
    entries: Vec<(String, Vec<Arc<DnsProviderConfig>>)>,
}

impl DomainProviderMap {
    /// Resolve providers for each domain, failing on the first domain that
    /// no provider serves
    pub fn build(
        domains: &[String],
        providers: &[Arc<DnsProviderConfig>],
    ) -> Result<Self, IssuanceError> {
        let mut entries = Vec::with_capacity(domains.len());

        for domain in domains {
            let selected = select_providers(domain, providers);
            if selected.is_empty() {
                count_event("get_authorizations_no_dns_provider_for_domain");
                warn!(domain = %domain, "No DNS providers found for domain");
                return Err(IssuanceError::NoDnsProviders {
                    domain: domain.clone(),
                });
            }

            debug!(
                domain = %domain,
                providers = ?selected.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
                "Selected DNS providers"
            );
            entries.push((domain.clone(), selected));
        }

        Ok(Self { entries })
    }

    /// Providers selected for `domain`
    pub fn get(&self, domain: &str) -> Option<&[Arc<DnsProviderConfig>]> {
        self.entries
            .iter()
            .find(|(d, _)| d == domain)
            .map(|(_, providers)| providers.as_slice())
    }

    /// Domains in request order
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(domain, _)| domain.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Arc<DnsProviderConfig>])> {
        self.entries
            .iter()
            .map(|(domain, providers)| (domain.as_str(), providers.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
