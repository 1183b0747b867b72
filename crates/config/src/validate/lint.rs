//! Configuration linting for best practices
//!
//! Checks configuration for missing best practices and potential issues.

use std::collections::BTreeMap;

use chrono::Utc;

use super::{ValidationResult, ValidationWarning};
use crate::defaults::LETSENCRYPT_STAGING;
use crate::Config;

/// Lint configuration for best practices
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let acme = &config.acme;

    if acme.email.is_none() {
        result.add_warning(ValidationWarning::new(
            "No default contact email (authorities must provide 'email' to register accounts)",
        ));
    }

    if acme.directory_url == LETSENCRYPT_STAGING {
        result.add_warning(ValidationWarning::new(
            "ACME directory is Let's Encrypt staging (certificates will not be trusted)",
        ));
    }

    if acme.private_key.is_some() != acme.registration.is_some() {
        result.add_warning(ValidationWarning::new(
            "Only one of 'private-key' and 'registration' is set; the default account will not be reused",
        ));
    }

    if acme.settle_delay_secs == 0 {
        result.add_warning(ValidationWarning::new(
            "Settle delay is 0 (challenges may be submitted before resolvers see the records)",
        ));
    }

    if let Some(ref over) = acme.cross_signed_chain {
        if !over.is_active(Utc::now()) {
            result.add_warning(ValidationWarning::new(format!(
                "Cross-signed chain override expired on {} and is ignored",
                over.expires
            )));
        }
    }

    if config.dns_providers.is_empty() {
        result.add_warning(ValidationWarning::new(
            "No DNS providers configured (every issuance will fail)",
        ));
    }

    // Suffixes served by more than one provider get records at each of them
    let mut suffix_owners: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for provider in &config.dns_providers {
        if provider.domains.is_empty() {
            result.add_warning(ValidationWarning::new(format!(
                "DNS provider '{}' has no domains and will never be selected",
                provider.id
            )));
        }
        for domain in &provider.domains {
            suffix_owners
                .entry(domain.as_str())
                .or_default()
                .push(provider.id.as_str());
        }
    }
    for (suffix, owners) in suffix_owners {
        if owners.len() > 1 {
            result.add_warning(ValidationWarning::new(format!(
                "Domain suffix '{}' is served by multiple providers ({}); records will be created at each",
                suffix,
                owners.join(", ")
            )));
        }
    }

    for plugin in &config.plugins {
        let crate::PluginKind::Webhook(ref webhook) = plugin.kind;
        if webhook.token_env.is_none() {
            result.add_warning(ValidationWarning::new(format!(
                "Plugin '{}' has no token-env (requests will be unauthenticated)",
                plugin.name
            )));
        }
        if webhook.url.starts_with("http://") {
            result.add_warning(ValidationWarning::new(format!(
                "Plugin '{}' uses plain HTTP",
                plugin.name
            )));
        }
    }

    result
}
