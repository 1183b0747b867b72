//! Provider and plugin reference checks

use std::collections::HashSet;

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::Config;

/// Validate plugin definitions, provider references and the acme block
pub fn validate_providers(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let mut plugin_names = HashSet::new();
    for plugin in &config.plugins {
        if !plugin_names.insert(plugin.name.as_str()) {
            result.add_error(ValidationError::new(
                ErrorCategory::Provider,
                format!("Plugin '{}' is defined more than once", plugin.name),
            ));
        }

        let crate::PluginKind::Webhook(ref webhook) = plugin.kind;
        if let Err(e) = url::Url::parse(&webhook.url) {
            result.add_error(ValidationError::new(
                ErrorCategory::Provider,
                format!("Plugin '{}' has an invalid url '{}': {}", plugin.name, webhook.url, e),
            ));
        }
    }

    let mut provider_ids = HashSet::new();
    for provider in &config.dns_providers {
        if !provider_ids.insert(provider.id.as_str()) {
            result.add_error(ValidationError::new(
                ErrorCategory::Provider,
                format!("DNS provider '{}' is defined more than once", provider.id),
            ));
        }

        if !plugin_names.contains(provider.provider_type.as_str()) {
            result.add_error(ValidationError::new(
                ErrorCategory::Provider,
                format!(
                    "DNS provider '{}' references undeclared plugin '{}'",
                    provider.id, provider.provider_type
                ),
            ));
        }

        if let Err(e) = provider.credential_options() {
            result.add_error(ValidationError::new(
                ErrorCategory::Provider,
                format!(
                    "DNS provider '{}' credentials are not a JSON object: {}",
                    provider.id, e
                ),
            ));
        }

        for domain in &provider.domains {
            if domain.is_empty() || domain.starts_with('.') || domain.starts_with("*.") {
                result.add_error(ValidationError::new(
                    ErrorCategory::Provider,
                    format!(
                        "DNS provider '{}' has an invalid domain suffix '{}'",
                        provider.id, domain
                    ),
                ));
            }
        }
    }

    if config.acme.retry.max_attempts == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Logic,
            "acme retry 'max-attempts' must be at least 1",
        ));
    }

    if config.acme.issuance_timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Logic,
            "acme 'issuance-timeout-secs' must be greater than zero",
        ));
    }

    if let Err(e) = url::Url::parse(&config.acme.directory_url) {
        result.add_error(ValidationError::new(
            ErrorCategory::Schema,
            format!(
                "acme 'directory-url' is not a valid URL '{}': {}",
                config.acme.directory_url, e
            ),
        ));
    }

    result
}
