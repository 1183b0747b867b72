//! DNS plugin registry
//!
//! Maps a provider `type` to the plugin instance serving it. New plugin types
//! are added by registration; callers only ever resolve by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use zonecert_config::PluginConfig;

use super::provider::{DnsProvider, DnsResult};
use super::providers::create_provider;
use crate::acme::IssuanceError;

/// Registered DNS plugins keyed by provider type
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    plugins: HashMap<String, Arc<dyn DnsProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding one plugin per definition
    pub fn from_plugins(plugins: &[PluginConfig]) -> DnsResult<Self> {
        let mut registry = Self::new();
        for plugin in plugins {
            let provider = create_provider(plugin)?;
            registry.register(&plugin.name, provider);
        }
        info!(plugins = registry.len(), "DNS plugin registry initialized");
        Ok(registry)
    }

    /// Register `plugin` under `provider_type`, replacing any previous entry
    pub fn register(&mut self, provider_type: impl Into<String>, plugin: Arc<dyn DnsProvider>) {
        let provider_type = provider_type.into();
        debug!(provider_type = %provider_type, plugin = %plugin.name(), "Registering DNS plugin");
        self.plugins.insert(provider_type, plugin);
    }

    /// Plugin serving `provider_type`
    pub fn resolve(&self, provider_type: &str) -> Result<Arc<dyn DnsProvider>, IssuanceError> {
        self.plugins
            .get(provider_type)
            .cloned()
            .ok_or_else(|| IssuanceError::UnknownProvider {
                provider_type: provider_type.to_string(),
            })
    }

    /// Registered provider types, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
