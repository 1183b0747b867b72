//! DNS provider plugin implementations
//!
//! Available plugins:
//! - [`WebhookProvider`] - Generic webhook for custom DNS management systems

mod webhook;

pub use webhook::WebhookProvider;

use std::sync::Arc;

use zonecert_config::{PluginConfig, PluginKind};

use super::provider::{DnsProvider, DnsResult};

/// Create a DNS provider plugin from its definition
pub fn create_provider(config: &PluginConfig) -> DnsResult<Arc<dyn DnsProvider>> {
    match &config.kind {
        PluginKind::Webhook(webhook) => {
            let provider = WebhookProvider::from_config(&config.name, webhook)?;
            Ok(Arc::new(provider))
        }
    }
}
