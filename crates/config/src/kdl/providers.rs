//! Plugin and DNS provider KDL parsing.

use anyhow::Result;
use tracing::trace;

use crate::dns_provider::{
    DnsProviderConfig, PluginConfig, PluginKind, WebhookPluginConfig, WEBHOOK_PLUGIN_TYPE,
};

use super::helpers::{
    get_arg_pair, get_first_arg_string, get_string_args, get_string_entry, get_u64_entry,
};

/// Parse a `plugin "<name>" { ... }` block
pub fn parse_plugin(node: &kdl::KdlNode) -> Result<PluginConfig> {
    let name = get_first_arg_string(node).ok_or_else(|| {
        anyhow::anyhow!("Plugin requires a name argument, e.g., plugin \"corp-dns\" {{ ... }}")
    })?;

    let plugin_type = get_string_entry(node, "type").ok_or_else(|| {
        anyhow::anyhow!(
            "Plugin '{}' requires a 'type' field, e.g., type \"{}\"",
            name,
            WEBHOOK_PLUGIN_TYPE
        )
    })?;

    trace!(plugin = %name, plugin_type = %plugin_type, "Parsing plugin");

    let kind = match plugin_type.as_str() {
        WEBHOOK_PLUGIN_TYPE => PluginKind::Webhook(parse_webhook(&name, node)?),
        other => {
            return Err(anyhow::anyhow!(
                "Invalid type '{}' for plugin '{}'. Valid types: {}",
                other,
                name,
                WEBHOOK_PLUGIN_TYPE
            ));
        }
    };

    Ok(PluginConfig { name, kind })
}

fn parse_webhook(name: &str, node: &kdl::KdlNode) -> Result<WebhookPluginConfig> {
    let url = get_string_entry(node, "url").ok_or_else(|| {
        anyhow::anyhow!(
            "Webhook plugin '{}' requires a 'url' field, e.g., url \"https://dns.internal/api\"",
            name
        )
    })?;

    let mut config = WebhookPluginConfig::new(url);
    config.token_env = get_string_entry(node, "token-env");
    if let Some(timeout) = get_u64_entry(node, "timeout-secs")? {
        config.timeout_secs = timeout;
    }

    if let Some(propagation) = node.children().and_then(|c| c.get("propagation")) {
        if let Some(interval) = get_u64_entry(propagation, "check-interval-secs")? {
            config.check_interval_secs = interval;
        }
        if let Some(timeout) = get_u64_entry(propagation, "timeout-secs")? {
            config.propagation_timeout_secs = timeout;
        }
    }

    Ok(config)
}

/// Parse a `dns-provider "<id>" { ... }` block
pub fn parse_dns_provider(node: &kdl::KdlNode) -> Result<DnsProviderConfig> {
    let id = get_first_arg_string(node).ok_or_else(|| {
        anyhow::anyhow!(
            "DNS provider requires an ID argument, e.g., dns-provider \"primary\" {{ ... }}"
        )
    })?;

    let provider_type = get_string_entry(node, "type").ok_or_else(|| {
        anyhow::anyhow!(
            "DNS provider '{}' requires a 'type' field naming a plugin, e.g., type \"corp-dns\"",
            id
        )
    })?;

    let mut provider = DnsProviderConfig::new(id.as_str(), provider_type)
        .with_domains(get_string_args(node, "domains"));

    if let Some(credentials) = get_string_entry(node, "credentials") {
        provider = provider.with_credentials(credentials);
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "option" {
                continue;
            }
            let (name, value) = get_arg_pair(child).ok_or_else(|| {
                anyhow::anyhow!(
                    "DNS provider '{}' option requires a name and a value, e.g., option \"acme_challenge_extension\" \"-acme\"",
                    id
                )
            })?;
            provider = provider.with_option(name, value);
        }
    }

    trace!(
        provider = %provider.id,
        provider_type = %provider.provider_type,
        domains = ?provider.domains,
        options = provider.options.len(),
        "Parsed DNS provider"
    );

    Ok(provider)
}
