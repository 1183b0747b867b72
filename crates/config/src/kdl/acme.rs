//! ACME defaults KDL parsing.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::trace;

use zonecert_common::RetryPolicy;

use crate::defaults::{AcmeDefaults, CrossSignOverride, DEFAULT_CROSS_SIGN_EXPIRY};

use super::helpers::{get_string_entry, get_u64_entry};

/// Parse the `acme` configuration block
pub fn parse_acme_config(node: &kdl::KdlNode) -> Result<AcmeDefaults> {
    trace!("Parsing acme configuration block");

    let defaults = AcmeDefaults::default();
    let children = node.children();

    let retry = match children.and_then(|c| c.get("retry")) {
        Some(retry_node) => parse_retry(retry_node)?,
        None => defaults.retry,
    };

    let cross_signed_chain = match children.and_then(|c| c.get("cross-signed-chain")) {
        Some(chain_node) => Some(parse_cross_signed_chain(chain_node)?),
        None => None,
    };

    let config = AcmeDefaults {
        email: get_string_entry(node, "email"),
        telephone: get_string_entry(node, "telephone"),
        directory_url: get_string_entry(node, "directory-url")
            .unwrap_or(defaults.directory_url),
        private_key: get_string_entry(node, "private-key"),
        registration: get_string_entry(node, "registration"),
        issuance_timeout_secs: get_u64_entry(node, "issuance-timeout-secs")?
            .unwrap_or(defaults.issuance_timeout_secs),
        settle_delay_secs: get_u64_entry(node, "settle-delay-secs")?
            .unwrap_or(defaults.settle_delay_secs),
        retry,
        cross_signed_chain,
    };

    trace!(
        directory_url = %config.directory_url,
        issuance_timeout_secs = config.issuance_timeout_secs,
        settle_delay_secs = config.settle_delay_secs,
        retry_attempts = config.retry.max_attempts,
        cross_sign = config.cross_signed_chain.is_some(),
        "Parsed acme configuration"
    );

    Ok(config)
}

fn parse_retry(node: &kdl::KdlNode) -> Result<RetryPolicy> {
    let defaults = RetryPolicy::default();
    let max_attempts = match get_u64_entry(node, "max-attempts")? {
        Some(v) => u32::try_from(v).context("'max-attempts' is out of range")?,
        None => defaults.max_attempts,
    };
    let delay = get_u64_entry(node, "delay-secs")?
        .map(Duration::from_secs)
        .unwrap_or(defaults.delay);

    Ok(RetryPolicy::new(max_attempts, delay))
}

fn parse_cross_signed_chain(node: &kdl::KdlNode) -> Result<CrossSignOverride> {
    let chain = match (
        get_string_entry(node, "chain"),
        get_string_entry(node, "chain-file"),
    ) {
        (Some(_), Some(_)) => {
            return Err(anyhow::anyhow!(
                "cross-signed-chain accepts either 'chain' or 'chain-file', not both"
            ));
        }
        (Some(chain), None) => chain,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cross-signed chain file: {:?}", path))?,
        (None, None) => {
            return Err(anyhow::anyhow!(
                "cross-signed-chain requires a 'chain' or 'chain-file' field, e.g., chain-file \"/etc/zonecert/cross-signed.pem\""
            ));
        }
    };

    let expires = get_string_entry(node, "expires")
        .unwrap_or_else(|| DEFAULT_CROSS_SIGN_EXPIRY.to_string());
    let expires = CrossSignOverride::parse_expiry(&expires)?;

    Ok(CrossSignOverride::new(chain, expires))
}
