//! Configuration module for zonecert
//!
//! Loads the KDL configuration: process-wide ACME defaults, DNS plugin
//! definitions and DNS provider accounts. Also owns the authority option
//! list format shared with the external authority store.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

pub mod authority;
pub mod defaults;
pub mod dns_provider;
pub mod kdl;
pub mod validate;

pub use authority::{
    Authority, AuthorityOption, AuthorityOptions, ACME_PRIVATE_KEY_OPTION, ACME_REGR_OPTION,
    ACME_URL_OPTION, EMAIL_OPTION, STORE_ACCOUNT_OPTION, TELEPHONE_OPTION,
};
pub use defaults::{
    AcmeDefaults, CrossSignOverride, LETSENCRYPT_PRODUCTION, LETSENCRYPT_STAGING,
};
pub use dns_provider::{
    DnsProviderConfig, PluginConfig, PluginKind, WebhookPluginConfig, ACCOUNT_ID_CREDENTIAL,
    CHALLENGE_EXTENSION_OPTION, WEBHOOK_PLUGIN_TYPE,
};
pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

/// Environment variable naming the default configuration file
pub const CONFIG_PATH_ENV: &str = "ZONECERT_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Process-wide ACME defaults
    pub acme: AcmeDefaults,
    /// DNS plugin definitions
    pub plugins: Vec<PluginConfig>,
    /// DNS provider accounts, in declaration order
    pub dns_providers: Vec<DnsProviderConfig>,
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        let config = match extension {
            "kdl" => Self::from_kdl(&content),
            _ => Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        }
        .with_context(|| format!("Invalid configuration in {:?}", path))?;

        info!(
            path = %path.display(),
            plugins = config.plugins.len(),
            dns_providers = config.dns_providers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load a KDL file and apply `ZONECERT_ACME_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.acme.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from KDL text
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content.parse().map_err(|e: ::kdl::KdlError| {
            let mut error_msg = String::new();
            error_msg.push_str("KDL configuration parse error:\n\n");

            let lines: Vec<&str> = content.lines().collect();
            for diagnostic in &e.diagnostics {
                let message = diagnostic
                    .message
                    .clone()
                    .unwrap_or_else(|| "invalid syntax".to_string());
                error_msg.push_str(&format!("  {}\n", message));

                let (line, col) = kdl::offset_to_line_col(content, diagnostic.span.offset());
                error_msg.push_str(&format!("\n  --> at line {}, column {}\n", line, col));
                if let Some(line_content) = lines.get(line.saturating_sub(1)) {
                    error_msg.push_str(&format!("{:>4} | {}\n", line, line_content));
                    error_msg.push_str(&format!("     | {}^\n", " ".repeat(col.saturating_sub(1))));
                }
                if let Some(ref help) = diagnostic.help {
                    error_msg.push_str(&format!("\n  Help: {}\n", help));
                }
            }

            if e.diagnostics.is_empty() {
                error_msg.push_str(&format!("  {}\n", e));
            }

            anyhow::anyhow!(error_msg)
        })?;

        let config = kdl::parse_kdl_document(doc)?;
        debug!(
            plugins = config.plugins.len(),
            dns_providers = config.dns_providers.len(),
            "Parsed KDL configuration"
        );
        Ok(config)
    }

    /// Run every check: references, the chain override, and lints
    pub fn validate(&self) -> ValidationResult {
        let mut result = validate::providers::validate_providers(self);
        result.merge(validate::certs::validate_certificates(self));
        result.merge(validate::lint::lint_config(self));
        result
    }

    /// Look up a DNS provider by id
    pub fn provider(&self, id: &str) -> Option<&DnsProviderConfig> {
        self.dns_providers.iter().find(|p| p.id.as_str() == id)
    }

    /// Look up a plugin definition by name
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Shared provider handles in declaration order
    pub fn provider_handles(&self) -> Vec<Arc<DnsProviderConfig>> {
        self.dns_providers.iter().cloned().map(Arc::new).collect()
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_kdl(s)
    }
}
