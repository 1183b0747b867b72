//! DNS provider and plugin configuration
//!
//! A [`DnsProviderConfig`] is one account at a DNS service: which plugin type
//! drives it, its credential blob, and the domain suffixes it is
//! authoritative for. A [`PluginConfig`] defines a plugin instance that
//! providers refer to by name.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use zonecert_common::ProviderId;

/// Provider option holding a suffix appended to the validated host
pub const CHALLENGE_EXTENSION_OPTION: &str = "acme_challenge_extension";

/// Credential key carrying the provider account identifier
pub const ACCOUNT_ID_CREDENTIAL: &str = "account_id";

/// Built-in plugin type name for the HTTP webhook plugin
pub const WEBHOOK_PLUGIN_TYPE: &str = "webhook";

/// A configured DNS provider account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsProviderConfig {
    /// Provider identifier
    pub id: ProviderId,
    /// Plugin type (a registered plugin name)
    pub provider_type: String,
    /// Opaque credential blob, a JSON object
    #[serde(default = "empty_credentials")]
    pub credentials: String,
    /// Domain suffixes this provider is authoritative for, in order
    #[serde(default)]
    pub domains: Vec<String>,
    /// Provider-specific options
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn empty_credentials() -> String {
    "{}".to_string()
}

impl DnsProviderConfig {
    pub fn new(id: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(id),
            provider_type: provider_type.into(),
            credentials: empty_credentials(),
            domains: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = credentials.into();
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Parse the credential blob into key/value configuration
    pub fn credential_options(&self) -> Result<Map<String, Value>, serde_json::Error> {
        if self.credentials.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&self.credentials)
    }

    /// Account identifier from the credentials, if any.
    ///
    /// Numeric identifiers are rendered as strings.
    pub fn account_id(&self) -> Result<Option<String>, serde_json::Error> {
        let options = self.credential_options()?;
        Ok(match options.get(ACCOUNT_ID_CREDENTIAL) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Suffix appended to the validated host before deriving record names
    pub fn challenge_extension(&self) -> Option<&str> {
        self.options
            .get(CHALLENGE_EXTENSION_OPTION)
            .map(String::as_str)
            .filter(|ext| !ext.is_empty())
    }
}

/// A plugin instance definition
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// Name providers use as their `type`
    pub name: String,
    pub kind: PluginKind,
}

/// Supported plugin implementations
#[derive(Debug, Clone, PartialEq)]
pub enum PluginKind {
    /// Generic HTTP webhook
    Webhook(WebhookPluginConfig),
}

impl PluginKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            PluginKind::Webhook(_) => WEBHOOK_PLUGIN_TYPE,
        }
    }
}

/// Settings for the webhook plugin
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPluginConfig {
    /// Base URL of the webhook API
    pub url: String,
    /// Environment variable holding the bearer token
    pub token_env: Option<String>,
    /// API request timeout
    pub timeout_secs: u64,
    /// Interval between change status checks
    pub check_interval_secs: u64,
    /// Maximum time to wait for a change to propagate
    pub propagation_timeout_secs: u64,
}

impl WebhookPluginConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token_env: None,
            timeout_secs: 30,
            check_interval_secs: 5,
            propagation_timeout_secs: 120,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_secs(self.propagation_timeout_secs)
    }

    /// Read the bearer token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        self.token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|token| !token.is_empty())
    }
}
