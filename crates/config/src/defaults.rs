//! Process-wide ACME defaults
//!
//! Values used when an authority's own options do not provide them: contact
//! details, the ACME directory, an optional shared account, and the
//! cross-signed chain override.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use zonecert_common::RetryPolicy;

/// Let's Encrypt production directory URL
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory URL
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Deadline for one issuance (propagation and finalization)
pub const DEFAULT_ISSUANCE_TIMEOUT_SECS: u64 = 360;

/// Pause between propagation confirmation and challenge submission
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;

/// Expiry applied to a cross-signed chain that does not declare one
pub const DEFAULT_CROSS_SIGN_EXPIRY: &str = "17/03/21";

/// Date format of the cross-sign expiry (`dd/mm/yy`)
pub const CROSS_SIGN_EXPIRY_FORMAT: &str = "%d/%m/%y";

/// Environment prefix for overrides, e.g. `ZONECERT_ACME_EMAIL`
pub const ENV_PREFIX: &str = "ZONECERT_ACME_";

/// Process-wide ACME settings
#[derive(Debug, Clone, PartialEq)]
pub struct AcmeDefaults {
    /// Default account contact email
    pub email: Option<String>,
    /// Default account contact phone
    pub telephone: Option<String>,
    /// Default ACME directory
    pub directory_url: String,
    /// Shared stored account key (JSON)
    pub private_key: Option<String>,
    /// Shared stored account registration (JSON)
    pub registration: Option<String>,
    /// Deadline for a single issuance
    pub issuance_timeout_secs: u64,
    /// Settling delay before submitting challenge responses
    pub settle_delay_secs: u64,
    /// Retry policy for account/session setup
    pub retry: RetryPolicy,
    /// Intermediate chain override
    pub cross_signed_chain: Option<CrossSignOverride>,
}

impl Default for AcmeDefaults {
    fn default() -> Self {
        Self {
            email: None,
            telephone: None,
            directory_url: LETSENCRYPT_PRODUCTION.to_string(),
            private_key: None,
            registration: None,
            issuance_timeout_secs: DEFAULT_ISSUANCE_TIMEOUT_SECS,
            settle_delay_secs: DEFAULT_SETTLE_DELAY_SECS,
            retry: RetryPolicy::default(),
            cross_signed_chain: None,
        }
    }
}

impl AcmeDefaults {
    pub fn issuance_timeout(&self) -> Duration {
        Duration::from_secs(self.issuance_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Apply `ZONECERT_ACME_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let overrides: AcmeEnvOverrides = envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("Invalid ZONECERT_ACME_* environment overrides")?;
        self.merge_overrides(overrides);
        Ok(())
    }

    /// Apply overrides from explicit `(KEY, value)` pairs (keys carry the prefix)
    pub fn apply_overrides_from<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: AcmeEnvOverrides = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context("Invalid ZONECERT_ACME_* overrides")?;
        self.merge_overrides(overrides);
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: AcmeEnvOverrides) {
        if let Some(email) = overrides.email {
            debug!("ACME email overridden from environment");
            self.email = Some(email);
        }
        if let Some(telephone) = overrides.telephone {
            self.telephone = Some(telephone);
        }
        if let Some(url) = overrides.directory_url {
            debug!(directory_url = %url, "ACME directory overridden from environment");
            self.directory_url = url;
        }
        if let Some(key) = overrides.private_key {
            self.private_key = Some(key);
        }
        if let Some(regr) = overrides.registration {
            self.registration = Some(regr);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AcmeEnvOverrides {
    email: Option<String>,
    telephone: Option<String>,
    directory_url: Option<String>,
    private_key: Option<String>,
    registration: Option<String>,
}

/// Substitute intermediate chain, honoured until `expires`.
///
/// Exists for interoperability with trust stores that only know a legacy
/// cross-signing root.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSignOverride {
    /// PEM chain returned instead of the CA-provided intermediates
    pub chain: String,
    /// First day on which the override no longer applies
    pub expires: NaiveDate,
}

impl CrossSignOverride {
    pub fn new(chain: impl Into<String>, expires: NaiveDate) -> Self {
        Self {
            chain: chain.into(),
            expires,
        }
    }

    /// Parse an expiry in `dd/mm/yy` form
    pub fn parse_expiry(value: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value, CROSS_SIGN_EXPIRY_FORMAT).with_context(|| {
            format!(
                "Invalid cross-signed chain expiry '{}', expected dd/mm/yy",
                value
            )
        })
    }

    /// True while `now` is strictly before midnight (UTC) of the expiry date
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.chain.is_empty() && now.date_naive() < self.expires
    }
}
