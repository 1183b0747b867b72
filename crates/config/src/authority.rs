//! Certificate authority option lists
//!
//! Authorities are stored externally with their options as an ordered JSON
//! list of `{"name": ..., "value": ...}` pairs. Account material created for
//! an authority is appended to that list when the authority asks for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use zonecert_common::AuthorityId;

/// Option holding the stored account key
pub const ACME_PRIVATE_KEY_OPTION: &str = "acme_private_key";
/// Option holding the stored account registration
pub const ACME_REGR_OPTION: &str = "acme_regr";
/// Option requesting that a newly created account be persisted
pub const STORE_ACCOUNT_OPTION: &str = "store_account";
/// Contact email option
pub const EMAIL_OPTION: &str = "email";
/// Contact phone option
pub const TELEPHONE_OPTION: &str = "telephone";
/// ACME directory option
pub const ACME_URL_OPTION: &str = "acme_url";

/// One `{name, value}` option pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// Ordered option list of an authority
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityOptions(Vec<AuthorityOption>);

impl AuthorityOptions {
    pub fn new(options: Vec<AuthorityOption>) -> Self {
        Self(options)
    }

    /// Parse the stored JSON list
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize back to the stored JSON list
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthorityOption> {
        self.0.iter()
    }

    /// Append an option, keeping earlier entries untouched
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.push(AuthorityOption {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Non-empty string value of the last option called `name`
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|option| option.name == name)
            .and_then(|option| option.value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Whether newly created account material should be stored.
    ///
    /// Accepts a JSON boolean or the strings `"true"`/`"1"`; absent means no.
    pub fn store_account(&self) -> bool {
        match self
            .0
            .iter()
            .rev()
            .find(|option| option.name == STORE_ACCOUNT_OPTION)
            .map(|option| &option.value)
        {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1"),
            _ => false,
        }
    }
}

/// A certificate authority as seen by the issuer
#[derive(Debug, Clone, PartialEq)]
pub struct Authority {
    pub id: AuthorityId,
    pub name: String,
    /// `None` when the authority was stored without options
    pub options: Option<AuthorityOptions>,
}

impl Authority {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: AuthorityId::new(id),
            name: name.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: AuthorityOptions) -> Self {
        self.options = Some(options);
        self
    }
}
