//! ACME client contract
//!
//! The ACME protocol state machine (JWS signing, nonces, polling) lives
//! behind [`AcmeClient`]; this module defines the objects exchanged with it
//! and the DNS-01 challenge computations that only need the account key.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;

use super::account_key::{AccountKey, Jwk};
use crate::dns::provider::ACME_CHALLENGE_RECORD;

/// DNS-01 challenge type
pub const DNS01: &str = "dns-01";

/// Errors surfaced by an ACME client
#[derive(Debug, Clone, Error)]
pub enum AcmeClientError {
    /// The server answered with an ACME problem document
    #[error("ACME server error: {0}")]
    Server(String),

    /// An operation did not complete before its deadline
    #[error("ACME request timed out: {0}")]
    Timeout(String),

    /// The server rejected a challenge or the order became invalid
    #[error("ACME validation error: {0}")]
    Validation(String),

    /// The directory or an endpoint could not be reached
    #[error("ACME network error: {0}")]
    Network(String),
}

impl AcmeClientError {
    /// Whether repeating the operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AcmeClientError::Server(_) | AcmeClientError::Timeout(_) | AcmeClientError::Network(_)
        )
    }
}

/// Identifier an authorization is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            kind: "dns".to_string(),
            value: value.into(),
        }
    }
}

/// Authorization status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    #[default]
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// Challenge status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    #[default]
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// One challenge offered by an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub token: String,
    #[serde(default)]
    pub status: ChallengeStatus,
}

impl Challenge {
    pub fn dns01(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            kind: DNS01.to_string(),
            url: url.into(),
            token: token.into(),
            status: ChallengeStatus::Pending,
        }
    }

    pub fn is_dns01(&self) -> bool {
        self.kind == DNS01
    }

    /// Name of the TXT record that proves control of `host`
    pub fn validation_domain_name(&self, host: &str) -> String {
        format!("{}.{}", ACME_CHALLENGE_RECORD, host)
    }

    /// `token.thumbprint`
    pub fn key_authorization(&self, key: &AccountKey) -> String {
        format!("{}.{}", self.token, key.thumbprint())
    }

    /// TXT record value: base64url SHA-256 of the key authorization
    pub fn validation(&self, key: &AccountKey) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.key_authorization(key).as_bytes()))
    }

    /// Response submitted to the server for this challenge
    pub fn response(&self, key: &AccountKey) -> ChallengeResponse {
        ChallengeResponse {
            key_authorization: self.key_authorization(key),
        }
    }
}

/// Response to a DNS-01 challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub key_authorization: String,
}

impl ChallengeResponse {
    /// Check the response locally before it is submitted.
    ///
    /// The key authorization must be `token.thumbprint` for this challenge and
    /// the account's public key, and the token must be well-formed base64url.
    /// Does not query DNS; `domain` is carried for logging only.
    pub fn simple_verify(&self, challenge: &Challenge, domain: &str, public_jwk: &Jwk) -> bool {
        if !challenge.is_dns01() || !is_base64url_token(&challenge.token) {
            tracing::debug!(domain = %domain, "Challenge token is not a valid DNS-01 token");
            return false;
        }

        let Some((token, thumbprint)) = self.key_authorization.split_once('.') else {
            return false;
        };
        token == challenge.token && thumbprint == public_jwk.thumbprint()
    }
}

fn is_base64url_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// ACME authorization for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub url: String,
    pub identifier: Identifier,
    #[serde(default)]
    pub status: AuthorizationStatus,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    /// Set when the authorization was created for a `*.` name
    #[serde(default)]
    pub wildcard: bool,
}

/// ACME order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub url: String,
    pub authorizations: Vec<Authorization>,
    /// Leaf followed by intermediates, once the order is complete
    #[serde(default)]
    pub fullchain_pem: Option<String>,
}

/// Registered account resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub body: Value,
    pub uri: String,
}

impl Registration {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            body: Value::Object(Default::default()),
            uri: uri.into(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Stored form: `{"body":{},"uri":"..."}`; the body is not persisted
    pub fn to_stored_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Registration::new(self.uri.clone()))
    }
}

/// New-account request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    pub contact: Vec<String>,
    pub terms_of_service_agreed: bool,
}

impl NewRegistration {
    /// Account request with an optional `mailto:` contact, agreeing to the terms
    pub fn from_email(email: Option<&str>) -> Self {
        Self {
            contact: email
                .filter(|email| !email.is_empty())
                .map(|email| vec![format!("mailto:{}", email)])
                .unwrap_or_default(),
            terms_of_service_agreed: true,
        }
    }
}

/// A client bound to one account on one ACME directory
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Register the account and accept the terms of service
    async fn new_account_and_tos(
        &self,
        registration: NewRegistration,
    ) -> Result<Registration, AcmeClientError>;

    /// Create an order for the identifiers in a CSR
    async fn new_order(&self, csr_pem: &str) -> Result<Order, AcmeClientError>;

    /// Refresh an authorization
    async fn poll(&self, authorization: &Authorization) -> Result<Authorization, AcmeClientError>;

    /// Wait for the order to become ready, finalize it and fetch the chain.
    ///
    /// Progress is written into `order` even when an error is returned.
    async fn poll_and_finalize(
        &self,
        order: &mut Order,
        deadline: Instant,
    ) -> Result<(), AcmeClientError>;

    /// Submit a challenge response
    async fn answer_challenge(
        &self,
        challenge: &Challenge,
        response: &ChallengeResponse,
    ) -> Result<Challenge, AcmeClientError>;
}

/// Binds clients to accounts
#[async_trait]
pub trait AcmeConnector: Send + Sync {
    /// Connect to `directory_url` with `key`, optionally as an existing account
    async fn connect(
        &self,
        directory_url: &str,
        key: Arc<AccountKey>,
        account: Option<Registration>,
    ) -> Result<Arc<dyn AcmeClient>, AcmeClientError>;
}
