//! ACME account keys
//!
//! An account key is an RSA-2048 key pair. Its public half is exposed as a
//! JSON Web Key so that challenge responses can be computed and verified
//! locally, and the whole key round-trips through the JSON form stored in
//! authority options (`{"kty":"RSA","pem":"..."}`).

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rcgen::{KeyPair, PublicKeyData, RsaKeySize, PKCS_RSA_SHA256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

const KEY_TYPE_RSA: &str = "RSA";

/// Errors raised while generating or loading an account key
#[derive(Debug, Error)]
pub enum AccountKeyError {
    #[error("Failed to generate account key: {0}")]
    Generation(String),

    #[error("Invalid account key: {0}")]
    Invalid(String),

    #[error("Unsupported account key type '{0}', expected RSA")]
    UnsupportedKeyType(String),

    #[error("Malformed stored account key: {0}")]
    Json(#[from] serde_json::Error),
}

/// Public RSA key in JSON Web Key form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub e: String,
    pub kty: String,
    pub n: String,
}

impl Jwk {
    /// Build from big-endian modulus and exponent bytes
    pub fn from_rsa_components(modulus: &[u8], exponent: &[u8]) -> Self {
        Self {
            e: URL_SAFE_NO_PAD.encode(strip_leading_zeros(exponent)),
            kty: KEY_TYPE_RSA.to_string(),
            n: URL_SAFE_NO_PAD.encode(strip_leading_zeros(modulus)),
        }
    }

    /// RFC 7638 thumbprint: base64url SHA-256 of the canonical member set
    pub fn thumbprint(&self) -> String {
        // Members in lexicographic order, no whitespace
        let canonical = format!(
            r#"{{"e":"{}","kty":"{}","n":"{}"}}"#,
            self.e, self.kty, self.n
        );
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Stored form of an account key
#[derive(Serialize, Deserialize)]
struct StoredAccountKey {
    kty: String,
    pem: String,
}

/// An ACME account key pair
pub struct AccountKey {
    key_pair: KeyPair,
    jwk: Jwk,
}

impl AccountKey {
    /// Generate a fresh RSA-2048 account key
    pub fn generate() -> Result<Self, AccountKeyError> {
        let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048)
            .map_err(|e| AccountKeyError::Generation(e.to_string()))?;
        Self::from_key_pair(key_pair)
    }

    /// Load an RSA private key from PKCS#8 PEM
    pub fn from_pem(pem: &str) -> Result<Self, AccountKeyError> {
        let key_pair = KeyPair::from_pem_and_sign_algo(pem, &PKCS_RSA_SHA256)
            .map_err(|e| AccountKeyError::Invalid(e.to_string()))?;
        Self::from_key_pair(key_pair)
    }

    /// Load the stored JSON form
    pub fn from_json(json: &str) -> Result<Self, AccountKeyError> {
        let stored: StoredAccountKey = serde_json::from_str(json)?;
        if stored.kty != KEY_TYPE_RSA {
            return Err(AccountKeyError::UnsupportedKeyType(stored.kty));
        }
        Self::from_pem(&stored.pem)
    }

    /// Serialize to the stored JSON form. Contains private key material.
    pub fn to_json(&self) -> Result<String, AccountKeyError> {
        let stored = StoredAccountKey {
            kty: KEY_TYPE_RSA.to_string(),
            pem: self.key_pair.serialize_pem(),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    fn from_key_pair(key_pair: KeyPair) -> Result<Self, AccountKeyError> {
        let spki = key_pair.subject_public_key_info();
        let (_, info) = SubjectPublicKeyInfo::from_der(&spki)
            .map_err(|e| AccountKeyError::Invalid(format!("bad public key: {}", e)))?;

        let jwk = match info.parsed() {
            Ok(PublicKey::RSA(rsa)) => Jwk::from_rsa_components(rsa.modulus, rsa.exponent),
            Ok(_) => return Err(AccountKeyError::UnsupportedKeyType("non-RSA".to_string())),
            Err(e) => return Err(AccountKeyError::Invalid(format!("bad RSA key: {}", e))),
        };

        Ok(Self { key_pair, jwk })
    }

    /// Public key as a JWK
    pub fn public_jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// RFC 7638 thumbprint of the public key
    pub fn thumbprint(&self) -> String {
        self.jwk.thumbprint()
    }

    /// Signing key for JWS-producing ACME clients
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("kty", &self.jwk.kty)
            .field("thumbprint", &self.thumbprint())
            .finish_non_exhaustive()
    }
}
