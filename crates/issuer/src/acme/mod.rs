//! ACME account handling and order finalization
//!
//! # Components
//!
//! - [`AccountKey`]: RSA account key with its public JWK and thumbprint
//! - [`AcmeClient`] / [`AcmeConnector`]: the protocol client contract
//! - [`AccountSessionManager`]: reuses or registers accounts per authority
//! - [`OrderFinalizer`]: finalizes orders and splits the issued chain
//! - [`AuthorityStore`]: persistence for newly created account material

mod account_key;
mod client;
mod error;
mod finalize;
mod session;
mod store;

pub use account_key::{AccountKey, AccountKeyError, Jwk};
pub use client::{
    AcmeClient, AcmeClientError, AcmeConnector, Authorization, AuthorizationStatus, Challenge,
    ChallengeResponse, ChallengeStatus, Identifier, NewRegistration, Order, Registration, DNS01,
};
pub use error::{IssuanceError, RecordFailure};
pub use finalize::{split_chain, IssuedCertificate, OrderFinalizer};
pub use session::{AccountSessionManager, AcmeSession};
pub use store::{AuthorityStore, FileAuthorityStore, MemoryAuthorityStore, StoreError};
