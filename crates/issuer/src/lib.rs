//! Zonecert issuer
//!
//! ACME DNS-01 certificate issuance across pluggable DNS providers.
//!
//! A [`CertificateIssuer`] resolves the authoritative DNS providers for each
//! requested domain, obtains an ACME account session, publishes the
//! validation records, answers the challenges and finalizes the order. The
//! records are removed afterwards whether issuance succeeds or fails.
//!
//! The ACME protocol client is supplied through [`acme::AcmeConnector`];
//! DNS providers are plugins implementing [`dns::DnsProvider`].

pub mod acme;
pub mod dns;
mod issuer;

pub use acme::{
    AccountSessionManager, AcmeSession, IssuanceError, IssuedCertificate, OrderFinalizer,
};
pub use dns::{ChallengeOrchestrator, DomainProviderMap, ProviderRegistry};
pub use issuer::{zones_for_provider, CertificateIssuer, CertificateRequest};
