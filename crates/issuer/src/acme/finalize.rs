//! Order finalization
//!
//! Polls every authorization of an order, finalizes it against the issuance
//! deadline and splits the returned chain into the leaf and its
//! intermediates.

use chrono::Utc;
use pem::{EncodeConfig, LineEnding};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use zonecert_common::{count_event, report_error};
use zonecert_config::CrossSignOverride;

use super::client::{AcmeClientError, Order};
use super::error::IssuanceError;
use super::session::AcmeSession;
use crate::dns::challenge::AuthorizationRecord;

const PEM_CERTIFICATE_END: &str = "-----END CERTIFICATE-----";

/// Leaf certificate and intermediate chain of a finalized order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub chain_pem: String,
}

/// Finalizes orders once their challenges have been answered
#[derive(Debug, Clone, Default)]
pub struct OrderFinalizer {
    cross_sign: Option<CrossSignOverride>,
}

impl OrderFinalizer {
    pub fn new(cross_sign: Option<CrossSignOverride>) -> Self {
        Self { cross_sign }
    }

    /// Poll the records' authorizations, then finalize `order`.
    ///
    /// A validation error is tolerated when the order already carries its
    /// full chain. Every other failure is reported with the order URL.
    pub async fn finalize(
        &self,
        session: &AcmeSession,
        records: &[AuthorizationRecord],
        order: &mut Order,
        deadline: Instant,
    ) -> Result<IssuedCertificate, IssuanceError> {
        for record in records {
            for authorization in &record.authorizations {
                let polled = session.client().poll(authorization).await?;
                debug!(
                    host = %record.host,
                    authorization = %polled.url,
                    status = ?polled.status,
                    "Polled authorization"
                );
            }
        }

        let order_url = order.url.clone();
        let outcome = timeout_at(deadline, session.client().poll_and_finalize(order, deadline)).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(AcmeClientError::Validation(message))) if has_fullchain(order) => {
                warn!(
                    order_url = %order_url,
                    error = %message,
                    "Validation error after the order completed, using the returned chain"
                );
            }
            Ok(Err(source)) => {
                let err = IssuanceError::Finalization {
                    order_url: order_url.clone(),
                    source,
                };
                report_error("request_certificate_error", &err, &[("order_url", &order_url)]);
                return Err(err);
            }
            Err(_) => {
                let err = IssuanceError::DeadlineExceeded {
                    stage: "finalization",
                };
                report_error("request_certificate_error", &err, &[("order_url", &order_url)]);
                return Err(err);
            }
        }

        let fullchain = order
            .fullchain_pem
            .as_deref()
            .filter(|chain| !chain.trim().is_empty())
            .ok_or_else(|| IssuanceError::Certificate {
                order_url: order_url.clone(),
                reason: "order completed without a certificate chain".to_string(),
            })?;

        count_event("request_certificate_success");
        info!(order_url = %order_url, "Successfully resolved ACME order");

        let (certificate_pem, mut chain_pem) =
            split_chain(fullchain).map_err(|reason| IssuanceError::Certificate {
                order_url: order_url.clone(),
                reason,
            })?;

        if let Some(over) = self.cross_sign.as_ref().filter(|o| o.is_active(Utc::now())) {
            debug!(expires = %over.expires, "Substituting cross-signed intermediate chain");
            chain_pem = over.chain.clone();
        }

        Ok(IssuedCertificate {
            certificate_pem,
            chain_pem,
        })
    }
}

fn has_fullchain(order: &Order) -> bool {
    order
        .fullchain_pem
        .as_deref()
        .is_some_and(|chain| !chain.trim().is_empty())
}

/// Split a full chain into the canonical leaf PEM and the remaining chain
pub fn split_chain(fullchain: &str) -> Result<(String, String), String> {
    let blocks = pem::parse_many(fullchain).map_err(|e| format!("invalid PEM: {}", e))?;
    let leaf = blocks
        .first()
        .ok_or_else(|| "no PEM blocks in chain".to_string())?;

    if leaf.tag() != "CERTIFICATE" {
        return Err(format!("first PEM block is '{}', not CERTIFICATE", leaf.tag()));
    }
    x509_parser::parse_x509_certificate(leaf.contents())
        .map_err(|e| format!("leaf is not a valid X.509 certificate: {}", e))?;

    let certificate_pem =
        pem::encode_config(leaf, EncodeConfig::new().set_line_ending(LineEnding::LF));

    let chain_pem = fullchain
        .find(PEM_CERTIFICATE_END)
        .map(|pos| fullchain[pos + PEM_CERTIFICATE_END.len()..].trim_start().to_string())
        .unwrap_or_default();

    Ok((certificate_pem, chain_pem))
}
