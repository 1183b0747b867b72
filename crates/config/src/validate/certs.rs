//! Certificate validation
//!
//! Validates the cross-signed chain override: every block must be a parseable
//! X.509 certificate, and expired or soon-to-expire certificates are flagged.

use std::time::{Duration, SystemTime};

use chrono::Utc;

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;

/// Validate the cross-signed chain override, if configured
pub fn validate_certificates(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(ref over) = config.acme.cross_signed_chain else {
        return result;
    };

    if !over.is_active(Utc::now()) {
        // An inactive override is never served; lint reports it.
        return result;
    }

    let blocks = match pem::parse_many(over.chain.as_bytes()) {
        Ok(blocks) => blocks,
        Err(e) => {
            result.add_error(ValidationError::new(
                ErrorCategory::Certificate,
                format!("Failed to parse cross-signed chain: {}", e),
            ));
            return result;
        }
    };

    if blocks.is_empty() {
        result.add_error(ValidationError::new(
            ErrorCategory::Certificate,
            "Cross-signed chain contains no PEM blocks",
        ));
        return result;
    }

    for (index, block) in blocks.iter().enumerate() {
        if block.tag() != "CERTIFICATE" {
            result.add_error(ValidationError::new(
                ErrorCategory::Certificate,
                format!(
                    "Cross-signed chain block {} is a '{}', expected CERTIFICATE",
                    index,
                    block.tag()
                ),
            ));
            continue;
        }

        match check_expiry(index, block.contents()) {
            Ok(Some(warning)) => result.add_warning(warning),
            Ok(None) => {}
            Err(e) => result.add_error(e),
        }
    }

    result
}

/// Parse one chain certificate and check its expiry
fn check_expiry(index: usize, der: &[u8]) -> Result<Option<ValidationWarning>, ValidationError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Invalid X509 certificate in cross-signed chain block {}: {}", index, e),
        )
    })?;

    let now = SystemTime::now();
    let not_after = cert.validity().not_after.to_datetime().unix_timestamp();
    let expiry_time = SystemTime::UNIX_EPOCH + Duration::from_secs(not_after.max(0) as u64);

    if expiry_time < now {
        return Err(ValidationError::new(
            ErrorCategory::Certificate,
            format!(
                "Cross-signed chain certificate {} ({}) expired at {}",
                index,
                cert.subject(),
                cert.validity().not_after
            ),
        ));
    }

    // Warn if expiring within 30 days
    let thirty_days = Duration::from_secs(30 * 86400);
    if expiry_time < now + thirty_days {
        return Ok(Some(ValidationWarning::new(format!(
            "Cross-signed chain certificate {} ({}) expires soon (at {})",
            index,
            cert.subject(),
            cert.validity().not_after
        ))));
    }

    Ok(None)
}
