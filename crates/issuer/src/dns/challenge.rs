//! DNS-01 challenge orchestration
//!
//! Drives one [`AuthorizationRecord`] per requested host through
//! record creation, propagation, local verification and submission, and
//! removes the validation records afterwards.
//!
//! Every record of every host is created and has propagated before any
//! challenge is verified or submitted. Hosts are processed concurrently
//! during creation and propagation.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use zonecert_common::{count_event, report_error, ProviderId};
use zonecert_config::DnsProviderConfig;

use super::provider::{DnsProvider, DnsProviderError};
use super::registry::ProviderRegistry;
use super::resolver::DomainProviderMap;
use crate::acme::{
    AcmeSession, Authorization, Challenge, ChallengeResponse, IssuanceError, Order, RecordFailure,
};

const WILDCARD_PREFIX: &str = "*.";

/// Strip a leading `*.`; the flag tells whether it was present
pub fn strip_wildcard(host: &str) -> (&str, bool) {
    match host.strip_prefix(WILDCARD_PREFIX) {
        Some(stripped) => (stripped, true),
        None => (host, false),
    }
}

/// Authorizations belonging to `host`.
///
/// Identifiers compare case-insensitively. A wildcard host only matches
/// wildcard authorizations and a plain host only plain ones.
pub fn authorizations_for(host: &str, authorizations: &[Authorization]) -> Vec<Authorization> {
    let (domain, is_wildcard) = strip_wildcard(host);
    authorizations
        .iter()
        .filter(|authz| authz.identifier.value.eq_ignore_ascii_case(domain))
        .filter(|authz| authz.wildcard == is_wildcard)
        .cloned()
        .collect()
}

/// DNS-01 challenges offered to `host`
pub fn dns_challenges_for(host: &str, authorizations: &[Authorization]) -> Vec<Challenge> {
    authorizations_for(host, authorizations)
        .into_iter()
        .flat_map(|authz| authz.challenges)
        .filter(Challenge::is_dns01)
        .collect()
}

/// Host name used to derive record names at `provider`
fn validation_host(host: &str, provider: &DnsProviderConfig) -> String {
    let (domain, _) = strip_wildcard(host);
    match provider.challenge_extension() {
        Some(extension) => format!("{}{}", domain, extension),
        None => domain.to_string(),
    }
}

/// Progress of one host through the challenge flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    PendingCreate,
    RecordsCreated,
    Verified,
    Submitted,
    Cleanup,
}

/// A validation record created at one provider
#[derive(Debug, Clone)]
pub struct RecordChange {
    pub provider_id: ProviderId,
    pub plugin: Arc<dyn DnsProvider>,
    pub account_id: Option<String>,
    pub change_id: String,
    pub record_name: String,
    pub value: String,
}

/// Challenge bookkeeping for one requested host
#[derive(Debug, Clone)]
pub struct AuthorizationRecord {
    /// Requested host, possibly `*.`-prefixed
    pub host: String,
    pub authorizations: Vec<Authorization>,
    pub dns_challenges: Vec<Challenge>,
    /// Records created for this host, across all of its providers
    pub changes: Vec<RecordChange>,
    pub state: ChallengeState,
}

impl AuthorizationRecord {
    fn new(host: &str, order: &Order) -> Self {
        let authorizations = authorizations_for(host, &order.authorizations);
        let dns_challenges = authorizations
            .iter()
            .flat_map(|authz| authz.challenges.iter())
            .filter(|challenge| challenge.is_dns01())
            .cloned()
            .collect();

        Self {
            host: host.to_string(),
            authorizations,
            dns_challenges,
            changes: Vec::new(),
            state: ChallengeState::PendingCreate,
        }
    }
}

/// Outcome of a best-effort cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempted: usize,
    pub deleted: usize,
    pub failures: Vec<RecordFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Creates, verifies, submits and removes DNS-01 validation records
#[derive(Debug, Clone)]
pub struct ChallengeOrchestrator {
    registry: Arc<ProviderRegistry>,
    settle_delay: Duration,
}

impl ChallengeOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, settle_delay: Duration) -> Self {
        Self {
            registry,
            settle_delay,
        }
    }

    /// Create validation records for every host in `map`.
    ///
    /// Records are appended to `records` even when creation fails part way,
    /// so that the caller can clean up whatever was created.
    pub async fn start_challenges(
        &self,
        session: &AcmeSession,
        order: &Order,
        map: &DomainProviderMap,
        records: &mut Vec<AuthorizationRecord>,
    ) -> Result<(), IssuanceError> {
        let outcomes = join_all(map.iter().map(|(host, providers)| async move {
            let mut record = AuthorizationRecord::new(host, order);
            let result = self.create_records(session, providers, &mut record).await;
            (record, result)
        }))
        .await;

        let mut first_error = None;
        for (record, result) in outcomes {
            records.push(record);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn create_records(
        &self,
        session: &AcmeSession,
        providers: &[Arc<DnsProviderConfig>],
        record: &mut AuthorizationRecord,
    ) -> Result<(), IssuanceError> {
        debug!(host = %record.host, "Starting DNS challenge");

        if record.dns_challenges.is_empty() {
            let err = IssuanceError::NoChallenges {
                host: record.host.clone(),
            };
            report_error(
                "start_dns_challenge_error_no_dns_challenges",
                &err,
                &[("host", &record.host)],
            );
            return Err(err);
        }

        for provider in providers {
            let plugin = self.registry.resolve(&provider.provider_type)?;
            let account_id =
                provider
                    .account_id()
                    .map_err(|source| IssuanceError::ProviderCredentials {
                        provider_id: provider.id.clone(),
                        source,
                    })?;
            let host = validation_host(&record.host, provider);

            for challenge in &record.dns_challenges {
                let record_name = challenge.validation_domain_name(&host);
                let value = challenge.validation(session.key());

                let change_id = plugin
                    .create_txt_record(&record_name, &value, account_id.as_deref())
                    .await
                    .map_err(|source| IssuanceError::DnsProvider {
                        provider_id: provider.id.clone(),
                        target: record_name.clone(),
                        source,
                    })?;

                debug!(
                    host = %record.host,
                    provider = %provider.id,
                    record_name = %record_name,
                    change_id = %change_id,
                    "Created DNS validation record"
                );

                record.changes.push(RecordChange {
                    provider_id: provider.id.clone(),
                    plugin: Arc::clone(&plugin),
                    account_id: account_id.clone(),
                    change_id,
                    record_name,
                    value,
                });
            }
        }

        record.state = ChallengeState::RecordsCreated;
        Ok(())
    }

    /// Wait for every record to propagate, then verify and submit every
    /// challenge.
    ///
    /// Propagation is bounded by `deadline`. All responses are verified
    /// locally before the first one is submitted.
    pub async fn complete_challenges(
        &self,
        session: &AcmeSession,
        records: &mut [AuthorizationRecord],
        deadline: Instant,
    ) -> Result<(), IssuanceError> {
        let waits = records.iter().flat_map(|record| {
            record
                .changes
                .iter()
                .map(move |change| wait_for_change(&record.host, change))
        });

        match timeout_at(deadline, try_join_all(waits)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let err = IssuanceError::DeadlineExceeded {
                    stage: "propagation",
                };
                report_error("complete_dns_challenge_error", &err, &[]);
                return Err(err);
            }
        }
        info!(hosts = records.len(), "DNS validation records propagated");

        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }

        let key = session.key();
        let mut responses: Vec<(usize, Challenge, ChallengeResponse)> = Vec::new();
        for (index, record) in records.iter().enumerate() {
            for challenge in &record.dns_challenges {
                let response = challenge.response(key);
                if !response.simple_verify(challenge, &record.host, key.public_jwk()) {
                    count_event("complete_dns_challenge_verification_error");
                    warn!(host = %record.host, challenge = %challenge.url, "Failed verification");
                    return Err(IssuanceError::VerificationFailed {
                        host: record.host.clone(),
                    });
                }
                responses.push((index, challenge.clone(), response));
            }
        }
        for record in records.iter_mut() {
            record.state = ChallengeState::Verified;
        }

        for (index, challenge, response) in &responses {
            let result = session.client().answer_challenge(challenge, response).await?;
            debug!(
                host = %records[*index].host,
                challenge = %result.url,
                status = ?result.status,
                "Challenge response submitted"
            );
        }
        for record in records.iter_mut() {
            record.state = ChallengeState::Submitted;
        }

        Ok(())
    }

    /// Delete every validation record after a successful order.
    ///
    /// All deletions are attempted; any failure is returned once the rest
    /// have been tried. Records that could not be deleted stay in
    /// `changes`.
    pub async fn teardown(&self, records: &mut [AuthorizationRecord]) -> Result<(), IssuanceError> {
        let mut failures = Vec::new();

        for record in records.iter_mut() {
            let mut remaining = Vec::new();
            for change in record.changes.drain(..) {
                match delete_change(&change).await {
                    Ok(()) => {
                        debug!(host = %record.host, change_id = %change.change_id, "Deleted DNS validation record");
                    }
                    Err(e) => {
                        report_error(
                            "teardown_dns_challenges_error",
                            &e,
                            &[("host", &record.host), ("change_id", &change.change_id)],
                        );
                        failures.push(failure(&record.host, &change, &e));
                        remaining.push(change);
                    }
                }
            }
            record.changes = remaining;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(IssuanceError::Teardown { failures })
        }
    }

    /// Best-effort deletion of every validation record after a failure.
    ///
    /// Never fails; problems are counted, logged and returned in the report.
    pub async fn cleanup(&self, records: &mut [AuthorizationRecord]) -> CleanupReport {
        let mut report = CleanupReport::default();

        for record in records.iter_mut() {
            record.state = ChallengeState::Cleanup;
            for change in record.changes.drain(..) {
                report.attempted += 1;
                match delete_change(&change).await {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        report_error(
                            "cleanup_dns_challenges_error",
                            &e,
                            &[("host", &record.host), ("change_id", &change.change_id)],
                        );
                        report.failures.push(failure(&record.host, &change, &e));
                    }
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                deleted = report.deleted,
                failed = report.failures.len(),
                "Cleaned up DNS validation records"
            );
        }
        report
    }
}

async fn wait_for_change(host: &str, change: &RecordChange) -> Result<(), IssuanceError> {
    change
        .plugin
        .wait_for_dns_change(&change.change_id, change.account_id.as_deref())
        .await
        .map_err(|source| {
            let err = IssuanceError::DnsProvider {
                provider_id: change.provider_id.clone(),
                target: change.change_id.clone(),
                source,
            };
            report_error(
                "complete_dns_challenge_error",
                &err,
                &[
                    ("host", host),
                    ("change_id", &change.change_id),
                    ("account_id", change.account_id.as_deref().unwrap_or("")),
                ],
            );
            err
        })
}

async fn delete_change(change: &RecordChange) -> Result<(), DnsProviderError> {
    change
        .plugin
        .delete_txt_record(
            &change.change_id,
            change.account_id.as_deref(),
            &change.record_name,
            &change.value,
        )
        .await
}

fn failure(host: &str, change: &RecordChange, error: &DnsProviderError) -> RecordFailure {
    RecordFailure {
        host: host.to_string(),
        provider_id: change.provider_id.clone(),
        change_id: change.change_id.clone(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::{AuthorizationStatus, Identifier};

    fn authz(domain: &str, wildcard: bool, challenges: Vec<Challenge>) -> Authorization {
        Authorization {
            url: format!("https://acme.test/authz/{}", domain),
            identifier: Identifier::dns(domain),
            status: AuthorizationStatus::Pending,
            challenges,
            wildcard,
        }
    }

    fn http01(token: &str) -> Challenge {
        Challenge {
            kind: "http-01".to_string(),
            ..Challenge::dns01("https://acme.test/chall/http", token)
        }
    }

    #[test]
    fn test_strip_wildcard() {
        assert_eq!(strip_wildcard("*.example.com"), ("example.com", true));
        assert_eq!(strip_wildcard("example.com"), ("example.com", false));
        assert_eq!(strip_wildcard("*example.com"), ("*example.com", false));
    }

    #[test]
    fn test_wildcard_flag_filters_authorizations() {
        let authorizations = vec![
            authz("example.com", false, vec![Challenge::dns01("https://acme.test/c/plain", "plain")]),
            authz("example.com", true, vec![Challenge::dns01("https://acme.test/c/wild", "wild")]),
        ];

        let wild = dns_challenges_for("*.example.com", &authorizations);
        assert_eq!(wild.len(), 1);
        assert_eq!(wild[0].token, "wild");

        let plain = dns_challenges_for("example.com", &authorizations);
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].token, "plain");
    }

    #[test]
    fn test_identifier_match_is_case_insensitive() {
        let authorizations = vec![authz(
            "Example.COM",
            false,
            vec![Challenge::dns01("https://acme.test/c/1", "tok")],
        )];
        assert_eq!(authorizations_for("example.com", &authorizations).len(), 1);
        assert!(authorizations_for("other.com", &authorizations).is_empty());
    }

    #[test]
    fn test_only_dns01_selected() {
        let authorizations = vec![authz(
            "example.com",
            false,
            vec![http01("h"), Challenge::dns01("https://acme.test/c/1", "d")],
        )];
        let challenges = dns_challenges_for("example.com", &authorizations);
        assert_eq!(challenges.len(), 1);
        assert!(challenges[0].is_dns01());

        let only_http = vec![authz("example.com", false, vec![http01("h")])];
        assert!(dns_challenges_for("example.com", &only_http).is_empty());
    }

    #[test]
    fn test_validation_host_applies_extension() {
        let plain = DnsProviderConfig::new("a", "webhook");
        assert_eq!(validation_host("*.example.com", &plain), "example.com");

        let extended = DnsProviderConfig::new("b", "webhook")
            .with_option(zonecert_config::CHALLENGE_EXTENSION_OPTION, ".validation.test");
        assert_eq!(
            validation_host("example.com", &extended),
            "example.com.validation.test"
        );
    }

    #[test]
    fn test_record_filters_order_authorizations() {
        let order = Order {
            url: "https://acme.test/order/1".to_string(),
            authorizations: vec![
                authz("example.com", false, vec![Challenge::dns01("https://acme.test/c/1", "a")]),
                authz("www.example.com", false, vec![Challenge::dns01("https://acme.test/c/2", "b")]),
            ],
            fullchain_pem: None,
        };

        let record = AuthorizationRecord::new("www.example.com", &order);
        assert_eq!(record.authorizations.len(), 1);
        assert_eq!(record.dns_challenges[0].token, "b");
        assert_eq!(record.state, ChallengeState::PendingCreate);
        assert!(record.changes.is_empty());
    }
}
