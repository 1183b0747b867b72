//! Certificate issuance
//!
//! [`CertificateIssuer`] runs one DNS-01 issuance end to end: provider
//! resolution, account session, order creation, challenges, finalization
//! and record teardown. Any failure after records exist triggers a
//! best-effort cleanup before the error is returned.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use zonecert_common::IssuanceId;
use zonecert_config::{AcmeDefaults, Authority, Config, DnsProviderConfig};

use crate::acme::{
    AccountSessionManager, AcmeConnector, AcmeSession, AuthorityStore, IssuanceError,
    IssuedCertificate, Order, OrderFinalizer,
};
use crate::dns::{
    AuthorizationRecord, ChallengeOrchestrator, DnsProviderError, DomainProviderMap,
    ProviderRegistry,
};

/// A certificate to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub common_name: String,
    /// Subject alternative DNS names
    pub sans: Vec<String>,
    /// PEM-encoded CSR covering the common name and every SAN
    pub csr_pem: String,
}

impl CertificateRequest {
    pub fn new(common_name: impl Into<String>, csr_pem: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            sans: Vec::new(),
            csr_pem: csr_pem.into(),
        }
    }

    pub fn with_sans<I, S>(mut self, sans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sans = sans.into_iter().map(Into::into).collect();
        self
    }

    /// Requested domains: the common name first, then each new SAN in order
    pub fn domains(&self) -> Vec<String> {
        let mut domains = vec![self.common_name.clone()];
        for san in &self.sans {
            if !domains.contains(san) {
                domains.push(san.clone());
            }
        }
        domains
    }
}

/// Issues certificates through ACME DNS-01
pub struct CertificateIssuer {
    defaults: Arc<AcmeDefaults>,
    registry: Arc<ProviderRegistry>,
    providers: Vec<Arc<DnsProviderConfig>>,
    sessions: AccountSessionManager,
    orchestrator: ChallengeOrchestrator,
    finalizer: OrderFinalizer,
}

impl CertificateIssuer {
    pub fn new(
        defaults: AcmeDefaults,
        registry: ProviderRegistry,
        providers: Vec<Arc<DnsProviderConfig>>,
        connector: Arc<dyn AcmeConnector>,
        store: Arc<dyn AuthorityStore>,
    ) -> Self {
        let defaults = Arc::new(defaults);
        let registry = Arc::new(registry);

        Self {
            sessions: AccountSessionManager::new(connector, Arc::clone(&defaults), store),
            orchestrator: ChallengeOrchestrator::new(Arc::clone(&registry), defaults.settle_delay()),
            finalizer: OrderFinalizer::new(defaults.cross_signed_chain.clone()),
            defaults,
            registry,
            providers,
        }
    }

    /// Build an issuer from loaded configuration
    pub fn from_config(
        config: &Config,
        connector: Arc<dyn AcmeConnector>,
        store: Arc<dyn AuthorityStore>,
    ) -> Result<Self, DnsProviderError> {
        let registry = ProviderRegistry::from_plugins(&config.plugins)?;
        Ok(Self::new(
            config.acme.clone(),
            registry,
            config.provider_handles(),
            connector,
            store,
        ))
    }

    pub fn sessions(&self) -> &AccountSessionManager {
        &self.sessions
    }

    /// Issue a certificate for `request` under `authority`
    pub async fn issue(
        &self,
        authority: &Authority,
        request: &CertificateRequest,
    ) -> Result<IssuedCertificate, IssuanceError> {
        let issuance_id = IssuanceId::new();
        let domains = request.domains();
        info!(
            issuance_id = %issuance_id,
            authority = %authority.name,
            common_name = %request.common_name,
            domains = domains.len(),
            "Starting certificate issuance"
        );

        let map = DomainProviderMap::build(&domains, &self.providers)?;
        let (session, registration) = self.sessions.obtain_session(authority).await?;
        if let Some(registration) = &registration {
            debug!(account = %registration.uri, "Issuing with newly registered account");
        }

        let mut order = session.client().new_order(&request.csr_pem).await?;
        let deadline = Instant::now() + self.defaults.issuance_timeout();
        debug!(
            order_url = %order.url,
            directory_url = %session.directory_url(),
            "Created ACME order"
        );

        let mut records = Vec::new();
        let result = self
            .authorize_and_finalize(&session, &mut order, &map, &mut records, deadline)
            .await;

        match result {
            Ok(certificate) => {
                self.orchestrator.teardown(&mut records).await?;
                info!(
                    issuance_id = %issuance_id,
                    common_name = %request.common_name,
                    "Certificate issued"
                );
                Ok(certificate)
            }
            Err(e) => {
                let report = self.orchestrator.cleanup(&mut records).await;
                warn!(
                    issuance_id = %issuance_id,
                    common_name = %request.common_name,
                    error = %e,
                    cleaned = report.deleted,
                    cleanup_failures = report.failures.len(),
                    "Certificate issuance failed"
                );
                Err(e)
            }
        }
    }

    async fn authorize_and_finalize(
        &self,
        session: &AcmeSession,
        order: &mut Order,
        map: &DomainProviderMap,
        records: &mut Vec<AuthorizationRecord>,
        deadline: Instant,
    ) -> Result<IssuedCertificate, IssuanceError> {
        self.orchestrator
            .start_challenges(session, order, map, records)
            .await?;
        self.orchestrator
            .complete_challenges(session, records, deadline)
            .await?;
        self.finalizer
            .finalize(session, records, order, deadline)
            .await
    }

    /// Zones visible to the account of `provider_id`
    pub async fn zones_for(&self, provider_id: &str) -> Result<Vec<String>, IssuanceError> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.id.as_str() == provider_id)
            .ok_or_else(|| IssuanceError::ProviderNotFound {
                provider_id: provider_id.into(),
            })?;

        zones_for_provider(&self.registry, provider).await
    }
}

/// Zones visible to `provider`'s account through its plugin
pub async fn zones_for_provider(
    registry: &ProviderRegistry,
    provider: &DnsProviderConfig,
) -> Result<Vec<String>, IssuanceError> {
    let plugin = registry.resolve(&provider.provider_type)?;
    let account_id = provider
        .account_id()
        .map_err(|source| IssuanceError::ProviderCredentials {
            provider_id: provider.id.clone(),
            source,
        })?;

    plugin
        .get_zones(account_id.as_deref())
        .await
        .map_err(|source| IssuanceError::DnsProvider {
            provider_id: provider.id.clone(),
            target: "zones".to_string(),
            source,
        })
}
