//! Shared fixtures for issuer integration tests
//!
//! A scripted ACME client, a DNS plugin with failure injection and helpers
//! that wire them into a `CertificateIssuer`. Both mocks append to one event
//! log so tests can check the order of operations across them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::time::Instant;

use zonecert_common::RetryPolicy;
use zonecert_config::{AcmeDefaults, Authority, AuthorityOptions, DnsProviderConfig};
use zonecert_issuer::acme::{
    AccountKey, AcmeClient, AcmeClientError, AcmeConnector, Authorization, AuthorizationStatus,
    Challenge, ChallengeResponse, ChallengeStatus, Identifier, MemoryAuthorityStore,
    NewRegistration, Order, Registration,
};
use zonecert_issuer::dns::{DnsProvider, DnsProviderError, DnsResult};
use zonecert_issuer::{CertificateIssuer, ProviderRegistry};

/// Ordered log of mock calls, e.g. `create:<name>`, `wait:<id>`, `answer:<token>`,
/// stamped with the tokio clock at the time of the call
pub type EventLog = Arc<Mutex<Vec<(Instant, String)>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(events: &EventLog, event: impl Into<String>) {
    events.lock().push((Instant::now(), event.into()));
}

/// Account key shared by tests that reuse a stored account
pub static STORED_KEY_JSON: Lazy<String> = Lazy::new(|| {
    AccountKey::generate()
        .and_then(|key| key.to_json())
        .expect("test account key")
});

pub const STORED_REGR_JSON: &str = r#"{"body": {}, "uri": "https://acme.test/acct/stored"}"#;

pub fn cert_pem(name: &str) -> String {
    rcgen::generate_simple_self_signed(vec![name.to_string()])
        .expect("self-signed certificate")
        .cert
        .pem()
}

/// Leaf and intermediate PEMs plus their concatenation
pub struct TestChain {
    pub leaf: String,
    pub intermediate: String,
    pub fullchain: String,
}

pub fn test_chain(name: &str) -> TestChain {
    let leaf = cert_pem(name);
    let intermediate = cert_pem("intermediate.acme.test");
    let fullchain = format!("{}{}", leaf, intermediate);
    TestChain {
        leaf,
        intermediate,
        fullchain,
    }
}

/// Order with one pending authorization and one DNS-01 challenge per host
pub fn order_for(hosts: &[&str]) -> Order {
    let authorizations = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| {
            let (domain, wildcard) = match host.strip_prefix("*.") {
                Some(domain) => (domain, true),
                None => (*host, false),
            };
            Authorization {
                url: format!("https://acme.test/authz/{}", i),
                identifier: Identifier::dns(domain),
                status: AuthorizationStatus::Pending,
                challenges: vec![
                    Challenge {
                        kind: "http-01".to_string(),
                        ..Challenge::dns01(format!("https://acme.test/chall/{}/http", i), format!("http-{}", i))
                    },
                    Challenge::dns01(format!("https://acme.test/chall/{}/dns", i), format!("token-{}", i)),
                ],
                wildcard,
            }
        })
        .collect();

    Order {
        url: "https://acme.test/order/1".to_string(),
        authorizations,
        fullchain_pem: None,
    }
}

/// How the mock client finalizes an order
#[derive(Debug, Clone)]
pub enum Finalize {
    /// Complete with the given full chain
    Complete(String),
    /// Attach the chain, then report a validation error
    ValidationAfterChain(String),
    /// Fail without a chain
    Fail(AcmeClientError),
    /// Never return
    Hang,
}

/// Scripted ACME client
pub struct MockAcmeClient {
    order: Mutex<Order>,
    finalize: Mutex<Finalize>,
    answer_error: Mutex<Option<AcmeClientError>>,
    events: EventLog,
    pub new_accounts: AtomicUsize,
    pub new_orders: AtomicUsize,
    pub polls: AtomicUsize,
    pub last_registration: Mutex<Option<NewRegistration>>,
}

impl MockAcmeClient {
    pub fn new(order: Order, finalize: Finalize, events: EventLog) -> Self {
        Self {
            order: Mutex::new(order),
            finalize: Mutex::new(finalize),
            answer_error: Mutex::new(None),
            events,
            new_accounts: AtomicUsize::new(0),
            new_orders: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            last_registration: Mutex::new(None),
        }
    }

    pub fn fail_answers(&self, error: AcmeClientError) {
        *self.answer_error.lock() = Some(error);
    }

    pub fn answered(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|(_, e)| e.strip_prefix("answer:").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl AcmeClient for MockAcmeClient {
    async fn new_account_and_tos(
        &self,
        registration: NewRegistration,
    ) -> Result<Registration, AcmeClientError> {
        self.new_accounts.fetch_add(1, Ordering::SeqCst);
        record(&self.events, "new_account".to_string());
        *self.last_registration.lock() = Some(registration.clone());

        let mut created = Registration::new("https://acme.test/acct/new");
        created.body = serde_json::json!({ "contact": registration.contact, "status": "valid" });
        Ok(created)
    }

    async fn new_order(&self, _csr_pem: &str) -> Result<Order, AcmeClientError> {
        self.new_orders.fetch_add(1, Ordering::SeqCst);
        record(&self.events, "new_order".to_string());
        Ok(self.order.lock().clone())
    }

    async fn poll(&self, authorization: &Authorization) -> Result<Authorization, AcmeClientError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut polled = authorization.clone();
        polled.status = AuthorizationStatus::Valid;
        Ok(polled)
    }

    async fn poll_and_finalize(
        &self,
        order: &mut Order,
        _deadline: Instant,
    ) -> Result<(), AcmeClientError> {
        record(&self.events, "finalize".to_string());
        let behaviour = self.finalize.lock().clone();
        match behaviour {
            Finalize::Complete(chain) => {
                order.fullchain_pem = Some(chain);
                Ok(())
            }
            Finalize::ValidationAfterChain(chain) => {
                order.fullchain_pem = Some(chain);
                Err(AcmeClientError::Validation("order already valid".to_string()))
            }
            Finalize::Fail(e) => Err(e),
            Finalize::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn answer_challenge(
        &self,
        challenge: &Challenge,
        _response: &ChallengeResponse,
    ) -> Result<Challenge, AcmeClientError> {
        if let Some(e) = self.answer_error.lock().clone() {
            return Err(e);
        }
        record(&self.events, format!("answer:{}", challenge.token));
        let mut answered = challenge.clone();
        answered.status = ChallengeStatus::Processing;
        Ok(answered)
    }
}

/// Connector handing out one shared mock client
pub struct MockConnector {
    client: Arc<MockAcmeClient>,
    failures: Mutex<VecDeque<AcmeClientError>>,
    pub connects: AtomicUsize,
    /// Whether each connect carried an existing registration
    pub with_registration: Mutex<Vec<bool>>,
    pub directories: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(client: Arc<MockAcmeClient>) -> Self {
        Self {
            client,
            failures: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            with_registration: Mutex::new(Vec::new()),
            directories: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next connects with these errors, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = AcmeClientError>) {
        self.failures.lock().extend(errors);
    }
}

#[async_trait]
impl AcmeConnector for MockConnector {
    async fn connect(
        &self,
        directory_url: &str,
        _key: Arc<AccountKey>,
        account: Option<Registration>,
    ) -> Result<Arc<dyn AcmeClient>, AcmeClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        self.with_registration.lock().push(account.is_some());
        self.directories.lock().push(directory_url.to_string());
        let client: Arc<dyn AcmeClient> = self.client.clone();
        Ok(client)
    }
}

/// A TXT record created through the mock plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub change_id: String,
    pub name: String,
    pub value: String,
    pub account_id: Option<String>,
}

/// DNS plugin recording every call, with failure injection
#[derive(Debug)]
pub struct MockDnsPlugin {
    name: String,
    events: EventLog,
    next_id: AtomicUsize,
    fail_create: bool,
    fail_wait: bool,
    fail_delete: bool,
    wait_delay: Option<Duration>,
    pub created: Mutex<Vec<CreatedRecord>>,
    pub waited: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub zones: Vec<String>,
}

impl MockDnsPlugin {
    pub fn new(name: &str, events: EventLog) -> Self {
        Self {
            name: name.to_string(),
            events,
            next_id: AtomicUsize::new(1),
            fail_create: false,
            fail_wait: false,
            fail_delete: false,
            wait_delay: None,
            created: Mutex::new(Vec::new()),
            waited: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            zones: vec!["example.com".to_string()],
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_wait(mut self) -> Self {
        self.fail_wait = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn slow_wait(mut self, delay: Duration) -> Self {
        self.wait_delay = Some(delay);
        self
    }

    pub fn created(&self) -> Vec<CreatedRecord> {
        self.created.lock().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl DnsProvider for MockDnsPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_txt_record(
        &self,
        name: &str,
        value: &str,
        account_id: Option<&str>,
    ) -> DnsResult<String> {
        record(&self.events, format!("create:{}", name));
        if self.fail_create {
            return Err(DnsProviderError::RecordCreation {
                record_name: name.to_string(),
                message: "injected".to_string(),
            });
        }

        let change_id = format!("{}-{}", self.name, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.lock().push(CreatedRecord {
            change_id: change_id.clone(),
            name: name.to_string(),
            value: value.to_string(),
            account_id: account_id.map(str::to_string),
        });
        Ok(change_id)
    }

    async fn wait_for_dns_change(&self, change_id: &str, _account_id: Option<&str>) -> DnsResult<()> {
        if let Some(delay) = self.wait_delay {
            tokio::time::sleep(delay).await;
        }
        record(&self.events, format!("wait:{}", change_id));
        if self.fail_wait {
            return Err(DnsProviderError::Propagation {
                change_id: change_id.to_string(),
                message: "injected".to_string(),
            });
        }
        self.waited.lock().push(change_id.to_string());
        Ok(())
    }

    async fn delete_txt_record(
        &self,
        change_id: &str,
        _account_id: Option<&str>,
        _name: &str,
        _value: &str,
    ) -> DnsResult<()> {
        record(&self.events, format!("delete:{}", change_id));
        if self.fail_delete {
            return Err(DnsProviderError::RecordDeletion {
                change_id: change_id.to_string(),
                message: "injected".to_string(),
            });
        }
        self.deleted.lock().push(change_id.to_string());
        Ok(())
    }

    async fn get_zones(&self, _account_id: Option<&str>) -> DnsResult<Vec<String>> {
        Ok(self.zones.clone())
    }
}

/// Defaults with no settle delay and a fast retry policy
pub fn fast_defaults() -> AcmeDefaults {
    AcmeDefaults {
        email: Some("ops@example.com".to_string()),
        settle_delay_secs: 0,
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..Default::default()
    }
}

/// Authority that reuses the shared stored account
pub fn stored_account_authority() -> Authority {
    let mut options = AuthorityOptions::default();
    options.push("email", "ops@example.com");
    options.push("acme_private_key", STORED_KEY_JSON.as_str());
    options.push("acme_regr", STORED_REGR_JSON);
    Authority::new("1", "letsencrypt").with_options(options)
}

/// Everything an issuance test needs to inspect afterwards
pub struct Harness {
    pub events: EventLog,
    pub client: Arc<MockAcmeClient>,
    pub connector: Arc<MockConnector>,
    pub store: Arc<MemoryAuthorityStore>,
    pub issuer: CertificateIssuer,
}

impl Harness {
    /// Wire `plugins` (type name, plugin) and `providers` into an issuer
    pub fn new(
        defaults: AcmeDefaults,
        order: Order,
        finalize: Finalize,
        events: EventLog,
        plugins: Vec<(&str, Arc<MockDnsPlugin>)>,
        providers: Vec<DnsProviderConfig>,
    ) -> Self {
        let client = Arc::new(MockAcmeClient::new(order, finalize, events.clone()));
        let connector = Arc::new(MockConnector::new(client.clone()));
        let store = Arc::new(MemoryAuthorityStore::new());

        let mut registry = ProviderRegistry::new();
        for (provider_type, plugin) in plugins {
            registry.register(provider_type, plugin);
        }

        let issuer = CertificateIssuer::new(
            defaults,
            registry,
            providers.into_iter().map(Arc::new).collect(),
            connector.clone(),
            store.clone(),
        );

        Self {
            events,
            client,
            connector,
            store,
            issuer,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Events with the instant each was recorded
    pub fn timeline(&self) -> Vec<(Instant, String)> {
        self.events.lock().clone()
    }
}
