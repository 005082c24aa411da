//! Test doubles and common utilities for contract tests
//!
//! The mock provider keeps its zones in a shared [`MockBackend`] so a test can
//! seed records, inspect the call log and inject failures while the executor
//! owns the provider instances the registry creates.

#![allow(dead_code)]

use async_trait::async_trait;
use edgedns_core::error::{Error, Result};
use edgedns_core::traits::{
    ClusterDnsInfo, DnsDomain, DnsProvider, DnsProviderFactory, LockStore, NodeAddress,
    NodeDnsInfo, ProviderParams, ServerDnsInfo,
};
use edgedns_core::{
    DnsTaskExecutor, DomainRecordsCache, ExecutorConfig, ExecutorEvent, MemoryStore,
    ProviderConfig, ProviderRegistry, Record, RecordType, Route,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Type code the mock provider is registered under
pub const MOCK_TYPE: &str = "mock";

pub const PROVIDER_ID: i64 = 1;
pub const DOMAIN_ID: i64 = 2;
pub const CLUSTER_ID: i64 = 3;
pub const SERVER_ID: i64 = 5;
pub const DOMAIN: &str = "example.com";

/// One call the executor made against the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    GetRecords { domain: String },
    Query { domain: String, name: String, record_type: RecordType },
    Add { domain: String, record: Record },
    Update { domain: String, record_id: String, new_record: Record },
    Delete { domain: String, record: Record },
}

impl ProviderCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ProviderCall::Add { .. } | ProviderCall::Update { .. } | ProviderCall::Delete { .. }
        )
    }
}

/// How calls against a zone should misbehave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RateLimited,
    NotFound,
    Panic,
}

#[derive(Debug, Default)]
struct BackendState {
    zones: HashMap<String, Vec<Record>>,
    calls: Vec<ProviderCall>,
    failures: HashMap<String, Failure>,
    /// Record ids someone else removes right before our delete lands
    raced: HashSet<String>,
    next_id: u64,
}

/// Shared remote state behind every [`MockDnsProvider`]
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
    default_route: String,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_default_route("default")
    }

    pub fn with_default_route(route: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            default_route: route.to_string(),
        }
    }

    /// Create an empty zone
    pub fn add_zone(&self, domain: &str) {
        self.state
            .lock()
            .unwrap()
            .zones
            .entry(domain.to_string())
            .or_default();
    }

    /// Put a record in a zone without logging a call
    pub fn seed(&self, domain: &str, record: Record) -> Record {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let record = record.with_id(format!("seed-{}", state.next_id));
        state
            .zones
            .entry(domain.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn records(&self, domain: &str) -> Vec<Record> {
        self.state
            .lock()
            .unwrap()
            .zones
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    /// `route@value` of every record named `name`, sorted
    pub fn keys(&self, domain: &str, name: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records(domain)
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.key().to_string())
            .collect();
        keys.sort();
        keys
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<ProviderCall> {
        self.calls().into_iter().filter(ProviderCall::is_mutation).collect()
    }

    pub fn count(&self, pred: impl Fn(&ProviderCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn fail(&self, domain: &str, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(domain.to_string(), failure);
    }

    pub fn heal(&self, domain: &str) {
        self.state.lock().unwrap().failures.remove(domain);
    }

    /// Another actor removes record `id` between our listing and our delete
    pub fn remove_before_delete(&self, id: &str) {
        self.state.lock().unwrap().raced.insert(id.to_string());
    }

    /// Log a call, then apply the zone's failure mode, if any
    fn enter(&self, domain: &str, call: ProviderCall) -> Result<()> {
        let failure = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            state.failures.get(domain).copied()
        };
        match failure {
            None => {}
            Some(Failure::RateLimited) => return Err(Error::rate_limited("mock quota exhausted")),
            Some(Failure::NotFound) => return Err(Error::not_found(format!("zone {}", domain))),
            Some(Failure::Panic) => panic!("mock provider exploded on {}", domain),
        }
        if !self.state.lock().unwrap().zones.contains_key(domain) {
            return Err(Error::not_found(format!("zone {}", domain)));
        }
        Ok(())
    }
}

/// A DnsProvider over a [`MockBackend`]
pub struct MockDnsProvider {
    backend: MockBackend,
}

impl MockDnsProvider {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    fn auth(&mut self, _params: &ProviderParams) -> Result<()> {
        Ok(())
    }

    async fn get_domains(&self) -> Result<Vec<String>> {
        Ok(self.backend.state.lock().unwrap().zones.keys().cloned().collect())
    }

    async fn get_records(&self, domain: &str) -> Result<Vec<Record>> {
        self.backend.enter(
            domain,
            ProviderCall::GetRecords {
                domain: domain.to_string(),
            },
        )?;
        Ok(self.backend.records(domain))
    }

    async fn get_routes(&self, _domain: &str) -> Result<Vec<Route>> {
        Ok(vec![Route::new("Default", &self.backend.default_route)])
    }

    async fn query_record(
        &self,
        domain: &str,
        name: &str,
        record_type: &RecordType,
    ) -> Result<Option<Record>> {
        self.backend.enter(
            domain,
            ProviderCall::Query {
                domain: domain.to_string(),
                name: name.to_string(),
                record_type: record_type.clone(),
            },
        )?;
        Ok(self
            .backend
            .records(domain)
            .into_iter()
            .find(|r| r.name == name && &r.record_type == record_type))
    }

    async fn add_record(&self, domain: &str, record: &Record) -> Result<Record> {
        self.backend.enter(
            domain,
            ProviderCall::Add {
                domain: domain.to_string(),
                record: record.clone(),
            },
        )?;
        let mut state = self.backend.state.lock().unwrap();
        state.next_id += 1;
        let created = record.clone().with_id(format!("rec-{}", state.next_id));
        state
            .zones
            .entry(domain.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_record(&self, domain: &str, record: &Record, new_record: &Record) -> Result<()> {
        self.backend.enter(
            domain,
            ProviderCall::Update {
                domain: domain.to_string(),
                record_id: record.id.clone(),
                new_record: new_record.clone(),
            },
        )?;
        let mut state = self.backend.state.lock().unwrap();
        let zone = state.zones.entry(domain.to_string()).or_default();
        match zone.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = new_record.clone().with_id(record.id.clone());
                Ok(())
            }
            None => Err(Error::record_not_found(format!("record {}", record.id))),
        }
    }

    async fn delete_record(&self, domain: &str, record: &Record) -> Result<()> {
        self.backend.enter(
            domain,
            ProviderCall::Delete {
                domain: domain.to_string(),
                record: record.clone(),
            },
        )?;
        let mut state = self.backend.state.lock().unwrap();
        let raced = state.raced.remove(&record.id);
        let zone = state.zones.entry(domain.to_string()).or_default();
        let before = zone.len();
        zone.retain(|r| r.id != record.id);
        if raced || zone.len() == before {
            return Err(Error::record_not_found(format!("record {}", record.id)));
        }
        Ok(())
    }

    fn default_route(&self) -> String {
        self.backend.default_route.clone()
    }

    fn provider_name(&self) -> &'static str {
        MOCK_TYPE
    }
}

/// Factory handing out providers that share one backend
pub struct MockProviderFactory {
    backend: MockBackend,
}

impl MockProviderFactory {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }
}

impl DnsProviderFactory for MockProviderFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(MockDnsProvider::new(self.backend.clone())))
    }
}

/// A lock service where the lock is always free
///
/// Counters go to the wrapped store, so cache versions behave normally.
/// Lets one test run several ticks back to back.
pub struct FreeLock {
    inner: MemoryStore,
}

#[async_trait]
impl LockStore for FreeLock {
    async fn lock(&self, _key: &str, _ttl_secs: u64) -> Result<bool> {
        Ok(true)
    }

    async fn increase(&self, key: &str, delta: i64) -> Result<i64> {
        self.inner.increase(key, delta).await
    }

    async fn read(&self, key: &str) -> Result<i64> {
        self.inner.read(key).await
    }
}

/// Everything an executor test needs
pub struct Harness {
    pub store: MemoryStore,
    pub backend: MockBackend,
    pub cache: Arc<DomainRecordsCache>,
    pub executor: Arc<DnsTaskExecutor>,
    pub events: mpsc::Receiver<ExecutorEvent>,
}

impl Harness {
    /// Executor whose lock never contends, over a seeded platform
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let lock: Arc<dyn LockStore> = Arc::new(FreeLock {
            inner: store.clone(),
        });
        Self::build(store, lock, ExecutorConfig::default()).await
    }

    /// Executor that elects itself through the store's own lock
    pub async fn with_store_lock(config: ExecutorConfig) -> Self {
        let store = MemoryStore::new();
        let lock: Arc<dyn LockStore> = Arc::new(store.clone());
        Self::build(store, lock, config).await
    }

    async fn build(store: MemoryStore, lock: Arc<dyn LockStore>, config: ExecutorConfig) -> Self {
        let backend = MockBackend::new();
        backend.add_zone(DOMAIN);
        seed_platform(&store).await;

        let registry = Arc::new(ProviderRegistry::new());
        registry.register_provider(MOCK_TYPE, Box::new(MockProviderFactory::new(backend.clone())));

        let cache = Arc::new(DomainRecordsCache::new(lock.clone()));
        let shared = Arc::new(store.clone());
        let (executor, events) = DnsTaskExecutor::new(
            shared.clone(),
            lock,
            shared,
            registry,
            cache.clone(),
            config,
        )
        .expect("executor construction succeeds");

        Self {
            store,
            backend,
            cache,
            executor: Arc::new(executor),
            events,
        }
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<ExecutorEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

/// Provider 1 hosting `example.com` (domain 2), cluster 3 aliased `edge1`,
/// server 5 aliased `edge1` in cluster 3
pub async fn seed_platform(store: &MemoryStore) {
    store
        .put_provider(ProviderConfig::new(PROVIDER_ID, MOCK_TYPE))
        .await;
    store
        .put_domain(DnsDomain::new(DOMAIN_ID, PROVIDER_ID, DOMAIN))
        .await;
    store
        .put_cluster(ClusterDnsInfo {
            id: CLUSTER_ID,
            dns_name: "edge1".to_string(),
            dns_domain_id: DOMAIN_ID,
            ttl: 600,
        })
        .await;
    store
        .put_server(ServerDnsInfo {
            id: SERVER_ID,
            cluster_id: CLUSTER_ID,
            dns_name: "edge1".to_string(),
            is_on: true,
        })
        .await;
}

/// A healthy node in the seeded cluster
pub fn node(id: i64, ips: &[&str]) -> NodeDnsInfo {
    NodeDnsInfo {
        id,
        cluster_id: Some(CLUSTER_ID),
        is_on: true,
        is_backup: false,
        is_online: true,
        addresses: ips.iter().map(|ip| NodeAddress::healthy(*ip)).collect(),
        routes: HashMap::new(),
    }
}

/// A node with route assignments for the seeded domain
pub fn routed_node(id: i64, ips: &[&str], routes: &[&str]) -> NodeDnsInfo {
    let mut node = node(id, ips);
    node.routes.insert(
        DOMAIN_ID,
        routes.iter().map(|r| r.to_string()).collect(),
    );
    node
}

/// An A record named after the seeded cluster
pub fn cluster_a(route: &str, ip: &str) -> Record {
    Record::new("edge1", RecordType::A, ip, route)
}
