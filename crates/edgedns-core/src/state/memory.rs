// # Memory Store
//
// In-memory implementation of TaskStore, LockStore and Inventory.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and for embedding the executor next to an existing data layer during
// development.
//
// ## Crash Behavior
//
// - All tasks, counters and inventory are lost on restart
// - Cache versions restart from zero, which is safe: caches are per process
//   and die with it

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::PlatformState;
use crate::Error;
use crate::config::ProviderConfig;
use crate::record::Record;
use crate::traits::{
    ClusterDnsInfo, DnsDomain, DnsTask, DnsTaskKind, Inventory, LockStore, NodeDnsInfo,
    ServerDnsInfo, TaskStore,
};

/// In-memory store
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// assertions while the executor owns another.
///
/// # Example
///
/// ```rust,no_run
/// use edgedns_core::state::MemoryStore;
/// use edgedns_core::traits::TaskStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     store.create_node_task(42).await?;
///     assert_eq!(store.find_pending_tasks().await?.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<PlatformState>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from existing state
    pub fn from_state(state: PlatformState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> PlatformState {
        self.inner.read().await.clone()
    }

    /// Insert or replace a server
    pub async fn put_server(&self, server: ServerDnsInfo) {
        self.inner.write().await.servers.insert(server.id, server);
    }

    /// Insert or replace a node
    pub async fn put_node(&self, node: NodeDnsInfo) {
        self.inner.write().await.nodes.insert(node.id, node);
    }

    /// Insert or replace a cluster
    pub async fn put_cluster(&self, cluster: ClusterDnsInfo) {
        self.inner.write().await.clusters.insert(cluster.id, cluster);
    }

    /// Insert or replace a domain
    pub async fn put_domain(&self, domain: DnsDomain) {
        self.inner.write().await.domains.insert(domain.id, domain);
    }

    /// Insert or replace a provider account
    pub async fn put_provider(&self, provider: ProviderConfig) {
        self.inner
            .write()
            .await
            .providers
            .insert(provider.id, provider);
    }

    /// Remove a node
    pub async fn remove_node(&self, node_id: i64) {
        self.inner.write().await.nodes.remove(&node_id);
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, kind: DnsTaskKind) -> Result<i64, Error> {
        Ok(self.inner.write().await.create_task(kind))
    }

    async fn find_pending_tasks(&self) -> Result<Vec<DnsTask>, Error> {
        Ok(self.inner.read().await.pending_tasks())
    }

    async fn delete_task(&self, task_id: i64) -> Result<(), Error> {
        self.inner.write().await.delete_task(task_id);
        Ok(())
    }

    async fn update_task_error(&self, task_id: i64, error: &str) -> Result<(), Error> {
        self.inner.write().await.record_task_error(task_id, error);
        Ok(())
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn lock(&self, key: &str, ttl_secs: u64) -> Result<bool, Error> {
        Ok(self
            .inner
            .write()
            .await
            .try_lock(key, ttl_secs, chrono::Utc::now()))
    }

    async fn increase(&self, key: &str, delta: i64) -> Result<i64, Error> {
        Ok(self.inner.write().await.increase(key, delta))
    }

    async fn read(&self, key: &str) -> Result<i64, Error> {
        Ok(self.inner.read().await.read_counter(key))
    }
}

#[async_trait]
impl Inventory for MemoryStore {
    async fn find_server(&self, server_id: i64) -> Result<Option<ServerDnsInfo>, Error> {
        Ok(self.inner.read().await.servers.get(&server_id).cloned())
    }

    async fn find_node(&self, node_id: i64) -> Result<Option<NodeDnsInfo>, Error> {
        Ok(self.inner.read().await.nodes.get(&node_id).cloned())
    }

    async fn find_cluster(&self, cluster_id: i64) -> Result<Option<ClusterDnsInfo>, Error> {
        Ok(self.inner.read().await.clusters.get(&cluster_id).cloned())
    }

    async fn find_cluster_nodes(&self, cluster_id: i64) -> Result<Vec<NodeDnsInfo>, Error> {
        Ok(self.inner.read().await.cluster_nodes(cluster_id))
    }

    async fn find_domain(&self, domain_id: i64) -> Result<Option<DnsDomain>, Error> {
        Ok(self.inner.read().await.domains.get(&domain_id).cloned())
    }

    async fn find_provider(&self, provider_id: i64) -> Result<Option<ProviderConfig>, Error> {
        Ok(self.inner.read().await.providers.get(&provider_id).cloned())
    }

    async fn update_domain_records(&self, domain_id: i64, records: &[Record]) -> Result<(), Error> {
        if !self
            .inner
            .write()
            .await
            .set_domain_records(domain_id, records)
        {
            tracing::debug!("Domain {} vanished before its snapshot was saved", domain_id);
        }
        Ok(())
    }
}
