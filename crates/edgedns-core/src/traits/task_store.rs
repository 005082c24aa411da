// # Task Store Trait
//
// Durable queue of pending reconciliation work.
//
// ## Purpose
//
// Any mutation site (server toggled, node IP changed, cluster membership
// changed) records *that* something changed by inserting a task. The executor
// later works out *what* to do by re-reading current state, which makes
// duplicate tasks harmless.
//
// ## Lifecycle
//
// - Created pending by `create_*_task` (fire-and-forget)
// - Deleted when its handler succeeds
// - On failure it stays pending with `error` set and `attempts` incremented
//
// ## Usage
//
// ```rust,ignore
// use edgedns_core::TaskStore;
//
// // after flipping server 5 off in the admin API
// store.create_server_task(5).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What changed, with the id of the changed subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DnsTaskKind {
    /// A server's enabled state or DNS alias changed
    #[serde(rename_all = "camelCase")]
    ServerChange { server_id: i64 },
    /// A node's addresses, state or routes changed
    #[serde(rename_all = "camelCase")]
    NodeChange { node_id: i64 },
    /// A cluster's alias or membership changed
    #[serde(rename_all = "camelCase")]
    ClusterChange { cluster_id: i64 },
    /// A domain's records changed and its snapshot needs a refresh
    #[serde(rename_all = "camelCase")]
    DomainChange { domain_id: i64 },
}

impl DnsTaskKind {
    /// Short type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            DnsTaskKind::ServerChange { .. } => "serverChange",
            DnsTaskKind::NodeChange { .. } => "nodeChange",
            DnsTaskKind::ClusterChange { .. } => "clusterChange",
            DnsTaskKind::DomainChange { .. } => "domainChange",
        }
    }

    /// Id of the subject the task refers to
    pub fn subject_id(&self) -> i64 {
        match *self {
            DnsTaskKind::ServerChange { server_id } => server_id,
            DnsTaskKind::NodeChange { node_id } => node_id,
            DnsTaskKind::ClusterChange { cluster_id } => cluster_id,
            DnsTaskKind::DomainChange { domain_id } => domain_id,
        }
    }
}

impl fmt::Display for DnsTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.subject_id())
    }
}

/// A durable work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsTask {
    /// Monotonic id assigned at creation
    pub id: i64,
    /// Type and subject
    #[serde(flatten)]
    pub kind: DnsTaskKind,
    /// Error of the last failed attempt
    pub error: Option<String>,
    /// Failed attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Creation or last failure time
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DnsTask {
    /// Create a pending task
    ///
    /// # Visibility
    ///
    /// Ids are assigned by the store, so only store implementations create tasks.
    pub(crate) fn new(id: i64, kind: DnsTaskKind) -> Self {
        Self {
            id,
            kind,
            error: None,
            attempts: 0,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Record a failed attempt
    pub(crate) fn record_failure(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = chrono::Utc::now();
    }
}

/// Trait for task store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks; task
/// creation happens on request paths while the executor is draining.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a pending task
    ///
    /// # Returns
    ///
    /// The new task's id
    async fn create_task(&self, kind: DnsTaskKind) -> Result<i64, crate::Error>;

    /// Every pending task, in creation order
    async fn find_pending_tasks(&self) -> Result<Vec<DnsTask>, crate::Error>;

    /// Delete a finished task (missing ids are ignored)
    async fn delete_task(&self, task_id: i64) -> Result<(), crate::Error>;

    /// Record a failed attempt on a task
    async fn update_task_error(&self, task_id: i64, error: &str) -> Result<(), crate::Error>;

    /// Enqueue a ServerChange task
    async fn create_server_task(&self, server_id: i64) -> Result<i64, crate::Error> {
        self.create_task(DnsTaskKind::ServerChange { server_id })
            .await
    }

    /// Enqueue a NodeChange task
    async fn create_node_task(&self, node_id: i64) -> Result<i64, crate::Error> {
        self.create_task(DnsTaskKind::NodeChange { node_id }).await
    }

    /// Enqueue a ClusterChange task
    async fn create_cluster_task(&self, cluster_id: i64) -> Result<i64, crate::Error> {
        self.create_task(DnsTaskKind::ClusterChange { cluster_id })
            .await
    }

    /// Enqueue a DomainChange task
    async fn create_domain_task(&self, domain_id: i64) -> Result<i64, crate::Error> {
        self.create_task(DnsTaskKind::DomainChange { domain_id })
            .await
    }
}
