// # Inventory Trait
//
// Read model over the platform's relational data: the servers, nodes,
// clusters, domains and provider accounts the executor needs to compute the
// desired DNS state. The only write is the domain record snapshot refreshed by
// DomainChange handling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ProviderConfig;
use crate::record::{Record, RecordType, same_value};

/// DNS-relevant view of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDnsInfo {
    /// Server id
    pub id: i64,
    /// Cluster serving this server
    pub cluster_id: i64,
    /// CNAME alias under the cluster's zone, empty when the server has none
    pub dns_name: String,
    /// Whether the server is enabled
    pub is_on: bool,
}

/// DNS-relevant view of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDnsInfo {
    /// Cluster id
    pub id: i64,
    /// Alias of the cluster under its zone, empty when unset
    pub dns_name: String,
    /// Zone hosting the alias, 0 when unset
    pub dns_domain_id: i64,
    /// TTL for the cluster's records, 0 for the provider default
    #[serde(default)]
    pub ttl: u32,
}

/// One address of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Address text as stored; may fail to parse
    pub ip: String,
    /// Enabled by an administrator
    pub is_on: bool,
    /// Passing health checks
    pub is_up: bool,
}

impl NodeAddress {
    /// An enabled, healthy address
    pub fn healthy(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            is_on: true,
            is_up: true,
        }
    }
}

/// DNS-relevant view of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDnsInfo {
    /// Node id
    pub id: i64,
    /// Owning cluster, if any
    pub cluster_id: Option<i64>,
    /// Enabled by an administrator
    pub is_on: bool,
    /// Standby node, never published
    #[serde(default)]
    pub is_backup: bool,
    /// Currently reporting in
    pub is_online: bool,
    /// Node addresses
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    /// Route codes assigned to this node, per domain id
    #[serde(default)]
    pub routes: HashMap<i64, Vec<String>>,
}

impl NodeDnsInfo {
    /// Whether this node's addresses belong in the cluster's records
    pub fn is_publishable(&self) -> bool {
        self.is_on && !self.is_backup && self.is_online
    }

    /// Routes assigned for `domain_id`, empty when none are assigned
    pub fn routes_for(&self, domain_id: i64) -> &[String] {
        self.routes
            .get(&domain_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A provider-hosted zone known to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsDomain {
    /// Domain id
    pub id: i64,
    /// Provider account hosting the zone
    pub provider_id: i64,
    /// Zone name, e.g. `example.com`
    pub name: String,
    /// Whether the domain is enabled
    #[serde(default = "default_true")]
    pub is_on: bool,
    /// Last known record list, for display and cheap existence checks
    #[serde(default)]
    pub records: Vec<Record>,
    /// When `records` was last refreshed
    #[serde(default)]
    pub records_updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl DnsDomain {
    /// Create an enabled domain with an empty snapshot
    pub fn new(id: i64, provider_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            provider_id,
            name: name.into(),
            is_on: true,
            records: Vec::new(),
            records_updated_at: None,
        }
    }

    /// Whether the snapshot holds a matching record
    ///
    /// An empty `route` matches any route. Values compare ignoring a
    /// trailing dot.
    pub fn has_record(&self, name: &str, record_type: &RecordType, route: &str, value: &str) -> bool {
        self.records.iter().any(|record| {
            record.name == name
                && &record.record_type == record_type
                && (route.is_empty() || record.route == route)
                && same_value(&record.value, value)
        })
    }
}

fn default_true() -> bool {
    true
}

/// Trait for inventory implementations
///
/// Lookups of ids that do not exist return `Ok(None)`: the subject was
/// presumably deleted, and the executor finishes the task without contacting
/// any provider.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Look up a server
    async fn find_server(&self, server_id: i64) -> Result<Option<ServerDnsInfo>, crate::Error>;

    /// Look up a node
    async fn find_node(&self, node_id: i64) -> Result<Option<NodeDnsInfo>, crate::Error>;

    /// Look up a cluster
    async fn find_cluster(&self, cluster_id: i64)
    -> Result<Option<ClusterDnsInfo>, crate::Error>;

    /// All nodes whose owning cluster is `cluster_id`, in id order
    async fn find_cluster_nodes(&self, cluster_id: i64) -> Result<Vec<NodeDnsInfo>, crate::Error>;

    /// Look up a domain
    async fn find_domain(&self, domain_id: i64) -> Result<Option<DnsDomain>, crate::Error>;

    /// Look up a provider account
    async fn find_provider(&self, provider_id: i64)
    -> Result<Option<ProviderConfig>, crate::Error>;

    /// Replace a domain's record snapshot
    async fn update_domain_records(
        &self,
        domain_id: i64,
        records: &[Record],
    ) -> Result<(), crate::Error>;

    /// Check the durable snapshot for a record without calling the provider
    async fn exist_domain_record(
        &self,
        domain_id: i64,
        name: &str,
        record_type: &RecordType,
        route: &str,
        value: &str,
    ) -> Result<bool, crate::Error> {
        Ok(self
            .find_domain(domain_id)
            .await?
            .is_some_and(|domain| domain.has_record(name, record_type, route, value)))
    }
}
