// # Store Implementations
//
// This module provides implementations of the TaskStore, LockStore and
// Inventory traits for different persistence strategies. Both keep the whole
// platform state in one `PlatformState` value; the file store additionally
// writes it through to disk after every mutation.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::ProviderConfig;
use crate::record::Record;
use crate::traits::{ClusterDnsInfo, DnsDomain, DnsTask, DnsTaskKind, NodeDnsInfo, ServerDnsInfo};

/// Everything the stores hold
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformState {
    /// Last assigned task id
    #[serde(default)]
    pub last_task_id: i64,
    /// Pending tasks by id
    #[serde(default)]
    pub tasks: BTreeMap<i64, DnsTask>,
    /// Named counters
    #[serde(default)]
    pub counters: HashMap<String, i64>,
    /// Named locks and when they expire
    #[serde(default)]
    pub locks: HashMap<String, DateTime<Utc>>,
    /// Servers by id
    #[serde(default)]
    pub servers: BTreeMap<i64, ServerDnsInfo>,
    /// Nodes by id
    #[serde(default)]
    pub nodes: BTreeMap<i64, NodeDnsInfo>,
    /// Clusters by id
    #[serde(default)]
    pub clusters: BTreeMap<i64, ClusterDnsInfo>,
    /// Domains by id
    #[serde(default)]
    pub domains: BTreeMap<i64, DnsDomain>,
    /// Provider accounts by id
    #[serde(default)]
    pub providers: BTreeMap<i64, ProviderConfig>,
}

impl PlatformState {
    pub(crate) fn create_task(&mut self, kind: DnsTaskKind) -> i64 {
        self.last_task_id += 1;
        let id = self.last_task_id;
        self.tasks.insert(id, DnsTask::new(id, kind));
        id
    }

    pub(crate) fn pending_tasks(&self) -> Vec<DnsTask> {
        self.tasks.values().cloned().collect()
    }

    /// Returns whether a task was removed
    pub(crate) fn delete_task(&mut self, task_id: i64) -> bool {
        self.tasks.remove(&task_id).is_some()
    }

    /// Returns whether the task exists
    pub(crate) fn record_task_error(&mut self, task_id: i64, error: &str) -> bool {
        match self.tasks.get_mut(&task_id) {
            Some(task) => {
                task.record_failure(error);
                true
            }
            None => false,
        }
    }

    pub(crate) fn try_lock(&mut self, key: &str, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.locks.get(key)
            && *expires_at > now
        {
            return false;
        }
        let ttl = chrono::Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
        self.locks.insert(key.to_string(), now + ttl);
        true
    }

    pub(crate) fn increase(&mut self, key: &str, delta: i64) -> i64 {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(delta);
        *counter
    }

    pub(crate) fn read_counter(&self, key: &str) -> i64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn cluster_nodes(&self, cluster_id: i64) -> Vec<NodeDnsInfo> {
        self.nodes
            .values()
            .filter(|node| node.cluster_id == Some(cluster_id))
            .cloned()
            .collect()
    }

    /// Returns whether the domain exists
    pub(crate) fn set_domain_records(&mut self, domain_id: i64, records: &[Record]) -> bool {
        match self.domains.get_mut(&domain_id) {
            Some(domain) => {
                domain.records = records.to_vec();
                domain.records_updated_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_expiry() {
        let mut state = PlatformState::default();
        let now = Utc::now();

        assert!(state.try_lock("executor", 9, now));
        assert!(!state.try_lock("executor", 9, now + chrono::Duration::seconds(5)));
        assert!(state.try_lock("executor", 9, now + chrono::Duration::seconds(10)));
        assert!(state.try_lock("other", 9, now));
    }

    #[test]
    fn test_task_ids_are_monotonic() {
        let mut state = PlatformState::default();
        let a = state.create_task(DnsTaskKind::NodeChange { node_id: 1 });
        let b = state.create_task(DnsTaskKind::NodeChange { node_id: 1 });
        assert!(b > a);

        state.delete_task(b);
        let c = state.create_task(DnsTaskKind::DomainChange { domain_id: 1 });
        assert!(c > b, "ids are never reused");
        assert_eq!(
            state.pending_tasks().iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![a, c]
        );
    }
}
