//! Core traits for the DNS reconciliation engine
//!
//! This module defines the abstract interfaces the executor is built on.
//!
//! - [`DnsProvider`]: Read and mutate records at a DNS provider
//! - [`TaskStore`]: Durable queue of pending reconciliation tasks
//! - [`LockStore`]: Durable TTL lock and counters shared by the fleet
//! - [`Inventory`]: Read model over servers, nodes, clusters and domains

pub mod dns_provider;
pub mod inventory;
pub mod lock_store;
pub mod task_store;

pub use dns_provider::{DnsProvider, DnsProviderFactory, ProviderParams};
pub use inventory::{ClusterDnsInfo, DnsDomain, Inventory, NodeAddress, NodeDnsInfo, ServerDnsInfo};
pub use lock_store::LockStore;
pub use task_store::{DnsTask, DnsTaskKind, TaskStore};
