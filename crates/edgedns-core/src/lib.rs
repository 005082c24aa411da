// # edgedns-core
//
// Core library for the DNS reconciliation engine of an edge-node control
// plane.
//
// ## Architecture Overview
//
// Mutations elsewhere in the platform (a server toggled, a node's IP changed)
// enqueue a task; the executor wakes on a fixed interval, elects itself via a
// durable lock, drains every pending task and drives the provider's records
// toward the platform's current state.
//
// - **TaskStore**: Durable queue of pending tasks
// - **LockStore**: Durable TTL lock plus counters (tick election, cache versions)
// - **Inventory**: Read model of servers, nodes, clusters, domains and provider accounts
// - **DnsProvider**: Trait for reading and mutating records via provider APIs
// - **ProviderRegistry**: Plugin-based registry for DNS providers
// - **DomainRecordsCache**: Version-stamped per-zone record list cache
// - **DnsTaskExecutor**: The control loop
//
// ## Design Principles
//
// 1. **Tasks carry what changed, not what to do**: handlers re-read state, so duplicates are harmless
// 2. **Plugin-Based**: Providers are registered by type code, no hard-coded if-else
// 3. **Library-First**: All core functionality can be used as a library

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod record;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use cache::{CacheKey, CacheLookup, CachedProvider, DomainRecordsCache};
pub use config::{CacheConfig, EdgeDnsConfig, ExecutorConfig, ProviderConfig, StoreConfig};
pub use error::{Error, Result};
pub use executor::{DnsTaskExecutor, ExecutorEvent, TickSummary};
pub use record::{Record, RecordKey, RecordType, Route};
pub use registry::ProviderRegistry;
pub use state::{FileStore, MemoryStore};
pub use traits::{DnsProvider, DnsProviderFactory, DnsTask, DnsTaskKind, Inventory, LockStore, TaskStore};
