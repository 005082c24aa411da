// # Lock Store Trait
//
// Durable, cross-process coordination primitives shared by every API node:
//
// - a named lock with a TTL, used to elect the single executor of a tick
// - named counters, used as version stamps for the domain records cache
//
// Backed by the relational store in production; `MemoryStore` and `FileStore`
// implement it for tests and single-node deployments.

use async_trait::async_trait;

/// Trait for lock and counter storage
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently. `lock` and `increase` must
/// be atomic with respect to other callers of the same store.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Try to take the lock `key` for `ttl_secs` seconds
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: acquired (no holder, or the previous hold expired)
    /// - `Ok(false)`: someone else holds an unexpired lock
    async fn lock(&self, key: &str, ttl_secs: u64) -> Result<bool, crate::Error>;

    /// Add `delta` to counter `key`, creating it at zero first
    ///
    /// # Returns
    ///
    /// The counter's new value
    async fn increase(&self, key: &str, delta: i64) -> Result<i64, crate::Error>;

    /// Read counter `key`; a missing counter reads as zero
    async fn read(&self, key: &str) -> Result<i64, crate::Error>;
}
