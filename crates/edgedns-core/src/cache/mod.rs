//! Domain records cache
//!
//! Process-local cache of each zone's record list, keyed by
//! `(provider_id, domain)`. Every entry carries the value of a durable
//! counter (held by a [`LockStore`]) at the time it was written. Any process
//! that refreshes a zone bumps the counter, so other processes see their
//! copy go stale on the next read without sharing memory.
//!
//! The cache is only an optimization: a miss means "unknown", and callers
//! must ask the provider.
//!
//! ```text
//!  write_domain_records ──► LockStore::increase(key) ──► entry{version, now, records}
//!  query_domain_record  ──► LockStore::read(key) == entry.version && age < ttl ?
//!                              yes ─► Hit        no ─► evict, Miss
//! ```

mod provider;

pub use provider::CachedProvider;

use crate::error::Result;
use crate::record::{Record, RecordType};
use crate::traits::LockStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Default absolute lifetime of an entry
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Identity of a cached record list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Provider account id
    pub provider_id: i64,
    /// Zone name
    pub domain: String,
}

impl CacheKey {
    /// Create a key
    pub fn new(provider_id: i64, domain: impl Into<String>) -> Self {
        Self {
            provider_id,
            domain: domain.into(),
        }
    }

    /// Name of the durable version counter for this key
    pub fn version_key(&self) -> String {
        format!("{}@{}", self.provider_id, self.domain)
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    /// Nothing trustworthy cached; ask the provider
    Miss,
    /// The cached zone has records; `T` is authoritative for this process
    Hit(T),
}

impl<T> CacheLookup<T> {
    /// Whether the zone had any cached records
    pub fn has_records(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// The hit value, if any
    pub fn hit(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }
}

/// A cached record list
#[derive(Debug, Clone)]
struct CacheEntry {
    version: i64,
    updated_at: DateTime<Utc>,
    records: Vec<Record>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_at) >= ttl
    }
}

/// Version-stamped cache of zone record lists
///
/// Constructed once per process and shared (behind an `Arc`) by every
/// [`CachedProvider`].
pub struct DomainRecordsCache {
    lock_store: Arc<dyn LockStore>,
    ttl: chrono::Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl DomainRecordsCache {
    /// Create a cache with the default 24 hour TTL
    pub fn new(lock_store: Arc<dyn LockStore>) -> Self {
        Self::with_ttl(lock_store, DEFAULT_CACHE_TTL)
    }

    /// Create a cache with a custom TTL
    pub fn with_ttl(lock_store: Arc<dyn LockStore>, ttl: Duration) -> Self {
        Self {
            lock_store,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a freshly fetched record list and bump the durable version
    ///
    /// Other processes holding an older copy see a miss on their next read.
    pub async fn write_domain_records(
        &self,
        provider_id: i64,
        domain: &str,
        records: Vec<Record>,
    ) -> Result<()> {
        let key = CacheKey::new(provider_id, domain);
        let version = self.lock_store.increase(&key.version_key(), 1).await?;

        debug!(
            "Cached {} record(s) for {} (version {})",
            records.len(),
            key.version_key(),
            version
        );

        self.entries().insert(
            key,
            CacheEntry {
                version,
                updated_at: Utc::now(),
                records,
            },
        );
        Ok(())
    }

    /// Records matching `name` and `record_type` in a cached zone
    pub async fn query_domain_records(
        &self,
        provider_id: i64,
        domain: &str,
        name: &str,
        record_type: &RecordType,
    ) -> CacheLookup<Vec<Record>> {
        let key = CacheKey::new(provider_id, domain);

        // read the durable version before taking the map lock
        let version = match self.lock_store.read(&key.version_key()).await {
            Ok(version) => version,
            Err(e) => {
                warn!(
                    "Failed to read cache version for {}: {}",
                    key.version_key(),
                    e
                );
                return CacheLookup::Miss;
            }
        };

        let mut entries = self.entries();
        let Some(entry) = entries.get(&key) else {
            return CacheLookup::Miss;
        };

        if entry.version != version || entry.is_expired(self.ttl, Utc::now()) {
            debug!(
                "Evicting cached records for {} (cached version {}, current {})",
                key.version_key(),
                entry.version,
                version
            );
            entries.remove(&key);
            return CacheLookup::Miss;
        }

        if entry.records.is_empty() {
            return CacheLookup::Miss;
        }

        CacheLookup::Hit(
            entry
                .records
                .iter()
                .filter(|record| record.name == name && &record.record_type == record_type)
                .cloned()
                .collect(),
        )
    }

    /// First record matching `name` and `record_type` in a cached zone
    ///
    /// `Hit(None)` means the zone is cached and has no such record.
    pub async fn query_domain_record(
        &self,
        provider_id: i64,
        domain: &str,
        name: &str,
        record_type: &RecordType,
    ) -> CacheLookup<Option<Record>> {
        match self
            .query_domain_records(provider_id, domain, name, record_type)
            .await
        {
            CacheLookup::Hit(records) => CacheLookup::Hit(records.into_iter().next()),
            CacheLookup::Miss => CacheLookup::Miss,
        }
    }

    /// Append a record the provider just created
    ///
    /// Does nothing when the zone is not cached: a partial list must never
    /// be cached. The version is not bumped.
    pub fn add_domain_record(&self, provider_id: i64, domain: &str, record: Record) {
        if let Some(entry) = self.entries().get_mut(&CacheKey::new(provider_id, domain)) {
            entry.records.push(record);
        }
    }

    /// Replace the record with `record_id` after the provider updated it
    pub fn update_domain_record(
        &self,
        provider_id: i64,
        domain: &str,
        record_id: &str,
        new_record: Record,
    ) {
        if let Some(entry) = self.entries().get_mut(&CacheKey::new(provider_id, domain))
            && let Some(record) = entry.records.iter_mut().find(|r| r.id == record_id)
        {
            *record = Record {
                id: record_id.to_string(),
                ..new_record
            };
        }
    }

    /// Drop the record with `record_id` after the provider deleted it
    pub fn delete_domain_record(&self, provider_id: i64, domain: &str, record_id: &str) {
        if let Some(entry) = self.entries().get_mut(&CacheKey::new(provider_id, domain)) {
            entry.records.retain(|record| record.id != record_id);
        }
    }

    /// Evict entries older than the TTL
    ///
    /// # Returns
    ///
    /// Number of evicted entries
    pub fn clean(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired domain record list(s)", evicted);
        }
        evicted
    }

    /// Number of cached zones
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
