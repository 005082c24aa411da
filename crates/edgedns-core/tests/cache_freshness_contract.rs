//! Contract Test: Domain Records Cache Freshness
//!
//! Constraints verified:
//! - After a fetch, same-process lookups are served from the cache
//! - A version bump by another process invalidates the local copy
//! - Successful mutations keep the cached list in step without a version bump
//!
//! If this test fails, a process can act on another process's stale view.

mod common;

use common::*;
use edgedns_core::traits::{DnsProvider, LockStore};
use edgedns_core::{CacheKey, CachedProvider, DomainRecordsCache, MemoryStore, Record, RecordType};
use std::sync::Arc;

fn setup() -> (CachedProvider, MockBackend, Arc<DomainRecordsCache>, MemoryStore) {
    let store = MemoryStore::new();
    let backend = MockBackend::new();
    backend.add_zone(DOMAIN);
    let cache = Arc::new(DomainRecordsCache::new(Arc::new(store.clone())));
    let provider = CachedProvider::new(
        PROVIDER_ID,
        Box::new(MockDnsProvider::new(backend.clone())),
        cache.clone(),
    );
    (provider, backend, cache, store)
}

fn get_records_calls(backend: &MockBackend) -> usize {
    backend.count(|c| matches!(c, ProviderCall::GetRecords { .. }))
}

#[tokio::test]
async fn query_after_fetch_hits_the_cache() {
    let (provider, backend, cache, _store) = setup();
    backend.seed(DOMAIN, cluster_a("default", "1.1.1.1"));

    provider.get_records(DOMAIN).await.unwrap();
    assert_eq!(get_records_calls(&backend), 1);

    let lookup = cache
        .query_domain_records(PROVIDER_ID, DOMAIN, "edge1", &RecordType::A)
        .await;
    assert!(lookup.has_records());

    let found = provider
        .query_record(DOMAIN, "edge1", &RecordType::A)
        .await
        .unwrap();
    assert_eq!(found.unwrap().value, "1.1.1.1");

    let absent = provider
        .query_record(DOMAIN, "www", &RecordType::A)
        .await
        .unwrap();
    assert!(absent.is_none());

    assert_eq!(get_records_calls(&backend), 1, "both lookups served locally");
    assert_eq!(backend.count(|c| matches!(c, ProviderCall::Query { .. })), 0);
}

#[tokio::test]
async fn external_version_bump_forces_a_refetch() {
    let (provider, backend, cache, store) = setup();
    backend.seed(DOMAIN, cluster_a("default", "1.1.1.1"));
    provider.get_records(DOMAIN).await.unwrap();

    // another process refreshed the same zone
    store
        .increase(&CacheKey::new(PROVIDER_ID, DOMAIN).version_key(), 1)
        .await
        .unwrap();
    backend.seed(DOMAIN, cluster_a("cn", "2.2.2.2"));

    let lookup = cache
        .query_domain_records(PROVIDER_ID, DOMAIN, "edge1", &RecordType::A)
        .await;
    assert!(!lookup.has_records());

    let records = provider.get_records(DOMAIN).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(get_records_calls(&backend), 2);
}

#[tokio::test]
async fn version_key_is_provider_at_domain() {
    let (provider, _backend, _cache, store) = setup();
    provider.get_records(DOMAIN).await.unwrap();
    provider.get_records(DOMAIN).await.unwrap();

    assert_eq!(store.read("1@example.com").await.unwrap(), 2);
}

#[tokio::test]
async fn mutations_keep_the_cache_in_step() {
    let (provider, backend, _cache, store) = setup();
    let old = backend.seed(DOMAIN, cluster_a("default", "1.1.1.1"));
    provider.get_records(DOMAIN).await.unwrap();
    let version = store.read("1@example.com").await.unwrap();

    let created = provider
        .add_record(DOMAIN, &Record::new("www", RecordType::Cname, "cdn.example.com.", ""))
        .await
        .unwrap();
    provider.delete_record(DOMAIN, &old).await.unwrap();
    provider
        .update_record(
            DOMAIN,
            &created,
            &Record::new("www", RecordType::Cname, "cdn2.example.com.", ""),
        )
        .await
        .unwrap();

    let www = provider
        .query_record(DOMAIN, "www", &RecordType::Cname)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(www.id, created.id);
    assert_eq!(www.value, "cdn2.example.com.");
    assert!(
        provider
            .query_record(DOMAIN, "edge1", &RecordType::A)
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(get_records_calls(&backend), 1, "no refetch after mutations");
    assert_eq!(store.read("1@example.com").await.unwrap(), version);
}

#[tokio::test]
async fn query_on_a_cold_cache_fetches_the_zone() {
    let (provider, backend, cache, _store) = setup();
    backend.seed(DOMAIN, cluster_a("default", "1.1.1.1"));

    let found = provider
        .query_record(DOMAIN, "edge1", &RecordType::A)
        .await
        .unwrap();

    assert!(found.is_some());
    assert_eq!(get_records_calls(&backend), 1);
    assert_eq!(cache.len(), 1);
}
