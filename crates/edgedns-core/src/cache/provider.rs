//! Cached provider
//!
//! Wraps a provider so read-heavy lookups go through the shared
//! [`DomainRecordsCache`], and successful mutations keep the cached list in step.
//!
//! - `get_records`: always remote; the result refreshes the cache and bumps
//!   the durable version
//! - `query_record`: cache first; on a miss, a full `get_records`
//! - `add/update/delete_record`: remote, then the matching in-place cache edit
//! - `delete_record` of an id the provider no longer knows succeeds: the
//!   record is already absent, and the cached copy is dropped

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CacheLookup, DomainRecordsCache};
use crate::error::{Error, Result};
use crate::record::{Record, RecordType, Route};
use crate::traits::{DnsProvider, ProviderParams};

/// A provider whose reads go through the domain records cache
pub struct CachedProvider {
    provider_id: i64,
    inner: Box<dyn DnsProvider>,
    cache: Arc<DomainRecordsCache>,
}

impl CachedProvider {
    /// Wrap `inner`, the provider for account `provider_id`
    pub fn new(provider_id: i64, inner: Box<dyn DnsProvider>, cache: Arc<DomainRecordsCache>) -> Self {
        Self {
            provider_id,
            inner,
            cache,
        }
    }

    /// Provider account id
    pub fn provider_id(&self) -> i64 {
        self.provider_id
    }
}

#[async_trait]
impl DnsProvider for CachedProvider {
    fn auth(&mut self, params: &ProviderParams) -> Result<()> {
        self.inner.auth(params)
    }

    async fn get_domains(&self) -> Result<Vec<String>> {
        self.inner.get_domains().await
    }

    async fn get_records(&self, domain: &str) -> Result<Vec<Record>> {
        let records = self.inner.get_records(domain).await?;

        // the fetch itself succeeded; a failed version bump only costs a later miss
        if let Err(e) = self
            .cache
            .write_domain_records(self.provider_id, domain, records.clone())
            .await
        {
            warn!("Failed to cache records of {}: {}", domain, e);
        }

        Ok(records)
    }

    async fn get_routes(&self, domain: &str) -> Result<Vec<Route>> {
        self.inner.get_routes(domain).await
    }

    async fn query_record(
        &self,
        domain: &str,
        name: &str,
        record_type: &RecordType,
    ) -> Result<Option<Record>> {
        if let CacheLookup::Hit(record) = self
            .cache
            .query_domain_record(self.provider_id, domain, name, record_type)
            .await
        {
            debug!("Cache hit for {}.{} ({})", name, domain, record_type);
            return Ok(record);
        }

        let records = self.get_records(domain).await?;
        Ok(records
            .into_iter()
            .find(|record| record.name == name && &record.record_type == record_type))
    }

    async fn add_record(&self, domain: &str, record: &Record) -> Result<Record> {
        let created = self.inner.add_record(domain, record).await?;
        self.cache
            .add_domain_record(self.provider_id, domain, created.clone());
        Ok(created)
    }

    async fn update_record(&self, domain: &str, record: &Record, new_record: &Record) -> Result<()> {
        self.inner.update_record(domain, record, new_record).await?;
        self.cache
            .update_domain_record(self.provider_id, domain, &record.id, new_record.clone());
        Ok(())
    }

    async fn delete_record(&self, domain: &str, record: &Record) -> Result<()> {
        match self.inner.delete_record(domain, record).await {
            Ok(()) => {}
            Err(Error::RecordNotFound(reason)) => {
                debug!(
                    "Record {} of {} already absent ({}), dropping cached copy",
                    record.id, domain, reason
                );
            }
            Err(e) => return Err(e),
        }
        self.cache
            .delete_domain_record(self.provider_id, domain, &record.id);
        Ok(())
    }

    fn default_route(&self) -> String {
        self.inner.default_route()
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
