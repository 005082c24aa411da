// # DNS Provider Trait
//
// Defines the capability interface every DNS backend implements.
//
// ## Implementations
//
// - Cloudflare: `edgedns-provider-cloudflare` crate
// - Other vendors (AliDNS, DNSPod, Huawei, ...) register under their own type
//   code through `ProviderRegistry`
//
// ## Usage
//
// ```rust,ignore
// use edgedns_core::{DnsProvider, Record, RecordType};
//
// let record = provider.query_record("example.com", "edge1", &RecordType::Cname).await?;
// if record.is_none() {
//     provider
//         .add_record(
//             "example.com",
//             &Record::new("edge1", RecordType::Cname, "c1.example.com.", provider.default_route()),
//         )
//         .await?;
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::ProviderConfig;
use crate::record::{Record, RecordType, Route};

/// Decoded provider API parameters (`apiToken`, `accessKeyId`, ...)
pub type ProviderParams = HashMap<String, String>;

/// Trait for DNS provider implementations
///
/// Providers are stateless remote API clients. They execute one logical
/// operation per call and return typed errors; retrying, scheduling and
/// caching belong to the executor and [`crate::cache::CachedProvider`].
///
/// # Error contract
///
/// - A zone that does not exist at the provider is reported as
///   [`crate::Error::NotFound`]; the executor drops the task in that case.
/// - An unknown record id in `update_record`/`delete_record` is reported as
///   [`crate::Error::RecordNotFound`]. A delete that hits it counts as done.
/// - Everything else (network, rate limit, 5xx) is retryable.
/// - [`DnsProvider::query_record`] returns `Ok(None)` when the record is absent;
///   absence is not an error.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Store and check the API parameters
    ///
    /// Called once by the registry right after construction.
    fn auth(&mut self, params: &ProviderParams) -> Result<(), crate::Error>;

    /// List the zones this account can manage
    async fn get_domains(&self) -> Result<Vec<String>, crate::Error>;

    /// Fetch every record of a zone
    async fn get_records(&self, domain: &str) -> Result<Vec<Record>, crate::Error>;

    /// List the routes (lines) the provider offers for a zone
    async fn get_routes(&self, domain: &str) -> Result<Vec<Route>, crate::Error>;

    /// Find one record by name and type
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Record))`: the first matching record
    /// - `Ok(None)`: no such record
    async fn query_record(
        &self,
        domain: &str,
        name: &str,
        record_type: &RecordType,
    ) -> Result<Option<Record>, crate::Error>;

    /// Create a record
    ///
    /// # Returns
    ///
    /// The created record carrying its provider-assigned id
    async fn add_record(&self, domain: &str, record: &Record) -> Result<Record, crate::Error>;

    /// Replace `record` (identified by its id) with `new_record`
    async fn update_record(
        &self,
        domain: &str,
        record: &Record,
        new_record: &Record,
    ) -> Result<(), crate::Error>;

    /// Delete a record (identified by its id)
    async fn delete_record(&self, domain: &str, record: &Record) -> Result<(), crate::Error>;

    /// Route code used when a node has no explicit route assignment
    fn default_route(&self) -> String;

    /// Provider type code (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create an unauthenticated provider instance
    ///
    /// The registry calls [`DnsProvider::auth`] on the returned instance.
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
