// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare DNS provider for the edge DNS
// reconciliation engine, registered under the type code `cloudFlare`.
//
// ## Behavior
//
// - One HTTP request per provider call (plus one zone lookup per zone per
//   provider instance)
// - Full error propagation to the executor, which owns retries
// - HTTP timeout configured (30 seconds)
// - Status codes mapped to typed errors (401/403, 404, 429, others); a 404
//   on a record URL is a missing record, not a missing zone
// - Record names converted between Cloudflare's absolute form and the
//   relative form the platform uses (`@` for the zone apex)
// - Cloudflare has no routing lines: `get_routes` is empty and the default
//   route is `""`
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=..&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use edgedns_core::config::ProviderConfig;
use edgedns_core::record::{Record, RecordType, Route};
use edgedns_core::traits::{DnsProvider, DnsProviderFactory, ProviderParams};
use edgedns_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Type code provider accounts use for Cloudflare
pub const TYPE_CODE: &str = "cloudFlare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for record listings (Cloudflare's maximum is 5000, default 100)
const RECORDS_PER_PAGE: u32 = 100;

/// Page size for zone listings
const ZONES_PER_PAGE: u32 = 50;

/// Cloudflare's "automatic" TTL
const AUTO_TTL: u32 = 1;

/// Cloudflare DNS provider
///
/// Created unauthenticated by [`CloudflareFactory`]; the registry then calls
/// [`DnsProvider::auth`] with the account parameters:
///
/// - `apiToken` (required): token with Zone:DNS:Edit permission
/// - `apiEndpoint` (optional): API base URL override, for proxies and tests
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL without trailing slash
    endpoint: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Zone name → zone id, resolved at most once per instance
    zone_ids: Mutex<HashMap<String, String>>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Envelope of every Cloudflare API v4 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

/// A DNS record as Cloudflare reports it
#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    #[serde(default)]
    ttl: u32,
}

/// Body of create and update requests
#[derive(Debug, Serialize, PartialEq, Eq)]
struct RecordBody {
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: u32,
}

/// Cloudflare's name for `name` in `domain`
fn absolute_name(name: &str, domain: &str) -> String {
    match name {
        "" | "@" => domain.to_string(),
        _ => format!("{}.{}", name, domain),
    }
}

/// The platform's name for Cloudflare's `fqdn` in `domain`
fn relative_name(fqdn: &str, domain: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.');
    if fqdn.eq_ignore_ascii_case(domain) {
        return "@".to_string();
    }
    fqdn.strip_suffix(domain)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .unwrap_or(fqdn)
        .to_string()
}

impl DnsRecord {
    fn into_record(self, domain: &str) -> Record {
        Record::new(
            relative_name(&self.name, domain),
            RecordType::from(self.record_type),
            self.content,
            "",
        )
        .with_id(self.id)
        .with_ttl(self.ttl)
    }
}

impl RecordBody {
    fn from_record(record: &Record, domain: &str) -> Self {
        let content = match record.record_type {
            RecordType::Cname => record.value.trim_end_matches('.').to_string(),
            _ => record.value.clone(),
        };
        Self {
            record_type: record.record_type.as_str().to_string(),
            name: absolute_name(&record.name, domain),
            content,
            ttl: if record.ttl == 0 { AUTO_TTL } else { record.ttl },
        }
    }
}

/// Map a non-success HTTP status to a typed error
fn status_error(status: reqwest::StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions ({})",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, status)),
        429 => Error::rate_limited(format!("{}: {}", context, status)),
        500..=599 => Error::provider(
            TYPE_CODE,
            format!("{}: Cloudflare server error (transient): {} - {}", context, status, body),
        ),
        _ => Error::provider(TYPE_CODE, format!("{}: {} - {}", context, status, body)),
    }
}

/// A 404 on a record URL means the record id is gone, not the zone
fn record_scoped(err: Error) -> Error {
    match err {
        Error::NotFound(message) => Error::record_not_found(message),
        other => other,
    }
}

impl CloudflareProvider {
    /// Create an unauthenticated provider
    ///
    /// # Returns
    ///
    /// - `Err(Error::Http)`: the HTTP client could not be built
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token: String::new(),
            endpoint: CLOUDFLARE_API_BASE.to_string(),
            client,
            zone_ids: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Send a request and unwrap the API envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<ApiResponse<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &body, context));
        }

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            Error::provider(TYPE_CODE, format!("{}: failed to parse response: {}", context, e))
        })?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|m| format!("{} {}", m.code, m.message))
                .collect();
            return Err(Error::provider(
                TYPE_CODE,
                format!("{}: {}", context, messages.join("; ")),
            ));
        }

        Ok(envelope)
    }

    /// Resolve (and remember) the zone id of `domain`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self, domain: &str) -> Result<String> {
        let known = self
            .zone_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .cloned();
        if let Some(id) = known {
            return Ok(id);
        }

        tracing::debug!("Looking up zone ID for domain: {}", domain);

        let context = format!("zone lookup for {}", domain);
        let request = self
            .client
            .get(self.url("/zones"))
            .query(&[("name", domain)]);
        let zones: Vec<Zone> = self
            .send(request, &context)
            .await?
            .result
            .unwrap_or_default();

        let zone = zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(domain))
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", domain)))?;

        tracing::debug!("Found zone ID: {}", zone.id);
        self.zone_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain.to_string(), zone.id.clone());
        Ok(zone.id)
    }

    fn record_id<'a>(record: &'a Record) -> Result<&'a str> {
        if record.id.is_empty() {
            return Err(Error::invalid_input(format!(
                "record {} ({}) has no provider id",
                record.name, record.record_type
            )));
        }
        Ok(&record.id)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn auth(&mut self, params: &ProviderParams) -> Result<()> {
        let token = params
            .get("apiToken")
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::config("Cloudflare API token (apiToken) is required"))?;
        self.api_token = token.to_string();

        if let Some(endpoint) = params.get("apiEndpoint").filter(|e| !e.is_empty()) {
            self.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        Ok(())
    }

    async fn get_domains(&self) -> Result<Vec<String>> {
        let mut domains = Vec::new();
        let mut page = 1;
        loop {
            let request = self.client.get(self.url("/zones")).query(&[
                ("page", page.to_string()),
                ("per_page", ZONES_PER_PAGE.to_string()),
            ]);
            let response: ApiResponse<Vec<Zone>> = self.send(request, "zone listing").await?;
            domains.extend(response.result.unwrap_or_default().into_iter().map(|z| z.name));

            match response.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }
        Ok(domains)
    }

    /// List every record in the zone, following pagination
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?page=1&per_page=100
    /// ```
    async fn get_records(&self, domain: &str) -> Result<Vec<Record>> {
        let zone_id = self.zone_id(domain).await?;
        let context = format!("record listing for {}", domain);

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let request = self
                .client
                .get(self.url(&format!("/zones/{}/dns_records", zone_id)))
                .query(&[
                    ("page", page.to_string()),
                    ("per_page", RECORDS_PER_PAGE.to_string()),
                ]);
            let response: ApiResponse<Vec<DnsRecord>> = self.send(request, &context).await?;
            records.extend(
                response
                    .result
                    .unwrap_or_default()
                    .into_iter()
                    .map(|r| r.into_record(domain)),
            );

            match response.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }

        tracing::debug!("Fetched {} record(s) of {}", records.len(), domain);
        Ok(records)
    }

    async fn get_routes(&self, _domain: &str) -> Result<Vec<Route>> {
        Ok(Vec::new())
    }

    async fn query_record(
        &self,
        domain: &str,
        name: &str,
        record_type: &RecordType,
    ) -> Result<Option<Record>> {
        let zone_id = self.zone_id(domain).await?;
        let fqdn = absolute_name(name, domain);
        let context = format!("record lookup for {} ({})", fqdn, record_type);

        let request = self
            .client
            .get(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .query(&[("name", fqdn.as_str()), ("type", record_type.as_str())]);
        let response: ApiResponse<Vec<DnsRecord>> = self.send(request, &context).await?;

        Ok(response
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|r| r.into_record(domain)))
    }

    async fn add_record(&self, domain: &str, record: &Record) -> Result<Record> {
        let zone_id = self.zone_id(domain).await?;
        let body = RecordBody::from_record(record, domain);
        let context = format!("create {} {}", body.record_type, body.name);

        let request = self
            .client
            .post(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .json(&body);
        let created: DnsRecord = self
            .send(request, &context)
            .await?
            .result
            .ok_or_else(|| Error::provider(TYPE_CODE, format!("{}: empty result", context)))?;

        tracing::info!("Created Cloudflare record {} -> {}", body.name, body.content);
        Ok(created.into_record(domain))
    }

    async fn update_record(&self, domain: &str, record: &Record, new_record: &Record) -> Result<()> {
        let zone_id = self.zone_id(domain).await?;
        let record_id = Self::record_id(record)?;
        let body = RecordBody::from_record(new_record, domain);
        let context = format!("update {} {}", body.record_type, body.name);

        let request = self
            .client
            .put(self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id)))
            .json(&body);
        self.send::<serde_json::Value>(request, &context)
            .await
            .map_err(record_scoped)?;

        tracing::info!("Updated Cloudflare record {} -> {}", body.name, body.content);
        Ok(())
    }

    async fn delete_record(&self, domain: &str, record: &Record) -> Result<()> {
        let zone_id = self.zone_id(domain).await?;
        let record_id = Self::record_id(record)?;
        let context = format!("delete record {} in {}", record_id, domain);

        let request = self
            .client
            .delete(self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id)));
        self.send::<serde_json::Value>(request, &context)
            .await
            .map_err(record_scoped)?;

        tracing::info!("Deleted Cloudflare record {} ({})", record.name, record_id);
        Ok(())
    }

    fn default_route(&self) -> String {
        String::new()
    }

    fn provider_name(&self) -> &'static str {
        TYPE_CODE
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(CloudflareProvider::new()?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// This function should be called during initialization to make the
/// Cloudflare provider available.
///
/// # Example
///
/// ```rust
/// use edgedns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// edgedns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudFlare"));
/// ```
pub fn register(registry: &edgedns_core::ProviderRegistry) {
    registry.register_provider(TYPE_CODE, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgedns_core::ProviderRegistry;

    fn authed(token: &str) -> CloudflareProvider {
        let mut provider = CloudflareProvider::new().unwrap();
        let params = ProviderParams::from([("apiToken".to_string(), token.to_string())]);
        provider.auth(&params).unwrap();
        provider
    }

    #[test]
    fn test_register_and_create() {
        let registry = ProviderRegistry::new();
        register(&registry);

        let config = ProviderConfig::new(1, TYPE_CODE).with_param("apiToken", "test_token");
        let provider = registry.create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "cloudFlare");
        assert_eq!(provider.default_route(), "");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let registry = ProviderRegistry::new();
        register(&registry);

        let missing = ProviderConfig::new(1, TYPE_CODE);
        assert!(matches!(registry.create_provider(&missing), Err(Error::Config(_))));

        let blank = ProviderConfig::new(1, TYPE_CODE).with_param("apiToken", "  ");
        assert!(matches!(registry.create_provider(&blank), Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_override() {
        let mut provider = authed("t");
        assert_eq!(provider.url("/zones"), "https://api.cloudflare.com/client/v4/zones");

        let params = ProviderParams::from([
            ("apiToken".to_string(), "t".to_string()),
            ("apiEndpoint".to_string(), "http://127.0.0.1:8080/v4/".to_string()),
        ]);
        provider.auth(&params).unwrap();
        assert_eq!(provider.url("/zones"), "http://127.0.0.1:8080/v4/zones");
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = authed("secret_token_12345");

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_name_conversion() {
        assert_eq!(absolute_name("edge1", "example.com"), "edge1.example.com");
        assert_eq!(absolute_name("@", "example.com"), "example.com");
        assert_eq!(absolute_name("", "example.com"), "example.com");

        assert_eq!(relative_name("edge1.example.com", "example.com"), "edge1");
        assert_eq!(relative_name("a.b.example.com.", "example.com"), "a.b");
        assert_eq!(relative_name("example.com", "example.com"), "@");
        // not inside the zone: keep as reported
        assert_eq!(relative_name("notexample.com", "example.com"), "notexample.com");
    }

    #[test]
    fn test_record_body() {
        let record = Record::new("edge1", RecordType::Cname, "c1.example.com.", "");
        let body = RecordBody::from_record(&record, "example.com");
        assert_eq!(
            body,
            RecordBody {
                record_type: "CNAME".to_string(),
                name: "edge1.example.com".to_string(),
                content: "c1.example.com".to_string(),
                ttl: AUTO_TTL,
            }
        );

        let a = Record::new("edge1", RecordType::A, "1.1.1.1", "").with_ttl(600);
        let body = RecordBody::from_record(&a, "example.com");
        assert_eq!(body.ttl, 600);
        assert_eq!(body.content, "1.1.1.1");
    }

    #[test]
    fn test_record_parsing() {
        let json = r#"{
            "success": true,
            "errors": [],
            "result": [
                {"id": "r1", "name": "edge1.example.com", "type": "AAAA", "content": "2001:db8::1", "ttl": 1, "proxied": false},
                {"id": "r2", "name": "example.com", "type": "CAA", "content": "0 issue \"letsencrypt.org\"", "ttl": 300}
            ],
            "result_info": {"page": 1, "per_page": 100, "total_pages": 1, "count": 2}
        }"#;
        let response: ApiResponse<Vec<DnsRecord>> = serde_json::from_str(json).unwrap();
        assert!(response.success);
        let info = response.result_info.as_ref().unwrap();
        assert_eq!((info.page, info.total_pages), (1, 1));

        let records: Vec<Record> = response
            .result
            .unwrap()
            .into_iter()
            .map(|r| r.into_record("example.com"))
            .collect();
        assert_eq!(records[0].id, "r1");
        assert_eq!(records[0].name, "edge1");
        assert_eq!(records[0].record_type, RecordType::Aaaa);
        assert_eq!(records[0].route, "");
        assert_eq!(records[1].name, "@");
        assert_eq!(records[1].record_type, RecordType::Other("CAA".to_string()));
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "", "zone lookup"),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "", "zone lookup"),
            Error::Authentication(_)
        ));

        let zone_gone = status_error(StatusCode::NOT_FOUND, "", "zone lookup for example.com");
        assert!(!zone_gone.is_retryable());

        // record URLs narrow a 404 to the record
        let record_gone = record_scoped(status_error(StatusCode::NOT_FOUND, "", "delete record r1"));
        assert!(matches!(record_gone, Error::RecordNotFound(_)));
        assert!(record_gone.is_retryable());
        assert!(matches!(
            record_scoped(status_error(StatusCode::TOO_MANY_REQUESTS, "", "delete record r1")),
            Error::RateLimited(_)
        ));

        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "", "create"),
            Error::RateLimited(_)
        ));
        let server = status_error(StatusCode::BAD_GATEWAY, "upstream", "create");
        assert!(matches!(server, Error::Provider { .. }));
        assert!(server.is_retryable());
    }

    #[test]
    fn test_record_without_id_is_rejected() {
        let record = Record::new("edge1", RecordType::A, "1.1.1.1", "");
        assert!(matches!(
            CloudflareProvider::record_id(&record),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_no_routes() {
        let provider = authed("t");
        assert!(provider.get_routes("example.com").await.unwrap().is_empty());
    }
}
