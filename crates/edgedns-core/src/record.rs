//! DNS record and route value types
//!
//! Providers assign opaque record ids the platform cannot predict, so record
//! identity for diffing is [`RecordKey`]: the `(route, value)` pair inside a
//! `(domain, name, type)` scope.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// DNS record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Canonical name record
    Cname,
    /// Text record
    Txt,
    /// Mail exchange record
    Mx,
    /// Name server record
    Ns,
    /// Any other type a provider reports, upper-cased
    Other(String),
}

impl RecordType {
    /// The address record type matching an IP's family
    pub fn for_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    /// Wire name of the record type
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Other(name) => name,
        }
    }

    /// Whether this is an A or AAAA record
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

impl From<&str> for RecordType {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            "TXT" => RecordType::Txt,
            "MX" => RecordType::Mx,
            "NS" => RecordType::Ns,
            other => RecordType::Other(other.to_string()),
        }
    }
}

impl From<String> for RecordType {
    fn from(value: String) -> Self {
        RecordType::from(value.as_str())
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DNS record as reported by (or sent to) a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Provider-assigned id, empty until the provider created the record
    #[serde(default)]
    pub id: String,
    /// Record name relative to the zone (`@` for the apex)
    pub name: String,
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Record value (IP address, CNAME target, ...)
    pub value: String,
    /// Provider route code, empty for the provider's default line
    #[serde(default)]
    pub route: String,
    /// TTL in seconds, 0 for the provider default
    #[serde(default)]
    pub ttl: u32,
}

impl Record {
    /// Create a record without a provider id
    pub fn new(
        name: impl Into<String>,
        record_type: RecordType,
        value: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            record_type,
            value: value.into(),
            route: route.into(),
            ttl: 0,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the provider id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Diff identity of this record
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.route, &self.value)
    }

    /// Diff identity with address values in canonical form
    ///
    /// Providers echo addresses back as stored (`2001:DB8:0::1`), while
    /// desired values are built from parsed [`IpAddr`]s (`2001:db8::1`).
    /// Values that do not parse are kept verbatim.
    pub fn canonical_key(&self) -> RecordKey {
        if self.record_type.is_address()
            && let Ok(ip) = self.value.trim().parse::<IpAddr>()
        {
            return RecordKey::new(&self.route, ip.to_string());
        }
        self.key()
    }

    /// Whether this record's value matches `value`, ignoring a trailing dot
    ///
    /// Providers disagree on whether CNAME targets are reported absolute.
    pub fn value_matches(&self, value: &str) -> bool {
        same_value(&self.value, value)
    }
}

/// Compare two record values ignoring a trailing dot
pub fn same_value(a: &str, b: &str) -> bool {
    a.trim_end_matches('.') == b.trim_end_matches('.')
}

/// Diff identity of a record within a `(domain, name, type)` scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Route code
    pub route: String,
    /// Record value
    pub value: String,
}

impl RecordKey {
    /// Create a key
    pub fn new(route: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.route, self.value)
    }
}

/// A provider-exposed routing option (geographic/ISP line)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Human-readable name
    pub name: String,
    /// Code records carry in their `route` field
    pub code: String,
}

impl Route {
    /// Create a route
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}
