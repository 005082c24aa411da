//! Provider registry keyed by type code
//!
//! Provider accounts name their backend with a type code (`alidns`,
//! `cloudFlare`, `dnspod`, ...). The registry maps each code to a factory so
//! the executor never branches on vendor names.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edgedns_core::{ProviderConfig, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new();
//! edgedns_provider_cloudflare::register(&registry);
//!
//! let config = ProviderConfig::new(1, "cloudFlare").with_param("apiToken", token);
//! let provider = registry.create_provider(&config)?;
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register()` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudFlare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry of DNS provider factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under a type code
    ///
    /// Registering the same code twice replaces the earlier factory.
    pub fn register_provider(&self, type_code: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(type_code.into(), factory);
    }

    /// Create and authenticate a provider for an account
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: ready-to-use provider
    /// - `Err(Error::Config)`: unknown type code or invalid parameters
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        config.validate()?;

        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = providers.get(config.type_name()).ok_or_else(|| {
            Error::config(format!("Unknown provider type: {}", config.type_name()))
        })?;

        let mut provider = factory.create(config)?;
        provider.auth(&config.params)?;
        Ok(provider)
    }

    /// List all registered type codes
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// Check if a type code is registered
    pub fn has_provider(&self, type_code: &str) -> bool {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(type_code)
    }
}
