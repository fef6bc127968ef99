//! Plugin-based provider registry
//!
//! DNS providers register a factory under their type name, and the daemon
//! builds providers from [`ProviderConfig`] without naming concrete types.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tasks_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! tasks_provider_route53::register(&registry);
//!
//! let provider = registry.create_provider(&config).await?;
//! ```
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In tasks-provider-cloudflare
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Map of provider type names to factories
///
/// Interior mutability lets provider crates register through a shared
/// reference. Factories are reference counted so creation runs without
/// holding the lock across an await point.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under `name`
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.insert(name.into(), Arc::from(factory));
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: Provider type not registered
    /// - `Err(Error)`: Factory failed
    pub async fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();

        let factory = {
            let providers = self
                .providers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            providers.get(provider_type).cloned()
        }
        .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config).await
    }

    /// Registered provider type names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }
}
