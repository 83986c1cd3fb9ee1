//! Provider factory pattern for config-driven pool assembly.
//!
//! This module enables adding new vendor adapters without modifying
//! enums. Adapters register factories that create instances from
//! configuration; an ordered list of factory configs becomes a
//! [`ProviderPool`] in one call.
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = UsageTracker::new();
//! let registry = ProviderRegistry::with_defaults();
//!
//! let pool = registry.build_pool(
//!     &[
//!         PoolEntry::provider("ip-api"),
//!         PoolEntry::provider("geo-plugin"),
//!     ],
//!     &tracker,
//! )?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{Metered, ProviderError};
use crate::pool::ProviderPool;
use crate::usage::UsageTracker;

/// Factory for creating providers from configuration.
///
/// Implement this trait to add a new vendor without touching the rest
/// of the access layer. Each factory is responsible for:
/// 1. Validating its configuration format
/// 2. Creating provider instances registered against the shared tracker
/// 3. Providing a unique type identifier
pub trait ProviderFactory<P: ?Sized>: Send + Sync {
    /// Unique identifier for this provider type.
    ///
    /// Examples: "ip-api", "geo-plugin", "open-weather-map"
    fn provider_type(&self) -> &'static str;

    /// Create a provider instance from JSON configuration.
    ///
    /// The tracker is where the instance registers its usage meter;
    /// every instance of one type built against one tracker shares the
    /// type's lock, and instances with the same credential share one
    /// quota.
    fn create(
        &self,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<P>, ProviderError>;

    /// Validate configuration without creating a provider.
    ///
    /// Use this for fast config validation during startup.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Human-readable description of this provider.
    fn description(&self) -> &'static str {
        "Lookup provider"
    }
}

/// One position in a pool configuration. Order in the list is priority
/// order; selection breaks full ties by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Factory type name (e.g. "ip-api")
    pub provider: String,

    /// Factory-specific configuration
    #[serde(default)]
    pub config: JsonValue,
}

impl PoolEntry {
    /// Entry with an empty config.
    pub fn provider(provider_type: impl Into<String>) -> Self {
        Self {
            provider: provider_type.into(),
            config: JsonValue::Null,
        }
    }

    /// Entry with a config object.
    pub fn with_config(provider_type: impl Into<String>, config: JsonValue) -> Self {
        Self {
            provider: provider_type.into(),
            config,
        }
    }
}

/// Registry of available provider factories for one capability.
///
/// The registry maintains a mapping of provider type names to their
/// factories. Use this to dynamically create providers and assemble
/// pools from configuration.
pub struct ProviderRegistry<P: ?Sized> {
    factories: BTreeMap<String, Arc<dyn ProviderFactory<P>>>,
}

impl<P: ?Sized> Default for ProviderRegistry<P> {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }
}

impl<P: ?Sized> ProviderRegistry<P> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory with the same type already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory<P>>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Create a provider from type name and configuration.
    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<P>, ProviderError> {
        self.factories
            .get(provider_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Unknown provider type: '{}'. Available: {:?}",
                    provider_type,
                    self.available_types()
                ))
            })?
            .create(config, tracker)
    }

    /// Validate configuration for a provider type.
    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factories
            .get(provider_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("Unknown provider type: '{}'", provider_type))
            })?
            .validate_config(config)
    }

    /// List available provider types.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a provider type is registered.
    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Get the factory for a provider type.
    pub fn get_factory(&self, provider_type: &str) -> Option<&Arc<dyn ProviderFactory<P>>> {
        self.factories.get(provider_type)
    }
}

impl<P: Metered + ?Sized> ProviderRegistry<P> {
    /// Assemble an immutable pool from an ordered config list.
    ///
    /// Entry order becomes the pool's registration order, so list the
    /// preferred provider first.
    pub fn build_pool(
        &self,
        entries: &[PoolEntry],
        tracker: &UsageTracker,
    ) -> Result<ProviderPool<P>, ProviderError> {
        let mut providers = Vec::with_capacity(entries.len());
        for entry in entries {
            providers.push(self.create(&entry.provider, &entry.config, tracker)?);
        }

        Ok(ProviderPool::new(providers))
    }
}

#[cfg(any(feature = "ip-api", feature = "geo-plugin", feature = "ip-info-db"))]
impl ProviderRegistry<dyn super::LocationProvider> {
    /// Create a registry with all compiled-in location vendors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "ip-api")]
        registry.register(Arc::new(super::IpApiFactory));

        #[cfg(feature = "geo-plugin")]
        registry.register(Arc::new(super::GeoPluginFactory));

        #[cfg(feature = "ip-info-db")]
        registry.register(Arc::new(super::IpInfoDbFactory));

        registry
    }
}

#[cfg(any(feature = "open-weather-map", feature = "pirate-weather"))]
impl ProviderRegistry<dyn super::WeatherProvider> {
    /// Create a registry with all compiled-in weather vendors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "open-weather-map")]
        registry.register(Arc::new(super::OpenWeatherMapFactory));

        #[cfg(feature = "pirate-weather")]
        registry.register(Arc::new(super::PirateWeatherFactory));

        registry
    }
}

impl<P: ?Sized> std::fmt::Debug for ProviderRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
