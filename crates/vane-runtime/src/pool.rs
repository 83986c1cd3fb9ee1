//! Immutable provider pools.
//!
//! A pool is assembled once at startup in priority order and never
//! changes afterwards. Failover is caller-driven: call [`ProviderPool::
//! next`], query the chosen provider, and on a call error ask the pool
//! again; selection will have moved past the provider whose failure
//! counter just grew.

use std::fmt;
use std::sync::Arc;

use crate::providers::{LocationProvider, Metered, ProviderError, WeatherProvider};
use crate::select::next_available;

/// An ordered, immutable collection of providers sharing one
/// capability.
pub struct ProviderPool<P: ?Sized> {
    providers: Vec<Arc<P>>,
}

/// Pool of IP-to-location resolvers.
pub type LocationPool = ProviderPool<dyn LocationProvider>;

/// Pool of location-to-weather resolvers.
pub type WeatherPool = ProviderPool<dyn WeatherProvider>;

impl<P: Metered + ?Sized> ProviderPool<P> {
    /// Build a pool. Order is priority order: put the cheapest or most
    /// reliable provider first, since selection breaks ties by it.
    pub fn new(providers: Vec<Arc<P>>) -> Self {
        Self { providers }
    }

    /// Pick the best provider currently under its quota.
    pub fn next(&self) -> Result<Arc<P>, ProviderError> {
        next_available(&self.providers).ok_or(ProviderError::Unavailable)
    }

    /// Providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<P>> {
        self.providers.iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the pool has no providers at all.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl<P: Metered + ?Sized> From<Vec<Arc<P>>> for ProviderPool<P> {
    fn from(providers: Vec<Arc<P>>) -> Self {
        Self::new(providers)
    }
}

impl<P: Metered + ?Sized> fmt::Debug for ProviderPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identities: Vec<&str> = self.providers.iter().map(|p| p.identity()).collect();
        f.debug_struct("ProviderPool")
            .field("providers", &identities)
            .finish()
    }
}
