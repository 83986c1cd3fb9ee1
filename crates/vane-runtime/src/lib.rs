//! # vane-runtime
//!
//! Quota-tracked, failover-aware access layer over external lookup
//! providers.
//!
//! Interchangeable vendors (IP-to-location resolvers and
//! location-to-weather resolvers) sit behind one access layer that
//! tracks per-provider usage inside rolling quota windows and
//! deterministically picks the best available provider for each
//! request.
//!
//! ## Important
//!
//! The core does NOT retry. When a provider call fails its failure
//! counter has already grown; failing over means asking the pool again:
//!
//! ```rust,ignore
//! use vane_runtime::{LocationPool, ProviderError};
//!
//! async fn locate(pool: &LocationPool, ip: &str) -> Result<vane_core::Location, ProviderError> {
//!     loop {
//!         let provider = pool.next()?; // Err(Unavailable) once every provider is over quota
//!         match provider.locate(ip).await {
//!             Ok(location) => return Ok(location),
//!             Err(ProviderError::InvalidInput(msg)) => return Err(ProviderError::InvalidInput(msg)),
//!             Err(_) => continue, // counted against that provider; selection moves on
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`cache`]: keyed TTL cache; values carry their own deadline
//! - [`usage`]: per-provider windows of success/failure counts
//! - [`providers`]: the provider contract plus feature-gated vendors
//! - [`select`] / [`pool`]: deterministic choice over immutable pools

pub mod cache;
pub mod pool;
pub mod providers;
pub mod select;
pub mod usage;

// Re-export main types at crate root
pub use cache::{Deadline, Eviction, TtlCache};
pub use pool::{LocationPool, ProviderPool, WeatherPool};
pub use providers::{
    metered_call, ApiCredential, CredentialSource, LocationProvider, Metered, PoolEntry,
    ProviderError, ProviderFactory, ProviderRegistry, WeatherProvider,
};
pub use select::next_available;
pub use usage::{UsageMeter, UsageTracker, UsageWindow};
