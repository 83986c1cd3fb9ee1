//! # vane-core
//!
//! Domain models for the vane lookup-provider aggregation layer.
//!
//! This crate defines the records that lookup providers resolve:
//! - IP-to-location results ([`Location`])
//! - location-to-weather results ([`WeatherReport`], [`Forecast`])
//! - the query shape weather providers accept ([`WeatherQuery`])
//!
//! ## Key Guarantees
//!
//! 1. **Pure data**: no network, no clocks, no shared state
//! 2. **Vendor-neutral**: every provider, whatever its wire format,
//!    resolves into these types
//! 3. **Attributed**: each record carries which vendor produced it
//!
//! Quota tracking, provider selection, and the vendor adapters live in
//! `vane-runtime`.

pub mod location;
pub mod weather;

// Re-export main types at crate root
pub use location::{Attribution, Location};
pub use weather::{
    thin_to_schedule, Forecast, WeatherCondition, WeatherQuery, WeatherReport, FORECAST_LIMIT,
    FORECAST_SLOTS,
};
