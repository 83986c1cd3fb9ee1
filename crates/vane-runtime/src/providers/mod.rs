//! Lookup provider abstractions.
//!
//! This module defines the contract every external lookup provider
//! implements (identity, quota, usage counters, and the query
//! operation) and includes feature-gated adapters for the supported
//! vendors.
//!
//! ## Counter discipline
//!
//! A provider's counters always reflect real call results: the query
//! operations validate input first (invalid input touches no counter),
//! then run the external call through [`metered_call`], which charges
//! exactly one success or one failure per completed attempt, including
//! on error paths. The network call is the only suspension point and
//! happens outside any lock.
//!
//! ## Security
//!
//! Vendors that require an API key use the [`secrets`] module for
//! credential handling. See [`ApiCredential`] for the patterns.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use vane_core::{Attribution, Forecast, Location, WeatherQuery, WeatherReport};

use crate::usage::UsageMeter;

mod registry;
pub mod secrets;

#[cfg(feature = "ip-api")]
mod ip_api;

#[cfg(feature = "geo-plugin")]
mod geo_plugin;

#[cfg(feature = "ip-info-db")]
mod ip_info_db;

#[cfg(feature = "open-weather-map")]
mod open_weather_map;

#[cfg(feature = "pirate-weather")]
mod pirate_weather;

pub use registry::{PoolEntry, ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "ip-api")]
pub use ip_api::{IpApi, IpApiFactory};

#[cfg(feature = "geo-plugin")]
pub use geo_plugin::{GeoPlugin, GeoPluginFactory};

#[cfg(feature = "ip-info-db")]
pub use ip_info_db::{IpInfoDb, IpInfoDbFactory};

#[cfg(feature = "open-weather-map")]
pub use open_weather_map::{OpenWeatherMap, OpenWeatherMapFactory};

#[cfg(feature = "pirate-weather")]
pub use pirate_weather::{PirateWeather, PirateWeatherFactory};

/// How long an adapter waits on a vendor before the call counts as a
/// failed attempt.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from lookup providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Malformed or empty input; no counter was touched.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Selection found no provider under its quota. Surfaced
    /// immediately, never retried internally.
    #[error("No provider is under its quota limit")]
    Unavailable,

    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The vendor answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The vendor's response body did not parse.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// The vendor did not answer in time; counted as a failed call.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Missing credential or unknown provider type.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Standalone forecast requested from a vendor that has none.
    #[error("Standalone forecast not supported by {0}")]
    Unsupported(&'static str),
}

/// Quota-tracked capability shared by every provider.
///
/// The provided methods delegate to the provider's [`UsageMeter`], so
/// implementors only wire up `usage()`.
pub trait Metered {
    /// The meter this provider charges calls against.
    fn usage(&self) -> &UsageMeter;

    /// Identity key: concrete type plus credential fingerprint.
    fn identity(&self) -> &str {
        self.usage().key()
    }

    /// Maximum combined calls per window. Never changes.
    fn quota_limit(&self) -> u32 {
        self.usage().quota_limit()
    }

    /// How long a usage window lasts. Never changes.
    fn window(&self) -> Duration {
        self.usage().window()
    }

    /// Whether another call fits under the quota:
    /// `successes + failures < quota_limit`, at every observation.
    fn is_available(&self) -> bool {
        self.usage().is_available()
    }
}

/// An IP-to-location resolver.
#[async_trait]
pub trait LocationProvider: Metered + Send + Sync {
    /// Short vendor name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Vendor attribution stamped onto resolved records.
    fn attribution(&self) -> Attribution;

    /// Resolve a textual IP literal (v4 or v6) to a location.
    async fn locate(&self, ip: &str) -> Result<Location, ProviderError>;
}

/// A location-to-weather resolver.
#[async_trait]
pub trait WeatherProvider: Metered + Send + Sync {
    /// Short vendor name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Vendor attribution stamped onto resolved records.
    fn attribution(&self) -> Attribution;

    /// Whether [`WeatherProvider::weather`] already carries the
    /// forecast, making a separate forecast call unnecessary.
    fn forecast_bundled(&self) -> bool {
        false
    }

    /// Resolve current conditions (and, for bundling vendors, the
    /// forecast) for a query.
    async fn weather(&self, query: &WeatherQuery) -> Result<WeatherReport, ProviderError>;

    /// Resolve the short-term forecast for a query.
    ///
    /// Vendors that bundle the forecast into `weather` serve it from
    /// there; vendors with a dedicated endpoint override this.
    async fn forecast(&self, query: &WeatherQuery) -> Result<Vec<Forecast>, ProviderError> {
        if self.forecast_bundled() {
            Ok(self.weather(query).await?.forecast)
        } else {
            Err(ProviderError::Unsupported(self.name()))
        }
    }
}

/// Run an external call and charge its outcome to `usage`.
///
/// Exactly one counter moves per completed attempt: success on `Ok`,
/// failure on `Err`, and the error then propagates unchanged. Validation
/// belongs BEFORE this call; invalid input must not reach it.
pub async fn metered_call<T, F>(usage: &UsageMeter, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match call.await {
        Ok(value) => {
            usage.record_success();
            Ok(value)
        }
        Err(err) => {
            usage.record_failure();
            tracing::warn!(key = %usage.key(), error = %err, "provider call failed");
            Err(err)
        }
    }
}

/// Validate a textual IP literal.
#[cfg(any(feature = "ip-api", feature = "geo-plugin", feature = "ip-info-db"))]
pub(crate) fn parse_ip(ip: &str) -> Result<std::net::IpAddr, ProviderError> {
    let trimmed = ip.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::InvalidInput("empty IP".to_string()));
    }

    trimmed
        .parse()
        .map_err(|_| ProviderError::InvalidInput(format!("not an IP literal: '{trimmed}'")))
}

/// Map a transport error onto the taxonomy.
#[cfg(feature = "reqwest")]
pub(crate) fn http_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if err.is_decode() {
        ProviderError::Parse(err.to_string())
    } else {
        ProviderError::Http(err.to_string())
    }
}

/// Build the HTTP client adapters share.
#[cfg(feature = "reqwest")]
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageTracker;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    struct MockLocation {
        usage: UsageMeter,
        fail: bool,
    }

    impl MockLocation {
        fn new(tracker: &UsageTracker, fail: bool) -> Self {
            Self {
                usage: tracker.meter("mock-location", None, 5, MINUTE),
                fail,
            }
        }
    }

    impl Metered for MockLocation {
        fn usage(&self) -> &UsageMeter {
            &self.usage
        }
    }

    #[async_trait]
    impl LocationProvider for MockLocation {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn attribution(&self) -> Attribution {
            Attribution::new("Mock", "https://example.com/")
        }

        async fn locate(&self, ip: &str) -> Result<Location, ProviderError> {
            if ip.trim().is_empty() {
                return Err(ProviderError::InvalidInput("empty IP".to_string()));
            }

            metered_call(&self.usage, async {
                if self.fail {
                    Err(ProviderError::Http("connection refused".to_string()))
                } else {
                    Ok(Location::for_ip(ip))
                }
            })
            .await
        }
    }

    struct MockWeather {
        usage: UsageMeter,
        bundled: bool,
    }

    impl Metered for MockWeather {
        fn usage(&self) -> &UsageMeter {
            &self.usage
        }
    }

    #[async_trait]
    impl WeatherProvider for MockWeather {
        fn name(&self) -> &'static str {
            "mock-weather"
        }

        fn attribution(&self) -> Attribution {
            Attribution::new("Mock Weather", "https://example.com/")
        }

        fn forecast_bundled(&self) -> bool {
            self.bundled
        }

        async fn weather(&self, _query: &WeatherQuery) -> Result<WeatherReport, ProviderError> {
            metered_call(&self.usage, async {
                Ok(WeatherReport {
                    forecast: vec![],
                    ..Default::default()
                })
            })
            .await
        }
    }

    #[tokio::test]
    async fn test_success_charges_success_counter() {
        let tracker = UsageTracker::new();
        let provider = MockLocation::new(&tracker, false);

        provider.locate("203.0.113.7").await.unwrap();

        assert_eq!(provider.usage().successes(), 1);
        assert_eq!(provider.usage().failures(), 0);
    }

    #[tokio::test]
    async fn test_call_failure_charges_failure_counter() {
        let tracker = UsageTracker::new();
        let provider = MockLocation::new(&tracker, true);

        let err = provider.locate("203.0.113.7").await.unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)));

        assert_eq!(provider.usage().successes(), 0);
        assert_eq!(provider.usage().failures(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_touches_no_counter() {
        let tracker = UsageTracker::new();
        let provider = MockLocation::new(&tracker, false);

        let err = provider.locate("   ").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));

        assert_eq!(provider.usage().total(), 0);
    }

    #[tokio::test]
    async fn test_availability_follows_quota() {
        let tracker = UsageTracker::new();
        let provider = MockLocation::new(&tracker, false);

        for _ in 0..5 {
            assert!(provider.is_available());
            provider.locate("203.0.113.7").await.unwrap();
        }

        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn test_bundled_forecast_served_from_weather() {
        let tracker = UsageTracker::new();
        let provider = MockWeather {
            usage: tracker.meter("mock-weather", None, 5, MINUTE),
            bundled: true,
        };

        let forecast = provider.forecast(&WeatherQuery::default()).await.unwrap();
        assert!(forecast.is_empty());
        assert_eq!(provider.usage().successes(), 1);
    }

    #[tokio::test]
    async fn test_unbundled_forecast_is_unsupported() {
        let tracker = UsageTracker::new();
        let provider = MockWeather {
            usage: tracker.meter("mock-weather", None, 5, MINUTE),
            bundled: false,
        };

        let err = provider.forecast(&WeatherQuery::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported("mock-weather")));
        assert_eq!(provider.usage().total(), 0);
    }

    #[test]
    fn test_metered_trait_exposes_meter_facts() {
        let tracker = UsageTracker::new();
        let provider = MockLocation::new(&tracker, false);

        assert_eq!(provider.identity(), "mock-location");
        assert_eq!(provider.quota_limit(), 5);
        assert_eq!(provider.window(), MINUTE);
    }
}
