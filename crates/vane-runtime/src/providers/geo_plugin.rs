//! geoPlugin location provider.
//!
//! No API key required; 120 lookups per minute. The endpoint answers
//! HTTP 200 with a `geoplugin_status` field carrying the real outcome,
//! and reports coordinates as strings.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use vane_core::{Attribution, Location};

use super::{
    http_client, http_error, metered_call, parse_ip, LocationProvider, Metered, ProviderError,
    ProviderFactory, DEFAULT_CALL_TIMEOUT,
};
use crate::usage::{UsageMeter, UsageTracker};

/// 120 lookups per minute.
const QUOTA_LIMIT: u32 = 120;

/// Counters reset every minute.
const WINDOW: Duration = Duration::from_secs(60);

/// geoPlugin adapter.
pub struct GeoPlugin {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    usage: UsageMeter,
}

impl GeoPlugin {
    /// Create an adapter registered against the shared tracker.
    pub fn new(tracker: &UsageTracker) -> Self {
        Self {
            base_url: "http://www.geoplugin.net".to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
            client: http_client(DEFAULT_CALL_TIMEOUT),
            usage: tracker.meter("geo-plugin", None, QUOTA_LIMIT, WINDOW),
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn fetch(&self, ip: IpAddr) -> Result<Location, ProviderError> {
        let url = format!("{}/json.gp?ip={}", self.base_url, ip);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request rejected")
                    .to_string(),
            });
        }

        let body: GeoPluginResponse = response
            .json()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        if body.geoplugin_status != 200 {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("geoplugin_status {}", body.geoplugin_status),
            });
        }

        Ok(body.into_location(ip, self.attribution()))
    }
}

impl Metered for GeoPlugin {
    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

#[async_trait]
impl LocationProvider for GeoPlugin {
    fn name(&self) -> &'static str {
        "geo-plugin"
    }

    fn attribution(&self) -> Attribution {
        Attribution::new("GeoPlugin", "https://www.geoplugin.com/")
    }

    async fn locate(&self, ip: &str) -> Result<Location, ProviderError> {
        let ip = parse_ip(ip)?;
        metered_call(&self.usage, self.fetch(ip)).await
    }
}

/// geoPlugin response format. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct GeoPluginResponse {
    geoplugin_status: i64,
    #[serde(default)]
    geoplugin_city: String,
    #[serde(default, rename = "geoplugin_countryName")]
    geoplugin_country_name: String,
    #[serde(default, rename = "geoplugin_countryCode")]
    geoplugin_country_code: String,
    #[serde(default)]
    geoplugin_region: String,
    #[serde(default, rename = "geoplugin_regionCode")]
    geoplugin_region_code: String,
    #[serde(default)]
    geoplugin_latitude: Option<String>,
    #[serde(default)]
    geoplugin_longitude: Option<String>,
    #[serde(default)]
    geoplugin_timezone: Option<String>,
}

impl GeoPluginResponse {
    fn into_location(self, ip: IpAddr, provider: Attribution) -> Location {
        Location {
            ip: ip.to_string(),
            latitude: self.geoplugin_latitude.and_then(|v| v.parse().ok()),
            longitude: self.geoplugin_longitude.and_then(|v| v.parse().ok()),
            city: self.geoplugin_city,
            region: self.geoplugin_region,
            region_code: self.geoplugin_region_code,
            country: self.geoplugin_country_name,
            country_code: self.geoplugin_country_code,
            zip_code: None,
            time_zone: self.geoplugin_timezone.filter(|t| !t.is_empty()),
            provider,
        }
    }
}

/// Factory for creating geoPlugin providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "http://www.geoplugin.net"   // Optional, custom endpoint
/// }
/// ```
pub struct GeoPluginFactory;

impl ProviderFactory<dyn LocationProvider> for GeoPluginFactory {
    fn provider_type(&self) -> &'static str {
        "geo-plugin"
    }

    fn create(
        &self,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<dyn LocationProvider>, ProviderError> {
        let mut provider = GeoPlugin::new(tracker);
        if let Some(url) = config["base_url"].as_str() {
            provider = provider.with_base_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "geoPlugin geolocation, keyless free tier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_maps_string_coordinates() {
        let json = r#"{
            "geoplugin_status": 200,
            "geoplugin_city": "Montreal",
            "geoplugin_countryName": "Canada",
            "geoplugin_countryCode": "CA",
            "geoplugin_region": "Quebec",
            "geoplugin_regionCode": "QC",
            "geoplugin_latitude": "45.5088",
            "geoplugin_longitude": "-73.5878",
            "geoplugin_timezone": "America/Toronto"
        }"#;

        let body: GeoPluginResponse = serde_json::from_str(json).unwrap();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let location = body.into_location(ip, Attribution::default());

        assert_eq!(location.latitude, Some(45.5088));
        assert_eq!(location.longitude, Some(-73.5878));
        assert_eq!(location.region_code, "QC");
        assert!(location.zip_code.is_none());
    }

    #[test]
    fn test_unparseable_coordinates_become_none() {
        let json = r#"{
            "geoplugin_status": 200,
            "geoplugin_latitude": "",
            "geoplugin_longitude": "n/a"
        }"#;

        let body: GeoPluginResponse = serde_json::from_str(json).unwrap();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let location = body.into_location(ip, Attribution::default());

        assert!(location.latitude.is_none());
        assert!(location.longitude.is_none());
    }

    #[test]
    fn test_not_found_status_parses() {
        let json = r#"{"geoplugin_status": 404}"#;
        let body: GeoPluginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.geoplugin_status, 404);
    }

    #[tokio::test]
    async fn test_invalid_ip_touches_no_counter() {
        let tracker = UsageTracker::new();
        let provider = GeoPlugin::new(&tracker);

        let err = provider.locate("").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert_eq!(provider.usage().total(), 0);
    }

    #[test]
    fn test_quota_facts() {
        let tracker = UsageTracker::new();
        let provider = GeoPlugin::new(&tracker);

        assert_eq!(provider.quota_limit(), 120);
        assert_eq!(provider.window(), Duration::from_secs(60));
        assert_eq!(provider.identity(), "geo-plugin");
    }

    #[test]
    fn test_factory_provider_type() {
        assert_eq!(GeoPluginFactory.provider_type(), "geo-plugin");
    }
}
