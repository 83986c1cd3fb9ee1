//! IP-API.com location provider.
//!
//! No API key required, but the free tier allows 45 requests per
//! minute. Failures are reported in-band: the endpoint answers HTTP 200
//! with `"status": "fail"` and a message.

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

/// 45 requests per minute on the free tier.
const QUOTA_LIMIT: u32 = 45;

/// Counters reset every minute.
const WINDOW: Duration = Duration::from_secs(60);

/// IP-API.com adapter.
pub struct IpApi {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    usage: UsageMeter,
}

impl IpApi {
    /// Create an adapter registered against the shared tracker.
    pub fn new(tracker: &UsageTracker) -> Self {
        Self {
            base_url: "http://ip-api.com".to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
            client: http_client(DEFAULT_CALL_TIMEOUT),
            usage: tracker.meter("ip-api", None, QUOTA_LIMIT, WINDOW),
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn fetch(&self, ip: IpAddr) -> Result<Location, ProviderError> {
        let url = format!("{}/json/{}", self.base_url, ip);

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

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        if body.status != "success" {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body
                    .message
                    .unwrap_or_else(|| "lookup failed".to_string()),
            });
        }

        Ok(body.into_location(ip, self.attribution()))
    }
}

impl Metered for IpApi {
    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

#[async_trait]
impl LocationProvider for IpApi {
    fn name(&self) -> &'static str {
        "ip-api"
    }

    fn attribution(&self) -> Attribution {
        Attribution::new("IP-API", "https://ip-api.com/")
    }

    async fn locate(&self, ip: &str) -> Result<Location, ProviderError> {
        let ip = parse_ip(ip)?;
        metered_call(&self.usage, self.fetch(ip)).await
    }
}

/// IP-API.com response format.
///
/// `region` carries the short code; `regionName` the full name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    lat: Option<f32>,
    #[serde(default)]
    lon: Option<f32>,
    #[serde(default)]
    timezone: Option<String>,
}

impl IpApiResponse {
    fn into_location(self, ip: IpAddr, provider: Attribution) -> Location {
        Location {
            ip: ip.to_string(),
            latitude: self.lat,
            longitude: self.lon,
            city: self.city,
            region: self.region_name,
            region_code: self.region,
            country: self.country,
            country_code: self.country_code,
            zip_code: self.zip.filter(|z| !z.is_empty()),
            time_zone: self.timezone.filter(|t| !t.is_empty()),
            provider,
        }
    }
}

/// Factory for creating IP-API providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "http://ip-api.com"   // Optional, custom endpoint
/// }
/// ```
pub struct IpApiFactory;

impl ProviderFactory<dyn LocationProvider> for IpApiFactory {
    fn provider_type(&self) -> &'static str {
        "ip-api"
    }

    fn create(
        &self,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<dyn LocationProvider>, ProviderError> {
        let mut provider = IpApi::new(tracker);
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
        "IP-API.com geolocation, keyless free tier"
    }
}
