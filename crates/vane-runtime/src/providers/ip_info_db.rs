//! IPInfoDB location provider.
//!
//! Requires an API key. The vendor imposes no hard monthly cap but
//! queues everything past 2 calls per second, so the quota window is
//! sized to stay under that rate.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use vane_core::{Attribution, Location};

use super::{
    http_client, http_error, metered_call, parse_ip,
    secrets::{ApiCredential, CredentialSource},
    LocationProvider, Metered, ProviderError, ProviderFactory, DEFAULT_CALL_TIMEOUT,
};
use crate::usage::{UsageMeter, UsageTracker};

/// Environment variable name for the IPInfoDB API key.
pub const IP_INFO_DB_API_KEY_ENV: &str = "IP_INFO_DB_API_KEY";

/// 2 calls per second before the vendor starts queueing.
const QUOTA_LIMIT: u32 = 2;

/// Counters reset every second.
const WINDOW: Duration = Duration::from_secs(1);

/// IPInfoDB adapter.
pub struct IpInfoDb {
    credential: ApiCredential,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    usage: UsageMeter,
}

impl IpInfoDb {
    /// Create an adapter with a programmatic API key.
    pub fn new(api_key: impl Into<String>, tracker: &UsageTracker) -> Self {
        let credential = ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "IPInfoDB API key",
        );
        Self::with_credential(credential, tracker)
    }

    /// Create from the `IP_INFO_DB_API_KEY` environment variable.
    pub fn from_env(tracker: &UsageTracker) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(IP_INFO_DB_API_KEY_ENV, "IPInfoDB API key")?;
        Ok(Self::with_credential(credential, tracker))
    }

    /// Create from JSON configuration with environment fallback.
    pub fn from_config(
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            IP_INFO_DB_API_KEY_ENV,
            "IPInfoDB API key",
        )?;

        let mut provider = Self::with_credential(credential, tracker);
        if let Some(url) = config["base_url"].as_str() {
            provider = provider.with_base_url(url);
        }

        Ok(provider)
    }

    fn with_credential(credential: ApiCredential, tracker: &UsageTracker) -> Self {
        let usage = tracker.meter(
            "ip-info-db",
            Some(credential.fingerprint()),
            QUOTA_LIMIT,
            WINDOW,
        );

        Self {
            credential,
            base_url: "http://api.ipinfodb.com".to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
            client: http_client(DEFAULT_CALL_TIMEOUT),
            usage,
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn fetch(&self, ip: IpAddr) -> Result<Location, ProviderError> {
        let url = format!("{}/v3/ip-city/", self.base_url);
        let ip_literal = ip.to_string();

        // SECURITY: the credential is exposed only here, at point of use
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.credential.expose()),
                ("ip", ip_literal.as_str()),
                ("format", "json"),
            ])
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

        let body: IpInfoDbResponse = response
            .json()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        if body.status_code == "ERROR" {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body
                    .status_message
                    .unwrap_or_else(|| "lookup failed".to_string()),
            });
        }

        Ok(body.into_location(ip, self.attribution()))
    }
}

impl Metered for IpInfoDb {
    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

#[async_trait]
impl LocationProvider for IpInfoDb {
    fn name(&self) -> &'static str {
        "ip-info-db"
    }

    fn attribution(&self) -> Attribution {
        Attribution::new("IPInfoDB", "https://www.ipinfodb.com/")
    }

    async fn locate(&self, ip: &str) -> Result<Location, ProviderError> {
        let ip = parse_ip(ip)?;
        metered_call(&self.usage, self.fetch(ip)).await
    }
}

/// IPInfoDB v3 response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpInfoDbResponse {
    #[serde(default)]
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    city_name: String,
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    country_name: String,
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    zip_code: Option<String>,
    #[serde(default)]
    latitude: Option<f32>,
    #[serde(default)]
    longitude: Option<f32>,
    #[serde(default)]
    time_zone: Option<String>,
}

impl IpInfoDbResponse {
    fn into_location(self, ip: IpAddr, provider: Attribution) -> Location {
        Location {
            ip: ip.to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            city: self.city_name,
            region: self.region_name,
            region_code: String::new(),
            country: self.country_name,
            country_code: self.country_code,
            zip_code: self.zip_code.filter(|z| !z.is_empty()),
            time_zone: self.time_zone.filter(|t| !t.is_empty()),
            provider,
        }
    }
}

/// Factory for creating IPInfoDB providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "...",                    // Optional, falls back to IP_INFO_DB_API_KEY env
///   "base_url": "http://api.ipinfodb.com" // Optional, custom endpoint
/// }
/// ```
pub struct IpInfoDbFactory;

impl ProviderFactory<dyn LocationProvider> for IpInfoDbFactory {
    fn provider_type(&self) -> &'static str {
        "ip-info-db"
    }

    fn create(
        &self,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<dyn LocationProvider>, ProviderError> {
        let provider = IpInfoDb::from_config(config, tracker)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", IP_INFO_DB_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "IPInfoDB API key required: set 'api_key' in config or {} env",
                IP_INFO_DB_API_KEY_ENV
            )));
        }

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
        "IPInfoDB geolocation, API key required"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response_maps_to_location() {
        let json = r#"{
            "statusCode": "OK",
            "statusMessage": "",
            "ipAddress": "203.0.113.7",
            "countryCode": "CA",
            "countryName": "Canada",
            "regionName": "Quebec",
            "cityName": "Montreal",
            "zipCode": "H2X",
            "latitude": 45.51,
            "longitude": -73.59,
            "timeZone": "-05:00"
        }"#;

        let body: IpInfoDbResponse = serde_json::from_str(json).unwrap();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let location = body.into_location(ip, Attribution::default());

        assert_eq!(location.city, "Montreal");
        assert_eq!(location.country_code, "CA");
        assert_eq!(location.latitude, Some(45.51));
        assert_eq!(location.zip_code.as_deref(), Some("H2X"));
    }

    #[test]
    fn test_error_response_parses() {
        let json = r#"{
            "statusCode": "ERROR",
            "statusMessage": "Invalid API key."
        }"#;

        let body: IpInfoDbResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.status_code, "ERROR");
        assert_eq!(body.status_message.as_deref(), Some("Invalid API key."));
    }

    #[tokio::test]
    async fn test_invalid_ip_touches_no_counter() {
        let tracker = UsageTracker::new();
        let provider = IpInfoDb::new("test-key", &tracker);

        let err = provider.locate("999.999.0.1").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert_eq!(provider.usage().total(), 0);
    }

    #[test]
    fn test_same_key_shares_one_quota() {
        let tracker = UsageTracker::new();
        let a = IpInfoDb::new("shared-key", &tracker);
        let b = IpInfoDb::new("shared-key", &tracker);

        a.usage().record_success();

        assert_eq!(b.usage().total(), 1);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_different_keys_have_separate_quotas() {
        let tracker = UsageTracker::new();
        let a = IpInfoDb::new("key-one", &tracker);
        let b = IpInfoDb::new("key-two", &tracker);

        a.usage().record_success();

        assert_eq!(b.usage().total(), 0);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_factory_requires_credential() {
        let factory = IpInfoDbFactory;
        let config = serde_json::json!({});

        // no config key and (presumably) no env var set in test runs
        std::env::remove_var(IP_INFO_DB_API_KEY_ENV);
        assert!(factory.validate_config(&config).is_err());

        let config = serde_json::json!({"api_key": "k"});
        assert!(factory.validate_config(&config).is_ok());
    }

    #[test]
    fn test_quota_facts() {
        let tracker = UsageTracker::new();
        let provider = IpInfoDb::new("k", &tracker);

        assert_eq!(provider.quota_limit(), 2);
        assert_eq!(provider.window(), Duration::from_secs(1));
    }
}
