//! Pirate Weather provider (Dark Sky-compatible API).
//!
//! Requires an API key; 1000 calls per day on the free tier. One call
//! bundles current conditions, daily bounds, and hourly data, so the
//! forecast IS bundled and a standalone forecast costs nothing extra.
//!
//! Coordinates are mandatory; the endpoint has no place-name lookup.
//! Timestamps are shifted by the reported UTC offset so hour-of-day
//! reads in the location's local time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use vane_core::{
    thin_to_schedule, Attribution, Forecast, WeatherCondition, WeatherQuery, WeatherReport,
};

use super::{
    http_client, http_error, metered_call,
    secrets::{ApiCredential, CredentialSource},
    Metered, ProviderError, ProviderFactory, WeatherProvider, DEFAULT_CALL_TIMEOUT,
};
use crate::usage::{UsageMeter, UsageTracker};

/// Environment variable name for the Pirate Weather API key.
pub const PIRATE_WEATHER_API_KEY_ENV: &str = "PIRATE_WEATHER_API_KEY";

/// 1000 calls per day on the free tier.
const QUOTA_LIMIT: u32 = 1000;

/// Counters reset daily.
const WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// How much hourly data feeds the forecast before thinning.
const HOURLY_SPAN: usize = 24;

/// Pirate Weather adapter.
pub struct PirateWeather {
    credential: ApiCredential,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    usage: UsageMeter,
}

impl PirateWeather {
    /// Create an adapter with a programmatic API key.
    pub fn new(api_key: impl Into<String>, tracker: &UsageTracker) -> Self {
        let credential = ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "Pirate Weather API key",
        );
        Self::with_credential(credential, tracker)
    }

    /// Create from the `PIRATE_WEATHER_API_KEY` environment variable.
    pub fn from_env(tracker: &UsageTracker) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::from_env(PIRATE_WEATHER_API_KEY_ENV, "Pirate Weather API key")?;
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
            PIRATE_WEATHER_API_KEY_ENV,
            "Pirate Weather API key",
        )?;

        let mut provider = Self::with_credential(credential, tracker);
        if let Some(url) = config["base_url"].as_str() {
            provider = provider.with_base_url(url);
        }

        Ok(provider)
    }

    fn with_credential(credential: ApiCredential, tracker: &UsageTracker) -> Self {
        let usage = tracker.meter(
            "pirate-weather",
            Some(credential.fingerprint()),
            QUOTA_LIMIT,
            WINDOW,
        );

        Self {
            credential,
            base_url: "https://api.pirateweather.net".to_string(),
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

    async fn fetch(
        &self,
        latitude: f32,
        longitude: f32,
        query: &WeatherQuery,
    ) -> Result<WeatherReport, ProviderError> {
        // SECURITY: the credential is exposed only here, at point of use
        let url = format!(
            "{}/forecast/{}/{},{}",
            self.base_url,
            self.credential.expose(),
            latitude,
            longitude
        );

        let response = self
            .client
            .get(&url)
            .query(&[("units", "si")])
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

        let body: PirateResponse = response
            .json()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        Ok(body.into_report(query, self.attribution()))
    }
}

impl Metered for PirateWeather {
    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

#[async_trait]
impl WeatherProvider for PirateWeather {
    fn name(&self) -> &'static str {
        "pirate-weather"
    }

    fn attribution(&self) -> Attribution {
        Attribution::new("Pirate Weather", "https://pirateweather.net/")
    }

    fn forecast_bundled(&self) -> bool {
        true
    }

    async fn weather(&self, query: &WeatherQuery) -> Result<WeatherReport, ProviderError> {
        let (Some(latitude), Some(longitude)) = (query.latitude, query.longitude) else {
            return Err(ProviderError::InvalidInput(
                "Pirate Weather needs coordinates".to_string(),
            ));
        };

        metered_call(&self.usage, self.fetch(latitude, longitude, query)).await
    }
}

/// Map a Dark Sky-style icon name to a condition.
fn condition_from_icon(icon: &str) -> WeatherCondition {
    match icon {
        "clear-day" | "clear-night" => WeatherCondition::ClearSky,
        "partly-cloudy-day" | "partly-cloudy-night" => WeatherCondition::FewClouds,
        "cloudy" => WeatherCondition::BrokenClouds,
        "rain" => WeatherCondition::Rain,
        "thunderstorm" => WeatherCondition::Thunderstorm,
        "snow" => WeatherCondition::Snow,
        "fog" => WeatherCondition::Mist,
        "hail" => WeatherCondition::Hail,
        "wind" => WeatherCondition::Wind,
        "sleet" => WeatherCondition::Sleet,
        "tornado" => WeatherCondition::Tornado,
        _ => WeatherCondition::Unknown,
    }
}

/// Pirate Weather response format (Dark Sky shape).
#[derive(Debug, Deserialize)]
struct PirateResponse {
    #[serde(default)]
    latitude: Option<f32>,
    #[serde(default)]
    longitude: Option<f32>,
    #[serde(default)]
    timezone: Option<String>,
    /// UTC offset in hours
    #[serde(default)]
    offset: Option<f64>,
    #[serde(default)]
    currently: Option<PirateCurrently>,
    #[serde(default)]
    daily: Option<PirateBlock<PirateDay>>,
    #[serde(default)]
    hourly: Option<PirateBlock<PirateHour>>,
}

#[derive(Debug, Deserialize)]
struct PirateBlock<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PirateCurrently {
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    icon: Option<String>,
    /// 0.0 to 1.0
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PirateDay {
    #[serde(default)]
    temperature_min: Option<f64>,
    #[serde(default)]
    temperature_max: Option<f64>,
    #[serde(default)]
    sunset_time: Option<i64>,
    #[serde(default)]
    sunrise_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct PirateHour {
    time: i64,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    icon: Option<String>,
}

impl PirateResponse {
    fn into_report(self, query: &WeatherQuery, provider: Attribution) -> WeatherReport {
        let shift =
            chrono::Duration::seconds((self.offset.unwrap_or(0.0) * 3600.0).round() as i64);
        let local = |time: i64| -> Option<DateTime<Utc>> {
            DateTime::from_timestamp(time, 0).map(|dt| dt + shift)
        };

        let mut report = WeatherReport {
            latitude: self.latitude,
            longitude: self.longitude,
            time_zone: self.timezone.filter(|t| !t.is_empty()),
            provider,
            ..Default::default()
        };

        if let Some(currently) = &self.currently {
            report.timestamp = currently.time.and_then(local);
            report.temperature = currently.temperature.unwrap_or(0.0).round() as i32;
            report.condition =
                condition_from_icon(currently.icon.as_deref().unwrap_or(""));
            report.humidity = currently.humidity.map(|h| (h * 100.0).round() as u8);
        }

        let days = self.daily.map(|d| d.data).unwrap_or_default();

        let mut sunset = None;
        if let Some(today) = days.first() {
            report.min_temperature = today.temperature_min.unwrap_or(0.0).round() as i32;
            report.max_temperature = today.temperature_max.unwrap_or(0.0).round() as i32;

            sunset = today.sunset_time.and_then(local);
            if let (Some(now), Some(down)) = (report.timestamp, sunset) {
                report.is_night = now > down;
            }
        }

        // tomorrow's sunrise bounds tonight
        let next_sunrise = days.get(1).and_then(|d| d.sunrise_time).and_then(local);

        let hours = self.hourly.map(|h| h.data).unwrap_or_default();
        let mut entries = Vec::with_capacity(HOURLY_SPAN);
        for hour in hours.into_iter().take(HOURLY_SPAN) {
            let Some(timestamp) = local(hour.time) else {
                continue;
            };

            let is_night = match (sunset, next_sunrise) {
                (Some(down), Some(up)) => timestamp > down && timestamp < up,
                (Some(down), None) => timestamp > down,
                _ => false,
            };

            entries.push(Forecast {
                timestamp,
                temperature: hour.temperature.unwrap_or(0.0).round() as i32,
                min_temperature: report.min_temperature,
                max_temperature: report.max_temperature,
                condition: condition_from_icon(hour.icon.as_deref().unwrap_or("")),
                is_night,
            });
        }

        report.forecast = thin_to_schedule(entries);
        report.label_from_query(query);
        report
    }
}

/// Factory for creating Pirate Weather providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "...",   // Optional, falls back to PIRATE_WEATHER_API_KEY env
///   "base_url": "https://api.pirateweather.net"  // Optional
/// }
/// ```
pub struct PirateWeatherFactory;

impl ProviderFactory<dyn WeatherProvider> for PirateWeatherFactory {
    fn provider_type(&self) -> &'static str {
        "pirate-weather"
    }

    fn create(
        &self,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<dyn WeatherProvider>, ProviderError> {
        let provider = PirateWeather::from_config(config, tracker)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", PIRATE_WEATHER_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Pirate Weather API key required: set 'api_key' in config or {} env",
                PIRATE_WEATHER_API_KEY_ENV
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
        "Pirate Weather bundled conditions and hourly forecast, API key required"
    }
}
