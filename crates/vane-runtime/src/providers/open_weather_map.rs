//! OpenWeatherMap weather provider.
//!
//! Requires an API key; the free tier allows 60 calls per minute.
//! Current conditions and the 3-hourly forecast are separate endpoints,
//! so the forecast is NOT bundled and costs a second quota charge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
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

/// Environment variable name for the OpenWeatherMap API key.
pub const OPEN_WEATHER_MAP_API_KEY_ENV: &str = "OPEN_WEATHER_MAP_API_KEY";

/// 60 calls per minute on the free tier.
const QUOTA_LIMIT: u32 = 60;

/// Counters reset every minute.
const WINDOW: Duration = Duration::from_secs(60);

/// OpenWeatherMap adapter.
pub struct OpenWeatherMap {
    credential: ApiCredential,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    usage: UsageMeter,
}

impl OpenWeatherMap {
    /// Create an adapter with a programmatic API key.
    pub fn new(api_key: impl Into<String>, tracker: &UsageTracker) -> Self {
        let credential = ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "OpenWeatherMap API key",
        );
        Self::with_credential(credential, tracker)
    }

    /// Create from the `OPEN_WEATHER_MAP_API_KEY` environment variable.
    pub fn from_env(tracker: &UsageTracker) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::from_env(OPEN_WEATHER_MAP_API_KEY_ENV, "OpenWeatherMap API key")?;
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
            OPEN_WEATHER_MAP_API_KEY_ENV,
            "OpenWeatherMap API key",
        )?;

        let mut provider = Self::with_credential(credential, tracker);
        if let Some(url) = config["base_url"].as_str() {
            provider = provider.with_base_url(url);
        }

        Ok(provider)
    }

    fn with_credential(credential: ApiCredential, tracker: &UsageTracker) -> Self {
        let usage = tracker.meter(
            "open-weather-map",
            Some(credential.fingerprint()),
            QUOTA_LIMIT,
            WINDOW,
        );

        Self {
            credential,
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
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

    /// Coordinates when the query has them, `q=city,countryCode`
    /// otherwise.
    fn place_params(query: &WeatherQuery) -> Vec<(String, String)> {
        if let (Some(lat), Some(lon)) = (query.latitude, query.longitude) {
            vec![
                ("lat".to_string(), lat.to_string()),
                ("lon".to_string(), lon.to_string()),
            ]
        } else {
            vec![(
                "q".to_string(),
                format!("{},{}", query.city, query.country_code),
            )]
        }
    }

    async fn send(&self, endpoint: &str, query: &WeatherQuery) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        // SECURITY: the credential is exposed only here, at point of use
        let response = self
            .client
            .get(&url)
            .query(&Self::place_params(query))
            .query(&[
                ("appid", self.credential.expose()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<OwmErrorBody>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "request rejected".to_string());

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn fetch_weather(&self, query: &WeatherQuery) -> Result<WeatherReport, ProviderError> {
        let response = self.send("weather", query).await?;

        let body: OwmWeatherResponse = response
            .json()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        Ok(body.into_report(query, self.attribution()))
    }

    async fn fetch_forecast(&self, query: &WeatherQuery) -> Result<Vec<Forecast>, ProviderError> {
        let response = self.send("forecast", query).await?;

        let body: OwmForecastResponse = response
            .json()
            .await
            .map_err(|e| http_error(e, self.timeout))?;

        Ok(thin_to_schedule(
            body.list
                .into_iter()
                .filter_map(OwmSlot::into_forecast)
                .collect(),
        ))
    }
}

impl Metered for OpenWeatherMap {
    fn usage(&self) -> &UsageMeter {
        &self.usage
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    fn name(&self) -> &'static str {
        "open-weather-map"
    }

    fn attribution(&self) -> Attribution {
        Attribution::new("OpenWeatherMap", "https://openweathermap.org/api")
    }

    async fn weather(&self, query: &WeatherQuery) -> Result<WeatherReport, ProviderError> {
        if !query.is_resolvable() {
            return Err(ProviderError::InvalidInput(
                "query needs coordinates or city and country code".to_string(),
            ));
        }

        metered_call(&self.usage, self.fetch_weather(query)).await
    }

    async fn forecast(&self, query: &WeatherQuery) -> Result<Vec<Forecast>, ProviderError> {
        if !query.is_resolvable() {
            return Err(ProviderError::InvalidInput(
                "query needs coordinates or city and country code".to_string(),
            ));
        }

        metered_call(&self.usage, self.fetch_forecast(query)).await
    }
}

/// Map an OpenWeatherMap icon code to a condition. The `d`/`n` suffix
/// carries day/night, the digits carry the condition.
fn condition_from_icon(icon: &str) -> WeatherCondition {
    match icon {
        "01d" | "01n" => WeatherCondition::ClearSky,
        "02d" | "02n" => WeatherCondition::FewClouds,
        "03d" | "03n" => WeatherCondition::ScatteredClouds,
        "04d" | "04n" => WeatherCondition::BrokenClouds,
        "09d" | "09n" => WeatherCondition::ShowerRain,
        "10d" | "10n" => WeatherCondition::Rain,
        "11d" | "11n" => WeatherCondition::Thunderstorm,
        "13d" | "13n" => WeatherCondition::Snow,
        "50d" | "50n" => WeatherCondition::Mist,
        _ => WeatherCondition::Unknown,
    }
}

/// OpenWeatherMap current-weather response format.
#[derive(Debug, Deserialize)]
struct OwmWeatherResponse {
    #[serde(default)]
    coord: Option<OwmCoord>,
    #[serde(default)]
    main: Option<OwmMain>,
    #[serde(default)]
    weather: Vec<OwmIcon>,
    #[serde(default)]
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmCoord {
    lat: f32,
    lon: f32,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    #[serde(default)]
    humidity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OwmIcon {
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwmForecastResponse {
    #[serde(default)]
    list: Vec<OwmSlot>,
}

#[derive(Debug, Deserialize)]
struct OwmSlot {
    dt: i64,
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmIcon>,
}

#[derive(Debug, Deserialize)]
struct OwmErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl OwmWeatherResponse {
    fn into_report(self, query: &WeatherQuery, provider: Attribution) -> WeatherReport {
        let mut report = WeatherReport {
            provider,
            ..Default::default()
        };

        if let Some(coord) = self.coord {
            report.latitude = Some(coord.lat);
            report.longitude = Some(coord.lon);
        }

        if let Some(main) = self.main {
            report.temperature = main.temp.round() as i32;
            report.min_temperature = main.temp_min.round() as i32;
            report.max_temperature = main.temp_max.round() as i32;
            report.humidity = main.humidity;
        }

        if let Some(first) = self.weather.first() {
            report.is_night = first.icon.ends_with('n');
            report.condition = condition_from_icon(&first.icon);
        }

        report.timestamp = self.dt.and_then(|t| DateTime::from_timestamp(t, 0));
        report.label_from_query(query);
        report
    }
}

impl OwmSlot {
    fn into_forecast(self) -> Option<Forecast> {
        let timestamp = DateTime::from_timestamp(self.dt, 0)?;
        let icon = self.weather.first().map(|w| w.icon.as_str()).unwrap_or("");

        Some(Forecast {
            timestamp,
            temperature: self.main.temp.round() as i32,
            min_temperature: self.main.temp_min.round() as i32,
            max_temperature: self.main.temp_max.round() as i32,
            condition: condition_from_icon(icon),
            is_night: icon.ends_with('n'),
        })
    }
}

/// Factory for creating OpenWeatherMap providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "...",   // Optional, falls back to OPEN_WEATHER_MAP_API_KEY env
///   "base_url": "https://api.openweathermap.org/data/2.5"  // Optional
/// }
/// ```
pub struct OpenWeatherMapFactory;

impl ProviderFactory<dyn WeatherProvider> for OpenWeatherMapFactory {
    fn provider_type(&self) -> &'static str {
        "open-weather-map"
    }

    fn create(
        &self,
        config: &JsonValue,
        tracker: &UsageTracker,
    ) -> Result<Arc<dyn WeatherProvider>, ProviderError> {
        let provider = OpenWeatherMap::from_config(config, tracker)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPEN_WEATHER_MAP_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenWeatherMap API key required: set 'api_key' in config or {} env",
                OPEN_WEATHER_MAP_API_KEY_ENV
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
        "OpenWeatherMap conditions and 3-hourly forecast, API key required"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_icon_mapping() {
        assert_eq!(condition_from_icon("01d"), WeatherCondition::ClearSky);
        assert_eq!(condition_from_icon("04n"), WeatherCondition::BrokenClouds);
        assert_eq!(condition_from_icon("10d"), WeatherCondition::Rain);
        assert_eq!(condition_from_icon("13n"), WeatherCondition::Snow);
        assert_eq!(condition_from_icon("50d"), WeatherCondition::Mist);
        assert_eq!(condition_from_icon(""), WeatherCondition::Unknown);
        assert_eq!(condition_from_icon("99x"), WeatherCondition::Unknown);
    }

    #[test]
    fn test_weather_response_maps_to_report() {
        let json = r#"{
            "coord": {"lat": 45.51, "lon": -73.59},
            "weather": [{"id": 500, "main": "Rain", "icon": "10n"}],
            "main": {"temp": 3.4, "temp_min": 1.2, "temp_max": 5.8, "humidity": 81},
            "dt": 1717243200,
            "cod": 200
        }"#;

        let body: OwmWeatherResponse = serde_json::from_str(json).unwrap();
        let query = WeatherQuery {
            city: "Montreal".to_string(),
            country_code: "CA".to_string(),
            ..Default::default()
        };
        let report = body.into_report(&query, Attribution::new("OpenWeatherMap", "u"));

        assert_eq!(report.latitude, Some(45.51));
        assert_eq!(report.temperature, 3);
        assert_eq!(report.min_temperature, 1);
        assert_eq!(report.max_temperature, 6);
        assert_eq!(report.humidity, Some(81));
        assert_eq!(report.condition, WeatherCondition::Rain);
        assert!(report.is_night);
        assert_eq!(report.city, "Montreal");
        assert!(report.has_weather());
    }

    #[test]
    fn test_forecast_slots_map_and_thin() {
        // 3-hourly slots starting 2024-06-01T00:00:00Z, more than a day
        let slots: Vec<String> = (0..12)
            .map(|i| {
                format!(
                    r#"{{"dt": {}, "main": {{"temp": 20.0, "temp_min": 15.0, "temp_max": 25.0}}, "weather": [{{"icon": "01d"}}]}}"#,
                    1_717_200_000 + i * 3 * 3600
                )
            })
            .collect();
        let json = format!(r#"{{"list": [{}]}}"#, slots.join(","));

        let body: OwmForecastResponse = serde_json::from_str(&json).unwrap();
        let forecasts = thin_to_schedule(
            body.list
                .into_iter()
                .filter_map(OwmSlot::into_forecast)
                .collect(),
        );

        assert_eq!(forecasts.len(), 8);
        for f in &forecasts {
            assert_eq!(f.timestamp.hour() % 3, 0);
            assert_eq!(f.condition, WeatherCondition::ClearSky);
            assert!(!f.is_night);
        }
    }

    #[tokio::test]
    async fn test_unresolvable_query_touches_no_counter() {
        let tracker = UsageTracker::new();
        let provider = OpenWeatherMap::new("test-key", &tracker);

        let err = provider.weather(&WeatherQuery::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));

        let err = provider
            .forecast(&WeatherQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));

        assert_eq!(provider.usage().total(), 0);
    }

    #[test]
    fn test_place_params_prefer_coordinates() {
        let query = WeatherQuery {
            city: "Montreal".to_string(),
            country_code: "CA".to_string(),
            latitude: Some(45.5),
            longitude: Some(-73.6),
            ..Default::default()
        };
        let params = OpenWeatherMap::place_params(&query);
        assert_eq!(params[0].0, "lat");

        let query = WeatherQuery {
            city: "Montreal".to_string(),
            country_code: "CA".to_string(),
            ..Default::default()
        };
        let params = OpenWeatherMap::place_params(&query);
        assert_eq!(params, vec![("q".to_string(), "Montreal,CA".to_string())]);
    }

    #[test]
    fn test_weather_is_not_bundled() {
        let tracker = UsageTracker::new();
        let provider = OpenWeatherMap::new("k", &tracker);
        assert!(!provider.forecast_bundled());
    }

    #[test]
    fn test_same_key_shares_one_quota() {
        let tracker = UsageTracker::new();
        let a = OpenWeatherMap::new("shared", &tracker);
        let b = OpenWeatherMap::new("shared", &tracker);

        a.usage().record_failure();
        assert_eq!(b.usage().failures(), 1);
    }

    #[test]
    fn test_factory_requires_credential() {
        let factory = OpenWeatherMapFactory;

        std::env::remove_var(OPEN_WEATHER_MAP_API_KEY_ENV);
        assert!(factory.validate_config(&serde_json::json!({})).is_err());
        assert!(factory
            .validate_config(&serde_json::json!({"api_key": "k"}))
            .is_ok());
    }

    #[test]
    fn test_quota_facts() {
        let tracker = UsageTracker::new();
        let provider = OpenWeatherMap::new("k", &tracker);

        assert_eq!(provider.quota_limit(), 60);
        assert_eq!(provider.window(), Duration::from_secs(60));
    }
}
