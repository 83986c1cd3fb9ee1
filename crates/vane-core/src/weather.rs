//! Location-to-weather result types.
//!
//! Temperatures are integral degrees in the metric system; unit
//! conversion and localized condition text are presentation concerns and
//! live outside this crate.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Attribution;

/// Maximum number of forecast entries a report carries.
pub const FORECAST_LIMIT: usize = 8;

/// Hours of day a forecast entry may land on (3-hour slots).
pub const FORECAST_SLOTS: [u32; 8] = [0, 3, 6, 9, 12, 15, 18, 21];

/// Sky condition, normalized across vendors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    /// Vendor reported nothing recognizable
    #[default]
    Unknown,
    ClearSky,
    FewClouds,
    ScatteredClouds,
    BrokenClouds,
    ShowerRain,
    Rain,
    Thunderstorm,
    Snow,
    Mist,
    Hail,
    Wind,
    Sleet,
    Tornado,
}

impl WeatherCondition {
    /// Whether the vendor reported a recognizable condition.
    pub fn is_known(self) -> bool {
        self != WeatherCondition::Unknown
    }
}

/// Parameters a weather provider resolves.
///
/// Coordinates win when present; otherwise providers fall back to a
/// place-name lookup from city and country code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub city: String,
    pub region: String,
    pub region_code: String,
    pub country: String,
    pub country_code: String,
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
}

impl WeatherQuery {
    /// Both coordinates present.
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Enough named-place information for a city lookup.
    pub fn has_place(&self) -> bool {
        !self.city.trim().is_empty() && !self.country_code.trim().is_empty()
    }

    /// Whether any provider could resolve this query at all.
    pub fn is_resolvable(&self) -> bool {
        self.has_coordinates() || self.has_place()
    }
}

/// One forecast entry.
///
/// Timestamps from vendors that report a UTC offset are already shifted
/// to the location's local time, so hour-of-day reads naturally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    /// When this entry applies
    pub timestamp: DateTime<Utc>,

    /// Temperature in degrees
    pub temperature: i32,

    /// Low for the period
    pub min_temperature: i32,

    /// High for the period
    pub max_temperature: i32,

    /// Normalized sky condition
    pub condition: WeatherCondition,

    /// Whether the sun is down at `timestamp`
    pub is_night: bool,
}

/// Thin an hourly forecast down to the 3-hour schedule.
///
/// Keeps entries whose hour-of-day is one of [`FORECAST_SLOTS`], capped
/// at [`FORECAST_LIMIT`]. Vendors that already report 3-hourly data pass
/// through unchanged (minus the cap).
pub fn thin_to_schedule(entries: Vec<Forecast>) -> Vec<Forecast> {
    entries
        .into_iter()
        .filter(|f| FORECAST_SLOTS.contains(&f.timestamp.hour()))
        .take(FORECAST_LIMIT)
        .collect()
}

/// A resolved weather report: where, what it looks like right now, and
/// the short-term forecast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Latitude the vendor resolved
    pub latitude: Option<f32>,

    /// Longitude the vendor resolved
    pub longitude: Option<f32>,

    /// City name, echoed from the query
    pub city: String,

    /// State, province or equivalent
    pub region: String,

    /// Short code for the region
    pub region_code: String,

    /// Country name
    pub country: String,

    /// ISO country code
    pub country_code: String,

    /// Postal code, when a vendor reports one
    pub zip_code: Option<String>,

    /// IANA time zone, when a vendor reports one
    pub time_zone: Option<String>,

    /// When the current conditions were observed
    pub timestamp: Option<DateTime<Utc>>,

    /// Current temperature in degrees
    pub temperature: i32,

    /// Today's low
    pub min_temperature: i32,

    /// Today's high
    pub max_temperature: i32,

    /// Current sky condition
    pub condition: WeatherCondition,

    /// Whether the sun is down at `timestamp`
    pub is_night: bool,

    /// Relative humidity percentage, when reported
    pub humidity: Option<u8>,

    /// Short-term forecast, at most [`FORECAST_LIMIT`] entries
    pub forecast: Vec<Forecast>,

    /// Which vendor produced the weather
    pub provider: Attribution,

    /// Which vendor resolved the location this report is for; filled by
    /// the caller that chained a location lookup into a weather lookup
    pub located_by: Attribution,
}

impl WeatherReport {
    /// Whether this report actually pins down a place.
    pub fn has_location(&self) -> bool {
        if self.latitude.is_some() && self.longitude.is_some() {
            return true;
        }
        !self.country.trim().is_empty() && !self.city.trim().is_empty()
    }

    /// Whether this report carries usable weather for a known place.
    pub fn has_weather(&self) -> bool {
        self.has_location() && self.condition.is_known()
    }

    /// Copy the place fields out of the query that produced this report.
    ///
    /// Vendors echo coordinates but rarely the place names, so reports
    /// are labeled from the query the caller already resolved.
    pub fn label_from_query(&mut self, query: &WeatherQuery) {
        self.city = query.city.clone();
        self.region = query.region.clone();
        self.region_code = query.region_code.clone();
        self.country = query.country.clone();
        self.country_code = query.country_code.clone();
    }
}
