//! IP-to-location result types.

use serde::{Deserialize, Serialize};

/// Which vendor produced a record, for display attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// Vendor's friendly name (e.g. "IP-API")
    pub name: String,

    /// Vendor's reference URL
    pub url: String,
}

impl Attribution {
    /// Create an attribution pair.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A resolved IP location.
///
/// Fields a vendor does not report stay at their defaults; consumers
/// should gate on [`Location::has_location`] rather than individual
/// fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    /// The IP this location corresponds to
    pub ip: String,

    /// Latitude, when the vendor reports coordinates
    pub latitude: Option<f32>,

    /// Longitude, when the vendor reports coordinates
    pub longitude: Option<f32>,

    /// City name
    pub city: String,

    /// State, province or equivalent
    pub region: String,

    /// Short code for the region
    pub region_code: String,

    /// Country name
    pub country: String,

    /// ISO country code
    pub country_code: String,

    /// Postal code, when present
    pub zip_code: Option<String>,

    /// IANA time zone, when present
    pub time_zone: Option<String>,

    /// Which vendor resolved this location
    pub provider: Attribution,
}

impl Location {
    /// Create an empty location for the given IP.
    pub fn for_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    /// Whether this record actually pins down a place.
    ///
    /// True when both coordinates are present and non-zero, or when both
    /// country and city are named. A (0, 0) pair is treated as "vendor
    /// had nothing" rather than a real position in the Gulf of Guinea.
    pub fn has_location(&self) -> bool {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => true,
            _ => !self.country.trim().is_empty() && !self.city.trim().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_location_has_nothing() {
        let loc = Location::for_ip("203.0.113.7");
        assert_eq!(loc.ip, "203.0.113.7");
        assert!(!loc.has_location());
    }

    #[test]
    fn test_coordinates_pin_a_place() {
        let loc = Location {
            latitude: Some(45.5),
            longitude: Some(-73.6),
            ..Location::for_ip("203.0.113.7")
        };
        assert!(loc.has_location());
    }

    #[test]
    fn test_zero_coordinates_do_not_count() {
        let loc = Location {
            latitude: Some(0.0),
            longitude: Some(0.0),
            ..Location::for_ip("203.0.113.7")
        };
        assert!(!loc.has_location());
    }

    #[test]
    fn test_city_and_country_pin_a_place() {
        let loc = Location {
            city: "Montreal".to_string(),
            country: "Canada".to_string(),
            ..Location::for_ip("203.0.113.7")
        };
        assert!(loc.has_location());
    }

    #[test]
    fn test_city_alone_is_not_enough() {
        let loc = Location {
            city: "Montreal".to_string(),
            ..Location::for_ip("203.0.113.7")
        };
        assert!(!loc.has_location());
    }

    #[test]
    fn test_location_serializes_round_trip() {
        let loc = Location {
            latitude: Some(45.5),
            longitude: Some(-73.6),
            city: "Montreal".to_string(),
            country: "Canada".to_string(),
            country_code: "CA".to_string(),
            provider: Attribution::new("IP-API", "https://ip-api.com/"),
            ..Location::for_ip("203.0.113.7")
        };

        let json = serde_json::to_string(&loc).unwrap();
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back.city, "Montreal");
        assert_eq!(back.provider.name, "IP-API");
    }
}
