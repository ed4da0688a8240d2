//! Static location map and great-circle distance.
//!
//! The map is loaded once at startup from a `{country: {zip: [lat, lon]}}`
//! JSON file and backs the geospatial filter predicates.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Read-only country → zip → (lat, lon) lookup table.
#[derive(Debug, Default)]
pub struct LocationMap {
    countries: HashMap<String, HashMap<String, (f64, f64)>>,
}

impl LocationMap {
    /// An empty map; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the map from disk. A missing or malformed file yields an empty
    /// map so the service can still start; geo predicates then always
    /// evaluate to false.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Location map unavailable");
                return Self::empty();
            }
        };

        let parsed: HashMap<String, HashMap<String, Vec<f64>>> =
            match serde_json::from_slice(&raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Location map unreadable");
                    return Self::empty();
                }
            };

        let countries: HashMap<String, HashMap<String, (f64, f64)>> = parsed
            .into_iter()
            .map(|(country, zips)| {
                let zips = zips
                    .into_iter()
                    .filter_map(|(zip, coords)| match coords.as_slice() {
                        [lat, lon, ..] => Some((zip, (*lat, *lon))),
                        _ => None,
                    })
                    .collect();
                (country, zips)
            })
            .collect();

        info!(
            path = %path.display(),
            countries = countries.len(),
            "Location map loaded"
        );
        Self { countries }
    }

    /// Build a map from already-parsed entries. Used by tests.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, String, (f64, f64))>,
    ) -> Self {
        let mut countries: HashMap<String, HashMap<String, (f64, f64)>> = HashMap::new();
        for (country, zip, coords) in entries {
            countries.entry(country).or_default().insert(zip, coords);
        }
        Self { countries }
    }

    /// Resolve a zip to coordinates. `None` when the country or zip is
    /// unknown.
    pub fn coords(&self, country: &str, zip: &str) -> Option<(f64, f64)> {
        self.countries.get(country)?.get(zip).copied()
    }

    /// All known zip codes for a country, sorted.
    pub fn codes(&self, country: &str) -> Vec<String> {
        let mut codes: Vec<String> = self
            .countries
            .get(country)
            .map(|zips| zips.keys().cloned().collect())
            .unwrap_or_default();
        codes.sort();
        codes
    }
}

/// Haversine great-circle distance between two coordinates, in meters.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> LocationMap {
        LocationMap::from_entries([
            ("ph".to_string(), "4026".to_string(), (14.1841, 121.1157)),
            ("ph".to_string(), "1000".to_string(), (14.5995, 120.9842)),
            ("us".to_string(), "10001".to_string(), (40.7506, -73.9971)),
        ])
    }

    #[test]
    fn coords_hits_and_misses() {
        let map = sample_map();
        assert!(map.coords("ph", "4026").is_some());
        assert!(map.coords("ph", "9999").is_none());
        assert!(map.coords("xx", "4026").is_none());
    }

    #[test]
    fn codes_are_sorted() {
        let map = sample_map();
        assert_eq!(map.codes("ph"), vec!["1000".to_string(), "4026".to_string()]);
        assert!(map.codes("xx").is_empty());
    }

    #[test]
    fn distance_is_accurate_and_monotonic() {
        // One degree of latitude is ~111.19 km.
        let one_degree = distance_meters(0.0, 0.0, 1.0, 0.0);
        assert!((one_degree - 111_195.0).abs() < 100.0);

        let near = distance_meters(14.5995, 120.9842, 14.6095, 120.9842);
        let far = distance_meters(14.5995, 120.9842, 14.6995, 120.9842);
        assert!(near < far);
        assert_eq!(distance_meters(14.0, 121.0, 14.0, 121.0), 0.0);
    }
}
