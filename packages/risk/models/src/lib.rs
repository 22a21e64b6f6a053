#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Core domain types for the road risk scoring system.
//!
//! This crate defines the shared vocabulary used across the whole
//! workspace: vehicle classes, weather snapshots, coordinates and
//! routes, bounding boxes, the service-area geofence, and the
//! per-point feature records consumed by the model gateway.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Minimum number of coordinates a route must have to be scored.
pub const MIN_ROUTE_POINTS: usize = 2;

/// Number of buckets used by the hashed categorical encoding of the
/// risk-regressor feature batch.
pub const HASHED_FEATURE_DIM: usize = 20;

/// Closed set of vehicle classes the risk models are trained on.
///
/// Drives threshold lookups and the static vehicle factors used by the
/// fallback heuristic and the integrated-score aggregation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleClass {
    /// Two-wheeled motorcycles and scooters.
    Motorcycle,
    /// Three-wheeled auto rickshaws.
    ThreeWheeler,
    /// Passenger cars.
    Car,
    /// Buses and coaches.
    Bus,
    /// Heavy goods lorries.
    Lorry,
    /// Light commercial vans.
    Van,
}

impl VehicleClass {
    /// Parses a vehicle label as it appears in side files and user
    /// input ("Motor Cycle", "three wheeler", "CAR", ...).
    ///
    /// Matching is case-insensitive and tolerant of spaces vs
    /// underscores. Returns `None` for labels outside the closed set.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "MOTORCYCLE" | "MOTOR_CYCLE" => Some(Self::Motorcycle),
            "THREE_WHEELER" | "THREEWHEELER" => Some(Self::ThreeWheeler),
            "CAR" => Some(Self::Car),
            "BUS" => Some(Self::Bus),
            "LORRY" => Some(Self::Lorry),
            "VAN" => Some(Self::Van),
            _ => None,
        }
    }

    /// Static vehicle factor fed into the degraded-mode risk formula.
    #[must_use]
    pub const fn fallback_factor(self) -> f64 {
        match self {
            Self::Motorcycle => 1.2,
            Self::ThreeWheeler | Self::Lorry => 1.15,
            Self::Bus => 1.1,
            Self::Car | Self::Van => 1.0,
        }
    }
}

impl Default for VehicleClass {
    fn default() -> Self {
        Self::Car
    }
}

/// A WGS84 coordinate, serialized on the wire as a `[lat, lon]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude degrees.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Self {
            lat: pair[0],
            lon: pair[1],
        }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.lat, c.lon]
    }
}

/// An ordered polyline of coordinates.
pub type Route = Vec<Coordinate>;

/// Per-point curvature override supplied with a weather snapshot.
///
/// A scalar is broadcast to every point; a list is used verbatim when
/// its length matches the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurvatureOverride {
    /// One curvature value applied to every route point.
    Scalar(f64),
    /// One curvature value per route point.
    PerPoint(Vec<f64>),
}

/// Weather conditions for a scoring request.
///
/// Immutable once constructed. Either fetched live for the route
/// midpoint or supplied manually by the caller (manual input takes
/// precedence). Absent fields take the documented literal defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Air temperature in degrees Celsius.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Relative humidity in percent.
    #[serde(default = "default_humidity")]
    pub humidity: f64,
    /// Precipitation in millimetres.
    #[serde(default)]
    pub precipitation: f64,
    /// Wind speed in km/h.
    #[serde(default)]
    pub wind_speed: f64,
    /// Externally asserted wetness; derived from precipitation when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_wet: Option<bool>,
    /// Optional curvature override for the route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curvature: Option<CurvatureOverride>,
}

const fn default_temperature() -> f64 {
    20.0
}

const fn default_humidity() -> f64 {
    60.0
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            humidity: default_humidity(),
            precipitation: 0.0,
            wind_speed: 0.0,
            is_wet: None,
            curvature: None,
        }
    }
}

impl WeatherSnapshot {
    /// Whether the road surface is considered wet: precipitation above
    /// 0.1 mm, unless explicitly asserted either way.
    #[must_use]
    pub fn wet(&self) -> bool {
        self.is_wet.unwrap_or(self.precipitation > 0.1)
    }
}

/// Error returned when a bounding box string or its bounds are invalid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundingBoxError {
    /// The string did not have exactly four numeric parts.
    #[error("bounding box must be 'minLon,minLat,maxLon,maxLat', got '{0}'")]
    Malformed(String),
    /// Minimums were not strictly below maximums, or values were out
    /// of WGS84 range.
    #[error("bounding box bounds out of range or inverted")]
    OutOfRange,
}

/// A rectangular lat/lon bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western boundary (degrees longitude).
    pub min_lon: f64,
    /// Southern boundary (degrees latitude).
    pub min_lat: f64,
    /// Eastern boundary (degrees longitude).
    pub max_lon: f64,
    /// Northern boundary (degrees latitude).
    pub max_lat: f64,
}

impl BoundingBox {
    /// Creates a bounding box from `(min_lon, min_lat, max_lon, max_lat)`.
    ///
    /// # Errors
    ///
    /// Returns [`BoundingBoxError::OutOfRange`] if minimums are not
    /// strictly below maximums or values fall outside WGS84 ranges.
    pub fn new(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, BoundingBoxError> {
        let latitudes_valid = (-90.0..=90.0).contains(&min_lat) && (-90.0..=90.0).contains(&max_lat);
        let longitudes_valid =
            (-180.0..=180.0).contains(&min_lon) && (-180.0..=180.0).contains(&max_lon);
        if min_lon < max_lon && min_lat < max_lat && latitudes_valid && longitudes_valid {
            Ok(Self {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            })
        } else {
            Err(BoundingBoxError::OutOfRange)
        }
    }

    /// Whether a point lies inside the box (inclusive on all edges).
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    /// Longitudinal extent in degrees.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitudinal extent in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = BoundingBoxError;

    /// Parses the `"minLon,minLat,maxLon,maxLat"` query format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(str::trim)
            .filter_map(|p| p.parse().ok())
            .collect();
        if parts.len() == 4 && s.split(',').count() == 4 {
            Self::new(parts[0], parts[1], parts[2], parts[3])
        } else {
            Err(BoundingBoxError::Malformed(s.to_string()))
        }
    }
}

/// The fixed service-area rectangle (Ginigathena corridor).
///
/// Routes and grid cells outside this rectangle are never scored.
pub const SERVICE_AREA: BoundingBox = BoundingBox {
    min_lon: 80.3,
    min_lat: 6.8,
    max_lon: 80.9,
    max_lat: 7.5,
};

/// Whether a single point lies inside the service area.
#[must_use]
pub fn in_service_area(lat: f64, lon: f64) -> bool {
    SERVICE_AREA.contains(lat, lon)
}

/// Keeps only the route points inside the service area, preserving
/// order.
#[must_use]
pub fn filter_in_service_area(route: &[Coordinate]) -> Vec<Coordinate> {
    route
        .iter()
        .copied()
        .filter(|c| in_service_area(c.lat, c.lon))
        .collect()
}

/// Whether any point of the route lies inside the service area.
#[must_use]
pub fn route_intersects_service_area(route: &[Coordinate]) -> bool {
    route.iter().any(|c| in_service_area(c.lat, c.lon))
}

/// One canonical feature row per route point.
///
/// Every record of a request shares the weather, vehicle, and time
/// context; curvature, position, and bins vary per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Latitude of the source point.
    pub latitude: f64,
    /// Longitude of the source point.
    pub longitude: f64,
    /// Air temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Precipitation in millimetres.
    pub precipitation: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
    /// Whether the surface is considered wet.
    pub is_wet: bool,
    /// Surface wetness probability (0.0 or 1.0 for now).
    pub surface_wetness_prob: f64,
    /// Turning angle at this point, radians in `[0, pi]`.
    pub curvature: f64,
    /// Integer latitude grid cell (latitude x 1000, truncated).
    pub lat_bin: i64,
    /// Integer longitude grid cell (longitude x 1000, truncated).
    pub lon_bin: i64,
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Day of week, 0 = Monday .. 6 = Sunday.
    pub dow: u8,
    /// Whether `dow` falls on Saturday or Sunday.
    pub is_weekend: bool,
    /// Unix timestamp (seconds) the record was resolved against.
    pub timestamp: i64,
    /// Vehicle class for the request.
    pub vehicle: VehicleClass,
    /// Static vehicle factor for the degraded-mode formula.
    pub vehicle_factor: f64,
}

/// Feature batch encoded for the risk regressor: base records plus a
/// signed hashed-categorical vector per record.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskBatch {
    /// Canonical per-point records.
    pub records: Vec<FeatureRecord>,
    /// One `HASHED_FEATURE_DIM`-wide hashed token vector per record.
    pub hashed: Vec<Vec<f64>>,
}

/// Feature batch encoded for the cause classifier: base records, the
/// literal categorical tokens, and the risk regressor's output, which
/// the cause stage consumes as an input feature.
#[derive(Debug, Clone, PartialEq)]
pub struct CauseBatch {
    /// Canonical per-point records.
    pub records: Vec<FeatureRecord>,
    /// Literal categorical tokens per record (e.g. `Vehicle=CAR`).
    pub tokens: Vec<Vec<String>>,
    /// Normalized risk scores from the prior stage, one per record.
    pub risk_scores: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_vehicle_labels() {
        assert_eq!(
            VehicleClass::from_label("Motor Cycle"),
            Some(VehicleClass::Motorcycle)
        );
        assert_eq!(
            VehicleClass::from_label("Three Wheeler"),
            Some(VehicleClass::ThreeWheeler)
        );
        assert_eq!(VehicleClass::from_label("car"), Some(VehicleClass::Car));
        assert_eq!(VehicleClass::from_label("LORRY"), Some(VehicleClass::Lorry));
        assert_eq!(VehicleClass::from_label("tractor"), None);
    }

    #[test]
    fn vehicle_serializes_screaming_snake() {
        let json = serde_json::to_string(&VehicleClass::ThreeWheeler).unwrap();
        assert_eq!(json, "\"THREE_WHEELER\"");
    }

    #[test]
    fn coordinate_round_trips_as_pair() {
        let c: Coordinate = serde_json::from_str("[6.93, 80.45]").unwrap();
        assert!((c.lat - 6.93).abs() < f64::EPSILON);
        assert!((c.lon - 80.45).abs() < f64::EPSILON);
        assert_eq!(serde_json::to_string(&c).unwrap(), "[6.93,80.45]");
    }

    #[test]
    fn wetness_derived_from_precipitation() {
        let dry = WeatherSnapshot::default();
        assert!(!dry.wet());

        let damp = WeatherSnapshot {
            precipitation: 0.5,
            ..WeatherSnapshot::default()
        };
        assert!(damp.wet());

        let asserted_dry = WeatherSnapshot {
            precipitation: 5.0,
            is_wet: Some(false),
            ..WeatherSnapshot::default()
        };
        assert!(!asserted_dry.wet());
    }

    #[test]
    fn weather_defaults_applied_on_deserialize() {
        let w: WeatherSnapshot = serde_json::from_str("{}").unwrap();
        assert!((w.temperature - 20.0).abs() < f64::EPSILON);
        assert!((w.humidity - 60.0).abs() < f64::EPSILON);
        assert!(w.precipitation.abs() < f64::EPSILON);
        assert!(w.wind_speed.abs() < f64::EPSILON);
    }

    #[test]
    fn parses_bbox_string() {
        let bbox: BoundingBox = "80.43,6.94,80.55,7.03".parse().unwrap();
        assert!((bbox.min_lon - 80.43).abs() < f64::EPSILON);
        assert!((bbox.max_lat - 7.03).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_malformed_bbox() {
        assert!("80.43,6.94,80.55".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
        // Inverted bounds.
        assert!("80.55,6.94,80.43,7.03".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn service_area_filter_preserves_in_bounds_points() {
        let route = vec![
            Coordinate::new(6.93, 80.45),
            Coordinate::new(0.0, 0.0),
            Coordinate::new(7.1, 80.5),
        ];
        let kept = filter_in_service_area(&route);
        assert_eq!(kept.len(), 2);
        assert!(route_intersects_service_area(&route));
        assert!(!route_intersects_service_area(&[Coordinate::new(0.0, 0.0)]));
    }
}
