#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Feature construction for the model gateway.
//!
//! Assembles one canonical [`FeatureRecord`] per route point from raw
//! coordinates, a weather snapshot, the vehicle class, and the
//! resolved request time, then encodes the records into the two
//! role-specific batches: hashed categorical tokens for the risk
//! regressor and literal tokens (plus the risk stage's output) for
//! the cause classifier.

use chrono::{DateTime, Datelike, Timelike, Utc};
use road_risk_risk_models::{
    CauseBatch, Coordinate, CurvatureOverride, FeatureRecord, HASHED_FEATURE_DIM, MIN_ROUTE_POINTS,
    RiskBatch, VehicleClass, WeatherSnapshot,
};

/// Multiplier applied to raw degrees before truncating into integer
/// location bins. Bins are a categorical signal only, never identity.
pub const LOCATION_BIN_PRECISION: f64 = 1000.0;

/// Errors raised while building feature records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureError {
    /// Scoring requires at least [`MIN_ROUTE_POINTS`] coordinates.
    #[error("route has {got} coordinates, need at least {MIN_ROUTE_POINTS}")]
    RouteTooShort {
        /// Number of coordinates supplied.
        got: usize,
    },
}

/// Resolved time context shared by every record of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimeContext {
    hour: u8,
    dow: u8,
    is_weekend: bool,
    timestamp: i64,
}

/// Resolves the request time.
///
/// Hour precedence: explicit override, then the hour extracted from
/// `timestamp`, then the current wall-clock hour. Day-of-week and the
/// weekend flag are always derived from the resolved timestamp, not
/// the hour override — overriding the hour deliberately does not move
/// the request to a different day.
fn resolve_time(timestamp: Option<DateTime<Utc>>, hour_override: Option<u8>) -> TimeContext {
    let resolved = timestamp.unwrap_or_else(Utc::now);
    #[allow(clippy::cast_possible_truncation)]
    let hour = hour_override.unwrap_or(resolved.hour() as u8);
    #[allow(clippy::cast_possible_truncation)]
    let dow = resolved.weekday().num_days_from_monday() as u8;
    TimeContext {
        hour,
        dow,
        is_weekend: dow >= 5,
        timestamp: resolved.timestamp(),
    }
}

/// Resolves per-point curvature for the route.
///
/// A caller-supplied per-point list matching the route length is used
/// verbatim; a scalar is broadcast; anything else (including a
/// mismatched list) falls back to the geometric computation. Values
/// from overrides are clamped into the valid `[0, pi]` band.
fn resolve_curvature(route: &[Coordinate], weather: &WeatherSnapshot) -> Vec<f64> {
    match &weather.curvature {
        Some(CurvatureOverride::PerPoint(values)) if values.len() == route.len() => values
            .iter()
            .map(|v| v.clamp(0.0, std::f64::consts::PI))
            .collect(),
        Some(CurvatureOverride::PerPoint(values)) => {
            log::warn!(
                "curvature override has {} values for a {}-point route, recomputing",
                values.len(),
                route.len()
            );
            road_risk_geometry::per_point_curvature(route)
        }
        Some(CurvatureOverride::Scalar(value)) => {
            vec![value.clamp(0.0, std::f64::consts::PI); route.len()]
        }
        None => road_risk_geometry::per_point_curvature(route),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn location_bin(degrees: f64) -> i64 {
    (degrees * LOCATION_BIN_PRECISION).trunc() as i64
}

fn record_for_point(
    point: Coordinate,
    curvature: f64,
    weather: &WeatherSnapshot,
    vehicle: VehicleClass,
    time: TimeContext,
) -> FeatureRecord {
    let is_wet = weather.wet();
    FeatureRecord {
        latitude: point.lat,
        longitude: point.lon,
        temperature: weather.temperature,
        humidity: weather.humidity,
        precipitation: weather.precipitation,
        wind_speed: weather.wind_speed,
        is_wet,
        surface_wetness_prob: if is_wet { 1.0 } else { 0.0 },
        curvature,
        lat_bin: location_bin(point.lat),
        lon_bin: location_bin(point.lon),
        hour: time.hour,
        dow: time.dow,
        is_weekend: time.is_weekend,
        timestamp: time.timestamp,
        vehicle,
        vehicle_factor: vehicle.fallback_factor(),
    }
}

/// Builds one feature record per route point.
///
/// `hour_override` must already be validated to `0..=23` by the
/// caller; the boundary rejects out-of-range hours before they reach
/// the core.
///
/// # Errors
///
/// Returns [`FeatureError::RouteTooShort`] for routes with fewer than
/// two coordinates.
pub fn build(
    route: &[Coordinate],
    weather: &WeatherSnapshot,
    vehicle: VehicleClass,
    timestamp: Option<DateTime<Utc>>,
    hour_override: Option<u8>,
) -> Result<Vec<FeatureRecord>, FeatureError> {
    if route.len() < MIN_ROUTE_POINTS {
        return Err(FeatureError::RouteTooShort { got: route.len() });
    }

    let time = resolve_time(timestamp, hour_override);
    let curvatures = resolve_curvature(route, weather);

    Ok(route
        .iter()
        .zip(curvatures)
        .map(|(point, curvature)| record_for_point(*point, curvature, weather, vehicle, time))
        .collect())
}

/// Fixed midweek day-of-week for grid cell records. A cell is
/// identified by `(lat, lon, hour, vehicle, weather)` only, so the
/// wall-clock date must not leak into its feature row.
const CELL_DOW: u8 = 2;

/// Builds the single synthetic record used for one grid cell.
///
/// The cell's curvature is supplied by the grid generator (from its
/// deterministic pseudo-random surface); the day context is pinned to
/// a fixed midweek value so identical cell inputs produce identical
/// records on any date.
#[must_use]
pub fn cell_record(
    center: Coordinate,
    curvature: f64,
    weather: &WeatherSnapshot,
    vehicle: VehicleClass,
    hour: u8,
) -> FeatureRecord {
    let time = TimeContext {
        hour,
        dow: CELL_DOW,
        is_weekend: false,
        timestamp: 0,
    };
    record_for_point(
        center,
        curvature.clamp(0.0, std::f64::consts::PI),
        weather,
        vehicle,
        time,
    )
}

/// Literal categorical tokens for one record.
///
/// These are the same tokens the hashed encoding consumes; the cause
/// classifier sees them verbatim.
fn categorical_tokens(record: &FeatureRecord, index: usize) -> Vec<String> {
    vec![
        format!("Vehicle={}", record.vehicle),
        "Reason=Unknown".to_string(),
        "Position=Road".to_string(),
        "Place=Unknown".to_string(),
        "Description=Route".to_string(),
        "Description=segment".to_string(),
        format!("segment_id=seg_{index}"),
    ]
}

/// Hashes a token into a `(bucket, sign)` pair.
///
/// md5 keeps the bucket assignment stable across processes and Rust
/// releases, which `DefaultHasher` does not guarantee. The top bit
/// signs the contribution to spread collisions, mirroring signed
/// feature hashing.
fn hash_token(token: &str) -> (usize, f64) {
    let digest = md5::compute(token.as_bytes());
    let bytes: [u8; 8] = digest.0[..8].try_into().expect("md5 digest is 16 bytes");
    let h = u64::from_be_bytes(bytes);
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (h % HASHED_FEATURE_DIM as u64) as usize;
    let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
    (bucket, sign)
}

/// Encodes records for the risk regressor: each record gains a
/// [`HASHED_FEATURE_DIM`]-wide signed hashed-token vector.
#[must_use]
pub fn risk_batch(records: Vec<FeatureRecord>) -> RiskBatch {
    let hashed = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let mut buckets = vec![0.0; HASHED_FEATURE_DIM];
            for token in categorical_tokens(record, index) {
                let (bucket, sign) = hash_token(&token);
                buckets[bucket] += sign;
            }
            buckets
        })
        .collect();

    RiskBatch { records, hashed }
}

/// Encodes records for the cause classifier: literal tokens plus the
/// risk stage's normalized output. The risk regressor must therefore
/// run first.
#[must_use]
pub fn cause_batch(records: Vec<FeatureRecord>, risk_scores: Vec<f64>) -> CauseBatch {
    let tokens = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let mut tokens = categorical_tokens(record, index);
            tokens.push(if record.is_wet {
                "Surface=Wet".to_string()
            } else {
                "Surface=Dry".to_string()
            });
            tokens
        })
        .collect();

    CauseBatch {
        records,
        tokens,
        risk_scores,
    }
}
