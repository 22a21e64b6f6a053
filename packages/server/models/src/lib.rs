#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! API request and response types for the road risk server.
//!
//! Request bodies keep the mobile client's camelCase field names;
//! response bodies mix camelCase legacy fields (kept for older app
//! versions) with the snake_case detailed fields newer clients read.

use chrono::{DateTime, Utc};
use road_risk_risk_models::{Coordinate, VehicleClass, WeatherSnapshot};
use road_risk_scoring::{ConfidenceReport, RouteStatistics};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/risk/score`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    /// Vehicle class the route is scored for.
    pub vehicle_type: VehicleClass,
    /// Route polyline as `[lat, lon]` pairs; at least two required.
    pub coordinates: Vec<Coordinate>,
    /// Optional request time; defaults to now.
    pub timestamp_utc: Option<DateTime<Utc>>,
    /// Optional hour override, `0..=23`.
    pub hour: Option<u8>,
    /// Manual weather; omitting it triggers a live fetch.
    pub weather: Option<WeatherSnapshot>,
}

/// One scored route segment with its explanatory intermediates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentDetail {
    /// Position of the segment along the route.
    pub index: usize,
    /// Segment coordinate as `[lat, lon]`.
    pub coordinate: [f64; 2],
    /// Normalized risk in `[0, 1]`.
    pub risk_score: f64,
    /// Integrated risk score, rounded.
    pub risk_0_100: u8,
    /// Predicted dominant cause.
    pub cause: String,
    /// Predicted incident rate, unchanged from the rate model.
    pub incident_rate: f64,
    /// Curvature at the segment in radians.
    pub curvature: f64,
    /// Surface wetness probability fed to the models.
    pub surface_wetness_prob: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Precipitation in millimetres.
    pub precipitation: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
    /// Static vehicle factor.
    pub vehicle_factor: f64,
    /// Whether the segment clears the high-risk cutoff.
    pub is_high_risk: bool,
}

/// Aggregate feature values echoed back for explainability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explain {
    /// Mean curvature over the route.
    pub curvature: f64,
    /// Surface wetness probability.
    pub surface_wetness_prob: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Static vehicle factor.
    pub vehicle_factor: f64,
}

/// Body of the `POST /api/v1/risk/score` response.
///
/// `segment_scores`, `segment_causes`, `rate_scores`, and `explain`
/// are the legacy flat arrays; `segments` carries the same data with
/// per-segment detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResponse {
    /// Mean normalized risk over the route, in `[0, 1]`.
    pub overall: f64,
    /// Integrated route score, in `[0, 100]`.
    pub overall_0_100: f64,
    /// Per-segment detail records.
    pub segments: Vec<SegmentDetail>,
    /// Route-level summary statistics.
    pub route_statistics: RouteStatistics,
    /// Confidence estimate over the segment predictions.
    pub confidence: ConfidenceReport,
    /// The weather snapshot the route was scored with.
    pub weather: WeatherSnapshot,
    /// Legacy: flat normalized risk scores.
    #[serde(rename = "segmentScores")]
    pub segment_scores: Vec<f64>,
    /// Legacy: flat cause strings.
    #[serde(rename = "segmentCauses")]
    pub segment_causes: Vec<String>,
    /// Legacy: flat incident rates.
    #[serde(rename = "rateScores")]
    pub rate_scores: Vec<f64>,
    /// Legacy: aggregate explanation.
    pub explain: Explain,
}

/// Query parameters for `GET /api/v1/risk/segments`.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentsQuery {
    /// Bounding box as `minLon,minLat,maxLon,maxLat`.
    pub bbox: Option<String>,
    /// Hour of day, `0..=23`.
    pub hour: Option<u8>,
    /// Vehicle class filter.
    pub vehicle: Option<VehicleClass>,
}

/// Query parameters for `GET /api/v1/risk/spots/top`.
#[derive(Debug, Clone, Deserialize)]
pub struct TopSpotsQuery {
    /// Vehicle class filter.
    pub vehicle: Option<VehicleClass>,
    /// Maximum number of spots; defaults to 10, capped at 100.
    pub limit: Option<usize>,
    /// Bounding box as `minLon,minLat,maxLon,maxLat`.
    pub bbox: Option<String>,
}

/// One entry of the top-spot ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopSpot {
    /// Derived cell id.
    pub segment_id: String,
    /// Cell center latitude.
    pub lat: f64,
    /// Cell center longitude.
    pub lon: f64,
    /// Integrated risk, rounded.
    pub risk_0_100: u8,
    /// Vehicle context.
    pub vehicle: VehicleClass,
    /// Hour context.
    pub hour: u8,
    /// Predicted dominant cause.
    pub top_cause: String,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Per-role model status for `GET /api/v1/models/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelsHealthResponse {
    /// Risk regressor status.
    pub risk: String,
    /// Cause classifier status.
    pub cause: String,
    /// Incident-rate regressor status.
    pub rate: String,
    /// Number of explicit vehicle threshold entries loaded.
    pub threshold_entries: usize,
}

/// Error body returned for client faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Human-readable description of the fault.
    pub error: String,
}

impl ApiError {
    /// Builds an error body from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
