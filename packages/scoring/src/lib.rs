#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Risk aggregation: the integrated 0-100 score, confidence
//! estimation, and per-route summary statistics.
//!
//! [`integrated_score`] is the single source of truth for the final
//! score. Per-segment responses additionally expose the intermediate
//! quantities (raw prediction, curvature, incident rate) unchanged so
//! callers can explain where a score came from.

use road_risk_risk_models::VehicleClass;
use serde::Serialize;

/// Incident rate at which the rate component saturates at 1.0.
const RATE_SATURATION: f64 = 0.05;

/// Multiplier applied to the score when the surface is wet.
const WET_MULTIPLIER: f64 = 1.25;

/// Static per-vehicle score multiplier.
#[must_use]
pub fn vehicle_multiplier(vehicle: VehicleClass) -> f64 {
    match vehicle {
        VehicleClass::Motorcycle => 1.2,
        VehicleClass::ThreeWheeler => 1.1,
        VehicleClass::Bus => 0.85,
        VehicleClass::Lorry => 0.90,
        VehicleClass::Car | VehicleClass::Van => 1.0,
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Combines a cause probability and an incident rate into the final
/// 0-100 score.
///
/// The cause component is a sigmoid centered on probability 0.5; the
/// rate component saturates at [`RATE_SATURATION`] incidents. Vehicle
/// and wetness multipliers scale the weighted sum, and the result is
/// clipped to `[0, 100]`.
#[must_use]
pub fn integrated_score(
    cause_probability: f64,
    incident_rate: f64,
    vehicle: VehicleClass,
    is_wet: bool,
) -> f64 {
    let cause_component = sigmoid(5.0 * (cause_probability - 0.5));
    let rate_component = (incident_rate / RATE_SATURATION).min(1.0);
    let weather_multiplier = if is_wet { WET_MULTIPLIER } else { 1.0 };

    (100.0
        * rate_component.mul_add(0.4, 0.6 * cause_component)
        * vehicle_multiplier(vehicle)
        * weather_multiplier)
        .clamp(0.0, 100.0)
}

/// How sure the engine is about a batch of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceReport {
    /// Combined confidence signal in `[0, 1]`.
    pub confidence: f64,
    /// Discretized certainty band: 0.9, 0.5, or 0.2.
    pub certainty: f64,
    /// How far the mean prediction sits from the decision threshold.
    pub distance_from_threshold: f64,
    /// Agreement between predictions; 1.0 when they all match.
    pub consistency: f64,
    /// Mean prediction over the batch.
    pub avg_prediction: f64,
    /// The vehicle threshold the distance was measured against.
    pub threshold: f64,
}

/// Estimates confidence for a batch of normalized predictions against
/// the vehicle's decision threshold.
///
/// Distance from the threshold drives confidence (predictions near
/// the boundary are ambiguous); prediction variance drives
/// consistency. A single-sample batch is treated as fully consistent.
#[must_use]
pub fn confidence(predictions: &[f64], threshold: f64) -> ConfidenceReport {
    if predictions.is_empty() {
        return ConfidenceReport {
            confidence: 0.0,
            certainty: 0.2,
            distance_from_threshold: 0.0,
            consistency: 1.0,
            avg_prediction: 0.0,
            threshold,
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let n = predictions.len() as f64;
    let mean = predictions.iter().sum::<f64>() / n;
    let distance = (mean - threshold).abs();
    let distance_confidence = (2.0 * distance).min(1.0);

    let consistency = if predictions.len() >= 2 {
        let variance = predictions.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        variance.mul_add(-10.0, 1.0).max(0.0)
    } else {
        1.0
    };

    let combined = consistency.mul_add(0.4, 0.6 * distance_confidence);
    let certainty = if combined > 0.7 {
        0.9
    } else if combined > 0.4 {
        0.5
    } else {
        0.2
    };

    ConfidenceReport {
        confidence: combined,
        certainty,
        distance_from_threshold: distance,
        consistency,
        avg_prediction: mean,
        threshold,
    }
}

/// Summary statistics over a route's per-segment outputs.
///
/// Risk fields are on the normalized 0-1 scale; the integrated 0-100
/// score is derived per segment, not summarized here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteStatistics {
    /// Number of scored segments.
    pub total_segments: usize,
    /// Segments at or above [`Self::HIGH_RISK_CUTOFF`].
    pub high_risk_segments: usize,
    /// High-risk share of the route, in percent.
    pub high_risk_percentage: f64,
    /// Mean normalized risk.
    pub avg_risk: f64,
    /// Highest normalized risk.
    pub max_risk: f64,
    /// Lowest normalized risk.
    pub min_risk: f64,
    /// Mean curvature in radians.
    pub avg_curvature: f64,
    /// Mean predicted incident rate.
    pub avg_incident_rate: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        values.iter().sum::<f64>() / n
    }
}

impl RouteStatistics {
    /// Normalized risk at or above which a segment counts as
    /// high-risk.
    pub const HIGH_RISK_CUTOFF: f64 = 0.7;

    /// Summarizes per-segment risk scores, curvatures, and incident
    /// rates. The slices are parallel arrays over the same segments.
    #[must_use]
    pub fn from_segments(risk_scores: &[f64], curvatures: &[f64], incident_rates: &[f64]) -> Self {
        if risk_scores.is_empty() {
            return Self {
                total_segments: 0,
                high_risk_segments: 0,
                high_risk_percentage: 0.0,
                avg_risk: 0.0,
                max_risk: 0.0,
                min_risk: 0.0,
                avg_curvature: 0.0,
                avg_incident_rate: 0.0,
            };
        }

        let high_risk_segments = risk_scores
            .iter()
            .filter(|s| **s >= Self::HIGH_RISK_CUTOFF)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let high_risk_percentage =
            100.0 * high_risk_segments as f64 / risk_scores.len() as f64;

        Self {
            total_segments: risk_scores.len(),
            high_risk_segments,
            high_risk_percentage,
            avg_risk: mean(risk_scores),
            max_risk: risk_scores.iter().copied().fold(f64::MIN, f64::max),
            min_risk: risk_scores.iter().copied().fold(f64::MAX, f64::min),
            avg_curvature: mean(curvatures),
            avg_incident_rate: mean(incident_rates),
        }
    }
}
