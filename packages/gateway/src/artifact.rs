//! Serialized model artifacts and their prediction routines.
//!
//! Artifacts are MessagePack-encoded linear scorers. Each role has its
//! own shape: the risk regressor mixes named numeric weights with a
//! fixed-width hashed-token weight vector, the cause classifier is a
//! multi-class scorer over literal tokens plus the prior risk output,
//! and the incident-rate regressor is numeric-only. A `schema_version`
//! gate rejects artifacts written by an incompatible trainer version.

use std::collections::BTreeMap;

use road_risk_risk_models::{CauseBatch, FeatureRecord, HASHED_FEATURE_DIM, RiskBatch};
use serde::{Deserialize, Serialize};

use crate::PredictionError;

/// Artifact schema version this gateway understands.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Named numeric features extracted from a [`FeatureRecord`], in the
/// order the trainer emits them.
#[allow(clippy::cast_precision_loss)]
fn numeric_feature(record: &FeatureRecord, name: &str) -> Option<f64> {
    match name {
        "temperature" => Some(record.temperature),
        "humidity" => Some(record.humidity),
        "precipitation" => Some(record.precipitation),
        "wind_speed" => Some(record.wind_speed),
        "is_wet" => Some(if record.is_wet { 1.0 } else { 0.0 }),
        "curvature" => Some(record.curvature),
        "lat_bin" => Some(record.lat_bin as f64),
        "lon_bin" => Some(record.lon_bin as f64),
        "hour" => Some(f64::from(record.hour)),
        "dow" => Some(f64::from(record.dow)),
        "is_weekend" => Some(if record.is_weekend { 1.0 } else { 0.0 }),
        "vehicle_factor" => Some(record.vehicle_factor),
        _ => None,
    }
}

fn numeric_contribution(
    record: &FeatureRecord,
    weights: &BTreeMap<String, f64>,
) -> Result<f64, PredictionError> {
    let mut sum = 0.0;
    for (name, weight) in weights {
        let value = numeric_feature(record, name)
            .ok_or_else(|| PredictionError::UnknownFeature { name: name.clone() })?;
        sum += weight * value;
    }
    Ok(sum)
}

/// Risk-regressor artifact: raw output is an unnormalized SPI value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskArtifact {
    /// Artifact schema version; must match [`ARTIFACT_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// Regression intercept.
    pub bias: f64,
    /// Weights for named numeric features.
    pub numeric_weights: BTreeMap<String, f64>,
    /// Weights for the [`HASHED_FEATURE_DIM`] hashed-token buckets.
    pub hashed_weights: Vec<f64>,
}

impl RiskArtifact {
    /// Raw SPI predictions, one per record.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError`] when the hashed weight vector width
    /// does not match the batch encoding or a named feature is
    /// unknown. The caller substitutes the conservative constant.
    pub fn predict(&self, batch: &RiskBatch) -> Result<Vec<f64>, PredictionError> {
        if self.hashed_weights.len() != HASHED_FEATURE_DIM {
            return Err(PredictionError::ShapeMismatch {
                expected: HASHED_FEATURE_DIM,
                got: self.hashed_weights.len(),
            });
        }

        batch
            .records
            .iter()
            .zip(&batch.hashed)
            .map(|(record, hashed)| {
                let numeric = numeric_contribution(record, &self.numeric_weights)?;
                let hashed_sum: f64 = self
                    .hashed_weights
                    .iter()
                    .zip(hashed)
                    .map(|(w, v)| w * v)
                    .sum();
                Ok(self.bias + numeric + hashed_sum)
            })
            .collect()
    }
}

/// One class of the cause classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseClass {
    /// Human-readable cause label (e.g. "Excessive Speed").
    pub label: String,
    /// Class intercept.
    pub bias: f64,
    /// Weight on the prior risk stage's normalized output.
    pub risk_weight: f64,
    /// Weights for named numeric features.
    pub numeric_weights: BTreeMap<String, f64>,
    /// Weights for literal categorical tokens.
    pub token_weights: BTreeMap<String, f64>,
}

/// Cause-classifier artifact: argmax over per-class linear scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseArtifact {
    /// Artifact schema version; must match [`ARTIFACT_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// The closed set of cause classes.
    pub classes: Vec<CauseClass>,
}

impl CauseArtifact {
    /// Predicted cause label per record.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError`] when the artifact carries no
    /// classes, the risk outputs do not line up with the records, or a
    /// named feature is unknown.
    pub fn predict(&self, batch: &CauseBatch) -> Result<Vec<String>, PredictionError> {
        if self.classes.is_empty() {
            return Err(PredictionError::ShapeMismatch {
                expected: 1,
                got: 0,
            });
        }
        if batch.risk_scores.len() != batch.records.len() {
            return Err(PredictionError::ShapeMismatch {
                expected: batch.records.len(),
                got: batch.risk_scores.len(),
            });
        }

        batch
            .records
            .iter()
            .zip(&batch.tokens)
            .zip(&batch.risk_scores)
            .map(|((record, tokens), risk)| {
                let mut best: Option<(f64, &str)> = None;
                for class in &self.classes {
                    let numeric = numeric_contribution(record, &class.numeric_weights)?;
                    let token_sum: f64 = tokens
                        .iter()
                        .filter_map(|t| class.token_weights.get(t))
                        .sum();
                    let score = class.bias + class.risk_weight * risk + numeric + token_sum;
                    match best {
                        Some((current, _)) if score <= current => {}
                        _ => best = Some((score, &class.label)),
                    }
                }
                // classes is non-empty, so best is always set
                Ok(best.map(|(_, label)| label.to_string()).unwrap_or_default())
            })
            .collect()
    }
}

/// Incident-rate regressor artifact: numeric-only linear regression,
/// floored at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateArtifact {
    /// Artifact schema version; must match [`ARTIFACT_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// Regression intercept.
    pub bias: f64,
    /// Weights for named numeric features.
    pub numeric_weights: BTreeMap<String, f64>,
}

impl RateArtifact {
    /// Predicted incident rates, one per record, never negative.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError`] when a named feature is unknown.
    pub fn predict(&self, batch: &RiskBatch) -> Result<Vec<f64>, PredictionError> {
        batch
            .records
            .iter()
            .map(|record| {
                let numeric = numeric_contribution(record, &self.numeric_weights)?;
                Ok((self.bias + numeric).max(0.0))
            })
            .collect()
    }
}
