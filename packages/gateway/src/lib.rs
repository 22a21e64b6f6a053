#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Model gateway: a uniform predict contract over three model roles.
//!
//! Each role (risk regressor, cause classifier, incident-rate
//! regressor) is loaded lazily and at most once per process. A load
//! failure of any kind pins the role to its deterministic fallback for
//! the process lifetime; callers never see a loading error. Errors
//! during an individual prediction call degrade only that call to a
//! conservative constant and are likewise invisible to the caller.

pub mod artifact;
pub mod thresholds;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use road_risk_risk_models::{CauseBatch, FeatureRecord, RiskBatch, VehicleClass};
use serde::de::DeserializeOwned;

pub use artifact::{
    ARTIFACT_SCHEMA_VERSION, CauseArtifact, CauseClass, RateArtifact, RiskArtifact,
};
pub use thresholds::ThresholdTable;

/// Hours treated as rush hour by the degraded-mode risk formula.
pub const RUSH_HOURS: [u8; 6] = [7, 8, 9, 17, 18, 19];

/// Multiplier applied to degraded-mode risk during rush hours.
pub const RUSH_HOUR_MULTIPLIER: f64 = 1.2;

/// Conservative normalized risk substituted when a prediction call
/// fails mid-flight.
pub const DEGRADED_RISK: f64 = 0.3;

/// Cause string emitted for every point while the cause role is in
/// fallback.
pub const FALLBACK_CAUSE: &str = "Potential risk due to road conditions";

/// Weight of curvature in the post-normalization amplifier.
const CURVATURE_AMPLIFICATION: f64 = 0.15;

/// Errors that can occur while loading a model artifact.
///
/// These never escape the gateway; they are logged and the role is
/// pinned to fallback.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The artifact file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The artifact bytes could not be decoded.
    #[error("artifact decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The artifact was written by an incompatible trainer version.
    #[error("artifact schema version {found} (supported: {ARTIFACT_SCHEMA_VERSION})")]
    VersionSkew {
        /// Version found in the artifact.
        found: u32,
    },
}

/// Errors raised by an individual prediction call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    /// The artifact references a feature the gateway does not know.
    #[error("unknown feature '{name}' in artifact")]
    UnknownFeature {
        /// The unrecognized feature name.
        name: String,
    },

    /// Vector widths did not line up.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Expected width.
        expected: usize,
        /// Actual width.
        got: usize,
    },
}

/// The three model roles the gateway hides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Raw risk (SPI) regressor.
    Risk,
    /// Accident-cause classifier.
    Cause,
    /// Incident-rate regressor.
    Rate,
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Risk => write!(f, "risk regressor"),
            Self::Cause => write!(f, "cause classifier"),
            Self::Rate => write!(f, "incident-rate regressor"),
        }
    }
}

/// Lifecycle state of one model role.
///
/// A role starts unloaded, transitions to `Loaded` on the first
/// successful deserialization or `Fallback` on the first failure, and
/// never changes again (no hot reload).
#[derive(Debug)]
enum ModelHandle<A> {
    Loaded(A),
    Fallback,
}

/// Externally visible status of a role, for observability endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    /// No caller has forced a load yet.
    Unloaded,
    /// Artifact deserialized successfully.
    Ready,
    /// Load failed; deterministic fallback in effect.
    FallbackMode,
}

/// Explicit artifact path overrides, one per role plus the threshold
/// table.
///
/// An override is the first candidate, not the only one: each role
/// probes its override, then its environment variable
/// (`RISK_MODEL_PATH`, `CAUSE_MODEL_PATH`, `RATE_MODEL_PATH`,
/// `VEHICLE_THRESHOLDS_PATH`), then the conventional default under
/// `models/`, and loads the first file that exists.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    /// Risk-regressor artifact path.
    pub risk: Option<PathBuf>,
    /// Cause-classifier artifact path.
    pub cause: Option<PathBuf>,
    /// Incident-rate regressor artifact path.
    pub rate: Option<PathBuf>,
    /// Vehicle threshold CSV path.
    pub thresholds: Option<PathBuf>,
}

/// Maps raw regressor output onto `[0, 1]` with the vehicle's decision
/// boundary pinned at exactly 0.5.
#[must_use]
pub fn normalize_with_threshold(prediction: f64, threshold: f64) -> f64 {
    let threshold = threshold.clamp(1e-6, 1.0 - 1e-6);
    let normalized = if prediction >= threshold {
        0.5 + 0.5 * ((prediction - threshold) / (1.0 - threshold))
    } else {
        0.5 * (prediction / threshold)
    };
    normalized.clamp(0.0, 1.0)
}

/// Post-normalization curvature amplifier, capped to `[0, 1]`.
///
/// Curvature already entered the model as a feature; applying it again
/// here intentionally double-counts the signal. Both applications are
/// part of the scoring contract, so neither may be removed.
#[must_use]
pub fn amplify_with_curvature(score: f64, curvature: f64) -> f64 {
    (score * curvature.mul_add(CURVATURE_AMPLIFICATION, 1.0)).clamp(0.0, 1.0)
}

/// Rush-hour multiplier for the degraded-mode formula.
#[must_use]
pub fn rush_multiplier(hour: u8) -> f64 {
    if RUSH_HOURS.contains(&hour) {
        RUSH_HOUR_MULTIPLIER
    } else {
        1.0
    }
}

/// Degraded-mode risk for one record:
/// `clip(0.15*vehicle + 0.7*curvature + 0.15*wetness) * rush`.
#[must_use]
pub fn fallback_risk(record: &FeatureRecord) -> f64 {
    let base = 0.15 * record.vehicle_factor
        + 0.7 * record.curvature
        + 0.15 * record.surface_wetness_prob;
    (base.clamp(0.0, 1.0) * rush_multiplier(record.hour)).clamp(0.0, 1.0)
}

/// How a batch of predictions was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    /// Loaded artifact, normalized through the threshold table.
    Model,
    /// Loaded artifact, but this call failed and was substituted with
    /// the conservative constant.
    Degraded,
    /// Role is in permanent fallback; heuristic formula in effect.
    Fallback,
}

/// Risk predictions for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskOutput {
    /// Raw regressor output (SPI scale), unchanged for explainability.
    pub raw: Vec<f64>,
    /// Normalized, curvature-amplified scores in `[0, 1]`.
    pub scores: Vec<f64>,
    /// The vehicle threshold used for normalization.
    pub threshold: f64,
    /// How the predictions were produced.
    pub mode: PredictionMode,
}

/// Injectable registry holding one lazily-loaded handle per role.
///
/// `OnceLock::get_or_init` serializes racing loaders: an artifact is
/// deserialized at most once, late arrivals block until the first load
/// settles, and every caller then shares the same handle. Predictions
/// take `&self` and never mutate model state, so they are safe to run
/// in parallel.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    paths: ModelPaths,
    risk: OnceLock<ModelHandle<RiskArtifact>>,
    cause: OnceLock<ModelHandle<CauseArtifact>>,
    rate: OnceLock<ModelHandle<RateArtifact>>,
    thresholds: OnceLock<ThresholdTable>,
}

fn load_artifact<A: DeserializeOwned>(path: &Path) -> Result<A, ModelError> {
    let bytes = std::fs::read(path)?;
    Ok(rmp_serde::from_slice(&bytes)?)
}

fn check_version(found: u32) -> Result<(), ModelError> {
    if found == ARTIFACT_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(ModelError::VersionSkew { found })
    }
}

/// First existing file among the path candidates: explicit override,
/// environment variable, conventional default.
fn first_existing(explicit: Option<&Path>, env_var: &str, default_path: &str) -> Option<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(env_var) {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(PathBuf::from(default_path));
    candidates.into_iter().find(|p| p.exists())
}

fn load_role<A, F>(
    role: ModelRole,
    explicit: Option<&Path>,
    env_var: &str,
    default_path: &str,
    version_of: F,
) -> ModelHandle<A>
where
    A: DeserializeOwned,
    F: Fn(&A) -> u32,
{
    let Some(path) = first_existing(explicit, env_var, default_path) else {
        log::warn!("No artifact file for {role}; using fallback predictions");
        return ModelHandle::Fallback;
    };

    match load_artifact::<A>(&path).and_then(|a| {
        check_version(version_of(&a))?;
        Ok(a)
    }) {
        Ok(artifact) => {
            log::info!("Loaded {role} from {}", path.display());
            ModelHandle::Loaded(artifact)
        }
        Err(e) => {
            log::warn!("Failed to load {role} from {}: {e}; using fallback", path.display());
            ModelHandle::Fallback
        }
    }
}

impl ModelRegistry {
    /// Creates a registry with explicit path overrides.
    #[must_use]
    pub fn new(paths: ModelPaths) -> Self {
        Self {
            paths,
            ..Self::default()
        }
    }

    fn risk_handle(&self) -> &ModelHandle<RiskArtifact> {
        self.risk.get_or_init(|| {
            load_role(
                ModelRole::Risk,
                self.paths.risk.as_deref(),
                "RISK_MODEL_PATH",
                "models/risk_regressor.mpk",
                |a: &RiskArtifact| a.schema_version,
            )
        })
    }

    fn cause_handle(&self) -> &ModelHandle<CauseArtifact> {
        self.cause.get_or_init(|| {
            load_role(
                ModelRole::Cause,
                self.paths.cause.as_deref(),
                "CAUSE_MODEL_PATH",
                "models/cause_classifier.mpk",
                |a: &CauseArtifact| a.schema_version,
            )
        })
    }

    fn rate_handle(&self) -> &ModelHandle<RateArtifact> {
        self.rate.get_or_init(|| {
            load_role(
                ModelRole::Rate,
                self.paths.rate.as_deref(),
                "RATE_MODEL_PATH",
                "models/incident_rate.mpk",
                |a: &RateArtifact| a.schema_version,
            )
        })
    }

    /// The vehicle threshold table, loaded on first access.
    pub fn thresholds(&self) -> &ThresholdTable {
        self.thresholds.get_or_init(|| {
            first_existing(
                self.paths.thresholds.as_deref(),
                "VEHICLE_THRESHOLDS_PATH",
                "models/vehicle_thresholds.csv",
            )
            .map_or_else(
                || {
                    log::warn!("No vehicle threshold file found; using default thresholds");
                    ThresholdTable::default()
                },
                |path| ThresholdTable::load(&path),
            )
        })
    }

    /// Observability status for one role; never forces a load.
    #[must_use]
    pub fn role_status(&self, role: ModelRole) -> RoleStatus {
        fn status_of<A>(cell: &OnceLock<ModelHandle<A>>) -> RoleStatus {
            match cell.get() {
                None => RoleStatus::Unloaded,
                Some(ModelHandle::Loaded(_)) => RoleStatus::Ready,
                Some(ModelHandle::Fallback) => RoleStatus::FallbackMode,
            }
        }
        match role {
            ModelRole::Risk => status_of(&self.risk),
            ModelRole::Cause => status_of(&self.cause),
            ModelRole::Rate => status_of(&self.rate),
        }
    }

    /// Threshold for the batch's vehicle class.
    #[must_use]
    pub fn threshold_for(&self, vehicle: VehicleClass) -> f64 {
        self.thresholds().lookup(vehicle)
    }

    /// Predicts normalized risk for a batch.
    ///
    /// Never fails: a fallback role yields the heuristic formula, a
    /// mid-call prediction error yields the conservative constant.
    #[must_use]
    pub fn predict_risk(&self, batch: &RiskBatch) -> RiskOutput {
        let vehicle = batch
            .records
            .first()
            .map_or_else(VehicleClass::default, |r| r.vehicle);
        let threshold = self.threshold_for(vehicle);

        match self.risk_handle() {
            ModelHandle::Loaded(artifact) => match artifact.predict(batch) {
                Ok(raw) => {
                    let scores = raw
                        .iter()
                        .zip(&batch.records)
                        .map(|(p, record)| {
                            amplify_with_curvature(
                                normalize_with_threshold(*p, threshold),
                                record.curvature,
                            )
                        })
                        .collect();
                    RiskOutput {
                        raw,
                        scores,
                        threshold,
                        mode: PredictionMode::Model,
                    }
                }
                Err(e) => {
                    log::warn!("Risk prediction failed ({e}); degrading to constant");
                    let n = batch.records.len();
                    RiskOutput {
                        raw: vec![DEGRADED_RISK; n],
                        scores: vec![DEGRADED_RISK; n],
                        threshold,
                        mode: PredictionMode::Degraded,
                    }
                }
            },
            ModelHandle::Fallback => {
                let scores: Vec<f64> = batch.records.iter().map(fallback_risk).collect();
                RiskOutput {
                    raw: scores.clone(),
                    scores,
                    threshold,
                    mode: PredictionMode::Fallback,
                }
            }
        }
    }

    /// Predicts a cause string per record.
    ///
    /// The cause stage consumes the risk stage's output (inside
    /// `batch.risk_scores`), so `predict_risk` must run first.
    #[must_use]
    pub fn predict_cause(&self, batch: &CauseBatch) -> Vec<String> {
        match self.cause_handle() {
            ModelHandle::Loaded(artifact) => match artifact.predict(batch) {
                Ok(labels) => labels
                    .into_iter()
                    .zip(&batch.records)
                    .zip(&batch.risk_scores)
                    .map(|((label, record), risk)| describe_cause(&label, record, *risk))
                    .collect(),
                Err(e) => {
                    log::warn!("Cause prediction failed ({e}); degrading to fallback cause");
                    vec![FALLBACK_CAUSE.to_string(); batch.records.len()]
                }
            },
            ModelHandle::Fallback => vec![FALLBACK_CAUSE.to_string(); batch.records.len()],
        }
    }

    /// Predicts an incident rate per record; `0.0` everywhere in
    /// fallback, and also on a failed call (the role's conservative
    /// constant).
    #[must_use]
    pub fn predict_incident_rate(&self, batch: &RiskBatch) -> Vec<f64> {
        match self.rate_handle() {
            ModelHandle::Loaded(artifact) => match artifact.predict(batch) {
                Ok(rates) => rates,
                Err(e) => {
                    log::warn!("Incident-rate prediction failed ({e}); degrading to zero");
                    vec![0.0; batch.records.len()]
                }
            },
            ModelHandle::Fallback => vec![0.0; batch.records.len()],
        }
    }
}

/// Expands a predicted class label with vehicle and wetness context
/// for riskier segments.
fn describe_cause(label: &str, record: &FeatureRecord, risk: f64) -> String {
    let mut cause = label.to_string();
    if risk >= 0.6 {
        let context = match record.vehicle {
            VehicleClass::Motorcycle => " - high risk for motorcycles",
            VehicleClass::ThreeWheeler => " - risky for three wheelers",
            VehicleClass::Bus => " - challenging for buses",
            VehicleClass::Lorry => " - difficult for lorries",
            VehicleClass::Car | VehicleClass::Van => "",
        };
        cause.push_str(context);
    }
    if record.precipitation > 0.5 && risk >= 0.5 {
        cause.push_str(" with wet conditions");
    }
    cause
}
