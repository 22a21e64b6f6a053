#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Deterministic spatial risk grid.
//!
//! Tiles a bounding box into rectangular cells, scores each cell
//! independently through the model gateway and aggregator, and emits
//! the result as a `GeoJSON` `FeatureCollection`. The per-cell
//! curvature comes from a seeded trigonometric generator, so identical
//! inputs always reproduce the identical surface; the map tiles a
//! client renders are stable across requests and across processes.

use std::sync::Arc;

use chrono::Timelike as _;
use futures::future::join_all;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use road_risk_gateway::ModelRegistry;
use road_risk_risk_models::{BoundingBox, Coordinate, VehicleClass, WeatherSnapshot, in_service_area};
use serde::Serialize;

/// Bounding box used when a grid request supplies none.
pub const DEFAULT_BBOX: BoundingBox = BoundingBox {
    min_lon: 80.43,
    min_lat: 6.94,
    max_lon: 80.55,
    max_lat: 7.03,
};

/// Cell edge length in degrees, roughly 440 m at the service area's
/// latitude.
pub const CELL_SIZE_DEG: f64 = 0.004;

/// Hard cap on cells per axis; a request can score at most 144 cells.
pub const MAX_CELLS_PER_AXIS: usize = 12;

/// Default number of spots returned by the top-spot ranking.
pub const DEFAULT_TOP_SPOT_LIMIT: usize = 10;

/// Deterministic pseudo-random value in `[0, 1)` for a seed.
///
/// The `frac(sin(seed) * 10000)` form is a reproducibility contract
/// with clients that cache rendered tiles, not a quality PRNG. Do not
/// swap it for a general-purpose generator.
#[must_use]
pub fn seeded_random(seed: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let x = (seed as f64).sin() * 10_000.0;
    x - x.floor()
}

/// Hashes a cell center into a seed for [`seeded_random`].
#[must_use]
pub fn hash_coords(lat: f64, lon: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let seed = (lat.mul_add(1000.0, lon * 1000.0) * 12_345.0).trunc() as i64;
    seed
}

/// Derived cell identity; cells have no persisted identity beyond it.
#[must_use]
pub fn segment_id(lat: f64, lon: f64) -> String {
    format!("seg_{lat:.3}_{lon:.3}")
}

/// A fully resolved grid request; optional inputs already defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRequest {
    /// Area to tile.
    pub bbox: BoundingBox,
    /// Hour of day the cells are scored for.
    pub hour: u8,
    /// Vehicle class the cells are scored for.
    pub vehicle: VehicleClass,
    /// Weather applied uniformly across the grid.
    pub weather: WeatherSnapshot,
}

impl GridRequest {
    /// Resolves optional request inputs to their defaults: the fixed
    /// default box, the current hour, and a dry car.
    #[must_use]
    pub fn resolve(
        bbox: Option<BoundingBox>,
        hour: Option<u8>,
        vehicle: Option<VehicleClass>,
        weather: Option<WeatherSnapshot>,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let hour = hour.unwrap_or_else(|| chrono::Utc::now().hour() as u8);
        Self {
            bbox: bbox.unwrap_or(DEFAULT_BBOX),
            hour,
            vehicle: vehicle.unwrap_or_default(),
            weather: weather.unwrap_or_default(),
        }
    }
}

/// One scored grid cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellEvaluation {
    /// Derived cell id (`seg_<lat>_<lon>`, 3 decimals).
    pub segment_id: String,
    /// Cell center latitude.
    pub lat: f64,
    /// Cell center longitude.
    pub lon: f64,
    /// Integrated risk, rounded to an integer.
    pub risk_0_100: u8,
    /// Predicted incident rate, unchanged from the rate model.
    pub incident_rate: f64,
    /// Predicted dominant cause.
    pub top_cause: String,
    /// Vehicle context the cell was scored for.
    pub vehicle: VehicleClass,
    /// Hour context the cell was scored for.
    pub hour: u8,
    /// Cell rectangle as `(min_lon, min_lat, max_lon, max_lat)`.
    #[serde(skip)]
    pub bounds: (f64, f64, f64, f64),
}

/// Scores a single cell center.
///
/// Curvature is the seeded pseudo-random surface value for the cell,
/// already inside the valid `[0, pi]` band since the generator emits
/// `[0, 1)`.
#[must_use]
pub fn evaluate_cell(
    registry: &ModelRegistry,
    center: Coordinate,
    bounds: (f64, f64, f64, f64),
    request: &GridRequest,
) -> Option<CellEvaluation> {
    let curvature = seeded_random(hash_coords(center.lat, center.lon));
    let record = road_risk_features::cell_record(
        center,
        curvature,
        &request.weather,
        request.vehicle,
        request.hour,
    );

    let batch = road_risk_features::risk_batch(vec![record]);
    let output = registry.predict_risk(&batch);
    let risk = output.scores.first().copied()?;
    let rate = registry
        .predict_incident_rate(&batch)
        .first()
        .copied()
        .unwrap_or(0.0);
    let cause_batch = road_risk_features::cause_batch(batch.records, vec![risk]);
    let top_cause = registry
        .predict_cause(&cause_batch)
        .into_iter()
        .next()
        .unwrap_or_else(|| road_risk_gateway::FALLBACK_CAUSE.to_string());

    let score =
        road_risk_scoring::integrated_score(risk, rate, request.vehicle, request.weather.wet());
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let risk_0_100 = score.round().clamp(0.0, 100.0) as u8;

    Some(CellEvaluation {
        segment_id: segment_id(center.lat, center.lon),
        lat: center.lat,
        lon: center.lon,
        risk_0_100,
        incident_rate: rate,
        top_cause,
        vehicle: request.vehicle,
        hour: request.hour,
        bounds,
    })
}

fn cells_per_axis(range: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = (range / CELL_SIZE_DEG).ceil() as usize;
    count.clamp(1, MAX_CELLS_PER_AXIS)
}

/// In-service-area cell rectangles for a request, as
/// `(center, bounds)` pairs.
///
/// Cells whose center falls outside the service area are skipped
/// before scoring, not scored and discarded.
fn cell_layout(bbox: &BoundingBox) -> Vec<(Coordinate, (f64, f64, f64, f64))> {
    let lat_cells = cells_per_axis(bbox.max_lat - bbox.min_lat);
    let lon_cells = cells_per_axis(bbox.max_lon - bbox.min_lon);
    #[allow(clippy::cast_precision_loss)]
    let lat_step = (bbox.max_lat - bbox.min_lat) / lat_cells as f64;
    #[allow(clippy::cast_precision_loss)]
    let lon_step = (bbox.max_lon - bbox.min_lon) / lon_cells as f64;

    let mut cells = Vec::with_capacity(lat_cells * lon_cells);
    for i in 0..lat_cells {
        for j in 0..lon_cells {
            #[allow(clippy::cast_precision_loss)]
            let lat = (i as f64 + 0.5).mul_add(lat_step, bbox.min_lat);
            #[allow(clippy::cast_precision_loss)]
            let lon = (j as f64 + 0.5).mul_add(lon_step, bbox.min_lon);
            if !in_service_area(lat, lon) {
                continue;
            }
            let bounds = (
                lon - lon_step / 2.0,
                lat - lat_step / 2.0,
                lon + lon_step / 2.0,
                lat + lat_step / 2.0,
            );
            cells.push((Coordinate::new(lat, lon), bounds));
        }
    }
    cells
}

/// Scores every in-service-area cell of the request.
///
/// Cells are independent, so each evaluation runs on the blocking
/// pool and the batch joins them all. A failing cell is logged and
/// dropped; it never aborts the batch.
pub async fn evaluate_grid(
    registry: Arc<ModelRegistry>,
    request: &GridRequest,
) -> Vec<CellEvaluation> {
    let tasks: Vec<_> = cell_layout(&request.bbox)
        .into_iter()
        .map(|(center, bounds)| {
            let registry = Arc::clone(&registry);
            let request = request.clone();
            tokio::task::spawn_blocking(move || {
                evaluate_cell(&registry, center, bounds, &request)
            })
        })
        .collect();

    let mut cells = Vec::with_capacity(tasks.len());
    for result in join_all(tasks).await {
        match result {
            Ok(Some(cell)) => cells.push(cell),
            Ok(None) => log::warn!("Dropping grid cell with no prediction output"),
            Err(e) => log::warn!("Grid cell evaluation panicked: {e}"),
        }
    }
    cells
}

/// Scores the request's grid and renders it as a `FeatureCollection`
/// of cell polygons.
pub async fn generate(registry: Arc<ModelRegistry>, request: &GridRequest) -> FeatureCollection {
    let cells = evaluate_grid(registry, request).await;
    FeatureCollection {
        bbox: None,
        features: cells.iter().map(cell_feature).collect(),
        foreign_members: None,
    }
}

/// The highest-risk cells of the request's grid, sorted descending.
pub async fn top_spots(
    registry: Arc<ModelRegistry>,
    request: &GridRequest,
    limit: usize,
) -> Vec<CellEvaluation> {
    let mut cells = evaluate_grid(registry, request).await;
    cells.sort_by(|a, b| {
        b.risk_0_100
            .cmp(&a.risk_0_100)
            .then_with(|| a.segment_id.cmp(&b.segment_id))
    });
    cells.truncate(limit);
    cells
}

fn cell_feature(cell: &CellEvaluation) -> Feature {
    let (min_lon, min_lat, max_lon, max_lat) = cell.bounds;
    let ring = vec![
        vec![min_lon, min_lat],
        vec![max_lon, min_lat],
        vec![max_lon, max_lat],
        vec![min_lon, max_lat],
        vec![min_lon, min_lat],
    ];

    let mut properties = serde_json::Map::new();
    properties.insert("segment_id".to_string(), cell.segment_id.clone().into());
    properties.insert("risk_0_100".to_string(), cell.risk_0_100.into());
    properties.insert("incident_rate".to_string(), cell.incident_rate.into());
    properties.insert("top_cause".to_string(), cell.top_cause.clone().into());
    properties.insert("vehicle".to_string(), cell.vehicle.to_string().into());
    properties.insert("hour".to_string(), cell.hour.into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use road_risk_gateway::ModelPaths;

    fn fallback_registry() -> Arc<ModelRegistry> {
        Arc::new(ModelRegistry::new(ModelPaths {
            risk: Some("does/not/exist.mpk".into()),
            cause: Some("does/not/exist.mpk".into()),
            rate: Some("does/not/exist.mpk".into()),
            thresholds: Some("does/not/exist.csv".into()),
        }))
    }

    fn request() -> GridRequest {
        GridRequest::resolve(None, Some(10), Some(VehicleClass::Car), None)
    }

    #[test]
    fn seeded_random_is_deterministic_and_bounded() {
        for seed in [-50_000, -1, 0, 1, 42, 987_654_321] {
            let a = seeded_random(seed);
            let b = seeded_random(seed);
            assert!((a - b).abs() < f64::EPSILON);
            assert!((0.0..1.0).contains(&a), "seed {seed} escaped [0, 1): {a}");
        }
    }

    #[test]
    fn nearby_cells_get_distinct_seeds() {
        let a = hash_coords(6.985, 80.465);
        let b = hash_coords(6.985, 80.469);
        assert_ne!(a, b);
    }

    #[test]
    fn segment_ids_round_to_three_decimals() {
        assert_eq!(segment_id(6.98549, 80.4651), "seg_6.985_80.465");
    }

    #[test]
    fn layout_caps_at_twelve_by_twelve() {
        // Default box spans 22 x 30 raw cells; both axes must cap.
        let cells = cell_layout(&DEFAULT_BBOX);
        assert_eq!(cells.len(), MAX_CELLS_PER_AXIS * MAX_CELLS_PER_AXIS);
    }

    #[test]
    fn tiny_boxes_still_produce_one_cell() {
        let bbox = BoundingBox::new(80.45, 6.95, 80.451, 6.951).unwrap();
        assert_eq!(cell_layout(&bbox).len(), 1);
    }

    #[test]
    fn out_of_service_cells_are_skipped() {
        // Colombo coast, entirely west of the service area.
        let bbox = BoundingBox::new(79.80, 6.85, 79.90, 6.95).unwrap();
        assert!(cell_layout(&bbox).is_empty());
    }

    #[test]
    fn loaded_model_cells_do_not_depend_on_the_date() {
        let dir = std::env::temp_dir().join("road_risk_grid_test_dow");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("risk_regressor.mpk");
        // Weights only the day-of-week feature: raw output is
        // 0.25 * dow, so a date-dependent record would move the score.
        let artifact = road_risk_gateway::RiskArtifact {
            schema_version: road_risk_gateway::ARTIFACT_SCHEMA_VERSION,
            bias: 0.0,
            numeric_weights: std::collections::BTreeMap::from([("dow".to_string(), 0.25)]),
            hashed_weights: vec![0.0; road_risk_risk_models::HASHED_FEATURE_DIM],
        };
        std::fs::write(&path, rmp_serde::to_vec_named(&artifact).unwrap()).unwrap();

        let registry = ModelRegistry::new(ModelPaths {
            risk: Some(path),
            cause: Some("does/not/exist.mpk".into()),
            rate: Some("does/not/exist.mpk".into()),
            thresholds: Some("does/not/exist.csv".into()),
        });
        let request = request();
        let center = Coordinate::new(6.985, 80.465);
        let bounds = (80.463, 6.983, 80.467, 6.987);

        let cell = evaluate_cell(&registry, center, bounds, &request).unwrap();
        assert_eq!(cell, evaluate_cell(&registry, center, bounds, &request).unwrap());

        // Cell records carry the fixed midweek day (dow 2): raw 0.5
        // sits exactly at the CAR threshold.
        let curvature = seeded_random(hash_coords(center.lat, center.lon));
        let risk = road_risk_gateway::amplify_with_curvature(
            road_risk_gateway::normalize_with_threshold(0.5, 0.5),
            curvature,
        );
        let expected = road_risk_scoring::integrated_score(risk, 0.0, VehicleClass::Car, false);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let expected = expected.round().clamp(0.0, 100.0) as u8;
        assert_eq!(cell.risk_0_100, expected);
    }

    #[test]
    fn cell_evaluation_is_deterministic() {
        let registry = fallback_registry();
        let request = request();
        let center = Coordinate::new(6.985, 80.465);
        let bounds = (80.463, 6.983, 80.467, 6.987);
        let a = evaluate_cell(&registry, center, bounds, &request).unwrap();
        let b = evaluate_cell(&registry, center, bounds, &request).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn grid_renders_polygon_features_with_properties() {
        let registry = fallback_registry();
        let collection = generate(registry, &request()).await;
        assert_eq!(
            collection.features.len(),
            MAX_CELLS_PER_AXIS * MAX_CELLS_PER_AXIS
        );

        let feature = &collection.features[0];
        let properties = feature.properties.as_ref().unwrap();
        assert!(properties.contains_key("segment_id"));
        assert!(properties.contains_key("risk_0_100"));
        assert!(properties.contains_key("top_cause"));
        let Some(Geometry {
            value: Value::Polygon(rings),
            ..
        }) = &feature.geometry
        else {
            panic!("expected polygon geometry");
        };
        assert_eq!(rings[0].len(), 5);
    }

    #[tokio::test]
    async fn repeated_grids_are_byte_identical() {
        let registry = fallback_registry();
        let request = request();
        let a = generate(Arc::clone(&registry), &request).await;
        let b = generate(registry, &request).await;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn top_spots_are_sorted_and_limited() {
        let registry = fallback_registry();
        let spots = top_spots(registry, &request(), 5).await;
        assert_eq!(spots.len(), 5);
        for pair in spots.windows(2) {
            assert!(pair[0].risk_0_100 >= pair[1].risk_0_100);
        }
    }
}
