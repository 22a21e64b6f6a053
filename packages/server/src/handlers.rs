//! HTTP handler functions for the risk API.

use std::sync::Arc;

use actix_web::{HttpResponse, web};
use road_risk_gateway::RoleStatus;
use road_risk_grid::GridRequest;
use road_risk_risk_models::{
    BoundingBox, MIN_ROUTE_POINTS, WeatherSnapshot, filter_in_service_area,
    route_intersects_service_area,
};
use road_risk_server_models::{
    ApiError, ApiHealth, Explain, ModelsHealthResponse, ScoreRequest, ScoreResponse, SegmentDetail,
    SegmentsQuery, TopSpot, TopSpotsQuery,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/v1/risk/score`
///
/// Scores a route polyline: validates the input, resolves weather,
/// runs all three model roles, and aggregates per-segment and
/// route-level results.
pub async fn score(state: web::Data<AppState>, body: web::Json<ScoreRequest>) -> HttpResponse {
    let request = body.into_inner();

    if request.coordinates.len() < MIN_ROUTE_POINTS {
        return HttpResponse::BadRequest().json(ApiError::new("Need at least 2 coordinates"));
    }
    if request.hour.is_some_and(|h| h > 23) {
        return HttpResponse::BadRequest().json(ApiError::new("hour must be between 0 and 23"));
    }
    if !route_intersects_service_area(&request.coordinates) {
        return HttpResponse::UnprocessableEntity()
            .json(ApiError::new("Route is outside the supported service area"));
    }

    let route = filter_in_service_area(&request.coordinates);
    if route.len() < MIN_ROUTE_POINTS {
        return HttpResponse::UnprocessableEntity().json(ApiError::new(
            "Route has fewer than 2 points inside the service area",
        ));
    }

    let weather = match request.weather {
        Some(weather) => weather,
        None => {
            match road_risk_weather::snapshot_for_route(
                &state.http_client,
                &state.weather_base,
                &route,
            )
            .await
            {
                Ok(weather) => weather,
                Err(e) => {
                    log::warn!("Weather fetch failed ({e}); scoring with default conditions");
                    WeatherSnapshot::default()
                }
            }
        }
    };

    let records = match road_risk_features::build(
        &route,
        &weather,
        request.vehicle_type,
        request.timestamp_utc,
        request.hour,
    ) {
        Ok(records) => records,
        Err(e) => return HttpResponse::BadRequest().json(ApiError::new(e.to_string())),
    };

    let batch = road_risk_features::risk_batch(records);
    let output = state.registry.predict_risk(&batch);
    let rates = state.registry.predict_incident_rate(&batch);
    let cause_batch = road_risk_features::cause_batch(batch.records, output.scores.clone());
    let causes = state.registry.predict_cause(&cause_batch);
    let records = &cause_batch.records;

    let is_wet = weather.wet();
    let mut segments = Vec::with_capacity(records.len());
    let mut integrated = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let risk_score = output.scores.get(index).copied().unwrap_or(0.0);
        let incident_rate = rates.get(index).copied().unwrap_or(0.0);
        let cause = causes
            .get(index)
            .cloned()
            .unwrap_or_else(|| road_risk_gateway::FALLBACK_CAUSE.to_string());

        let score = road_risk_scoring::integrated_score(
            risk_score,
            incident_rate,
            request.vehicle_type,
            is_wet,
        );
        integrated.push(score);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let risk_0_100 = score.round().clamp(0.0, 100.0) as u8;
        segments.push(SegmentDetail {
            index,
            coordinate: [record.latitude, record.longitude],
            risk_score,
            risk_0_100,
            cause,
            incident_rate,
            curvature: record.curvature,
            surface_wetness_prob: record.surface_wetness_prob,
            temperature: record.temperature,
            humidity: record.humidity,
            precipitation: record.precipitation,
            wind_speed: record.wind_speed,
            vehicle_factor: record.vehicle_factor,
            is_high_risk: risk_score >= road_risk_scoring::RouteStatistics::HIGH_RISK_CUTOFF,
        });
    }

    let curvatures: Vec<f64> = records.iter().map(|r| r.curvature).collect();
    #[allow(clippy::cast_precision_loss)]
    let overall = output.scores.iter().sum::<f64>() / output.scores.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    let overall_0_100 = integrated.iter().sum::<f64>() / integrated.len() as f64;

    let response = ScoreResponse {
        overall,
        overall_0_100,
        route_statistics: road_risk_scoring::RouteStatistics::from_segments(
            &output.scores,
            &curvatures,
            &rates,
        ),
        confidence: road_risk_scoring::confidence(&output.scores, output.threshold),
        explain: Explain {
            curvature: road_risk_geometry::mean_curvature(&route),
            surface_wetness_prob: records.first().map_or(0.0, |r| r.surface_wetness_prob),
            wind_speed: weather.wind_speed,
            temperature: weather.temperature,
            vehicle_factor: request.vehicle_type.fallback_factor(),
        },
        weather,
        segments,
        segment_scores: output.scores,
        segment_causes: causes,
        rate_scores: rates,
    };

    HttpResponse::Ok().json(response)
}

/// `GET /api/v1/risk/segments`
///
/// Returns the deterministic risk grid for a bounding box as a
/// `GeoJSON` `FeatureCollection` of cell polygons.
pub async fn segments(
    state: web::Data<AppState>,
    query: web::Query<SegmentsQuery>,
) -> HttpResponse {
    let bbox = match parse_bbox(query.bbox.as_deref()) {
        Ok(bbox) => bbox,
        Err(response) => return response,
    };
    if query.hour.is_some_and(|h| h > 23) {
        return HttpResponse::BadRequest().json(ApiError::new("hour must be between 0 and 23"));
    }

    let request = GridRequest::resolve(bbox, query.hour, query.vehicle, None);
    let collection = road_risk_grid::generate(Arc::clone(&state.registry), &request).await;
    HttpResponse::Ok().json(collection)
}

/// `GET /api/v1/risk/spots/top`
///
/// Returns the highest-risk grid cells, sorted descending.
pub async fn top_spots(
    state: web::Data<AppState>,
    query: web::Query<TopSpotsQuery>,
) -> HttpResponse {
    let bbox = match parse_bbox(query.bbox.as_deref()) {
        Ok(bbox) => bbox,
        Err(response) => return response,
    };
    let limit = query
        .limit
        .unwrap_or(road_risk_grid::DEFAULT_TOP_SPOT_LIMIT)
        .clamp(1, 100);

    let request = GridRequest::resolve(bbox, None, query.vehicle, None);
    let spots: Vec<TopSpot> =
        road_risk_grid::top_spots(Arc::clone(&state.registry), &request, limit)
            .await
            .into_iter()
            .map(|cell| TopSpot {
                segment_id: cell.segment_id,
                lat: cell.lat,
                lon: cell.lon,
                risk_0_100: cell.risk_0_100,
                vehicle: cell.vehicle,
                hour: cell.hour,
                top_cause: cell.top_cause,
            })
            .collect();

    HttpResponse::Ok().json(spots)
}

/// `GET /api/v1/models/health`
///
/// Reports per-role model status without forcing any loads.
pub async fn models_health(state: web::Data<AppState>) -> HttpResponse {
    use road_risk_gateway::ModelRole;

    HttpResponse::Ok().json(ModelsHealthResponse {
        risk: status_label(state.registry.role_status(ModelRole::Risk)),
        cause: status_label(state.registry.role_status(ModelRole::Cause)),
        rate: status_label(state.registry.role_status(ModelRole::Rate)),
        threshold_entries: state.registry.thresholds().len(),
    })
}

fn status_label(status: RoleStatus) -> String {
    match status {
        RoleStatus::Unloaded => "unloaded",
        RoleStatus::Ready => "ready",
        RoleStatus::FallbackMode => "fallback",
    }
    .to_string()
}

fn parse_bbox(raw: Option<&str>) -> Result<Option<BoundingBox>, HttpResponse> {
    match raw {
        None => Ok(None),
        Some(raw) => raw.parse::<BoundingBox>().map(Some).map_err(|_| {
            HttpResponse::BadRequest().json(ApiError::new(
                "Invalid bbox format. Use: minLon,minLat,maxLon,maxLat",
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use road_risk_gateway::{ModelPaths, ModelRegistry};

    fn test_state() -> web::Data<AppState> {
        // Nonexistent paths pin every role to fallback: tests are
        // deterministic and touch no model files.
        web::Data::new(AppState {
            registry: Arc::new(ModelRegistry::new(ModelPaths {
                risk: Some("does/not/exist.mpk".into()),
                cause: Some("does/not/exist.mpk".into()),
                rate: Some("does/not/exist.mpk".into()),
                thresholds: Some("does/not/exist.csv".into()),
            })),
            http_client: road_risk_weather::client().unwrap(),
            weather_base: road_risk_weather::base_url(),
        })
    }

    async fn send_score(body: serde_json::Value) -> (u16, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(test_state())
                .route("/score", web::post().to(score)),
        )
        .await;
        let request = test::TestRequest::post()
            .uri("/score")
            .set_json(body)
            .to_request();
        let response = test::call_service(&app, request).await;
        let status = response.status().as_u16();
        let body: serde_json::Value = test::read_body_json(response).await;
        (status, body)
    }

    #[actix_web::test]
    async fn score_rejects_single_point_routes() {
        let (status, body) = send_score(serde_json::json!({
            "vehicleType": "CAR",
            "coordinates": [[6.93, 80.45]],
            "weather": {}
        }))
        .await;
        assert_eq!(status, 400);
        assert!(body["error"].as_str().unwrap().contains("2 coordinates"));
    }

    #[actix_web::test]
    async fn score_rejects_out_of_range_hour() {
        let (status, _) = send_score(serde_json::json!({
            "vehicleType": "CAR",
            "coordinates": [[6.93, 80.45], [6.94, 80.46]],
            "hour": 24,
            "weather": {}
        }))
        .await;
        assert_eq!(status, 400);
    }

    #[actix_web::test]
    async fn score_rejects_routes_outside_service_area() {
        // Central Colombo, west of the service area.
        let (status, body) = send_score(serde_json::json!({
            "vehicleType": "CAR",
            "coordinates": [[6.92, 79.86], [6.93, 79.87]],
            "weather": {}
        }))
        .await;
        assert_eq!(status, 422);
        assert!(body["error"].as_str().unwrap().contains("service area"));
    }

    #[actix_web::test]
    async fn fallback_score_matches_heuristic_for_straight_route() {
        // Two points: both are endpoints, so curvature is 0 and the
        // fallback formula reduces to the vehicle term alone.
        let (status, body) = send_score(serde_json::json!({
            "vehicleType": "CAR",
            "coordinates": [[6.93, 80.45], [6.94, 80.46]],
            "hour": 12,
            "weather": {}
        }))
        .await;
        assert_eq!(status, 200);
        assert!((body["overall"].as_f64().unwrap() - 0.15).abs() < 1e-9);
        let segments = body["segments"].as_array().unwrap();
        assert_eq!(segments.len(), 2);
        assert!(
            segments
                .iter()
                .all(|s| s["risk_0_100"].as_u64().unwrap() <= 100)
        );
        assert_eq!(
            body["segmentCauses"][0].as_str().unwrap(),
            road_risk_gateway::FALLBACK_CAUSE
        );
        assert!(body["rateScores"][0].as_f64().unwrap().abs() < f64::EPSILON);
    }

    #[actix_web::test]
    async fn score_filters_points_outside_service_area() {
        // One coast point plus three in-area points: the boundary
        // filters before scoring, so only three segments come back.
        let (status, body) = send_score(serde_json::json!({
            "vehicleType": "CAR",
            "coordinates": [[6.92, 79.86], [6.93, 80.45], [6.935, 80.455], [6.94, 80.46]],
            "hour": 12,
            "weather": {}
        }))
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["segments"].as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn segments_endpoint_rejects_malformed_bbox() {
        let app = test::init_service(
            App::new()
                .app_data(test_state())
                .route("/segments", web::get().to(segments)),
        )
        .await;
        let request = test::TestRequest::get()
            .uri("/segments?bbox=not,a,box")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn segments_endpoint_returns_feature_collection() {
        let app = test::init_service(
            App::new()
                .app_data(test_state())
                .route("/segments", web::get().to(segments)),
        )
        .await;
        let request = test::TestRequest::get()
            .uri("/segments?hour=10&vehicle=CAR")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"].as_array().unwrap().len(), 144);
    }

    #[actix_web::test]
    async fn top_spots_endpoint_limits_and_sorts() {
        let app = test::init_service(
            App::new()
                .app_data(test_state())
                .route("/spots/top", web::get().to(top_spots)),
        )
        .await;
        let request = test::TestRequest::get()
            .uri("/spots/top?limit=5&vehicle=MOTORCYCLE")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        let spots = body.as_array().unwrap();
        assert_eq!(spots.len(), 5);
        let risks: Vec<u64> = spots
            .iter()
            .map(|s| s["risk_0_100"].as_u64().unwrap())
            .collect();
        assert!(risks.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[actix_web::test]
    async fn models_health_reports_fallback_after_first_use() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/models/health", web::get().to(models_health)),
        )
        .await;

        // Settle the risk role before asking for status.
        let batch = road_risk_features::risk_batch(
            road_risk_features::build(
                &[
                    road_risk_risk_models::Coordinate::new(6.93, 80.45),
                    road_risk_risk_models::Coordinate::new(6.94, 80.46),
                ],
                &WeatherSnapshot::default(),
                road_risk_risk_models::VehicleClass::Car,
                None,
                Some(10),
            )
            .unwrap(),
        );
        let _ = state.registry.predict_risk(&batch);

        let request = test::TestRequest::get().uri("/models/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["risk"], "fallback");
        assert_eq!(body["cause"], "unloaded");
    }
}
