#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Actix-Web API server for route and area risk scoring.
//!
//! Serves the REST API the mobile client calls: per-route risk
//! scoring, the deterministic area risk grid, top-spot ranking, and
//! model health. All scoring state lives in a process-wide
//! [`ModelRegistry`] established on startup; request handlers only
//! read it.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use road_risk_gateway::ModelRegistry;

/// Shared application state.
pub struct AppState {
    /// Lazily-loaded model handles, shared across all requests.
    pub registry: Arc<ModelRegistry>,
    /// HTTP client for live weather fetches.
    pub http_client: reqwest::Client,
    /// Open-Meteo endpoint the weather fetches go to.
    pub weather_base: String,
}

/// Starts the risk API server.
///
/// Builds the model registry (artifact paths resolve against the
/// environment or the conventional defaults on first use) and the
/// weather HTTP client, then starts the
/// Actix-Web HTTP server. This is a regular async function — the
/// caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to
/// bind or encounters a runtime error.
///
/// # Panics
///
/// Panics if the weather HTTP client cannot be constructed.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let registry = Arc::new(ModelRegistry::default());
    let http_client = road_risk_weather::client().expect("Failed to build weather HTTP client");
    let weather_base = road_risk_weather::base_url();

    let state = web::Data::new(AppState {
        registry,
        http_client,
        weather_base,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .service(
                        web::scope("/v1")
                            .route("/risk/score", web::post().to(handlers::score))
                            .route("/risk/segments", web::get().to(handlers::segments))
                            .route("/risk/spots/top", web::get().to(handlers::top_spots))
                            .route("/models/health", web::get().to(handlers::models_health)),
                    ),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
