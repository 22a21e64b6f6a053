#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Open-Meteo weather client.
//!
//! Fetches current conditions for a route's midpoint and normalizes
//! them into a [`WeatherSnapshot`]. Manually supplied snapshots and
//! fetched ones are identical to the scoring core; a fetch failure is
//! the caller's signal to fall back to the default snapshot.

use std::time::Duration;

use road_risk_risk_models::{Coordinate, WeatherSnapshot};

/// Default Open-Meteo forecast endpoint; override with
/// `OPEN_METEO_BASE_URL`.
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Upstream timeout for a weather fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the weather source.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// The route carried no coordinates to pick a midpoint from.
    #[error("cannot fetch weather for an empty route")]
    EmptyRoute,

    /// HTTP request failed or timed out.
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Builds the HTTP client used for weather fetches.
///
/// # Errors
///
/// Returns a [`reqwest::Error`] if the TLS backend fails to
/// initialize.
pub fn client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()
}

/// The configured Open-Meteo base URL.
#[must_use]
pub fn base_url() -> String {
    std::env::var("OPEN_METEO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

/// Fetches current conditions at the route's midpoint.
///
/// Missing fields in the upstream response fall back to the same
/// defaults a manual snapshot uses, so a partial response still yields
/// a complete snapshot.
///
/// # Errors
///
/// Returns [`WeatherError`] when the route is empty or the upstream
/// request fails.
pub async fn snapshot_for_route(
    client: &reqwest::Client,
    base_url: &str,
    route: &[Coordinate],
) -> Result<WeatherSnapshot, WeatherError> {
    let mid = route.get(route.len() / 2).ok_or(WeatherError::EmptyRoute)?;

    let resp = client
        .get(base_url)
        .query(&[
            ("latitude", mid.lat.to_string()),
            ("longitude", mid.lon.to_string()),
            (
                "current",
                "temperature_2m,precipitation,wind_speed_10m,relative_humidity_2m".to_string(),
            ),
        ])
        .send()
        .await?
        .error_for_status()?;

    let body: serde_json::Value = resp.json().await?;
    Ok(parse_current(&body))
}

fn parse_current(body: &serde_json::Value) -> WeatherSnapshot {
    let current = &body["current"];
    let field = |name: &str, fallback: f64| current[name].as_f64().unwrap_or(fallback);

    let defaults = WeatherSnapshot::default();
    WeatherSnapshot {
        temperature: field("temperature_2m", defaults.temperature),
        humidity: field("relative_humidity_2m", defaults.humidity),
        precipitation: field("precipitation", defaults.precipitation),
        wind_speed: field("wind_speed_10m", defaults.wind_speed),
        is_wet: None,
        curvature: None,
    }
}
