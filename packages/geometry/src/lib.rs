#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Distance and curvature primitives over polylines.
//!
//! All functions are pure and tolerant of degenerate input: duplicate
//! points, zero-length segments, and near-collinear geometry must not
//! produce NaN. Curvature values are always clamped into `[0, pi]`.

use road_risk_risk_models::Coordinate;

/// Mean Earth radius in metres used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Guards the division in the turning-angle computation against
/// zero-length neighbor vectors.
const CURVATURE_EPSILON: f64 = 1e-9;

/// Great-circle distance between two coordinates in metres (haversine).
#[must_use]
pub fn distance_m(p1: Coordinate, p2: Coordinate) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let dlat = (p2.lat - p1.lat).to_radians();
    let dlon = (p2.lon - p1.lon).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total polyline length in metres.
#[must_use]
pub fn polyline_length_m(route: &[Coordinate]) -> f64 {
    route.windows(2).map(|w| distance_m(w[0], w[1])).sum()
}

/// Turning angle at every route point, radians in `[0, pi]`.
///
/// For each interior point the angle between the vectors to its two
/// neighbors is computed as `arccos(clamp(dot / (|v1||v2| + eps)))`;
/// the clamp runs before `arccos` so near-collinear points stay
/// finite. The first and last points always get `0.0`. The returned
/// sequence has the same length as the input.
#[must_use]
pub fn per_point_curvature(route: &[Coordinate]) -> Vec<f64> {
    if route.len() < 3 {
        return vec![0.0; route.len()];
    }

    let mut angles = Vec::with_capacity(route.len());
    angles.push(0.0);
    for window in route.windows(3) {
        let (a, b, c) = (window[0], window[1], window[2]);
        let v1 = (a.lat - b.lat, a.lon - b.lon);
        let v2 = (c.lat - b.lat, c.lon - b.lon);
        let dot = v1.0 * v2.0 + v1.1 * v2.1;
        let norms = (v1.0.hypot(v1.1) * v2.0.hypot(v2.1)) + CURVATURE_EPSILON;
        let angle = (dot / norms).clamp(-1.0, 1.0).acos().abs();
        angles.push(angle);
    }
    angles.push(0.0);
    angles
}

/// Mean turning angle over the route; `0.0` for routes shorter than
/// three points.
#[must_use]
pub fn mean_curvature(route: &[Coordinate]) -> f64 {
    if route.len() < 3 {
        return 0.0;
    }
    let angles = per_point_curvature(route);
    #[allow(clippy::cast_precision_loss)]
    let n = angles.len() as f64;
    angles.iter().sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is ~111.2 km.
        let d = distance_m(coord(6.0, 80.5), coord(7.0, 80.5));
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = coord(6.93, 80.45);
        assert!(distance_m(p, p).abs() < 1e-6);
    }

    #[test]
    fn curvature_endpoints_are_zero() {
        let route = vec![
            coord(6.93, 80.45),
            coord(6.94, 80.46),
            coord(6.95, 80.45),
            coord(6.96, 80.46),
        ];
        let angles = per_point_curvature(&route);
        assert_eq!(angles.len(), route.len());
        assert!(angles[0].abs() < f64::EPSILON);
        assert!(angles[angles.len() - 1].abs() < f64::EPSILON);
    }

    #[test]
    fn curvature_values_within_bounds() {
        let route = vec![
            coord(6.93, 80.45),
            coord(6.935, 80.455),
            coord(6.94, 80.46),
            coord(6.945, 80.465),
            coord(6.95, 80.47),
        ];
        for angle in per_point_curvature(&route) {
            assert!((0.0..=std::f64::consts::PI).contains(&angle));
        }
    }

    #[test]
    fn collinear_points_have_straight_angle() {
        // Straight line: the vectors to the neighbors point in opposite
        // directions, so the turning angle approaches pi.
        let route = vec![coord(6.0, 80.0), coord(6.1, 80.0), coord(6.2, 80.0)];
        let angles = per_point_curvature(&route);
        assert!((angles[1] - std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn duplicate_points_do_not_produce_nan() {
        let route = vec![coord(6.93, 80.45), coord(6.93, 80.45), coord(6.94, 80.46)];
        for angle in per_point_curvature(&route) {
            assert!(angle.is_finite());
            assert!((0.0..=std::f64::consts::PI).contains(&angle));
        }
    }

    #[test]
    fn short_routes_are_all_zero() {
        assert_eq!(per_point_curvature(&[]), Vec::<f64>::new());
        assert_eq!(
            per_point_curvature(&[coord(6.9, 80.4), coord(7.0, 80.5)]),
            vec![0.0, 0.0]
        );
        assert!(mean_curvature(&[coord(6.9, 80.4), coord(7.0, 80.5)]).abs() < f64::EPSILON);
    }

    #[test]
    fn polyline_length_sums_segments() {
        let route = vec![coord(6.0, 80.0), coord(6.5, 80.0), coord(7.0, 80.0)];
        let total = polyline_length_m(&route);
        let first = distance_m(route[0], route[1]);
        let second = distance_m(route[1], route[2]);
        assert!((total - (first + second)).abs() < 1e-6);
    }
}
