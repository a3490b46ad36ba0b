//! Geographic utilities: great-circle distance and point-to-polyline distance.
//!
//! Both functions are numerically stable for coordinate deltas under ~1°,
//! which covers every edge of a road route.

use crate::{GeoPoint, GeometryPoint, NavError, Result};

/// Earth radius used by every distance in this crate, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two positions in meters (haversine formula).
///
/// Symmetric, and exactly 0 for identical points.
///
/// # Example
/// ```
/// use route_navigator::{GeoPoint, haversine_distance};
/// let a = GeoPoint::new(51.5074, -0.1278);
/// let b = GeoPoint::new(48.8566, 2.3522);
/// let d = haversine_distance(&a, &b);
/// assert!((d - 343_500.0).abs() < 1_000.0);
/// assert_eq!(haversine_distance(&a, &a), 0.0);
/// ```
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    // Rounding can push h a hair outside [0, 1] for near-antipodal points
    2.0 * EARTH_RADIUS_METERS * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Total length of a route geometry in meters.
pub fn polyline_length(polyline: &[GeometryPoint]) -> f64 {
    polyline
        .windows(2)
        .map(|w| haversine_distance(&w[0].to_geo(), &w[1].to_geo()))
        .sum()
}

/// Minimum distance in meters from `point` to any edge of `polyline`.
///
/// Each edge is handled in a local planar frame centred on `point`
/// (equirectangular, scaled by the cosine of the point's latitude). The
/// projection parameter is clamped to `[0, 1]`, so positions beyond either
/// end of an edge measure to that endpoint.
///
/// Returns [`NavError::EmptyPolyline`] when the polyline has fewer than 2 points.
pub fn distance_to_polyline(point: &GeoPoint, polyline: &[GeometryPoint]) -> Result<f64> {
    if polyline.len() < 2 {
        return Err(NavError::EmptyPolyline {
            point_count: polyline.len(),
        });
    }

    let frame = LocalFrame::around(point);
    Ok(polyline
        .windows(2)
        .map(|edge| frame.distance_to_edge(&edge[0], &edge[1]))
        .fold(f64::INFINITY, f64::min))
}

/// Parallel version of [`distance_to_polyline`] for very long geometries.
#[cfg(feature = "parallel")]
pub fn distance_to_polyline_parallel(
    point: &GeoPoint,
    polyline: &[GeometryPoint],
) -> Result<f64> {
    use rayon::prelude::*;

    if polyline.len() < 2 {
        return Err(NavError::EmptyPolyline {
            point_count: polyline.len(),
        });
    }

    let frame = LocalFrame::around(point);
    Ok(polyline
        .par_windows(2)
        .map(|edge| frame.distance_to_edge(&edge[0], &edge[1]))
        .reduce(|| f64::INFINITY, f64::min))
}

/// Equirectangular projection centred on a reference position, in meters.
#[derive(Debug, Clone, Copy)]
struct LocalFrame {
    origin: GeoPoint,
    meters_per_deg_lat: f64,
    meters_per_deg_lng: f64,
}

impl LocalFrame {
    fn around(origin: &GeoPoint) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_METERS.to_radians();
        Self {
            origin: *origin,
            meters_per_deg_lat,
            meters_per_deg_lng: meters_per_deg_lat * origin.lat.to_radians().cos(),
        }
    }

    fn project(&self, vertex: &GeometryPoint) -> (f64, f64) {
        (
            (vertex.lng - self.origin.lng) * self.meters_per_deg_lng,
            (vertex.lat - self.origin.lat) * self.meters_per_deg_lat,
        )
    }

    /// Distance from the frame origin to the closest point on edge `a-b`.
    fn distance_to_edge(&self, a: &GeometryPoint, b: &GeometryPoint) -> f64 {
        let (ax, ay) = self.project(a);
        let (bx, by) = self.project(b);
        let dx = bx - ax;
        let dy = by - ay;
        let len_sq = dx * dx + dy * dy;

        // Degenerate edge (repeated vertex)
        if len_sq < 1e-12 {
            return ax.hypot(ay);
        }

        // Origin is (0, 0): t = ((0 - a) . d) / |d|^2
        let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
        (ax + t * dx).hypot(ay + t * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Degrees of longitude spanning `meters` at latitude `lat`.
    fn lng_offset(lat: f64, meters: f64) -> f64 {
        meters / (EARTH_RADIUS_METERS.to_radians() * lat.to_radians().cos())
    }

    fn lat_offset(meters: f64) -> f64 {
        meters / EARTH_RADIUS_METERS.to_radians()
    }

    #[test]
    fn test_haversine_identity_and_symmetry() {
        let a = GeoPoint::new(9.03, 38.7578);
        let b = GeoPoint::new(9.05, 38.76);

        assert_eq!(haversine_distance(&a, &a), 0.0);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
        assert!(haversine_distance(&a, &b) > 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let expected = EARTH_RADIUS_METERS.to_radians();
        assert!((haversine_distance(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_small_delta_stable() {
        let a = GeoPoint::new(9.03, 38.7578);
        let b = GeoPoint::new(9.03 + lat_offset(1.0), 38.7578);
        assert!((haversine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_polyline_length() {
        let line = vec![
            GeometryPoint::new(0.0, 0.0),
            GeometryPoint::new(0.0, 1.0),
            GeometryPoint::new(0.0, 2.0),
        ];
        let expected = 2.0 * EARTH_RADIUS_METERS.to_radians();
        assert!((polyline_length(&line) - expected).abs() < 1e-6);
        assert_eq!(polyline_length(&line[..1]), 0.0);
    }

    #[test]
    fn test_distance_rejects_short_polyline() {
        let p = GeoPoint::new(9.03, 38.7578);
        assert_eq!(
            distance_to_polyline(&p, &[]),
            Err(NavError::EmptyPolyline { point_count: 0 })
        );
        assert_eq!(
            distance_to_polyline(&p, &[GeometryPoint::new(38.7578, 9.03)]),
            Err(NavError::EmptyPolyline { point_count: 1 })
        );
    }

    #[test]
    fn test_distance_perpendicular_to_middle() {
        // North-south edge, point 50m east of its midpoint
        let lat = 9.03;
        let edge = [
            GeometryPoint::new(38.75, lat - lat_offset(100.0)),
            GeometryPoint::new(38.75, lat + lat_offset(100.0)),
        ];
        let p = GeoPoint::new(lat, 38.75 + lng_offset(lat, 50.0));

        let d = distance_to_polyline(&p, &edge).unwrap();
        assert!((d - 50.0).abs() < 1e-6, "got {}", d);
    }

    #[test]
    fn test_distance_clamped_beyond_start() {
        let lat = 9.03;
        let a = GeometryPoint::new(38.75, lat);
        let b = GeometryPoint::new(38.75, lat + lat_offset(100.0));
        // 30m south of a, 40m east: closest point is a itself
        let p = GeoPoint::new(lat - lat_offset(30.0), 38.75 + lng_offset(lat, 40.0));

        let d = distance_to_polyline(&p, &[a, b]).unwrap();
        assert!((d - 50.0).abs() < 0.01, "got {}", d);
        assert!((d - haversine_distance(&p, &a.to_geo())).abs() < 0.01);
    }

    #[test]
    fn test_distance_clamped_beyond_end() {
        let lat = 9.03;
        let a = GeometryPoint::new(38.75, lat);
        let b = GeometryPoint::new(38.75, lat + lat_offset(100.0));
        // 60m north of b on the same meridian
        let p = GeoPoint::new(lat + lat_offset(160.0), 38.75);

        let d = distance_to_polyline(&p, &[a, b]).unwrap();
        assert!((d - 60.0).abs() < 1e-6, "got {}", d);
    }

    #[test]
    fn test_distance_on_vertex_is_zero() {
        let line = [
            GeometryPoint::new(38.7578, 9.03),
            GeometryPoint::new(38.759, 9.04),
            GeometryPoint::new(38.76, 9.05),
        ];
        let d = distance_to_polyline(&GeoPoint::new(9.04, 38.759), &line).unwrap();
        assert!(d < 1e-9);
    }

    #[test]
    fn test_distance_picks_nearest_edge() {
        let lat = 9.03;
        // L-shaped polyline: north 200m, then east 200m
        let corner_lat = lat + lat_offset(200.0);
        let line = [
            GeometryPoint::new(38.75, lat),
            GeometryPoint::new(38.75, corner_lat),
            GeometryPoint::new(38.75 + lng_offset(corner_lat, 200.0), corner_lat),
        ];
        // 20m south of the middle of the east-bound edge
        let p = GeoPoint::new(
            corner_lat - lat_offset(20.0),
            38.75 + lng_offset(corner_lat, 100.0),
        );
        let d = distance_to_polyline(&p, &line).unwrap();
        assert!((d - 20.0).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_degenerate_edge() {
        let v = GeometryPoint::new(38.75, 9.03);
        let p = GeoPoint::new(9.03 + lat_offset(10.0), 38.75);
        let d = distance_to_polyline(&p, &[v, v]).unwrap();
        assert!((d - 10.0).abs() < 1e-6);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let line: Vec<GeometryPoint> = (0..500)
            .map(|i| GeometryPoint::new(38.75 + i as f64 * 0.0005, 9.03 + (i % 7) as f64 * 0.0001))
            .collect();
        let p = GeoPoint::new(9.031, 38.8);
        assert_eq!(
            distance_to_polyline(&p, &line).unwrap(),
            distance_to_polyline_parallel(&p, &line).unwrap()
        );
    }
}
