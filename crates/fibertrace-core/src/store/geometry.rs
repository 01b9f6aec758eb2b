//! Polyline length and interpolation along cable geometry.

use crate::models::Coordinate;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two coordinates.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Sum of segment lengths.
pub fn polyline_length_m(points: &[Coordinate]) -> f64 {
    points.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

/// Point `offset_m` meters along the polyline from its first vertex,
/// walking cumulative segment length. Offsets past either end clamp to the
/// end vertex. `None` for an empty polyline.
pub fn interpolate(points: &[Coordinate], offset_m: f64) -> Option<Coordinate> {
    let first = *points.first()?;
    if points.len() == 1 || offset_m <= 0.0 {
        return Some(first);
    }
    let mut walked = 0.0;
    for w in points.windows(2) {
        let segment = haversine_m(w[0], w[1]);
        if segment > 0.0 && walked + segment >= offset_m {
            let t = (offset_m - walked) / segment;
            return Some(Coordinate::new(
                w[0].lat + (w[1].lat - w[0].lat) * t,
                w[0].lng + (w[1].lng - w[0].lng) * t,
            ));
        }
        walked += segment;
    }
    points.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meters_of_latitude(m: f64) -> f64 {
        (m / EARTH_RADIUS_M).to_degrees()
    }

    #[test]
    fn test_haversine_along_meridian() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(meters_of_latitude(1000.0), 0.0);
        assert!((haversine_m(a, b) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_uses_cumulative_length_not_chord() {
        // L-shaped cable: 300 m north, then 400 m east (at the equator).
        let north = meters_of_latitude(300.0);
        let east = meters_of_latitude(400.0);
        let points = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(north, 0.0),
            Coordinate::new(north, east),
        ];
        let total = polyline_length_m(&points);
        assert!((total - 700.0).abs() < 0.01);

        let corner = interpolate(&points, 300.0).unwrap();
        assert!((corner.lat - north).abs() < 1e-9);
        assert!(corner.lng.abs() < 1e-9);

        let past_corner = interpolate(&points, 500.0).unwrap();
        assert!((past_corner.lat - north).abs() < 1e-9);
        assert!((haversine_m(points[1], past_corner) - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_interpolate_clamps_and_handles_degenerate_input() {
        let points = vec![Coordinate::new(1.0, 1.0), Coordinate::new(1.001, 1.0)];
        assert_eq!(interpolate(&points, -5.0), Some(points[0]));
        assert_eq!(interpolate(&points, 1e9), Some(points[1]));
        assert_eq!(interpolate(&[], 10.0), None);
        let stacked = vec![Coordinate::new(2.0, 2.0), Coordinate::new(2.0, 2.0)];
        assert_eq!(interpolate(&stacked, 3.0), Some(stacked[1]));
    }
}
