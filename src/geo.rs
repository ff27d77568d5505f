//! Geodesy utilities for GPS track processing.
//!
//! Great-circle distance and initial bearing between coordinate pairs,
//! used by the tick processor for distance accumulation and bearing
//! derivation.

/// Mean Earth radius in kilometers (used by the haversine formula)
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Convert degrees to radians.
#[inline]
pub fn deg_to_rad(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Convert radians to degrees.
#[inline]
pub fn rad_to_deg(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Great-circle distance between two coordinates in kilometers.
///
/// Haversine formula with mean Earth radius: half-angle sine products,
/// then `atan2` of the square-root ratio. Symmetric, and zero for
/// identical points.
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = deg_to_rad(lat2 - lat1);
    let d_lon = deg_to_rad(lon2 - lon1);
    let rad_lat1 = deg_to_rad(lat1);
    let rad_lat2 = deg_to_rad(lat2);

    let a = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + (d_lon / 2.0).sin() * (d_lon / 2.0).sin() * rad_lat1.cos() * rad_lat2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial great-circle bearing from point 1 to point 2, in degrees.
///
/// Normalized to `[0, 360)`. For identical points Δλ = 0 gives y = 0 and
/// x > 0, so the bearing is 0. Callers that need "no bearing" should
/// check for coincident points before calling.
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = deg_to_rad(lat1);
    let phi2 = deg_to_rad(lat2);
    let d_lambda = deg_to_rad(lon2 - lon1);

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    let theta = y.atan2(x);

    (rad_to_deg(theta) + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical_points_is_zero() {
        let d = haversine_distance_km(51.0447, -114.0719, 51.0447, -114.0719);
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let d1 = haversine_distance_km(51.0447, -114.0719, 51.0486, -114.0708);
        let d2 = haversine_distance_km(51.0486, -114.0708, 51.0447, -114.0719);
        assert!((d1 - d2).abs() < 1e-12);
    }

    #[test]
    fn test_distance_known_pair() {
        // Calgary to Edmonton city centres, roughly 280 km
        let d = haversine_distance_km(51.0447, -114.0719, 53.5461, -113.4938);
        assert!(d > 270.0 && d < 290.0, "distance was {} km", d);
    }

    #[test]
    fn test_bearing_range() {
        let b = initial_bearing_deg(51.0, -114.0, 50.0, -115.0);
        assert!((0.0..360.0).contains(&b));
    }

    #[test]
    fn test_bearing_due_north() {
        let b = initial_bearing_deg(51.0, -114.0, 52.0, -114.0);
        assert!(b.abs() < 1e-9, "bearing was {}", b);
    }

    #[test]
    fn test_bearing_due_east_at_equator() {
        let b = initial_bearing_deg(0.0, 0.0, 0.0, 1.0);
        assert!((b - 90.0).abs() < 1e-9, "bearing was {}", b);
    }

    #[test]
    fn test_bearing_identical_points_is_zero() {
        // Boundary case: coincident points resolve to 0, not NaN
        let b = initial_bearing_deg(51.0, -114.0, 51.0, -114.0);
        assert_eq!(b, 0.0);
    }
}
