use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to `other` in meters (spherical earth, no ellipsoidal correction).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(*self, *other)
    }
}

pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Inclusive radius check: a point exactly on the boundary is inside.
pub fn is_within_radius(a: GeoPoint, b: GeoPoint, radius_m: f64) -> bool {
    haversine_distance_m(a, b) <= radius_m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        let p = GeoPoint::new(48.8606, 2.3376);
        assert_eq!(haversine_distance_m(p, p), 0.0);
    }

    #[test]
    fn test_known_distance_paris_london() {
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let d = haversine_distance_m(paris, london);
        // ~343.5 km on a 6371 km sphere
        assert!((d - 343_556.0).abs() < 500.0, "distance was {}", d);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(40.7128, -74.0060);
        let b = GeoPoint::new(34.0522, -118.2437);
        assert!((haversine_distance_m(a, b) - haversine_distance_m(b, a)).abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((haversine_distance_m(a, b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let a = GeoPoint::new(45.0, 7.0);
        let b = GeoPoint::new(45.0003, 7.0);
        let d = haversine_distance_m(a, b);
        assert!(is_within_radius(a, b, d));
        assert!(!is_within_radius(a, b, d - 0.001));
    }

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }
}
