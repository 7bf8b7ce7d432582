use crate::utils::geo::{is_within_radius, GeoPoint};

/// Answers "is the device within `radius_m` of `target`".
///
/// An unknown device position must never pass.
pub trait ProximityOracle: Send + Sync {
    fn is_within(&self, device: Option<GeoPoint>, target: GeoPoint, radius_m: f64) -> bool;
}

/// Spherical haversine check against the reported device position.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaversineOracle;

impl ProximityOracle for HaversineOracle {
    fn is_within(&self, device: Option<GeoPoint>, target: GeoPoint, radius_m: f64) -> bool {
        match device {
            Some(position) if position.is_valid() => is_within_radius(position, target, radius_m),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_position_fails_closed() {
        let oracle = HaversineOracle;
        let target = GeoPoint::new(48.8606, 2.3376);
        assert!(!oracle.is_within(None, target, 1_000_000.0));
    }

    #[test]
    fn test_invalid_position_fails_closed() {
        let oracle = HaversineOracle;
        let target = GeoPoint::new(48.8606, 2.3376);
        assert!(!oracle.is_within(Some(GeoPoint::new(f64::NAN, 2.0)), target, 50.0));
    }

    #[test]
    fn test_position_inside_and_outside_radius() {
        let oracle = HaversineOracle;
        let target = GeoPoint::new(48.8606, 2.3376);
        // ~22 m north
        let near = GeoPoint::new(48.8608, 2.3376);
        // ~111 m north
        let far = GeoPoint::new(48.8616, 2.3376);

        assert!(oracle.is_within(Some(near), target, 50.0));
        assert!(!oracle.is_within(Some(far), target, 50.0));
    }
}
