//! ---
//! trk_section: "01-core-functionality"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Shared primitives and utilities for the tracking runtime."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Axis delta treated as a meaningful move by the reconciliation layer.
/// 0.0001 degrees is roughly 11 metres at the equator.
pub const RENDER_AXIS_EPSILON_DEG: f64 = 0.0001;

/// Errors raised when constructing a [`GeoPoint`] from raw coordinates.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeoError {
    /// Latitude must fall within [-90, 90] degrees.
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    /// Longitude must fall within [-180, 180] degrees.
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Construct a point, validating coordinate ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&latitude) || !latitude.is_finite() {
            return Err(GeoError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) || !longitude.is_finite() {
            return Err(GeoError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        haversine_meters(self, other)
    }

    /// True when either axis differs from `other` by more than `epsilon_deg`.
    /// Cheap proxy for "the marker visibly moved"; avoids running the full
    /// haversine on every render decision.
    pub fn moved_beyond_axis_epsilon(&self, other: &GeoPoint, epsilon_deg: f64) -> bool {
        (self.latitude - other.latitude).abs() > epsilon_deg
            || (self.longitude - other.longitude).abs() > epsilon_deg
    }
}

/// Haversine great-circle distance between two points in metres.
pub fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).expect("valid point")
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(GeoError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -181.0),
            Err(GeoError::LongitudeOutOfRange(-181.0))
        );
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn haversine_matches_known_distances() {
        // One degree of latitude is ~111.2 km everywhere.
        let a = point(20.0, 85.0);
        let b = point(21.0, 85.0);
        let d = haversine_meters(&a, &b);
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");

        // Identical points are zero metres apart.
        assert_eq!(haversine_meters(&a, &a), 0.0);
    }

    #[test]
    fn small_displacements_resolve_to_meters() {
        // 0.0001 deg latitude is ~11 m; the sampler's 10 m gate sits just
        // below it.
        let a = point(20.2961, 85.8245);
        let b = point(20.2962, 85.8245);
        let d = haversine_meters(&a, &b);
        assert!((10.0..13.0).contains(&d), "got {d}");
    }

    #[test]
    fn axis_epsilon_flags_single_axis_moves() {
        let a = point(20.2961, 85.8245);
        let north = point(20.2963, 85.8245);
        let unchanged = point(20.29615, 85.82455);
        assert!(a.moved_beyond_axis_epsilon(&north, RENDER_AXIS_EPSILON_DEG));
        assert!(!a.moved_beyond_axis_epsilon(&unchanged, RENDER_AXIS_EPSILON_DEG));
    }
}
