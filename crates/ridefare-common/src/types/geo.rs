//! Geographic primitives
//!
//! Coordinates, resolved administrative hierarchy, and great-circle distance.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Reject non-finite or out-of-range coordinates
    pub fn validate(&self) -> Result<(), ValidationError> {
        let ok = self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng);
        if ok {
            Ok(())
        } else {
            Err(ValidationError::CoordinateOutOfRange {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    /// Great-circle (haversine) distance to another point in kilometres
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lng - self.lng).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

        // Clamp guards asin against rounding just above 1.0 for antipodal points
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

/// Administrative hierarchy a coordinate falls into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country_id: Option<i64>,
    pub region_id: Option<i64>,
    pub city_id: Option<i64>,
    pub zone_id: Option<i64>,
    /// IANA timezone name, informational
    pub timezone: String,
    /// Offset from UTC used to derive the local wall-clock
    pub utc_offset_minutes: i32,
}

impl GeoLocation {
    /// Location outside every known area
    pub fn unresolved() -> Self {
        Self {
            country_id: None,
            region_id: None,
            city_id: None,
            zone_id: None,
            timezone: "UTC".to_string(),
            utc_offset_minutes: 0,
        }
    }

    /// Wall-clock time at this location
    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset =
            FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    #[test]
    fn test_distance_same_point_is_zero() {
        let p = GeoPoint::new(40.7128, -74.0060);
        assert_eq!(p.distance_km(&p), 0.0);
    }

    #[test]
    fn test_distance_known_pair() {
        // Lower Manhattan to Times Square
        let a = GeoPoint::new(40.7128, -74.0060);
        let b = GeoPoint::new(40.7580, -73.9855);
        let d = a.distance_km(&b);
        assert!((d - 5.3).abs() < 0.2, "distance was {d}");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
        assert!(GeoPoint::new(-90.0, 180.0).validate().is_ok());
    }

    #[test]
    fn test_local_time_applies_offset() {
        let mut loc = GeoLocation::unresolved();
        loc.utc_offset_minutes = -300;
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(loc.local_time(now).hour(), 7);
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(
            lat1 in -89.0f64..89.0, lng1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lng2 in -179.0f64..179.0,
        ) {
            let a = GeoPoint::new(lat1, lng1);
            let b = GeoPoint::new(lat2, lng2);
            prop_assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-9);
            prop_assert!(a.distance_km(&a).abs() < 1e-9);
        }
    }
}
