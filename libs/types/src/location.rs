//! Driver location types
//!
//! A `LocationUpdate` is what a driver device submits, a `DriverLocationSample`
//! is what the location store keeps, and a `LocationEvent` is what observers
//! receive over the broadcast channel.

use crate::errors::TrackingError;
use crate::ids::{DriverId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// A driver record, owned by the user/driver directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub user_id: UserId,
    pub vehicle_number: String,
}

/// A validated WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Validate a raw position. Rejects NaN/infinite values and anything
    /// outside `[-90, 90]` x `[-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, TrackingError> {
        let lat_ok = latitude.is_finite() && (MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude);
        let lon_ok = longitude.is_finite() && (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude);
        if !lat_ok || !lon_ok {
            return Err(TrackingError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Position update as submitted by a driver device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationUpdate {
    pub fn coordinates(&self) -> Result<Coordinates, TrackingError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// One persisted position sample. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocationSample {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

impl DriverLocationSample {
    pub fn new(driver_id: DriverId, position: Coordinates, recorded_at: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            latitude: position.latitude,
            longitude: position.longitude,
            recorded_at,
        }
    }

    /// The broadcast payload for this sample.
    pub fn to_event(&self) -> LocationEvent {
        LocationEvent {
            driver_id: self.driver_id,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Frame pushed to every admin observer: `{driver_id, latitude, longitude}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinates_accept_bounds() {
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
        assert!(Coordinates::new(40.7, -74.0).is_ok());
    }

    #[test]
    fn test_coordinates_reject_out_of_range() {
        assert!(Coordinates::new(90.0001, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_event_wire_shape() {
        let sample = DriverLocationSample::new(
            DriverId::new(7),
            Coordinates::new(40.7, -74.0).unwrap(),
            Utc::now(),
        );
        let value = serde_json::to_value(sample.to_event()).unwrap();
        assert_eq!(
            value,
            json!({"driver_id": 7, "latitude": 40.7, "longitude": -74.0})
        );
    }
}
