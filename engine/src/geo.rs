//! Geographic points.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair.
///
/// Both coordinates are validated on construction and on every update, so a
/// `GeoPoint` in hand is always within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

/// Unchecked shape used while deserializing.
#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = Error;

    fn try_from(raw: RawGeoPoint) -> Result<Self> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        check_latitude(latitude)?;
        check_longitude(longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn set_latitude(&mut self, latitude: f64) -> Result<()> {
        check_latitude(latitude)?;
        self.latitude = latitude;
        Ok(())
    }

    pub fn set_longitude(&mut self, longitude: f64) -> Result<()> {
        check_longitude(longitude)?;
        self.longitude = longitude;
        Ok(())
    }
}

fn check_latitude(latitude: f64) -> Result<()> {
    // NaN fails the range check
    if (-90.0..=90.0).contains(&latitude) {
        Ok(())
    } else {
        Err(Error::LatitudeOutOfRange(latitude))
    }
}

fn check_longitude(longitude: f64) -> Result<()> {
    if (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(Error::LongitudeOutOfRange(longitude))
    }
}
