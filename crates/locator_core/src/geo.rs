//! Geographic primitives: validated coordinate pairs and haversine distance.

use std::fmt;

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LocatorError, Result};

/// Mean Earth radius (IUGG), in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// An immutable longitude/latitude pair in degrees.
///
/// Construction validates the ranges, so every `GeoPoint` in the system is usable
/// for indexing and distance math. The canonical encoding is `[longitude, latitude]`
/// (GeoJSON coordinate order).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    longitude: f64,
    latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocatorError::invalid_input(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(LocatorError::invalid_input(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Canonical `[longitude, latitude]` encoding.
    pub fn coordinates(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(self, other)
    }

    /// H3 cell containing this point at `resolution`.
    pub fn to_cell(&self, resolution: Resolution) -> Result<CellIndex> {
        LatLng::new(self.latitude, self.longitude)
            .map(|ll| ll.to_cell(resolution))
            .map_err(|err| LocatorError::invalid_input(format!("{self} has no H3 cell: {err}")))
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.longitude, self.latitude)
    }
}

impl Serialize for GeoPoint {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        self.coordinates().serialize(ser)
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let [longitude, latitude] = <[f64; 2]>::deserialize(de)?;
        GeoPoint::new(longitude, latitude).map_err(serde::de::Error::custom)
    }
}

/// Haversine distance between two points in metres.
pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}
