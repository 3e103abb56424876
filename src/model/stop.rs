use serde::{Deserialize, Serialize};

use super::repository::LiveDataDescriptor;

/// A WGS84 position as delivered by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// `geo` points are x = longitude, y = latitude.
    pub fn to_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// GeoJSON point. `coordinates` is always `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [coordinate.longitude, coordinate.latitude],
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.coordinates[1], self.coordinates[0])
    }
}

/// One row of a repository's stop index.
///
/// `live_data` is the owning repository's descriptor as it was when this
/// generation of stops was imported. It is not refreshed until the next import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(rename = "referenceId")]
    pub reference_id: String,
    pub stop_id: String,
    #[serde(default)]
    pub stop_code: Option<String>,
    pub stop_name: String,
    #[serde(default)]
    pub stop_desc: Option<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub stop_url: Option<String>,
    #[serde(default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub parent_station: Option<String>,
    #[serde(rename = "repo_data")]
    pub live_data: LiveDataDescriptor,
}

impl Stop {
    pub fn coordinate(&self) -> Coordinate {
        self.location.coordinate()
    }
}
