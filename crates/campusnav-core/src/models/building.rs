use serde::{Deserialize, Serialize};

/// Latitude/longitude in degrees. On the wire this is a `[lat, lng]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lat, c.lng]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub id: String,
    pub name: String,
    pub coords: Coordinates,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A circular region of campus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceZone {
    pub name: String,
    pub center: Coordinates,
    pub radius_meters: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_round_trip_as_pair() {
        let c = Coordinates::new(40.1, -88.2);
        assert_eq!(serde_json::to_string(&c).unwrap(), "[40.1,-88.2]");
        let back: Coordinates = serde_json::from_str("[40.1,-88.2]").unwrap();
        assert_eq!(back, c);
    }
}
