//! Coarse campus geometry helpers.
//!
//! `is_within_campus` and `building_by_coords` are deliberately approximate:
//! a planar distance scaled by meters-per-degree, and exact coordinate
//! matching within a small epsilon. `haversine_meters` is the true
//! great-circle distance.

use crate::config::CampusConfig;
use crate::models::{Building, Coordinates};

/// Meters per degree used by the planar approximation.
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Building lookups only match coordinates copied verbatim from the table.
const BUILDING_MATCH_EPSILON: f64 = 1e-4;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

pub fn planar_distance_meters(a: Coordinates, b: Coordinates) -> f64 {
    let dlat = a.lat - b.lat;
    let dlng = a.lng - b.lng;
    (dlat * dlat + dlng * dlng).sqrt() * METERS_PER_DEGREE
}

/// Whether `point` lies within the largest configured geofence radius of the
/// campus center. No geofences means nothing is on campus.
pub fn is_within_campus(point: Coordinates, campus: &CampusConfig) -> bool {
    let max_radius = campus
        .geofences
        .iter()
        .map(|zone| zone.radius_meters)
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));

    match max_radius {
        Some(radius) => planar_distance_meters(point, campus.center) <= radius,
        None => false,
    }
}

pub fn building_by_coords(point: Coordinates, buildings: &[Building]) -> Option<&Building> {
    buildings.iter().find(|b| {
        (b.coords.lat - point.lat).abs() < BUILDING_MATCH_EPSILON
            && (b.coords.lng - point.lng).abs() < BUILDING_MATCH_EPSILON
    })
}

pub fn haversine_meters(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}
