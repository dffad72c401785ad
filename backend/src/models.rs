pub use shared::{
    ApiError, Coordinate, RouteGenerateRequest, RouteGenerateResponse, RoutePreferences,
    RouteSummary, Stop, StopType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceType {
    Paved,
    Trail,
    Dirt,
}

/// A mandatory intermediate point. Waypoints are visited in vector order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub location: Coordinate,
}

/// Soft numeric targets after normalization. `None` means no preference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouteTargets {
    pub distance_m: Option<f64>,
    pub elevation_gain_m: Option<f64>,
}

impl RouteTargets {
    pub fn is_empty(&self) -> bool {
        self.distance_m.is_none() && self.elevation_gain_m.is_none()
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub start: Coordinate,
    pub end: Coordinate,
    pub waypoints: Vec<Waypoint>,
    /// `None` selects direct mode.
    pub targets: Option<RouteTargets>,
}

impl RouteRequest {
    /// `[start, waypoint_1, …, waypoint_n, end]`.
    pub fn stops_in_order(&self) -> Vec<Coordinate> {
        let mut ordered = Vec::with_capacity(self.waypoints.len() + 2);
        ordered.push(self.start);
        ordered.extend(self.waypoints.iter().map(|w| w.location));
        ordered.push(self.end);
        ordered
    }
}
