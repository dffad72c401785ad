use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Soft targets for the generated route. A missing or zero target means
/// "no preference" for that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_distance_km: Option<f64>,
    #[serde(
        default,
        alias = "target_elevation_m",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_elevation_gain_m: Option<f64>,
}

/// Body of `POST /api/v1/route/generate`.
///
/// `start_point` and `end_point` are optional at the wire level so that a
/// missing endpoint is reported as a field-level validation error instead of a
/// generic JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteGenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_point: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_point: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waypoints: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<RoutePreferences>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub total_distance_m: f64,
    pub total_elevation_gain_m: f64,
    pub estimated_moving_time_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    Cafe,
    Restaurant,
    Viewpoint,
    Convenience,
    Landmark,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StopType,
    pub rating: f64,
    pub location: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGenerateResponse {
    pub summary: RouteSummary,
    /// Encoded polyline, 1e-5 degree precision.
    pub geometry: String,
    #[serde(default)]
    pub stops: Vec<Stop>,
    /// Set when target matching ran out of budget before reaching tolerance.
    #[serde(default, skip_serializing_if = "is_false")]
    pub best_effort: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}
