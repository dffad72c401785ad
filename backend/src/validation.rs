//! Request validation and normalization. Pure functions of their input.

use crate::models::{Coordinate, RouteGenerateRequest, RouteRequest, RouteTargets, Waypoint};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationLimits {
    pub max_waypoints: usize,
    pub max_target_distance_km: f64,
    pub max_target_elevation_gain_m: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_waypoints: 20,
            max_target_distance_km: 300.0,
            max_target_elevation_gain_m: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `waypoints[2].lat`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate(
    request: &RouteGenerateRequest,
    limits: &ValidationLimits,
) -> Result<RouteRequest, ValidationError> {
    let start = required_location(request.start_point, "start_point")?;
    let end = required_location(request.end_point, "end_point")?;

    if request.waypoints.len() > limits.max_waypoints {
        return Err(ValidationError::new(
            "waypoints",
            format!(
                "at most {} waypoints are allowed, got {}",
                limits.max_waypoints,
                request.waypoints.len()
            ),
        ));
    }
    let waypoints = request
        .waypoints
        .iter()
        .enumerate()
        .map(|(index, location)| {
            check_location(location, &format!("waypoints[{index}]"))?;
            Ok(Waypoint {
                location: *location,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    let targets = match &request.preferences {
        Some(preferences) => {
            let distance_km = target(
                preferences.target_distance_km,
                limits.max_target_distance_km,
                "preferences.target_distance_km",
            )?;
            let elevation_gain_m = target(
                preferences.target_elevation_gain_m,
                limits.max_target_elevation_gain_m,
                "preferences.target_elevation_gain_m",
            )?;
            let targets = RouteTargets {
                distance_m: distance_km.map(|km| km * 1000.0),
                elevation_gain_m,
            };
            (!targets.is_empty()).then_some(targets)
        }
        None => None,
    };

    Ok(RouteRequest {
        start,
        end,
        waypoints,
        targets,
    })
}

fn required_location(location: Option<Coordinate>, field: &str) -> Result<Coordinate, ValidationError> {
    let location = location.ok_or_else(|| ValidationError::new(field, "is required"))?;
    check_location(&location, field)?;
    Ok(location)
}

fn check_location(location: &Coordinate, field: &str) -> Result<(), ValidationError> {
    check_range(location.lat, 90.0, &format!("{field}.lat"))?;
    check_range(location.lon, 180.0, &format!("{field}.lon"))
}

fn check_range(value: f64, bound: f64, field: &str) -> Result<(), ValidationError> {
    if value.is_finite() && (-bound..=bound).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("must be between -{bound} and {bound}, got {value}"),
        ))
    }
}

/// Zero and absent both mean "no preference".
fn target(value: Option<f64>, max: f64, field: &str) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(value) if !value.is_finite() || value < 0.0 => Err(ValidationError::new(
            field,
            format!("must be a non-negative number, got {value}"),
        )),
        Some(value) if value > max => Err(ValidationError::new(
            field,
            format!("must not exceed {max}, got {value}"),
        )),
        Some(value) if value == 0.0 => Ok(None),
        Some(value) => Ok(Some(value)),
    }
}
