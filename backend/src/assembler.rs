use tracing::error;

use crate::{
    models::{Coordinate, RouteGenerateResponse, RouteSummary, Stop},
    polyline::{self, PolylineError},
};

const KMH_PER_MPS: f64 = 3.6;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("average speed must be positive, got {0} km/h")]
    InvalidSpeed(f64),
    #[error("encoded geometry does not decode: {0}")]
    Polyline(#[from] PolylineError),
    #[error("encoded geometry has {decoded} points, path has {expected}")]
    PointCountMismatch { expected: usize, decoded: usize },
    #[error("encoded geometry point {index} drifted from the path")]
    PointMismatch { index: usize },
}

/// Everything the response is derived from.
#[derive(Debug, Clone)]
pub struct RouteDraft {
    pub points: Vec<Coordinate>,
    pub distance_m: f64,
    pub elevation_gain_m: f64,
    pub stops: Vec<Stop>,
    pub best_effort: bool,
}

pub fn assemble(
    draft: RouteDraft,
    average_speed_kmh: f64,
) -> Result<RouteGenerateResponse, AssemblyError> {
    if !(average_speed_kmh.is_finite() && average_speed_kmh > 0.0) {
        return Err(AssemblyError::InvalidSpeed(average_speed_kmh));
    }

    let geometry = polyline::encode(&draft.points);
    verify_geometry(&geometry, &draft.points).inspect_err(|err| {
        error!("geometry invariant violated: {err}");
    })?;

    let distance_m = draft.distance_m.max(0.0);
    Ok(RouteGenerateResponse {
        summary: RouteSummary {
            total_distance_m: distance_m,
            total_elevation_gain_m: draft.elevation_gain_m.max(0.0),
            estimated_moving_time_s: moving_time_s(distance_m, average_speed_kmh),
        },
        geometry,
        stops: draft.stops,
        best_effort: draft.best_effort,
    })
}

pub fn moving_time_s(distance_m: f64, average_speed_kmh: f64) -> f64 {
    distance_m / (average_speed_kmh / KMH_PER_MPS)
}

fn verify_geometry(encoded: &str, expected: &[Coordinate]) -> Result<(), AssemblyError> {
    let decoded = polyline::decode(encoded)?;
    if decoded.len() != expected.len() {
        return Err(AssemblyError::PointCountMismatch {
            expected: expected.len(),
            decoded: decoded.len(),
        });
    }
    let tolerance = polyline::precision_deg() + 1e-9;
    match decoded.iter().zip(expected).position(|(actual, wanted)| {
        let close = (actual.lat - wanted.lat).abs() <= tolerance
            && (actual.lon - wanted.lon).abs() <= tolerance;
        !close
    }) {
        Some(index) => Err(AssemblyError::PointMismatch { index }),
        None => Ok(()),
    }
}
