use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::{
    models::{Coordinate, Stop},
    poi::{Corridor, PoiProvider, PointOfInterest},
    routing::haversine_m,
};

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Corridor half-width around the route.
    pub corridor_half_width_m: f64,
    pub max_stops: usize,
    /// Stops closer than this to a better-ranked stop are duplicates.
    pub dedup_tolerance_m: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            corridor_half_width_m: 500.0,
            max_stops: 10,
            dedup_tolerance_m: 5.0,
        }
    }
}

struct Candidate {
    poi: PointOfInterest,
    distance_m: f64,
}

/// Best stops along the route: highest rating first, then closest to the
/// path, then by name. A failing provider yields no stops.
pub fn recommend_stops<P: PoiProvider + ?Sized>(
    provider: &P,
    route_points: &[Coordinate],
    config: &EnrichmentConfig,
) -> Vec<Stop> {
    if config.max_stops == 0 || route_points.is_empty() {
        return Vec::new();
    }

    let corridor = Corridor::new(route_points, config.corridor_half_width_m);
    let pois = match provider.query(&corridor) {
        Ok(pois) => pois,
        Err(err) => {
            warn!("POI lookup failed, returning route without stops: {err}");
            return Vec::new();
        }
    };

    let mut candidates: Vec<Candidate> = pois
        .into_iter()
        .filter_map(|poi| {
            let distance_m = corridor.distance_m(poi.location)?;
            (distance_m <= corridor.half_width_m()).then_some(Candidate { poi, distance_m })
        })
        .collect();
    candidates.sort_by(rank);

    let mut kept: Vec<Candidate> = Vec::with_capacity(config.max_stops);
    for candidate in candidates {
        if kept.len() == config.max_stops {
            break;
        }
        let duplicate = kept.iter().any(|existing| {
            haversine_m(existing.poi.location, candidate.poi.location) <= config.dedup_tolerance_m
        });
        if duplicate {
            debug!("dropping duplicate stop {}", candidate.poi.name);
            continue;
        }
        kept.push(candidate);
    }

    kept.into_iter().map(|candidate| candidate.poi.into()).collect()
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.poi
        .rating
        .total_cmp(&a.poi.rating)
        .then(a.distance_m.total_cmp(&b.distance_m))
        .then_with(|| a.poi.name.cmp(&b.poi.name))
}
