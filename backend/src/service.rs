use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    assembler::{assemble, RouteDraft},
    config::EngineConfig,
    enrichment::recommend_stops,
    error::RouteError,
    models::{RouteGenerateRequest, RouteGenerateResponse, RouteRequest},
    network::RoadNetwork,
    poi::PoiProvider,
    synthesis::{synthesize, CancelFlag, SearchBudget},
    validation::{validate, ValidationError},
};

/// Validation, synthesis, enrichment and assembly over shared read-only
/// providers. One instance serves every request.
pub struct RoutePlanner<N, P> {
    network: Arc<N>,
    pois: Arc<P>,
    config: EngineConfig,
}

impl<N: RoadNetwork, P: PoiProvider> RoutePlanner<N, P> {
    pub fn new(network: Arc<N>, pois: Arc<P>, config: EngineConfig) -> Self {
        Self {
            network,
            pois,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validate(&self, request: &RouteGenerateRequest) -> Result<RouteRequest, ValidationError> {
        validate(request, &self.config.limits)
    }

    /// Blocking; run it off the async executor.
    pub fn plan(
        &self,
        request: &RouteRequest,
        cancel: &CancelFlag,
    ) -> Result<RouteGenerateResponse, RouteError> {
        let network = self.network.as_ref();
        let budget = SearchBudget::from_config(&self.config.search, cancel.clone());
        let stops = request.stops_in_order();

        let outcome = synthesize(
            network,
            &stops,
            request.targets.as_ref(),
            &self.config.search,
            &budget,
        )?;

        let metrics = outcome.path.metrics();
        if outcome.best_effort() {
            warn!(
                "returning best-effort route after {} iterations ({:?}): {:.0} m, {:.0} m gain",
                outcome.iterations, outcome.termination, metrics.distance_m, metrics.gain_m
            );
        }

        let points = outcome.path.points(network);
        let profile = outcome.path.elevation_profile(network);
        let recommended = recommend_stops(self.pois.as_ref(), &points, &self.config.enrichment);
        debug!("{} stops along {} points", recommended.len(), points.len());

        let response = assemble(
            RouteDraft {
                points,
                distance_m: metrics.distance_m,
                elevation_gain_m: profile.gain_m,
                stops: recommended,
                best_effort: outcome.best_effort(),
            },
            self.config.average_speed_kmh,
        )?;

        info!(
            "route planned: {} waypoints, {:.0} m, {:.0} m gain",
            request.waypoints.len(),
            response.summary.total_distance_m,
            response.summary.total_elevation_gain_m
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Coordinate, RoutePreferences},
        network::{tests::sample_network, RoadGraph},
        poi::{tests::sample_index, PoiIndex},
        polyline,
        routing::haversine_m,
    };

    type SamplePlanner = RoutePlanner<RoadGraph, PoiIndex>;

    fn planner() -> SamplePlanner {
        RoutePlanner::new(
            Arc::new(sample_network()),
            Arc::new(sample_index()),
            EngineConfig::default(),
        )
    }

    fn corner(row: usize, col: usize) -> Coordinate {
        Coordinate::new(45.0 + row as f64 * 0.003, 5.0 + col as f64 * 0.004)
    }

    fn plan(
        planner: &SamplePlanner,
        body: RouteGenerateRequest,
    ) -> Result<RouteGenerateResponse, RouteError> {
        let request = planner.validate(&body)?;
        planner.plan(&request, &CancelFlag::new())
    }

    #[test]
    fn direct_route_summary_matches_geometry() {
        let planner = planner();
        let response = plan(
            &planner,
            RouteGenerateRequest {
                start_point: Some(corner(0, 0)),
                end_point: Some(corner(4, 6)),
                ..Default::default()
            },
        )
        .unwrap();

        let points = polyline::decode(&response.geometry).unwrap();
        assert!(haversine_m(points[0], corner(0, 0)) < 2.0);
        assert!(haversine_m(*points.last().unwrap(), corner(4, 6)) < 2.0);
        assert!(response.summary.total_distance_m >= haversine_m(corner(0, 0), corner(4, 6)));
        assert!(!response.best_effort);
        let expected_time = response.summary.total_distance_m / 5.0;
        assert!((response.summary.estimated_moving_time_s - expected_time).abs() < 1e-6);
    }

    #[test]
    fn same_start_and_end_is_degenerate() {
        let planner = planner();
        let response = plan(
            &planner,
            RouteGenerateRequest {
                start_point: Some(corner(3, 3)),
                end_point: Some(corner(3, 3)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(response.summary.total_distance_m, 0.0);
        assert_eq!(response.summary.estimated_moving_time_s, 0.0);
        assert_eq!(polyline::decode(&response.geometry).unwrap().len(), 1);
    }

    #[test]
    fn target_mode_reports_tolerance_or_best_effort() {
        let planner = planner();
        let response = plan(
            &planner,
            RouteGenerateRequest {
                start_point: Some(corner(0, 0)),
                end_point: Some(corner(2, 2)),
                preferences: Some(RoutePreferences {
                    target_distance_km: Some(5.0),
                    target_elevation_gain_m: None,
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let within = (response.summary.total_distance_m - 5_000.0).abs() <= 500.0;
        assert!(within || response.best_effort);
    }

    #[test]
    fn stops_come_from_the_corridor() {
        let planner = planner();
        let response = plan(
            &planner,
            RouteGenerateRequest {
                start_point: Some(corner(0, 0)),
                end_point: Some(corner(0, 5)),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(response.stops.iter().any(|stop| stop.name == "Grid Corner Cafe"));
        assert!(response.stops.iter().all(|stop| stop.name != "Far Away Cafe"));
    }

    #[test]
    fn unreachable_island_is_no_route() {
        let planner = planner();
        let island = sample_network().node(petgraph::graph::NodeIndex::new(225)).location;
        let err = plan(
            &planner,
            RouteGenerateRequest {
                start_point: Some(corner(0, 0)),
                end_point: Some(island),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RouteError::NoRouteFound(_)));
    }

    #[test]
    fn cancelled_before_start_times_out() {
        let planner = planner();
        let request = planner
            .validate(&RouteGenerateRequest {
                start_point: Some(corner(0, 0)),
                end_point: Some(corner(5, 5)),
                ..Default::default()
            })
            .unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(planner.plan(&request, &cancel), Err(RouteError::TimedOut)));
    }
}
