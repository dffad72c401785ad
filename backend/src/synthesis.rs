use std::{
    cmp::Ordering,
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc,
    },
    time::{Duration, Instant},
};

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::{debug, info};

use crate::{
    elevation::ElevationProfile,
    models::{Coordinate, RouteTargets},
    moves::{self, AlternateCache},
    network::{NetworkError, RoadNetwork},
    pathfinding::{shortest_path, Leg, SearchFilter},
};

/// Scores closer than this are treated as equal when ranking candidates.
const SCORE_EPSILON: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("no route between stop {from} and stop {to}")]
    NoRouteFound { from: usize, to: usize },
    #[error("route search cancelled before a route was found")]
    Cancelled,
}

/// Shared between a request handler and the search running on its behalf.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_iterations: usize,
    pub time_budget: Duration,
    /// Relative band around the distance target.
    pub distance_tolerance: f64,
    /// Relative band around the elevation gain target.
    pub elevation_tolerance: f64,
    pub min_distance_band_m: f64,
    pub min_elevation_band_m: f64,
    /// Score weight per kilometer of distance error.
    pub distance_weight: f64,
    /// Score weight per meter of elevation gain error.
    pub elevation_weight: f64,
    /// Alternates drawn per leg from the k-shortest set.
    pub alternates_per_leg: usize,
    pub max_spur_nodes: usize,
    /// Path positions tried as detour origins per iteration.
    pub detour_origins: usize,
    pub detour_sectors: usize,
    pub min_detour_m: f64,
    /// Average grade assumed when sizing a detour for climbing.
    pub climb_grade: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 40,
            time_budget: Duration::from_millis(2000),
            distance_tolerance: 0.10,
            elevation_tolerance: 0.15,
            min_distance_band_m: 100.0,
            min_elevation_band_m: 5.0,
            distance_weight: 1.0,
            elevation_weight: 0.01,
            alternates_per_leg: 3,
            max_spur_nodes: 8,
            detour_origins: 6,
            detour_sectors: 8,
            min_detour_m: 300.0,
            climb_grade: 0.05,
        }
    }
}

/// Limits of one target-matching run.
#[derive(Debug, Clone)]
pub struct SearchBudget {
    pub max_iterations: usize,
    pub deadline: Instant,
    pub cancel: CancelFlag,
}

impl SearchBudget {
    pub fn from_config(config: &SearchConfig, cancel: CancelFlag) -> Self {
        Self {
            max_iterations: config.max_iterations,
            deadline: Instant::now() + config.time_budget,
            cancel,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouteMetrics {
    pub distance_m: f64,
    pub gain_m: f64,
}

/// The route as legs between consecutive snapped stops. Stops are never
/// moved or reordered by the search, only the legs between them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub anchors: Vec<NodeIndex>,
    pub legs: Vec<Leg>,
}

impl ResolvedPath {
    pub fn metrics(&self) -> RouteMetrics {
        self.legs.iter().fold(RouteMetrics::default(), |acc, leg| RouteMetrics {
            distance_m: acc.distance_m + leg.cost.distance_m,
            gain_m: acc.gain_m + leg.cost.gain_m,
        })
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.legs.iter().flat_map(|leg| leg.edges.iter().copied())
    }

    /// Every node in travel order, with leg joints listed once.
    pub fn nodes(&self) -> Vec<NodeIndex> {
        let mut nodes = Vec::new();
        for leg in &self.legs {
            let skip = usize::from(!nodes.is_empty());
            nodes.extend(leg.nodes.iter().skip(skip).copied());
        }
        if nodes.is_empty() {
            nodes.extend(self.anchors.first().copied());
        }
        nodes
    }

    pub fn elevation_profile<N: RoadNetwork>(&self, network: &N) -> ElevationProfile {
        let edges: Vec<EdgeIndex> = self.edges().collect();
        ElevationProfile::of_path(network, &edges)
    }

    /// Node locations with each edge's shape points in between.
    pub fn points<N: RoadNetwork>(&self, network: &N) -> Vec<Coordinate> {
        let nodes = self.nodes();
        let Some(&first) = nodes.first() else {
            return Vec::new();
        };
        let mut points = vec![network.node(first).location];
        for (edge, node) in self.edges().zip(nodes.iter().skip(1)) {
            points.extend_from_slice(&network.edge(edge).geometry);
            points.push(network.node(*node).location);
        }
        points
    }

    pub fn with_leg(&self, index: usize, leg: Leg) -> Self {
        let mut legs = self.legs.clone();
        legs[index] = leg;
        Self {
            anchors: self.anchors.clone(),
            legs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    WithinTolerance,
    Stalled,
    IterationBudget,
    TimeBudget,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub path: ResolvedPath,
    /// `None` in direct mode.
    pub termination: Option<Termination>,
    pub iterations: usize,
    pub score: f64,
}

impl SearchOutcome {
    pub fn best_effort(&self) -> bool {
        matches!(self.termination, Some(t) if t != Termination::WithinTolerance)
    }
}

pub fn snap_stops<N: RoadNetwork>(
    network: &N,
    stops: &[Coordinate],
) -> Result<Vec<NodeIndex>, SynthesisError> {
    stops
        .iter()
        .map(|stop| network.nearest_node(*stop).map_err(SynthesisError::from))
        .collect()
}

/// Shortest leg between every consecutive pair of anchors.
pub fn resolve_direct<N: RoadNetwork>(
    network: &N,
    anchors: &[NodeIndex],
    cancel: &CancelFlag,
) -> Result<ResolvedPath, SynthesisError> {
    let mut legs = Vec::with_capacity(anchors.len().saturating_sub(1));
    for (index, pair) in anchors.windows(2).enumerate() {
        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        let leg = shortest_path(network, pair[0], pair[1], &SearchFilter::default()).ok_or(
            SynthesisError::NoRouteFound {
                from: index,
                to: index + 1,
            },
        )?;
        debug!(
            "leg {index}: {} edges, {:.0} m",
            leg.edges.len(),
            leg.cost.distance_m
        );
        legs.push(leg);
    }
    Ok(ResolvedPath {
        anchors: anchors.to_vec(),
        legs,
    })
}

pub fn score(metrics: RouteMetrics, targets: &RouteTargets, config: &SearchConfig) -> f64 {
    let distance = targets.distance_m.map_or(0.0, |target| {
        config.distance_weight * (metrics.distance_m - target).abs() / 1000.0
    });
    let elevation = targets.elevation_gain_m.map_or(0.0, |target| {
        config.elevation_weight * (metrics.gain_m - target).abs()
    });
    distance + elevation
}

pub fn within_tolerance(metrics: RouteMetrics, targets: &RouteTargets, config: &SearchConfig) -> bool {
    let distance_ok = targets.distance_m.is_none_or(|target| {
        let band = (target * config.distance_tolerance).max(config.min_distance_band_m);
        (metrics.distance_m - target).abs() <= band
    });
    let elevation_ok = targets.elevation_gain_m.is_none_or(|target| {
        let band = (target * config.elevation_tolerance).max(config.min_elevation_band_m);
        (metrics.gain_m - target).abs() <= band
    });
    distance_ok && elevation_ok
}

struct Scored {
    path: ResolvedPath,
    metrics: RouteMetrics,
    score: f64,
}

impl Scored {
    fn new(path: ResolvedPath, targets: &RouteTargets, config: &SearchConfig) -> Self {
        let metrics = path.metrics();
        Self {
            score: score(metrics, targets, config),
            path,
            metrics,
        }
    }
}

/// Bounded local search from `seed` toward the targets. The current state
/// is always the best route seen, so stopping at any point is safe.
pub fn match_targets<N: RoadNetwork>(
    network: &N,
    seed: ResolvedPath,
    targets: &RouteTargets,
    config: &SearchConfig,
    budget: &SearchBudget,
) -> SearchOutcome {
    let mut current = Scored::new(seed, targets, config);
    let mut alternates = AlternateCache::default();
    let mut iterations = 0;

    let termination = loop {
        if within_tolerance(current.metrics, targets, config) {
            break Termination::WithinTolerance;
        }
        if budget.cancel.is_cancelled() {
            break Termination::Cancelled;
        }
        if iterations >= budget.max_iterations {
            break Termination::IterationBudget;
        }
        if Instant::now() >= budget.deadline {
            break Termination::TimeBudget;
        }

        let candidates = moves::generate(
            network,
            &current.path,
            current.metrics,
            targets,
            config,
            &mut alternates,
            budget,
        );
        debug!(
            "iteration {iterations}: {} candidates around score {:.4}",
            candidates.len(),
            current.score
        );

        let scored = candidates
            .into_iter()
            .map(|path| Scored::new(path, targets, config));
        match select(&current, scored, targets) {
            Some(next) => {
                iterations += 1;
                info!(
                    "search step {iterations}: {:.0} m, {:.0} m gain, score {:.4} -> {:.4}",
                    next.metrics.distance_m,
                    next.metrics.gain_m,
                    current.score,
                    next.score
                );
                current = next;
            }
            None if budget.cancel.is_cancelled() => break Termination::Cancelled,
            None => break Termination::Stalled,
        }
    };

    SearchOutcome {
        path: current.path,
        termination: Some(termination),
        iterations,
        score: current.score,
    }
}

/// Best strictly improving candidate. Near-equal scores prefer the larger
/// distance correction toward the target, then the smaller change in gain,
/// then generation order.
fn select(
    current: &Scored,
    candidates: impl Iterator<Item = Scored>,
    targets: &RouteTargets,
) -> Option<Scored> {
    let correction = |candidate: &Scored| {
        targets.distance_m.map_or(0.0, |target| {
            (current.metrics.distance_m - target).abs() - (candidate.metrics.distance_m - target).abs()
        })
    };
    let gain_change = |candidate: &Scored| (candidate.metrics.gain_m - current.metrics.gain_m).abs();

    let mut best: Option<Scored> = None;
    for candidate in candidates {
        if !(candidate.score < current.score - SCORE_EPSILON) {
            continue;
        }
        let better = match &best {
            None => true,
            Some(incumbent) => {
                let by_score = if (candidate.score - incumbent.score).abs() <= SCORE_EPSILON {
                    Ordering::Equal
                } else {
                    incumbent.score.total_cmp(&candidate.score)
                };
                by_score
                    .then_with(|| correction(&candidate).total_cmp(&correction(incumbent)))
                    .then_with(|| gain_change(incumbent).total_cmp(&gain_change(&candidate)))
                    == Ordering::Greater
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Direct mode when `targets` is `None`, target matching otherwise.
pub fn synthesize<N: RoadNetwork>(
    network: &N,
    stops: &[Coordinate],
    targets: Option<&RouteTargets>,
    config: &SearchConfig,
    budget: &SearchBudget,
) -> Result<SearchOutcome, SynthesisError> {
    let anchors = snap_stops(network, stops)?;
    let seed = resolve_direct(network, &anchors, &budget.cancel)?;

    let outcome = match targets {
        Some(targets) if !targets.is_empty() => {
            match_targets(network, seed, targets, config, budget)
        }
        _ => SearchOutcome {
            path: seed,
            termination: None,
            iterations: 0,
            score: 0.0,
        },
    };
    Ok(outcome)
}
