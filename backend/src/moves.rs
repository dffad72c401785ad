//! Candidate modifications for target matching: detour loops hung off a
//! path node, and whole-leg swaps drawn from a k-shortest set.

use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use petgraph::graph::NodeIndex;

use crate::{
    models::RouteTargets,
    network::RoadNetwork,
    pathfinding::{evenly_spaced, explore, k_shortest_paths, shortest_path, Leg, PathCost, SearchFilter},
    routing::initial_bearing_deg,
    synthesis::{ResolvedPath, RouteMetrics, SearchBudget, SearchConfig},
};

/// Exploration reaches a bit past the desired excursion so every sector has
/// nodes on both sides of it.
const EXPLORE_SLACK: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Need {
    /// Lengthen the route; `excursion_m` is the one-way reach of a detour.
    Distance { excursion_m: f64 },
    /// Climb more; detours favour the steepest reachable turn point.
    Climb { excursion_m: f64 },
}

impl Need {
    fn assess(metrics: RouteMetrics, targets: &RouteTargets, config: &SearchConfig) -> Option<Self> {
        if let Some(target) = targets.distance_m {
            let deficit = target - metrics.distance_m;
            if deficit > 0.0 {
                return Some(Need::Distance {
                    excursion_m: deficit.max(config.min_detour_m) / 2.0,
                });
            }
        }
        if let Some(target) = targets.elevation_gain_m {
            let deficit = target - metrics.gain_m;
            if deficit > 0.0 && config.climb_grade > 0.0 {
                let length = (deficit / config.climb_grade).max(config.min_detour_m);
                return Some(Need::Climb {
                    excursion_m: length / 2.0,
                });
            }
        }
        None
    }

    fn excursion_m(self) -> f64 {
        match self {
            Need::Distance { excursion_m } | Need::Climb { excursion_m } => excursion_m,
        }
    }
}

/// Alternate legs keyed by their endpoints, computed once per search.
#[derive(Debug, Default)]
pub struct AlternateCache {
    legs: HashMap<(NodeIndex, NodeIndex), Vec<Leg>>,
}

impl AlternateCache {
    fn get_or_compute<N: RoadNetwork>(
        &mut self,
        network: &N,
        source: NodeIndex,
        target: NodeIndex,
        config: &SearchConfig,
    ) -> &[Leg] {
        self.legs.entry((source, target)).or_insert_with(|| {
            if source == target {
                vec![Leg::single(source)]
            } else {
                k_shortest_paths(
                    network,
                    source,
                    target,
                    config.alternates_per_leg,
                    config.max_spur_nodes,
                )
            }
        })
    }
}

/// Every candidate reachable in one step from `path`, in a fixed order.
pub fn generate<N: RoadNetwork>(
    network: &N,
    path: &ResolvedPath,
    metrics: RouteMetrics,
    targets: &RouteTargets,
    config: &SearchConfig,
    alternates: &mut AlternateCache,
    budget: &SearchBudget,
) -> Vec<ResolvedPath> {
    let mut candidates = Vec::new();
    if let Some(need) = Need::assess(metrics, targets, config) {
        candidates.extend(detours(network, path, need, config, budget));
    }
    if !exhausted(budget) {
        candidates.extend(alternate_legs(network, path, config, alternates));
    }
    candidates
}

fn exhausted(budget: &SearchBudget) -> bool {
    budget.cancel.is_cancelled() || Instant::now() >= budget.deadline
}

/// `(leg, position)` of every distinct node along the route.
fn origins(path: &ResolvedPath) -> Vec<(usize, usize)> {
    let mut origins = Vec::new();
    let last_leg = path.legs.len().saturating_sub(1);
    for (index, leg) in path.legs.iter().enumerate() {
        let end = if index == last_leg {
            leg.nodes.len()
        } else {
            leg.nodes.len() - 1
        };
        origins.extend((0..end.max(1)).map(|position| (index, position)));
    }
    origins
}

fn detours<N: RoadNetwork>(
    network: &N,
    path: &ResolvedPath,
    need: Need,
    config: &SearchConfig,
    budget: &SearchBudget,
) -> Vec<ResolvedPath> {
    let on_path: HashSet<NodeIndex> = path.nodes().into_iter().collect();
    let all_origins = origins(path);
    let mut candidates = Vec::new();

    for slot in evenly_spaced(all_origins.len(), config.detour_origins) {
        if exhausted(budget) {
            break;
        }
        let (leg_index, position) = all_origins[slot];
        let leg = &path.legs[leg_index];
        let origin = leg.nodes[position];

        let tree = explore(
            network,
            origin,
            need.excursion_m() * EXPLORE_SLACK,
            &SearchFilter::default(),
        );
        let turns = turn_points(network, origin, tree.settled(), &on_path, need, config);

        for turn in turns {
            let Some(outbound) = tree.leg_to(turn) else {
                continue;
            };
            let Some(back) = return_leg(network, &outbound) else {
                continue;
            };
            let excursion = outbound.concat(&back);
            let detoured = leg.splice(network, position, position, &excursion);
            candidates.push(path.with_leg(leg_index, detoured));
        }
    }

    candidates
}

/// One turn point per bearing sector around `origin`, off the current route.
fn turn_points<N: RoadNetwork>(
    network: &N,
    origin: NodeIndex,
    reached: impl Iterator<Item = (NodeIndex, PathCost)>,
    on_path: &HashSet<NodeIndex>,
    need: Need,
    config: &SearchConfig,
) -> Vec<NodeIndex> {
    let sectors = config.detour_sectors.max(1);
    let sector_width = 360.0 / sectors as f64;
    let origin_location = network.node(origin).location;
    let target = need.excursion_m();
    let mut best: Vec<Option<(NodeIndex, PathCost)>> = vec![None; sectors];

    let rank = |node: NodeIndex, cost: PathCost| {
        let miss = (cost.distance_m - target).abs();
        match need {
            Need::Distance { .. } => (0.0, miss, node),
            Need::Climb { .. } => (-cost.gain_m, miss, node),
        }
    };

    for (node, cost) in reached {
        if node == origin || on_path.contains(&node) {
            continue;
        }
        let bearing = initial_bearing_deg(origin_location, network.node(node).location);
        let sector = ((bearing / sector_width) as usize).min(sectors - 1);
        let replace = match best[sector] {
            None => true,
            Some((incumbent, incumbent_cost)) => {
                let (a0, a1, a2) = rank(node, cost);
                let (b0, b1, b2) = rank(incumbent, incumbent_cost);
                a0.total_cmp(&b0)
                    .then_with(|| a1.total_cmp(&b1))
                    .then_with(|| a2.cmp(&b2))
                    .is_lt()
            }
        };
        if replace {
            best[sector] = Some((node, cost));
        }
    }

    best.into_iter().flatten().map(|(node, _)| node).collect()
}

/// Way back from the turn point, avoiding the outbound stretch when the
/// network allows it so the detour forms a loop.
fn return_leg<N: RoadNetwork>(network: &N, outbound: &Leg) -> Option<Leg> {
    let interior = &outbound.nodes[1..outbound.nodes.len() - 1];
    let avoid_outbound = SearchFilter {
        banned_nodes: interior.iter().copied().collect(),
        banned_edges: HashSet::new(),
    };
    shortest_path(network, outbound.target(), outbound.source(), &avoid_outbound).or_else(|| {
        shortest_path(
            network,
            outbound.target(),
            outbound.source(),
            &SearchFilter::default(),
        )
    })
}

fn alternate_legs<N: RoadNetwork>(
    network: &N,
    path: &ResolvedPath,
    config: &SearchConfig,
    cache: &mut AlternateCache,
) -> Vec<ResolvedPath> {
    let mut candidates = Vec::new();
    for (index, leg) in path.legs.iter().enumerate() {
        for alternate in cache.get_or_compute(network, leg.source(), leg.target(), config) {
            if alternate.edges != leg.edges {
                candidates.push(path.with_leg(index, alternate.clone()));
            }
        }
    }
    candidates
}
