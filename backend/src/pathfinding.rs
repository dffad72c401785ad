use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    ops::Add,
};

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::{elevation::ascent, network::RoadNetwork};

/// Lexicographic path cost: distance first, then climbing, then edge count,
/// then meters ridden on poorly suited roads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathCost {
    pub distance_m: f64,
    pub gain_m: f64,
    pub hops: usize,
    /// Each edge contributes `length * (1 - suitability)`.
    pub unsuited_m: f64,
}

impl PathCost {
    pub fn of_edge<N: RoadNetwork>(network: &N, edge: EdgeIndex) -> Self {
        let data = network.edge(edge);
        Self {
            distance_m: data.length_m,
            gain_m: ascent(data.elevation_delta_m),
            hops: 1,
            unsuited_m: data.length_m * (1.0 - data.suitability),
        }
    }

    pub fn of_edges<N: RoadNetwork>(network: &N, edges: &[EdgeIndex]) -> Self {
        edges
            .iter()
            .fold(Self::default(), |cost, &edge| cost + Self::of_edge(network, edge))
    }
}

impl Add for PathCost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            distance_m: self.distance_m + rhs.distance_m,
            gain_m: self.gain_m + rhs.gain_m,
            hops: self.hops + rhs.hops,
            unsuited_m: self.unsuited_m + rhs.unsuited_m,
        }
    }
}

impl PartialEq for PathCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathCost {}

impl PartialOrd for PathCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathCost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_m
            .total_cmp(&other.distance_m)
            .then_with(|| self.gain_m.total_cmp(&other.gain_m))
            .then_with(|| self.hops.cmp(&other.hops))
            .then_with(|| self.unsuited_m.total_cmp(&other.unsuited_m))
    }
}

/// A walk through the graph. `nodes.len() == edges.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub nodes: Vec<NodeIndex>,
    pub edges: Vec<EdgeIndex>,
    pub cost: PathCost,
}

impl Leg {
    pub fn single(node: NodeIndex) -> Self {
        Self {
            nodes: vec![node],
            edges: Vec::new(),
            cost: PathCost::default(),
        }
    }

    pub fn source(&self) -> NodeIndex {
        self.nodes[0]
    }

    pub fn target(&self) -> NodeIndex {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Appends `next`, which must start where `self` ends.
    pub fn concat(mut self, next: &Leg) -> Leg {
        debug_assert_eq!(self.target(), next.source());
        self.nodes.extend_from_slice(&next.nodes[1..]);
        self.edges.extend_from_slice(&next.edges);
        self.cost = self.cost + next.cost;
        self
    }

    /// Replaces the stretch between node positions `from` and `to` with
    /// `replacement`, whose endpoints must be those two nodes.
    pub fn splice<N: RoadNetwork>(
        &self,
        network: &N,
        from: usize,
        to: usize,
        replacement: &Leg,
    ) -> Leg {
        debug_assert!(from <= to && to < self.nodes.len());
        debug_assert_eq!(self.nodes[from], replacement.source());
        debug_assert_eq!(self.nodes[to], replacement.target());

        let mut nodes = Vec::with_capacity(self.nodes.len() + replacement.nodes.len());
        nodes.extend_from_slice(&self.nodes[..from]);
        nodes.extend_from_slice(&replacement.nodes);
        nodes.extend_from_slice(&self.nodes[to + 1..]);

        let mut edges = Vec::with_capacity(nodes.len().saturating_sub(1));
        edges.extend_from_slice(&self.edges[..from]);
        edges.extend_from_slice(&replacement.edges);
        edges.extend_from_slice(&self.edges[to..]);

        let cost = PathCost::of_edges(network, &edges);
        Leg { nodes, edges, cost }
    }

    fn prefix<N: RoadNetwork>(&self, network: &N, position: usize) -> Leg {
        let edges = self.edges[..position].to_vec();
        Leg {
            nodes: self.nodes[..=position].to_vec(),
            cost: PathCost::of_edges(network, &edges),
            edges,
        }
    }

    fn visits_each_node_once(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        self.nodes.iter().all(|node| seen.insert(*node))
    }
}

/// Nodes and edges a search must not use.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub banned_nodes: HashSet<NodeIndex>,
    pub banned_edges: HashSet<EdgeIndex>,
}

impl SearchFilter {
    fn allows(&self, edge: EdgeIndex, target: NodeIndex) -> bool {
        !self.banned_edges.contains(&edge) && !self.banned_nodes.contains(&target)
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapItem {
    priority: PathCost,
    cost: PathCost,
    node: NodeIndex,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Flipped to turn BinaryHeap into a min-heap; lower node index wins ties.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[derive(Debug, Clone, Copy)]
struct Label {
    cost: PathCost,
    parent: Option<(NodeIndex, EdgeIndex)>,
}

fn reconstruct(labels: &HashMap<NodeIndex, Label>, target: NodeIndex) -> Option<Leg> {
    let cost = labels.get(&target)?.cost;
    let mut nodes = vec![target];
    let mut edges = Vec::new();
    let mut current = target;
    while let Some((parent, edge)) = labels.get(&current)?.parent {
        nodes.push(parent);
        edges.push(edge);
        current = parent;
    }
    nodes.reverse();
    edges.reverse();
    Some(Leg { nodes, edges, cost })
}

/// A* under the lexicographic [`PathCost`], guided by the network's
/// distance lower bound.
pub fn shortest_path<N: RoadNetwork>(
    network: &N,
    source: NodeIndex,
    target: NodeIndex,
    filter: &SearchFilter,
) -> Option<Leg> {
    if source == target {
        return Some(Leg::single(source));
    }

    let estimate = |node: NodeIndex, cost: PathCost| PathCost {
        distance_m: cost.distance_m + network.distance_lower_bound_m(node, target),
        ..cost
    };

    let mut labels: HashMap<NodeIndex, Label> = HashMap::with_capacity(1024);
    let mut heap = BinaryHeap::with_capacity(1024);
    labels.insert(
        source,
        Label {
            cost: PathCost::default(),
            parent: None,
        },
    );
    heap.push(HeapItem {
        priority: estimate(source, PathCost::default()),
        cost: PathCost::default(),
        node: source,
    });

    while let Some(HeapItem { cost, node, .. }) = heap.pop() {
        if labels.get(&node).is_some_and(|label| cost > label.cost) {
            continue;
        }
        if node == target {
            return reconstruct(&labels, target);
        }

        for neighbor in network.neighbors(node) {
            if !filter.allows(neighbor.edge, neighbor.target) {
                continue;
            }
            let next = cost + PathCost::of_edge(network, neighbor.edge);
            let improves = labels
                .get(&neighbor.target)
                .is_none_or(|label| next < label.cost);
            if improves {
                labels.insert(
                    neighbor.target,
                    Label {
                        cost: next,
                        parent: Some((node, neighbor.edge)),
                    },
                );
                heap.push(HeapItem {
                    priority: estimate(neighbor.target, next),
                    cost: next,
                    node: neighbor.target,
                });
            }
        }
    }

    None
}

/// Settled region of a bounded Dijkstra search.
#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    labels: HashMap<NodeIndex, Label>,
    settled: Vec<NodeIndex>,
}

impl ShortestPathTree {
    /// Settled nodes in the order the search reached them.
    pub fn settled(&self) -> impl Iterator<Item = (NodeIndex, PathCost)> + '_ {
        self.settled
            .iter()
            .filter_map(|node| self.labels.get(node).map(|label| (*node, label.cost)))
    }

    pub fn leg_to(&self, node: NodeIndex) -> Option<Leg> {
        if !self.settled.contains(&node) {
            return None;
        }
        reconstruct(&self.labels, node)
    }
}

/// Dijkstra from `source`, settling every node whose road distance is at
/// most `max_distance_m`.
pub fn explore<N: RoadNetwork>(
    network: &N,
    source: NodeIndex,
    max_distance_m: f64,
    filter: &SearchFilter,
) -> ShortestPathTree {
    let mut labels: HashMap<NodeIndex, Label> = HashMap::new();
    let mut settled = Vec::new();
    let mut done = HashSet::new();
    let mut heap = BinaryHeap::new();

    labels.insert(
        source,
        Label {
            cost: PathCost::default(),
            parent: None,
        },
    );
    heap.push(HeapItem {
        priority: PathCost::default(),
        cost: PathCost::default(),
        node: source,
    });

    while let Some(HeapItem { cost, node, .. }) = heap.pop() {
        if cost.distance_m > max_distance_m {
            break;
        }
        if !done.insert(node) {
            continue;
        }
        settled.push(node);

        for neighbor in network.neighbors(node) {
            if done.contains(&neighbor.target) || !filter.allows(neighbor.edge, neighbor.target) {
                continue;
            }
            let next = cost + PathCost::of_edge(network, neighbor.edge);
            if next.distance_m > max_distance_m {
                continue;
            }
            let improves = labels
                .get(&neighbor.target)
                .is_none_or(|label| next < label.cost);
            if improves {
                labels.insert(
                    neighbor.target,
                    Label {
                        cost: next,
                        parent: Some((node, neighbor.edge)),
                    },
                );
                heap.push(HeapItem {
                    priority: next,
                    cost: next,
                    node: neighbor.target,
                });
            }
        }
    }

    ShortestPathTree {
        labels,
        settled,
    }
}

/// Up to `k` loopless paths in increasing cost order (Yen). Spur searches
/// are limited to `max_spur_nodes` evenly spaced positions per round.
pub fn k_shortest_paths<N: RoadNetwork>(
    network: &N,
    source: NodeIndex,
    target: NodeIndex,
    k: usize,
    max_spur_nodes: usize,
) -> Vec<Leg> {
    if k == 0 || source == target {
        return Vec::new();
    }
    let Some(first) = shortest_path(network, source, target, &SearchFilter::default()) else {
        return Vec::new();
    };

    let mut accepted = vec![first];
    let mut candidates: Vec<Leg> = Vec::new();

    while accepted.len() < k {
        let previous = &accepted[accepted.len() - 1];
        for position in evenly_spaced(previous.edges.len(), max_spur_nodes) {
            let spur_node = previous.nodes[position];
            let root = &previous.nodes[..=position];

            let mut filter = SearchFilter::default();
            for path in &accepted {
                if path.nodes.len() > position + 1 && path.nodes[..=position] == *root {
                    filter.banned_edges.insert(path.edges[position]);
                }
            }
            filter.banned_nodes.extend(root[..position].iter().copied());

            let Some(spur) = shortest_path(network, spur_node, target, &filter) else {
                continue;
            };
            let candidate = previous.prefix(network, position).concat(&spur);
            if candidate.visits_each_node_once()
                && !accepted.iter().any(|path| path.edges == candidate.edges)
                && !candidates.iter().any(|path| path.edges == candidate.edges)
            {
                candidates.push(candidate);
            }
        }

        let best = candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cost.cmp(&b.cost).then_with(|| a.nodes.cmp(&b.nodes)))
            .map(|(index, _)| index);
        match best {
            Some(index) => accepted.push(candidates.swap_remove(index)),
            None => break,
        }
    }

    accepted
}

/// At most `max` positions out of `0..count`, spread evenly from the start.
pub(crate) fn evenly_spaced(count: usize, max: usize) -> Vec<usize> {
    if count == 0 || max == 0 {
        return Vec::new();
    }
    if count <= max {
        return (0..count).collect();
    }
    let mut positions: Vec<usize> = (0..max).map(|i| i * count / max).collect();
    positions.dedup();
    positions
}
