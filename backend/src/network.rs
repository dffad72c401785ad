use std::{collections::HashMap, io, io::Read};

use kdtree::{distance::squared_euclidean, KdTree};
use petgraph::{
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
    Direction,
};

use crate::{
    graph::GraphFile,
    models::Coordinate,
    routing::{haversine_m, METERS_PER_DEGREE_LAT},
};

/// Latitude beyond which the snap search box stops widening.
const MAX_SNAP_LATITUDE: f64 = 89.0;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("failed to read graph file: {0}")]
    Io(#[from] io::Error),
    #[error("graph is empty")]
    EmptyGraph,
    #[error("edge references unknown node {0}")]
    MissingNode(u64),
    #[error("edge {from}->{to} has an invalid length")]
    InvalidEdge { from: u64, to: u64 },
    #[error("no routable road within {radius_m} m of ({lat}, {lon})")]
    Unroutable { lat: f64, lon: f64, radius_m: f64 },
    #[error("road network unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub location: Coordinate,
    pub elevation_m: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub length_m: f64,
    /// `elevation(target) - elevation(source)`, 0 when either is unknown.
    pub elevation_delta_m: f64,
    pub suitability: f64,
    /// Shape points strictly between source and target, in travel order.
    pub geometry: Vec<Coordinate>,
}

impl GraphEdge {
    /// Edges with zero suitability stay in the graph but are never ridden.
    pub fn is_traversable(&self) -> bool {
        self.suitability > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub edge: EdgeIndex,
    pub target: NodeIndex,
}

/// Read-only routable graph. Implementations are shared across request
/// threads and are never mutated after construction.
pub trait RoadNetwork: Send + Sync {
    /// Snaps a free coordinate to the closest routable node.
    fn nearest_node(&self, location: Coordinate) -> Result<NodeIndex, NetworkError>;

    /// Outgoing traversable edges of `node`.
    fn neighbors(&self, node: NodeIndex) -> impl Iterator<Item = Neighbor> + '_;

    fn node(&self, node: NodeIndex) -> &GraphNode;

    fn edge(&self, edge: EdgeIndex) -> &GraphEdge;

    /// Never exceeds the road distance between the two nodes.
    fn distance_lower_bound_m(&self, from: NodeIndex, to: NodeIndex) -> f64;
}

pub struct RoadGraph {
    graph: DiGraph<GraphNode, GraphEdge>,
    spatial_index: KdTree<f64, usize, [f64; 2]>,
    snap_radius_m: f64,
    heuristic_scale: f64,
}

impl RoadGraph {
    pub fn from_reader(reader: impl Read, snap_radius_m: f64) -> Result<Self, NetworkError> {
        let graph_file = GraphFile::from_reader(reader)?;
        Self::from_graph_file(graph_file, snap_radius_m)
    }

    pub fn from_graph_file(graph_file: GraphFile, snap_radius_m: f64) -> Result<Self, NetworkError> {
        if graph_file.nodes.is_empty() {
            return Err(NetworkError::EmptyGraph);
        }

        let mut graph = DiGraph::with_capacity(graph_file.nodes.len(), graph_file.edges.len() * 2);
        let mut id_to_index = HashMap::with_capacity(graph_file.nodes.len());
        let mut node_ids = Vec::with_capacity(graph_file.nodes.len());

        for node in graph_file.nodes {
            let location = Coordinate::new(node.lat, node.lon);
            let idx = graph.add_node(GraphNode {
                location,
                elevation_m: node.elevation,
            });
            id_to_index.insert(node.id, idx);
            node_ids.push(node.id);
        }

        let mut heuristic_scale: f64 = 1.0;
        for edge in graph_file.edges {
            let from = *id_to_index
                .get(&edge.from)
                .ok_or(NetworkError::MissingNode(edge.from))?;
            let to = *id_to_index
                .get(&edge.to)
                .ok_or(NetworkError::MissingNode(edge.to))?;
            if !edge.length_m.is_finite() || edge.length_m < 0.0 {
                return Err(NetworkError::InvalidEdge {
                    from: edge.from,
                    to: edge.to,
                });
            }

            let chord_m = haversine_m(graph[from].location, graph[to].location);
            if chord_m > 1e-6 {
                heuristic_scale = heuristic_scale.min(edge.length_m / chord_m);
            }

            let elevation_delta_m = match (graph[from].elevation_m, graph[to].elevation_m) {
                (Some(a), Some(b)) => b - a,
                _ => 0.0,
            };
            let suitability = edge.suitability.clamp(0.0, 1.0);

            if !edge.oneway {
                let mut reversed = edge.geometry.clone();
                reversed.reverse();
                graph.add_edge(
                    to,
                    from,
                    GraphEdge {
                        length_m: edge.length_m,
                        elevation_delta_m: -elevation_delta_m,
                        suitability,
                        geometry: reversed,
                    },
                );
            }
            graph.add_edge(
                from,
                to,
                GraphEdge {
                    length_m: edge.length_m,
                    elevation_delta_m,
                    suitability,
                    geometry: edge.geometry,
                },
            );
        }

        // Only nodes a route can leave or reach are snap targets.
        let mut spatial_index = KdTree::new(2);
        let mut stranded = 0usize;
        for idx in graph.node_indices() {
            let routable = graph
                .edges_directed(idx, Direction::Outgoing)
                .chain(graph.edges_directed(idx, Direction::Incoming))
                .any(|edge| edge.weight().is_traversable());
            if !routable {
                stranded += 1;
                continue;
            }
            let location = graph[idx].location;
            // Non-finite coordinates are rejected by the kd-tree; such nodes stay unsnappable.
            if spatial_index.add([location.lon, location.lat], idx.index()).is_err() {
                tracing::warn!("node {} has invalid coordinates, not indexed", node_ids[idx.index()]);
            }
        }

        tracing::info!(
            "road graph ready: {} nodes ({} without usable roads), {} directed edges, heuristic scale {:.3}",
            graph.node_count(),
            stranded,
            graph.edge_count(),
            heuristic_scale
        );

        Ok(Self {
            graph,
            spatial_index,
            snap_radius_m,
            heuristic_scale: heuristic_scale.max(0.0),
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Euclidean radius in degrees that holds every point within the snap
    /// radius of `lat`. A degree of longitude shrinks toward the poles, so
    /// the box is widened by the cosine of its most poleward edge.
    fn search_radius_deg(&self, lat: f64) -> f64 {
        let lat_span = self.snap_radius_m / METERS_PER_DEGREE_LAT;
        let poleward = (lat.abs() + lat_span).min(MAX_SNAP_LATITUDE);
        let lon_span = lat_span / poleward.to_radians().cos();
        lat_span.hypot(lon_span) * 1.01
    }
}

impl RoadNetwork for RoadGraph {
    fn nearest_node(&self, location: Coordinate) -> Result<NodeIndex, NetworkError> {
        let unroutable = || NetworkError::Unroutable {
            lat: location.lat,
            lon: location.lon,
            radius_m: self.snap_radius_m,
        };

        let radius_deg = self.search_radius_deg(location.lat);
        let candidates = self
            .spatial_index
            .within(
                &[location.lon, location.lat],
                radius_deg * radius_deg,
                &squared_euclidean,
            )
            .map_err(|_| unroutable())?;

        candidates
            .into_iter()
            .map(|(_, &idx)| {
                let node = NodeIndex::new(idx);
                (haversine_m(location, self.graph[node].location), node)
            })
            .filter(|(distance, _)| *distance <= self.snap_radius_m)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, node)| node)
            .ok_or_else(unroutable)
    }

    fn neighbors(&self, node: NodeIndex) -> impl Iterator<Item = Neighbor> + '_ {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .filter(|edge| edge.weight().is_traversable())
            .map(|edge| Neighbor {
                edge: edge.id(),
                target: edge.target(),
            })
    }

    fn node(&self, node: NodeIndex) -> &GraphNode {
        &self.graph[node]
    }

    fn edge(&self, edge: EdgeIndex) -> &GraphEdge {
        &self.graph[edge]
    }

    fn distance_lower_bound_m(&self, from: NodeIndex, to: NodeIndex) -> f64 {
        if from == to {
            return 0.0;
        }
        haversine_m(self.graph[from].location, self.graph[to].location) * self.heuristic_scale
    }
}
