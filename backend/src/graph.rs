use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use osmpbf::{Element, ElementReader};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dem::ArcAsciiDem;
use crate::models::{Coordinate, SurfaceType};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>, // meters, from OSM 'ele' or the DEM
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: u64,
    pub to: u64,
    pub length_m: f64,
    pub surface: SurfaceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highway: Option<String>,
    #[serde(default)]
    pub oneway: bool,
    /// 0.0 (never ride) to 1.0 (ideal).
    #[serde(default = "default_suitability")]
    pub suitability: f64,
    /// Intermediate shape points between `from` and `to`, exclusive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry: Vec<Coordinate>,
}

fn default_suitability() -> f64 {
    1.0
}

impl GraphFile {
    /// Reads plain JSON, or zstd-compressed JSON when the path ends in `.zst`.
    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let path = path.as_ref();
        if is_compressed(path) {
            return Self::read_compressed(path);
        }
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, io::Error> {
        serde_json::from_reader(reader).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), io::Error> {
        let path = path.as_ref();
        if is_compressed(path) {
            return self.write_compressed(path);
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(8 * 1024 * 1024, file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()
    }

    pub fn write_compressed(&self, path: impl AsRef<Path>) -> Result<(), io::Error> {
        let file = File::create(path)?;
        let mut encoder = zstd::stream::write::Encoder::new(file, 3)?;
        serde_json::to_writer(&mut encoder, self)?;
        encoder.finish()?;
        Ok(())
    }

    pub fn read_compressed(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        let decoder = zstd::stream::read::Decoder::new(file)?;
        Self::from_reader(BufReader::new(decoder))
    }

    /// Samples the DEM for every node without an elevation. Returns how many
    /// nodes were filled.
    pub fn fill_missing_elevations(&mut self, dem: &ArcAsciiDem) -> usize {
        self.nodes
            .par_iter_mut()
            .filter(|node| node.elevation.is_none())
            .map(|node| match dem.sample(node.lat, node.lon) {
                Some(value) => {
                    node.elevation = Some(value);
                    1
                }
                None => 0,
            })
            .sum()
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, coord: Coordinate) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphBuildError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("osm error: {0}")]
    Osm(#[from] osmpbf::Error),
    #[error("graph contains no nodes")]
    EmptyGraph,
}

#[derive(Default)]
pub struct GraphBuilderConfig {
    pub bbox: Option<BoundingBox>,
}

pub struct GraphBuilder {
    config: GraphBuilderConfig,
}

#[derive(Debug, Clone)]
struct OsmNode {
    osm_id: i64,
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
}

#[derive(Debug, Clone)]
struct OsmWay {
    refs: Vec<i64>,
    tags: Vec<(String, String)>,
}

impl GraphBuilder {
    pub fn new(config: GraphBuilderConfig) -> Self {
        Self { config }
    }

    /// Two passes over the extract: cyclable ways first, then the nodes they
    /// reference. Every OSM node on a kept way becomes a graph node.
    pub fn build_from_pbf(&self, path: impl AsRef<Path>) -> Result<GraphFile, GraphBuildError> {
        let path = path.as_ref();

        let ways = collect_ways(path)?;
        tracing::info!("collected {} cyclable ways", ways.len());

        let needed: HashSet<i64> = ways.iter().flat_map(|way| way.refs.iter().copied()).collect();
        let mut osm_nodes = collect_nodes(path, &needed)?;
        if let Some(bbox) = self.config.bbox {
            osm_nodes.retain(|node| {
                bbox.contains(Coordinate {
                    lat: node.lat,
                    lon: node.lon,
                })
            });
        }
        if osm_nodes.is_empty() {
            return Err(GraphBuildError::EmptyGraph);
        }

        // Deterministic ids regardless of the parallel read order.
        osm_nodes.sort_by_key(|node| node.osm_id);
        osm_nodes.dedup_by_key(|node| node.osm_id);

        let mut osm_to_graph = HashMap::with_capacity(osm_nodes.len());
        let nodes: Vec<NodeRecord> = osm_nodes
            .iter()
            .enumerate()
            .map(|(position, node)| {
                let id = position as u64 + 1;
                osm_to_graph.insert(node.osm_id, id);
                NodeRecord {
                    id,
                    lat: node.lat,
                    lon: node.lon,
                    elevation: node.elevation,
                }
            })
            .collect();

        let edges: Vec<EdgeRecord> = ways
            .iter()
            .flat_map(|way| edges_for_way(way, &nodes, &osm_to_graph))
            .collect();

        Ok(GraphFile { nodes, edges })
    }
}

fn collect_ways(path: &Path) -> Result<Vec<OsmWay>, GraphBuildError> {
    let reader = ElementReader::from_path(path)?;
    let ways = reader.par_map_reduce(
        |element| -> Vec<OsmWay> {
            if let Element::Way(way) = element {
                let tags: Vec<(String, String)> = way
                    .tags()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                if is_cyclable(&tags) {
                    return vec![OsmWay {
                        refs: way.refs().collect(),
                        tags,
                    }];
                }
            }
            Vec::new()
        },
        Vec::new,
        |mut acc, ways| {
            acc.extend(ways);
            acc
        },
    )?;
    Ok(ways)
}

fn collect_nodes(path: &Path, needed: &HashSet<i64>) -> Result<Vec<OsmNode>, GraphBuildError> {
    let reader = ElementReader::from_path(path)?;
    let nodes = reader.par_map_reduce(
        |element| -> Vec<OsmNode> {
            let (osm_id, lat, lon, elevation) = match element {
                Element::Node(node) => (
                    node.id(),
                    node.lat(),
                    node.lon(),
                    extract_elevation(node.tags()),
                ),
                Element::DenseNode(node) => (
                    node.id(),
                    node.lat(),
                    node.lon(),
                    extract_elevation(node.tags()),
                ),
                _ => return Vec::new(),
            };
            if needed.contains(&osm_id) {
                vec![OsmNode {
                    osm_id,
                    lat,
                    lon,
                    elevation,
                }]
            } else {
                Vec::new()
            }
        },
        Vec::new,
        |mut acc, nodes| {
            acc.extend(nodes);
            acc
        },
    )?;
    Ok(nodes)
}

fn edges_for_way(
    way: &OsmWay,
    nodes: &[NodeRecord],
    osm_to_graph: &HashMap<i64, u64>,
) -> Vec<EdgeRecord> {
    let surface = infer_surface(&way.tags);
    let suitability = infer_suitability(&way.tags);
    let highway = tag(&way.tags, "highway").map(str::to_string);
    let direction = infer_direction(&way.tags);

    way.refs
        .windows(2)
        .filter_map(|pair| {
            let (first, second) = match direction {
                Direction::Reverse => (pair[1], pair[0]),
                _ => (pair[0], pair[1]),
            };
            let from = *osm_to_graph.get(&first)?;
            let to = *osm_to_graph.get(&second)?;
            let a = nodes.get((from - 1) as usize)?;
            let b = nodes.get((to - 1) as usize)?;
            let length_m = crate::routing::haversine_m(
                Coordinate::new(a.lat, a.lon),
                Coordinate::new(b.lat, b.lon),
            );
            Some(EdgeRecord {
                from,
                to,
                length_m,
                surface,
                highway: highway.clone(),
                oneway: direction != Direction::Both,
                suitability,
                geometry: Vec::new(),
            })
        })
        .collect()
}

fn tag<'a>(tags: &'a [(String, String)], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn is_cyclable(tags: &[(String, String)]) -> bool {
    let supported = tag(tags, "highway").is_some_and(is_supported_highway);
    supported && tag(tags, "bicycle") != Some("no") && tag(tags, "access") != Some("no")
}

fn is_supported_highway(highway_value: &str) -> bool {
    matches!(
        highway_value,
        "cycleway"
            | "path"
            | "footway"
            | "bridleway"
            | "living_street"
            | "primary"
            | "secondary"
            | "tertiary"
            | "residential"
            | "track"
            | "service"
            | "unclassified"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    Forward,
    Reverse,
}

fn infer_direction(tags: &[(String, String)]) -> Direction {
    if tag(tags, "oneway:bicycle") == Some("no") || tag(tags, "cycleway") == Some("opposite") {
        return Direction::Both;
    }
    match tag(tags, "oneway") {
        Some("yes" | "true" | "1") => Direction::Forward,
        Some("-1" | "reverse") => Direction::Reverse,
        Some(_) => Direction::Both,
        None if tag(tags, "junction") == Some("roundabout") => Direction::Forward,
        None => Direction::Both,
    }
}

fn infer_surface(tags: &[(String, String)]) -> SurfaceType {
    if let Some(surface) = tag(tags, "surface") {
        return match surface {
            "gravel" | "fine_gravel" | "compacted" | "unpaved" => SurfaceType::Trail,
            "dirt" | "earth" | "ground" | "grass" | "mud" | "sand" => SurfaceType::Dirt,
            _ => SurfaceType::Paved,
        };
    }

    match tag(tags, "highway") {
        Some("path" | "footway" | "track" | "bridleway") => SurfaceType::Trail,
        Some(
            "cycleway" | "service" | "residential" | "living_street" | "primary" | "secondary"
            | "tertiary" | "unclassified",
        ) => SurfaceType::Paved,
        _ => SurfaceType::Trail,
    }
}

fn infer_suitability(tags: &[(String, String)]) -> f64 {
    if tag(tags, "bicycle") == Some("designated") {
        return 1.0;
    }
    let base = match tag(tags, "highway") {
        Some("cycleway") => 1.0,
        Some("residential" | "living_street") => 0.9,
        Some("tertiary" | "unclassified" | "service" | "path") => 0.8,
        Some("track") => 0.7,
        Some("secondary") => 0.6,
        Some("footway" | "bridleway") => 0.5,
        Some("primary") => 0.4,
        _ => 0.5,
    };
    match infer_surface(tags) {
        SurfaceType::Dirt => base * 0.8,
        _ => base,
    }
}

// OSM uses 'ele' for elevation in meters; some mappers append a unit.
fn extract_elevation<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Option<f64> {
    let mut tags = tags;
    tags.find(|(k, _)| *k == "ele")
        .and_then(|(_, v)| v.trim().trim_end_matches('m').trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn small_graph() -> GraphFile {
        GraphFile {
            nodes: vec![
                NodeRecord {
                    id: 1,
                    lat: 45.0,
                    lon: 5.0,
                    elevation: Some(200.0),
                },
                NodeRecord {
                    id: 2,
                    lat: 45.001,
                    lon: 5.0,
                    elevation: None,
                },
            ],
            edges: vec![EdgeRecord {
                from: 1,
                to: 2,
                length_m: 111.2,
                surface: SurfaceType::Paved,
                highway: Some("residential".into()),
                oneway: false,
                suitability: 0.9,
                geometry: vec![Coordinate::new(45.0005, 5.0001)],
            }],
        }
    }

    #[test]
    fn edge_defaults_apply_when_fields_missing() {
        let json = r#"{"nodes":[],"edges":[{"from":1,"to":2,"length_m":10.0,"surface":"dirt"}]}"#;
        let graph = GraphFile::from_reader(json.as_bytes()).unwrap();
        let edge = &graph.edges[0];
        assert_eq!(edge.suitability, 1.0);
        assert!(!edge.oneway);
        assert!(edge.geometry.is_empty());
        assert!(edge.highway.is_none());
    }

    #[test]
    fn plain_and_compressed_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let graph = small_graph();

        for name in ["graph.json", "graph.json.zst"] {
            let path = dir.path().join(name);
            graph.write_to_path(&path).unwrap();
            let loaded = GraphFile::read_from_path(&path).unwrap();
            assert_eq!(loaded.nodes.len(), 2);
            assert_eq!(loaded.edges[0].geometry.len(), 1);
            assert_eq!(loaded.edges[0].highway.as_deref(), Some("residential"));
        }

        let compressed = std::fs::read(dir.path().join("graph.json.zst")).unwrap();
        assert!(serde_json::from_slice::<GraphFile>(&compressed).is_err());
    }

    #[test]
    fn dem_fills_only_missing_elevations() {
        let mut graph = small_graph();
        let dem = ArcAsciiDem::from_reader(crate::dem::tests::SMALL_GRID.as_bytes()).unwrap();

        let filled = graph.fill_missing_elevations(&dem);

        assert_eq!(filled, 1);
        assert_eq!(graph.nodes[0].elevation, Some(200.0));
        assert!(graph.nodes[1].elevation.is_some());
    }

    #[test]
    fn bounding_box_contains_edges_inclusive() {
        let bbox = BoundingBox {
            min_lat: 45.0,
            max_lat: 45.1,
            min_lon: 5.0,
            max_lon: 5.1,
        };
        assert!(bbox.contains(Coordinate::new(45.0, 5.1)));
        assert!(!bbox.contains(Coordinate::new(44.99, 5.05)));
    }

    #[test]
    fn oneway_tags_are_honoured() {
        assert_eq!(infer_direction(&tags(&[("oneway", "yes")])), Direction::Forward);
        assert_eq!(infer_direction(&tags(&[("oneway", "-1")])), Direction::Reverse);
        assert_eq!(
            infer_direction(&tags(&[("oneway", "yes"), ("oneway:bicycle", "no")])),
            Direction::Both
        );
        assert_eq!(
            infer_direction(&tags(&[("junction", "roundabout")])),
            Direction::Forward
        );
        assert_eq!(infer_direction(&tags(&[("oneway", "no")])), Direction::Both);
    }

    #[test]
    fn reverse_oneway_flips_edge_direction() {
        let nodes = vec![
            NodeRecord {
                id: 1,
                lat: 45.0,
                lon: 5.0,
                elevation: None,
            },
            NodeRecord {
                id: 2,
                lat: 45.001,
                lon: 5.0,
                elevation: None,
            },
        ];
        let osm_to_graph = HashMap::from([(10, 1), (20, 2)]);
        let way = OsmWay {
            refs: vec![10, 20],
            tags: tags(&[("highway", "residential"), ("oneway", "-1")]),
        };

        let edges = edges_for_way(&way, &nodes, &osm_to_graph);

        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].from, edges[0].to), (2, 1));
        assert!(edges[0].oneway);
        assert!((edges[0].length_m - 111.2).abs() < 1.0);
    }

    #[test]
    fn ways_with_missing_nodes_are_truncated() {
        let nodes = vec![NodeRecord {
            id: 1,
            lat: 45.0,
            lon: 5.0,
            elevation: None,
        }];
        let osm_to_graph = HashMap::from([(10, 1)]);
        let way = OsmWay {
            refs: vec![10, 20],
            tags: tags(&[("highway", "track")]),
        };
        assert!(edges_for_way(&way, &nodes, &osm_to_graph).is_empty());
    }

    #[test]
    fn cyclable_filter() {
        assert!(is_cyclable(&tags(&[("highway", "cycleway")])));
        assert!(!is_cyclable(&tags(&[("highway", "motorway")])));
        assert!(!is_cyclable(&tags(&[("highway", "path"), ("bicycle", "no")])));
        assert!(!is_cyclable(&tags(&[("building", "yes")])));
    }

    #[test]
    fn surface_and_suitability_inference() {
        assert_eq!(
            infer_surface(&tags(&[("highway", "residential"), ("surface", "gravel")])),
            SurfaceType::Trail
        );
        assert_eq!(infer_surface(&tags(&[("highway", "track")])), SurfaceType::Trail);
        assert_eq!(infer_surface(&tags(&[("surface", "ground")])), SurfaceType::Dirt);

        assert_eq!(infer_suitability(&tags(&[("highway", "cycleway")])), 1.0);
        assert_eq!(
            infer_suitability(&tags(&[("highway", "primary"), ("bicycle", "designated")])),
            1.0
        );
        let dirt_path = infer_suitability(&tags(&[("highway", "path"), ("surface", "dirt")]));
        assert!((dirt_path - 0.64).abs() < 1e-9);
    }

    #[test]
    fn elevation_tag_parsing() {
        let parsed = extract_elevation([("name", "x"), ("ele", "1234.5")].into_iter());
        assert_eq!(parsed, Some(1234.5));
        assert_eq!(extract_elevation([("ele", "812 m")].into_iter()), Some(812.0));
        assert_eq!(extract_elevation([("ele", "high")].into_iter()), None);
        assert_eq!(extract_elevation(std::iter::empty()), None);
    }
}
