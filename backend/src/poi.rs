//! Points of interest and the corridor queries used to find them along a route.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use csv::{ReaderBuilder, StringRecord, Trim};
use geo::{Closest, Distance, Haversine, HaversineClosestPoint};
use geo_types::{LineString, Point};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

use crate::{
    models::{Coordinate, Stop, StopType},
    routing::{is_valid_coordinate, METERS_PER_DEGREE_LAT},
};

const MAX_RATING: f64 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum PoiError {
    #[error("failed to read POI file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse POI file: {0}")]
    Csv(#[from] csv::Error),
    #[error("POI provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointOfInterest {
    pub name: String,
    pub kind: StopType,
    /// 0.0 to 5.0.
    pub rating: f64,
    pub location: Coordinate,
}

impl From<PointOfInterest> for Stop {
    fn from(poi: PointOfInterest) -> Self {
        Stop {
            name: poi.name,
            kind: poi.kind,
            rating: poi.rating,
            location: poi.location,
        }
    }
}

/// Buffer of `half_width_m` around a route's point sequence.
#[derive(Debug, Clone)]
pub struct Corridor {
    path: LineString<f64>,
    half_width_m: f64,
}

impl Corridor {
    pub fn new(points: &[Coordinate], half_width_m: f64) -> Self {
        let path = points
            .iter()
            .map(|point| (point.lon, point.lat))
            .collect::<Vec<_>>()
            .into();
        Self {
            path,
            half_width_m: half_width_m.max(0.0),
        }
    }

    pub fn half_width_m(&self) -> f64 {
        self.half_width_m
    }

    /// Lon/lat box holding the whole corridor, padded by the half-width.
    pub fn envelope(&self) -> Option<AABB<[f64; 2]>> {
        let first = self.path.0.first()?;
        let (mut min_lon, mut max_lon, mut min_lat, mut max_lat) = (first.x, first.x, first.y, first.y);
        for coord in &self.path.0 {
            min_lon = min_lon.min(coord.x);
            max_lon = max_lon.max(coord.x);
            min_lat = min_lat.min(coord.y);
            max_lat = max_lat.max(coord.y);
        }

        let lat_pad = self.half_width_m / METERS_PER_DEGREE_LAT;
        let widest_lat = (min_lat - lat_pad).abs().max((max_lat + lat_pad).abs()).min(89.0);
        let lon_pad =
            self.half_width_m / (METERS_PER_DEGREE_LAT * widest_lat.to_radians().cos().max(0.01));

        Some(AABB::from_corners(
            [min_lon - lon_pad, min_lat - lat_pad],
            [max_lon + lon_pad, max_lat + lat_pad],
        ))
    }

    /// Great-circle distance from `location` to the nearest point of the path.
    pub fn distance_m(&self, location: Coordinate) -> Option<f64> {
        let target = Point::new(location.lon, location.lat);
        let nearest = match self.path.0.as_slice() {
            [] => return None,
            [only] => Point::from(*only),
            _ => match self.path.haversine_closest_point(&target) {
                Closest::Intersection(point) | Closest::SinglePoint(point) => point,
                Closest::Indeterminate => Point::from(self.path.0[0]),
            },
        };
        Some(Haversine.distance(nearest, target))
    }

    pub fn contains(&self, location: Coordinate) -> bool {
        self.distance_m(location)
            .is_some_and(|distance| distance <= self.half_width_m)
    }
}

/// Read-only source of points of interest, shared across request threads.
pub trait PoiProvider: Send + Sync {
    /// Candidates inside the corridor. Implementations may return extra
    /// points from the corridor's bounding box; callers filter by distance.
    fn query(&self, corridor: &Corridor) -> Result<Vec<PointOfInterest>, PoiError>;
}

#[derive(Debug, Clone)]
struct IndexedPoi(PointOfInterest);

impl RTreeObject for IndexedPoi {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.0.location.lon, self.0.location.lat])
    }
}

/// In-memory R*-tree over POIs, built once at startup.
#[derive(Debug)]
pub struct PoiIndex {
    tree: RTree<IndexedPoi>,
}

impl PoiIndex {
    pub fn new(pois: Vec<PointOfInterest>) -> Self {
        Self {
            tree: RTree::bulk_load(pois.into_iter().map(IndexedPoi).collect()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PoiError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let index = Self::from_csv_reader(BufReader::new(file))?;
        info!("loaded {} POIs from {}", index.len(), path.display());
        Ok(index)
    }

    /// Header-less `name,type,lat,lon,rating` rows; `#` starts a comment line.
    /// Rows that do not parse are skipped with a warning.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self, PoiError> {
        let mut csv = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut pois = Vec::new();
        for record in csv.records() {
            let record = match record {
                Ok(record) => record,
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => {
                    warn!("skipping unreadable POI row: {err}");
                    continue;
                }
            };
            match parse_row(&record) {
                Ok(poi) => pois.push(poi),
                Err(reason) => {
                    let line = record.position().map_or(0, |position| position.line());
                    warn!("skipping POI row at line {line}: {reason}");
                }
            }
        }

        Ok(Self::new(pois))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PoiProvider for PoiIndex {
    fn query(&self, corridor: &Corridor) -> Result<Vec<PointOfInterest>, PoiError> {
        let Some(envelope) = corridor.envelope() else {
            return Ok(Vec::new());
        };
        Ok(self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|indexed| corridor.contains(indexed.0.location))
            .map(|indexed| indexed.0.clone())
            .collect())
    }
}

fn parse_row(record: &StringRecord) -> Result<PointOfInterest, String> {
    let field = |index: usize, label: &str| {
        record
            .get(index)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| format!("missing {label}"))
    };
    let number = |index: usize, label: &str| -> Result<f64, String> {
        let raw = field(index, label)?;
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("invalid {label} {raw:?}"))
    };

    let name = field(0, "name")?.to_string();
    let kind = stop_type(field(1, "type")?);
    let location = Coordinate::new(number(2, "latitude")?, number(3, "longitude")?);
    if !is_valid_coordinate(&location) {
        return Err(format!("coordinate ({}, {}) out of range", location.lat, location.lon));
    }
    let rating = number(4, "rating")?;
    if !(0.0..=MAX_RATING).contains(&rating) {
        return Err(format!("rating {rating} outside 0-{MAX_RATING}"));
    }

    Ok(PointOfInterest {
        name,
        kind,
        rating,
        location,
    })
}

fn stop_type(raw: &str) -> StopType {
    match raw.to_ascii_lowercase().as_str() {
        "cafe" => StopType::Cafe,
        "restaurant" => StopType::Restaurant,
        "viewpoint" => StopType::Viewpoint,
        "convenience" => StopType::Convenience,
        "landmark" => StopType::Landmark,
        _ => StopType::Other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_POIS: &str = include_str!("../data/sample_pois.csv");

    pub(crate) fn sample_index() -> PoiIndex {
        PoiIndex::from_csv_reader(SAMPLE_POIS.as_bytes()).unwrap()
    }

    fn row_zero_corridor(half_width_m: f64) -> Corridor {
        Corridor::new(
            &[Coordinate::new(45.0, 5.0), Coordinate::new(45.0, 5.056)],
            half_width_m,
        )
    }

    #[test]
    fn sample_file_skips_bad_rows() {
        let index = sample_index();
        assert_eq!(index.len(), 11);
    }

    #[test]
    fn unknown_types_become_other() {
        let index = PoiIndex::from_csv_reader("Bike Kiosk,bike_shop,45.0,5.0,3.5\n".as_bytes()).unwrap();
        let corridor = Corridor::new(&[Coordinate::new(45.0, 5.0)], 10.0);
        let found = index.query(&corridor).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, StopType::Other);
    }

    #[test]
    fn rejects_out_of_range_rows() {
        let csv = "\
# comment
Too Good,cafe,45.0,5.0,7.5
Nowhere,cafe,95.0,5.0,4.0
Short Row,cafe,45.0
Fine,Cafe,45.0,5.0,4.0
";
        let index = PoiIndex::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PoiIndex::from_path(dir.path().join("missing.csv"));
        assert!(matches!(result, Err(PoiError::Io(_))));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spots.csv");
        std::fs::write(&path, SAMPLE_POIS).unwrap();
        assert_eq!(PoiIndex::from_path(&path).unwrap().len(), 11);
    }

    #[test]
    fn corridor_distance_is_perpendicular_to_path() {
        let corridor = row_zero_corridor(200.0);
        let distance = corridor.distance_m(Coordinate::new(45.001, 5.01)).unwrap();
        assert!((distance - 111.2).abs() < 1.0, "got {distance}");
        // Past the end of the path the nearest point is the endpoint.
        let beyond = corridor.distance_m(Coordinate::new(45.0, 5.066)).unwrap();
        assert!((beyond - 786.0).abs() < 5.0, "got {beyond}");
    }

    #[test]
    fn single_point_corridor_is_a_disc() {
        let corridor = Corridor::new(&[Coordinate::new(45.0, 5.0)], 150.0);
        assert!(corridor.contains(Coordinate::new(45.001, 5.0)));
        assert!(!corridor.contains(Coordinate::new(45.002, 5.0)));
    }

    #[test]
    fn empty_corridor_matches_nothing() {
        let corridor = Corridor::new(&[], 500.0);
        assert!(corridor.envelope().is_none());
        assert!(corridor.distance_m(Coordinate::new(45.0, 5.0)).is_none());
        assert!(sample_index().query(&corridor).unwrap().is_empty());
    }

    #[test]
    fn envelope_covers_half_width() {
        let corridor = row_zero_corridor(500.0);
        let envelope = corridor.envelope().unwrap();
        let lower = envelope.lower();
        let upper = envelope.upper();
        assert!(lower[1] < 45.0 - 0.0044 && upper[1] > 45.0 + 0.0044);
        assert!(lower[0] < 5.0 - 0.006 && upper[0] > 5.056 + 0.006);
    }

    #[test]
    fn query_keeps_only_points_inside_corridor() {
        let index = sample_index();
        let found = index.query(&row_zero_corridor(200.0)).unwrap();
        let names: Vec<&str> = found.iter().map(|poi| poi.name.as_str()).collect();
        assert!(names.contains(&"Grid Corner Cafe"));
        assert!(!names.contains(&"Far Away Cafe"));
        assert!(!names.contains(&"Hilltop Viewpoint"));
    }
}
