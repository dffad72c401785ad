use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cycleroute::config::EngineConfig;
use cycleroute::models::{Coordinate, RouteGenerateRequest, RoutePreferences};
use cycleroute::network::{RoadGraph, RoadNetwork};
use cycleroute::poi::PoiIndex;
use cycleroute::service::RoutePlanner;
use cycleroute::synthesis::CancelFlag;

const SAMPLE_GRAPH: &str = include_str!("../data/sample_graph.json");
const SAMPLE_POIS: &str = include_str!("../data/sample_pois.csv");

fn corner(row: usize, col: usize) -> Coordinate {
    Coordinate::new(45.0 + row as f64 * 0.003, 5.0 + col as f64 * 0.004)
}

fn planner() -> RoutePlanner<RoadGraph, PoiIndex> {
    let network = RoadGraph::from_reader(SAMPLE_GRAPH.as_bytes(), 1000.0).expect("sample graph");
    let pois = PoiIndex::from_csv_reader(SAMPLE_POIS.as_bytes()).expect("sample POIs");
    RoutePlanner::new(Arc::new(network), Arc::new(pois), EngineConfig::default())
}

fn benchmark_snapping(c: &mut Criterion) {
    let network = RoadGraph::from_reader(SAMPLE_GRAPH.as_bytes(), 1000.0).expect("sample graph");
    let query = Coordinate::new(45.0201, 5.0299);
    c.bench_function("nearest_node", |b| {
        b.iter(|| network.nearest_node(black_box(query)))
    });
}

fn benchmark_direct_mode(c: &mut Criterion) {
    let planner = planner();
    let mut group = c.benchmark_group("direct_mode");

    let cases = [
        ("short", corner(0, 0), corner(2, 3), Vec::new()),
        ("diagonal", corner(0, 0), corner(14, 14), Vec::new()),
        (
            "three_waypoints",
            corner(0, 0),
            corner(14, 14),
            vec![corner(10, 2), corner(3, 8), corner(12, 11)],
        ),
    ];

    for (name, start, end, waypoints) in cases {
        let body = RouteGenerateRequest {
            start_point: Some(start),
            end_point: Some(end),
            waypoints,
            preferences: None,
        };
        let request = planner.validate(&body).expect("valid request");
        group.bench_with_input(BenchmarkId::from_parameter(name), &request, |b, request| {
            b.iter(|| planner.plan(black_box(request), &CancelFlag::new()))
        });
    }

    group.finish();
}

fn benchmark_target_mode(c: &mut Criterion) {
    let planner = planner();
    let mut group = c.benchmark_group("target_mode");
    group.sample_size(20);

    for target_km in [5.0, 10.0, 20.0] {
        let body = RouteGenerateRequest {
            start_point: Some(corner(2, 2)),
            end_point: Some(corner(4, 5)),
            waypoints: Vec::new(),
            preferences: Some(RoutePreferences {
                target_distance_km: Some(target_km),
                target_elevation_gain_m: Some(target_km * 15.0),
            }),
        };
        let request = planner.validate(&body).expect("valid request");
        group.bench_with_input(BenchmarkId::from_parameter(target_km), &request, |b, request| {
            b.iter(|| planner.plan(black_box(request), &CancelFlag::new()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_snapping,
    benchmark_direct_mode,
    benchmark_target_mode
);
criterion_main!(benches);
