use std::path::PathBuf;

use clap::Parser;
use cycleroute::{
    dem::ArcAsciiDem,
    graph::{BoundingBox, GraphBuilder, GraphBuilderConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Build a cycling road graph from an OSM PBF extract"
)]
struct Args {
    /// Path to the OSM .pbf file (e.g. france-latest.osm.pbf or a regional extract)
    #[arg(long)]
    pbf: PathBuf,

    /// Output graph file; a `.zst` extension writes zstd-compressed JSON
    #[arg(long)]
    output: PathBuf,

    /// ESRI ASCII grid (geographic) used for nodes without an `ele` tag
    #[arg(long)]
    dem: Option<PathBuf>,

    /// Minimum latitude of the bounding box filter
    #[arg(long)]
    min_lat: Option<f64>,
    #[arg(long)]
    max_lat: Option<f64>,
    #[arg(long)]
    min_lon: Option<f64>,
    #[arg(long)]
    max_lon: Option<f64>,
}

impl Args {
    fn bbox(&self) -> Result<Option<BoundingBox>, String> {
        match (self.min_lat, self.max_lat, self.min_lon, self.max_lon) {
            (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => Ok(Some(BoundingBox {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            })),
            (None, None, None, None) => Ok(None),
            _ => Err("bounding box needs all of --min-lat, --max-lat, --min-lon, --max-lon".into()),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("building graph from {:?} into {:?}", args.pbf, args.output);

    let builder = GraphBuilder::new(GraphBuilderConfig { bbox: args.bbox()? });
    let mut graph = builder.build_from_pbf(&args.pbf)?;
    if let Some(dem_path) = &args.dem {
        let dem = ArcAsciiDem::from_path(dem_path)?;
        let filled = graph.fill_missing_elevations(&dem);
        tracing::info!("filled {filled} node elevations from {:?}", dem_path);
    }
    let without_elevation = graph.nodes.iter().filter(|node| node.elevation.is_none()).count();
    tracing::info!(
        "graph nodes={} edges={} without_elevation={without_elevation}",
        graph.nodes.len(),
        graph.edges.len()
    );
    graph.write_to_path(&args.output)?;
    tracing::info!("graph written to {:?}", args.output);

    Ok(())
}
