use std::sync::Arc;

use cycleroute::{
    config::ServerConfig,
    cors_layer, create_router,
    dem::ArcAsciiDem,
    graph::GraphFile,
    network::RoadGraph,
    poi::PoiIndex,
    service::RoutePlanner,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cycleroute=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    let mut graph_file = GraphFile::read_from_path(&config.graph_path)?;
    if let Some(dem_path) = &config.local_dem_path {
        let dem = ArcAsciiDem::from_path(dem_path)?;
        let filled = graph_file.fill_missing_elevations(&dem);
        tracing::info!("filled {filled} node elevations from {}", dem_path.display());
    }
    let network = RoadGraph::from_graph_file(graph_file, config.snap_radius_m)?;
    tracing::info!(
        "loaded road graph from {}: {} nodes, {} edges",
        config.graph_path.display(),
        network.node_count(),
        network.edge_count()
    );

    let pois = PoiIndex::from_path(&config.spots_csv_path).unwrap_or_else(|err| {
        tracing::warn!(
            "no POIs loaded from {}: {err}; routes will have no stops",
            config.spots_csv_path.display()
        );
        PoiIndex::empty()
    });

    let planner = RoutePlanner::new(Arc::new(network), Arc::new(pois), config.engine.clone());
    let state = AppState::new(
        planner,
        config.max_concurrent_routes,
        config.queue_timeout,
        config.request_timeout,
    );
    let app = create_router(state).layer(cors_layer(&config.allow_origin)?);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("starting route service on http://{}", config.bind_addr);
    tracing::info!("  POST /api/v1/route/generate");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("route service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
