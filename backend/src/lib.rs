pub mod assembler;
pub mod config;
pub mod dem;
pub mod elevation;
pub mod enrichment;
pub mod error;
pub mod graph;
pub mod models;
pub mod moves;
pub mod network;
pub mod pathfinding;
pub mod poi;
pub mod polyline;
pub mod routing;
pub mod service;
pub mod synthesis;
pub mod validation;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderValue,
    routing::post,
    Json, Router,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, warn};

use crate::error::RouteError;
use crate::models::{RouteGenerateRequest, RouteGenerateResponse};
use crate::network::{RoadGraph, RoadNetwork};
use crate::poi::{PoiIndex, PoiProvider};
use crate::service::RoutePlanner;
use crate::synthesis::CancelFlag;

/// Shared handler state. Defaults to the production providers.
pub struct AppState<N = RoadGraph, P = PoiIndex> {
    pub planner: Arc<RoutePlanner<N, P>>,
    /// Bounds the number of searches running at once.
    pub limiter: Arc<Semaphore>,
    pub queue_timeout: Duration,
    pub request_timeout: Duration,
}

impl<N, P> Clone for AppState<N, P> {
    fn clone(&self) -> Self {
        Self {
            planner: Arc::clone(&self.planner),
            limiter: Arc::clone(&self.limiter),
            queue_timeout: self.queue_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

impl<N, P> AppState<N, P> {
    pub fn new(
        planner: RoutePlanner<N, P>,
        max_concurrent_routes: usize,
        queue_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            planner: Arc::new(planner),
            limiter: Arc::new(Semaphore::new(max_concurrent_routes)),
            queue_timeout,
            request_timeout,
        }
    }
}

pub fn create_router<N, P>(state: AppState<N, P>) -> Router
where
    N: RoadNetwork + 'static,
    P: PoiProvider + 'static,
{
    Router::new()
        .route("/api/v1/route/generate", post(generate_route_handler::<N, P>))
        .with_state(state)
}

/// `*` allows any origin; anything else must be a single valid origin.
pub fn cors_layer(allow_origin: &str) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    let origin = if allow_origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(HeaderValue::from_str(allow_origin)?)
    };
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn generate_route_handler<N, P>(
    State(state): State<AppState<N, P>>,
    payload: Result<Json<RouteGenerateRequest>, JsonRejection>,
) -> Result<Json<RouteGenerateResponse>, RouteError>
where
    N: RoadNetwork + 'static,
    P: PoiProvider + 'static,
{
    let Json(body) = payload?;
    let request = state.planner.validate(&body).inspect_err(|err| {
        debug!("rejected route request: {err}");
    })?;

    let permit = acquire_permit(&state.limiter, state.queue_timeout).await?;
    let cancel = CancelOnDrop(CancelFlag::new());
    let planner = Arc::clone(&state.planner);
    let search_cancel = cancel.0.clone();
    let mut search = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        planner.plan(&request, &search_cancel)
    });

    let outcome = match tokio::time::timeout(state.request_timeout, &mut search).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(
                "route request exceeded {:?}, stopping the search",
                state.request_timeout
            );
            cancel.0.cancel();
            search.await
        }
    };

    outcome
        .map_err(|err| RouteError::Internal(format!("route search task failed: {err}")))?
        .map(Json)
}

async fn acquire_permit(
    limiter: &Arc<Semaphore>,
    queue_timeout: Duration,
) -> Result<OwnedSemaphorePermit, RouteError> {
    let overloaded = || RouteError::Overloaded {
        retry_after_s: queue_timeout.as_secs().max(1),
    };
    match tokio::time::timeout(queue_timeout, Arc::clone(limiter).acquire_owned()).await {
        Ok(Ok(permit)) => Ok(permit),
        Ok(Err(_closed)) => Err(overloaded()),
        Err(_elapsed) => Err(overloaded()),
    }
}

/// Stops the search when the client goes away mid-request.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
