//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route(
            "/v1/artifacts/{*path}",
            put(handlers::put_artifact)
                .get(handlers::get_artifact)
                .delete(handlers::delete_artifact),
        )
        .route(
            "/v1/binaries/{sha1}",
            get(handlers::get_binary).head(handlers::head_binary),
        )
        .route(
            "/v1/admin/gc",
            get(handlers::get_gc).post(handlers::trigger_gc),
        )
        .route("/v1/admin/gc/pause", post(handlers::pause_gc))
        .route("/v1/admin/gc/resume", post(handlers::resume_gc))
        .route("/v1/admin/gc/stop", post(handlers::stop_gc))
        .route("/v1/admin/prune", post(handlers::prune))
        .route("/v1/admin/chain", get(handlers::get_chain));

    let mut router = Router::new().merge(api_routes);

    // When enabled, this endpoint must be network-restricted to the
    // Prometheus scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
