use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::dispatch::dispatch;
use super::handlers::*;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // System routes
        .route("/health", get(health_check_handler))
        .route("/_api/status", get(status_handler))
        .route("/acceptsurl", post(accepts_url_handler))
        // Session bootstrap
        .route("/connection", post(connect_handler))
        // Every entity below a connection
        .route("/connection/{*path}", any(dispatch))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
