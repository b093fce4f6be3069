use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};

/// Create the application router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Transaction ingestion
        .route("/webhook", post(handlers::receive_webhook))
        // Status endpoints
        .route("/raw", get(handlers::get_raw))
        .route("/", get(handlers::get_index))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
