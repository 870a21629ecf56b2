//! mcpshield HTTP ingress.
//!
//! Exposes the validation engine over REST: batch ingestion, synchronous
//! request/response validation, and a health probe.

pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete axum router with all API routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/ingestData", post(routes::ingest::ingest))
        .route("/validate/request", post(routes::validate::validate_request))
        .route(
            "/validate/response",
            post(routes::validate::validate_response),
        );

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
