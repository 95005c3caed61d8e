//! HTTP API module.
//!
//! REST endpoints for submitting, inspecting and cancelling jobs.

mod jobs;
mod metrics;
mod types;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use types::{ApiResponse, AppState};

/// Create CORS layer based on environment configuration.
/// Set CORS_ALLOW_ORIGIN (comma-separated origins) to restrict; otherwise
/// all origins are allowed.
fn create_cors_layer() -> CorsLayer {
    match std::env::var("CORS_ALLOW_ORIGIN").ok() {
        Some(origins) if !origins.is_empty() && origins != "*" => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        }
        _ => CorsLayer::permissive(),
    }
}

/// Create the HTTP router with all API routes.
pub fn create_router(state: AppState) -> Router {
    metrics::init_start_time();

    Router::new()
        .route("/jobs", post(jobs::submit_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/stats", get(metrics::get_stats))
        .route("/health", get(metrics::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
}
