//! Web server module.
//!
//! Thin HTTP layer over [`crate::intake`]: submission, status polling, and
//! the inbound and bounce webhooks from the mail provider.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use handlers::{
    bounce_webhook, health, inbound_webhook, status, submit_json, submit_query, AppState,
    HealthResponse, StatusResponse, Submission, SubmitResponse,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ajax/submit.json", post(submit_json).get(submit_query))
        .route("/ajax/status/:id", get(status))
        .route("/inbound", post(inbound_webhook))
        .route("/bounce", post(bounce_webhook))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
