pub mod admission_review;
pub(crate) mod api_error;
pub(crate) mod handlers;
pub(crate) mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use handlers::{health_handler, mutate_handler, validate_handler};
use state::ApiServerState;

/// Largest AdmissionReview accepted. An UPDATE review carries both `object`
/// and `oldObject`, each up to the ~1.5 MiB etcd allows.
pub const MAX_REVIEW_BODY_BYTES: usize = 8 * 1024 * 1024;

pub(crate) fn router(state: Arc<ApiServerState>) -> Router {
    Router::new()
        .route("/validate", post(validate_handler))
        .route("/mutate", post(mutate_handler))
        .layer(DefaultBodyLimit::max(MAX_REVIEW_BODY_BYTES))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        // added after the trace layer: probes are not traced
        .route("/health", get(health_handler))
}
