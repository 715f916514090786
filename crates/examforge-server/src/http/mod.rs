//! HTTP server module

mod api;
mod attempts;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use api::HealthResponse;
pub use attempts::{ListAttemptsQuery, SaveAnswerRequest, StartAttemptRequest, STUDENT_HEADER};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route(
            "/api/assessments/:assessment_id/attempts",
            post(attempts::start).get(attempts::list),
        )
        .route(
            "/api/assessments/:assessment_id/students/:student_id/attempt",
            get(attempts::find),
        )
        .route("/api/attempts/:attempt_id", get(attempts::get))
        .route(
            "/api/attempts/:attempt_id/answers/:question_id",
            put(attempts::save_answer),
        )
        .route("/api/attempts/:attempt_id/submit", post(attempts::submit))
        .route(
            "/api/attempts/:attempt_id/evaluate",
            post(attempts::evaluate),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
