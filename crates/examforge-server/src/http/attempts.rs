//! Attempt REST endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use examforge_core::engine::SavedAnswer;
use examforge_core::gateway::Grading;
use examforge_core::model::{AnswerValue, Attempt, AttemptStatus};

use crate::error::ApiError;
use crate::AppState;

/// Header a student uses to identify themselves on save and submit.
pub const STUDENT_HEADER: &str = "x-student-id";

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub student_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub value: AnswerValue,
}

/// Query params for attempt list
#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    pub status: Option<AttemptStatus>,
}

/// Reject the request if the caller named a student other than the owner.
async fn check_caller(
    state: &AppState,
    headers: &HeaderMap,
    attempt_id: Uuid,
) -> Result<(), ApiError> {
    let caller = headers
        .get(STUDENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(student_id) = caller {
        state.engine.check_owner(attempt_id, student_id).await?;
    }
    Ok(())
}

/// POST /api/assessments/:assessment_id/attempts
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(assessment_id): Path<String>,
    Json(request): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let attempt = state
        .engine
        .start_attempt(&assessment_id, &request.student_id)
        .await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

/// GET /api/assessments/:assessment_id/attempts
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(assessment_id): Path<String>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<Json<Vec<Attempt>>, ApiError> {
    let attempts = state
        .engine
        .list_attempts(&assessment_id, query.status)
        .await?;
    Ok(Json(attempts))
}

/// GET /api/assessments/:assessment_id/students/:student_id/attempt
pub async fn find(
    State(state): State<Arc<AppState>>,
    Path((assessment_id, student_id)): Path<(String, String)>,
) -> Result<Json<Attempt>, ApiError> {
    let attempt = state
        .engine
        .find_attempt(&assessment_id, &student_id)
        .await?;
    Ok(Json(attempt))
}

/// GET /api/attempts/:attempt_id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<Attempt>, ApiError> {
    Ok(Json(state.engine.get_attempt(attempt_id).await?))
}

/// PUT /api/attempts/:attempt_id/answers/:question_id
pub async fn save_answer(
    State(state): State<Arc<AppState>>,
    Path((attempt_id, question_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Json(request): Json<SaveAnswerRequest>,
) -> Result<Json<SavedAnswer>, ApiError> {
    check_caller(&state, &headers, attempt_id).await?;
    let saved = state
        .engine
        .save_answer(attempt_id, &question_id, request.value)
        .await?;
    Ok(Json(saved))
}

/// POST /api/attempts/:attempt_id/submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Attempt>, ApiError> {
    check_caller(&state, &headers, attempt_id).await?;
    Ok(Json(state.engine.submit_attempt(attempt_id).await?))
}

/// POST /api/attempts/:attempt_id/evaluate
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    Json(grading): Json<Grading>,
) -> Result<Json<Attempt>, ApiError> {
    Ok(Json(state.engine.evaluate_attempt(attempt_id, grading).await?))
}
