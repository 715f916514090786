//! Attempt engine orchestrator.
//!
//! Composes the catalog, the access window guard, the store and the state
//! machine into the five caller-facing operations: start, save, submit,
//! evaluate and get.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access;
use crate::clock::{Clock, SystemClock};
use crate::error::{DenyReason, EngineError};
use crate::events::{AttemptEvents, NoopEvents};
use crate::gateway::Grading;
use crate::model::{AnswerValue, AssessmentDefinition, Attempt, AttemptId, AttemptStatus};
use crate::traits::{AssessmentCatalog, AttemptStore};

/// Configuration for the attempt engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest accepted answer payload.
    #[serde(default = "default_max_answer_bytes")]
    pub max_answer_bytes: usize,
    /// Largest accepted grader feedback or comment.
    #[serde(default = "default_max_feedback_bytes")]
    pub max_feedback_bytes: usize,
}

fn default_max_answer_bytes() -> usize {
    64 * 1024
}

fn default_max_feedback_bytes() -> usize {
    16 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_answer_bytes: default_max_answer_bytes(),
            max_feedback_bytes: default_max_feedback_bytes(),
        }
    }
}

/// Acknowledgement of a saved answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAnswer {
    pub attempt_id: AttemptId,
    pub question_id: String,
    pub saved_at: DateTime<Utc>,
}

/// The attempt lifecycle engine.
pub struct AttemptEngine {
    catalog: Arc<dyn AssessmentCatalog>,
    store: Arc<dyn AttemptStore>,
    events: Arc<dyn AttemptEvents>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl AttemptEngine {
    pub fn new(
        catalog: Arc<dyn AssessmentCatalog>,
        store: Arc<dyn AttemptStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            events: Arc::new(NoopEvents),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn AttemptEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Start (or rejoin) a student's attempt.
    ///
    /// A student who already holds an attempt gets
    /// [`EngineError::AlreadyStarted`] carrying the existing id.
    pub async fn start_attempt(
        &self,
        assessment_id: &str,
        student_id: &str,
    ) -> Result<Attempt, EngineError> {
        let definition = self.definition(assessment_id).await?;
        let now = self.clock.now();

        if let Err(e) = access::can_attempt(&definition, student_id, now).into_result() {
            tracing::warn!(assessment_id, student_id, "start denied: {e}");
            return Err(e);
        }

        match self
            .store
            .start(Attempt::new(&definition, student_id, now))
            .await
        {
            Ok(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    assessment_id,
                    student_id,
                    "attempt started"
                );
                Ok(attempt)
            }
            Err(e) => {
                if let Some(existing) = e.existing_attempt() {
                    tracing::info!(
                        attempt_id = %existing,
                        assessment_id,
                        student_id,
                        "attempt already started"
                    );
                }
                Err(e)
            }
        }
    }

    /// Persist one answer. Last write wins.
    pub async fn save_answer(
        &self,
        attempt_id: AttemptId,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<SavedAnswer, EngineError> {
        if value.payload_len() > self.config.max_answer_bytes {
            return Err(EngineError::PayloadTooLarge {
                field: "answer",
                limit: self.config.max_answer_bytes,
            });
        }

        let (attempt, definition) = self.load(attempt_id).await?;
        if definition.question(question_id).is_none() {
            return Err(EngineError::UnknownQuestion(question_id.to_string()));
        }
        let now = self.clock.now();
        access::check_open(&definition, &attempt, now)?;

        let record = self
            .store
            .save_answer(attempt_id, question_id, value, now)
            .await?;
        tracing::debug!(%attempt_id, question_id, "answer saved");

        Ok(SavedAnswer {
            attempt_id,
            question_id: record.question_id,
            saved_at: record.saved_at.unwrap_or(now),
        })
    }

    /// Freeze the attempt and auto-grade it.
    pub async fn submit_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, EngineError> {
        let (attempt, definition) = self.load(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            tracing::warn!(%attempt_id, status = %attempt.status, "duplicate submit rejected");
            return Err(EngineError::AlreadySubmitted(attempt_id));
        }
        let now = self.clock.now();
        access::check_open(&definition, &attempt, now)?;

        let attempt = self.store.submit(attempt_id, &definition, now).await?;
        tracing::info!(
            %attempt_id,
            status = %attempt.status,
            total_score = attempt.total_score,
            "attempt submitted"
        );

        self.events.attempt_submitted(attempt_id);
        if attempt.status == AttemptStatus::Evaluated {
            self.events
                .attempt_evaluated(attempt_id, attempt.total_score);
        }
        Ok(attempt)
    }

    /// Apply a grader's marks and finalize the attempt.
    pub async fn evaluate_attempt(
        &self,
        attempt_id: AttemptId,
        grading: Grading,
    ) -> Result<Attempt, EngineError> {
        let limit = self.config.max_feedback_bytes;
        let too_long = grading.feedback.as_ref().is_some_and(|f| f.len() > limit)
            || grading
                .marks
                .iter()
                .filter_map(|m| m.comment.as_ref())
                .any(|c| c.len() > limit);
        if too_long {
            return Err(EngineError::PayloadTooLarge {
                field: "feedback",
                limit,
            });
        }

        let (_, definition) = self.load(attempt_id).await?;
        let now = self.clock.now();

        let modified = self
            .store
            .finalize(attempt_id, &definition, &grading, now)
            .await
            .inspect_err(|e| {
                tracing::warn!(%attempt_id, grader_id = %grading.grader_id, "evaluation rejected: {e}");
            })?;

        if modified.changed {
            tracing::info!(
                %attempt_id,
                grader_id = %grading.grader_id,
                total_score = modified.attempt.total_score,
                "attempt evaluated"
            );
            self.events
                .attempt_evaluated(attempt_id, modified.attempt.total_score);
        } else {
            tracing::debug!(%attempt_id, "identical re-evaluation ignored");
        }
        Ok(modified.attempt)
    }

    pub async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, EngineError> {
        self.store
            .get(attempt_id)
            .await?
            .ok_or_else(|| EngineError::AttemptNotFound(attempt_id.to_string()))
    }

    pub async fn find_attempt(
        &self,
        assessment_id: &str,
        student_id: &str,
    ) -> Result<Attempt, EngineError> {
        self.store
            .find_by_key(assessment_id, student_id)
            .await?
            .ok_or_else(|| EngineError::AttemptNotFound(format!("{assessment_id}/{student_id}")))
    }

    /// Attempts for an assessment, e.g. the grader's queue of `submitted` ones.
    pub async fn list_attempts(
        &self,
        assessment_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<Attempt>, EngineError> {
        self.definition(assessment_id).await?;
        self.store.list(assessment_id, status).await
    }

    /// Fail unless `student_id` owns the attempt.
    pub async fn check_owner(
        &self,
        attempt_id: AttemptId,
        student_id: &str,
    ) -> Result<(), EngineError> {
        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.student_id != student_id {
            tracing::warn!(%attempt_id, student_id, "caller does not own attempt");
            return Err(EngineError::AccessDenied(DenyReason::NotOwner));
        }
        Ok(())
    }

    async fn definition(&self, assessment_id: &str) -> Result<Arc<AssessmentDefinition>, EngineError> {
        self.catalog
            .get_definition(assessment_id)
            .await?
            .ok_or_else(|| EngineError::AssessmentNotFound(assessment_id.to_string()))
    }

    async fn load(
        &self,
        attempt_id: AttemptId,
    ) -> Result<(Attempt, Arc<AssessmentDefinition>), EngineError> {
        let attempt = self.get_attempt(attempt_id).await?;
        let definition = self.definition(&attempt.assessment_id).await?;
        Ok((attempt, definition))
    }
}
