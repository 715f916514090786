//! Collaborator traits.
//!
//! The engine reads assessment definitions through [`AssessmentCatalog`] and
//! persists attempts through [`AttemptStore`]. Implementations live in the
//! `examforge-store` crate (stores) and in [`crate::catalog`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::gateway::Grading;
use crate::lifecycle::{self, Applied};
use crate::model::{
    AnswerRecord, AnswerValue, AssessmentDefinition, Attempt, AttemptId, AttemptStatus,
};

// ---------------------------------------------------------------------------
// Assessment catalog
// ---------------------------------------------------------------------------

/// Read-only, versioned source of assessment definitions.
#[async_trait]
pub trait AssessmentCatalog: Send + Sync {
    /// Fetch a definition, or `None` if the catalog does not know the id.
    async fn get_definition(
        &self,
        assessment_id: &str,
    ) -> anyhow::Result<Option<Arc<AssessmentDefinition>>>;
}

// ---------------------------------------------------------------------------
// Attempt store
// ---------------------------------------------------------------------------

/// Result of a compare-and-insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The attempt was stored.
    Inserted(Attempt),
    /// Another attempt already holds the (assessment, student) key.
    Existing(Attempt),
}

/// Result of an atomic read-modify-write.
#[derive(Debug, Clone)]
pub struct Modified {
    /// The attempt as stored after the call.
    pub attempt: Attempt,
    /// False when the transition asked for no write.
    pub changed: bool,
}

/// A transition run under the store's per-attempt atomicity.
///
/// It receives a working copy of the stored attempt. Returning an error
/// discards the copy; returning [`Applied::Unchanged`] skips the write.
pub type Transition<'a> = &'a (dyn Fn(&mut Attempt) -> Result<Applied, EngineError> + Send + Sync);

/// Persistence boundary for attempts.
///
/// Implementations must guarantee:
/// - `insert_if_absent` is an atomic compare-and-insert on
///   `(assessment_id, student_id)`;
/// - `modify` serializes against every other mutation of the same attempt
///   and never exposes a half-applied transition.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Short backend name for logs (e.g. "sqlite").
    fn name(&self) -> &str;

    /// Store `attempt` unless its natural key is already taken.
    async fn insert_if_absent(&self, attempt: Attempt) -> Result<InsertOutcome, EngineError>;

    async fn get(&self, attempt_id: AttemptId) -> Result<Option<Attempt>, EngineError>;

    async fn find_by_key(
        &self,
        assessment_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, EngineError>;

    /// Attempts for an assessment, oldest first, optionally by status.
    async fn list(
        &self,
        assessment_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<Attempt>, EngineError>;

    /// Atomically apply `apply` to the stored attempt.
    async fn modify(
        &self,
        attempt_id: AttemptId,
        apply: Transition<'_>,
    ) -> Result<Modified, EngineError>;

    /// Create an attempt; a lost race reports the winner's id.
    async fn start(&self, attempt: Attempt) -> Result<Attempt, EngineError> {
        match self.insert_if_absent(attempt).await? {
            InsertOutcome::Inserted(attempt) => Ok(attempt),
            InsertOutcome::Existing(existing) => {
                Err(EngineError::AlreadyStarted { existing: existing.id })
            }
        }
    }

    /// Overwrite one answer while the attempt is in progress.
    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        question_id: &str,
        value: AnswerValue,
        saved_at: DateTime<Utc>,
    ) -> Result<AnswerRecord, EngineError> {
        let modified = self
            .modify(attempt_id, &|attempt: &mut Attempt| {
                lifecycle::record_answer(attempt, question_id, value.clone(), saved_at)
                    .map(|()| Applied::Changed)
            })
            .await?;
        modified
            .attempt
            .answer(question_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownQuestion(question_id.to_string()))
    }

    /// Freeze and auto-grade an attempt.
    async fn submit(
        &self,
        attempt_id: AttemptId,
        definition: &AssessmentDefinition,
        now: DateTime<Utc>,
    ) -> Result<Attempt, EngineError> {
        let modified = self
            .modify(attempt_id, &|attempt: &mut Attempt| {
                lifecycle::submit(attempt, definition, now).map(|()| Applied::Changed)
            })
            .await?;
        Ok(modified.attempt)
    }

    /// Apply a manual grading and finalize the attempt.
    async fn finalize(
        &self,
        attempt_id: AttemptId,
        definition: &AssessmentDefinition,
        grading: &Grading,
        now: DateTime<Utc>,
    ) -> Result<Modified, EngineError> {
        self.modify(attempt_id, &|attempt: &mut Attempt| {
            lifecycle::evaluate(attempt, definition, grading, now)
        })
        .await
    }
}
