//! Engine error types.
//!
//! Every failure surfaces with an explicit [`ErrorKind`] so callers (and the
//! HTTP binding) can decide between waiting, refetching and fixing input
//! without string matching.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::{AttemptId, AttemptStatus};

/// Why the access window guard refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotPublished,
    BeforeWindow,
    AfterWindow,
    /// Assigned-only assessment and the student is not on the list.
    NotPermitted,
    /// The caller is not the student who owns the attempt.
    NotOwner,
    /// The grader is not on the assessment's grader list.
    GraderNotAuthorized,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotPublished => "not_published",
            DenyReason::BeforeWindow => "before_window",
            DenyReason::AfterWindow => "after_window",
            DenyReason::NotPermitted => "not_permitted",
            DenyReason::NotOwner => "not_owner",
            DenyReason::GraderNotAuthorized => "grader_not_authorized",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt no longer accepts answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrozenReason {
    Status(AttemptStatus),
    WindowClosed,
}

impl fmt::Display for FrozenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrozenReason::Status(status) => write!(f, "status is {status}"),
            FrozenReason::WindowClosed => f.write_str("access window closed"),
        }
    }
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    Conflict,
    Validation,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors returned by the attempt engine and its stores.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("access denied: {0}")]
    AccessDenied(DenyReason),

    /// The student already holds an attempt; `existing` is its id.
    #[error("attempt already started: {existing}")]
    AlreadyStarted { existing: AttemptId },

    #[error("attempt {attempt_id} does not accept answers: {reason}")]
    NotMutable {
        attempt_id: AttemptId,
        reason: FrozenReason,
    },

    #[error("attempt {0} has already been submitted")]
    AlreadySubmitted(AttemptId),

    #[error("attempt {0} has not been submitted")]
    NotSubmitted(AttemptId),

    #[error("attempt {0} was already evaluated with a different result")]
    EvaluationConflict(AttemptId),

    #[error("assessment {assessment_id} changed from version {bound} to {current} during the attempt")]
    DefinitionChanged {
        assessment_id: String,
        bound: u32,
        current: u32,
    },

    #[error("marks for question {question_id} out of range: {awarded} not in [0, {max}]")]
    MarksOutOfRange {
        question_id: String,
        awarded: f64,
        max: f64,
    },

    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    #[error("question {0} is objective and cannot be graded manually")]
    NotSubjective(String),

    #[error("duplicate marks for question {0}")]
    DuplicateMarks(String),

    #[error("missing marks for subjective question {0}")]
    MissingMarks(String),

    #[error("{field} exceeds {limit} bytes")]
    PayloadTooLarge { field: &'static str, limit: usize },

    #[error("attempt not found: {0}")]
    AttemptNotFound(String),

    #[error("assessment not found: {0}")]
    AssessmentNotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::AccessDenied(_) => ErrorKind::AccessDenied,
            EngineError::NotMutable {
                reason: FrozenReason::WindowClosed,
                ..
            } => ErrorKind::AccessDenied,
            EngineError::AlreadyStarted { .. }
            | EngineError::NotMutable { .. }
            | EngineError::AlreadySubmitted(_)
            | EngineError::NotSubmitted(_)
            | EngineError::EvaluationConflict(_)
            | EngineError::DefinitionChanged { .. } => ErrorKind::Conflict,
            EngineError::MarksOutOfRange { .. }
            | EngineError::UnknownQuestion(_)
            | EngineError::NotSubjective(_)
            | EngineError::DuplicateMarks(_)
            | EngineError::MissingMarks(_)
            | EngineError::PayloadTooLarge { .. } => ErrorKind::Validation,
            EngineError::AttemptNotFound(_) | EngineError::AssessmentNotFound(_) => {
                ErrorKind::NotFound
            }
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable snake_case code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::AccessDenied(reason) => reason.as_str(),
            EngineError::AlreadyStarted { .. } => "already_started",
            EngineError::NotMutable {
                reason: FrozenReason::WindowClosed,
                ..
            } => "window_closed",
            EngineError::NotMutable { .. } => "not_mutable",
            EngineError::AlreadySubmitted(_) => "already_submitted",
            EngineError::NotSubmitted(_) => "not_submitted",
            EngineError::EvaluationConflict(_) => "evaluation_conflict",
            EngineError::DefinitionChanged { .. } => "definition_changed",
            EngineError::MarksOutOfRange { .. } => "marks_out_of_range",
            EngineError::UnknownQuestion(_) => "unknown_question",
            EngineError::NotSubjective(_) => "not_subjective",
            EngineError::DuplicateMarks(_) => "duplicate_marks",
            EngineError::MissingMarks(_) => "missing_marks",
            EngineError::PayloadTooLarge { .. } => "payload_too_large",
            EngineError::AttemptNotFound(_) => "attempt_not_found",
            EngineError::AssessmentNotFound(_) => "assessment_not_found",
            EngineError::Internal(_) => "internal",
        }
    }

    /// The winner's attempt id when a start lost the race.
    ///
    /// This is the one recoverable error: the caller may carry on with the
    /// returned id as if its own start had succeeded.
    pub fn existing_attempt(&self) -> Option<AttemptId> {
        match self {
            EngineError::AlreadyStarted { existing } => Some(*existing),
            _ => None,
        }
    }
}
