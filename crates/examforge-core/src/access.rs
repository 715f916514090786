//! Access window guard.
//!
//! Pure predicates deciding whether a student may start or keep working on
//! an attempt at a given instant. No I/O, no clock: `now` is always passed in.

use chrono::{DateTime, Duration, Utc};

use crate::error::{DenyReason, EngineError, FrozenReason};
use crate::model::{AssessmentDefinition, Attempt};

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(DenyReason),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allowed)
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            Access::Allowed => Ok(()),
            Access::Denied(reason) => Err(EngineError::AccessDenied(reason)),
        }
    }
}

/// Decide whether `student_id` may attempt `definition` at `now`.
///
/// The window is inclusive on both ends: `now == starts_at` and
/// `now == ends_at` are both allowed.
pub fn can_attempt(
    definition: &AssessmentDefinition,
    student_id: &str,
    now: DateTime<Utc>,
) -> Access {
    if !definition.published {
        return Access::Denied(DenyReason::NotPublished);
    }
    if !definition.access.permits(student_id) {
        return Access::Denied(DenyReason::NotPermitted);
    }
    if now < definition.starts_at {
        return Access::Denied(DenyReason::BeforeWindow);
    }
    if now > definition.ends_at {
        return Access::Denied(DenyReason::AfterWindow);
    }
    Access::Allowed
}

/// Last instant at which `attempt` may still be changed.
///
/// The earlier of the window end and `started_at + time_limit_secs`.
pub fn attempt_deadline(definition: &AssessmentDefinition, attempt: &Attempt) -> DateTime<Utc> {
    let limit = definition
        .time_limit_secs
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(Duration::try_seconds)
        .and_then(|limit| attempt.started_at.checked_add_signed(limit));

    match limit {
        Some(limit) if limit < definition.ends_at => limit,
        _ => definition.ends_at,
    }
}

/// Check that an existing attempt may still be saved to or submitted.
///
/// A closed window freezes the attempt; that is reported as
/// [`FrozenReason::WindowClosed`] rather than as a plain denial so callers
/// can tell it apart from a status conflict.
pub fn check_open(
    definition: &AssessmentDefinition,
    attempt: &Attempt,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let frozen = || EngineError::NotMutable {
        attempt_id: attempt.id,
        reason: FrozenReason::WindowClosed,
    };

    match can_attempt(definition, &attempt.student_id, now) {
        Access::Allowed => {}
        Access::Denied(DenyReason::AfterWindow) => return Err(frozen()),
        Access::Denied(reason) => return Err(EngineError::AccessDenied(reason)),
    }

    if now > attempt_deadline(definition, attempt) {
        return Err(frozen());
    }
    Ok(())
}
