//! Attempt state machine.
//!
//! ```text
//! in_progress --submit--> submitted --evaluate--> evaluated
//!      \________submit (all objective)________/
//! ```
//!
//! Every transition is a plain function over `&mut Attempt`. Stores run them
//! inside their atomic read-modify-write, so a transition that returns an
//! error leaves the stored attempt untouched.

use chrono::{DateTime, Utc};

use crate::error::{EngineError, FrozenReason};
use crate::gateway::{check_grading, Grading};
use crate::grader;
use crate::model::{
    AnswerRecord, AnswerValue, AssessmentDefinition, Attempt, AttemptStatus, GradingOutcome,
    QuestionKind,
};

/// Whether a transition changed the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

/// Fail if the catalog now serves a different version than the attempt was
/// started against.
pub fn ensure_bound(attempt: &Attempt, definition: &AssessmentDefinition) -> Result<(), EngineError> {
    if attempt.definition_version != definition.version {
        return Err(EngineError::DefinitionChanged {
            assessment_id: definition.id.clone(),
            bound: attempt.definition_version,
            current: definition.version,
        });
    }
    Ok(())
}

/// Store `value` as the answer to `question_id`. Last write wins.
pub fn record_answer(
    attempt: &mut Attempt,
    question_id: &str,
    value: AnswerValue,
    saved_at: DateTime<Utc>,
) -> Result<(), EngineError> {
    if attempt.status != AttemptStatus::InProgress {
        return Err(EngineError::NotMutable {
            attempt_id: attempt.id,
            reason: FrozenReason::Status(attempt.status),
        });
    }
    let answer = attempt
        .answer_mut(question_id)
        .ok_or_else(|| EngineError::UnknownQuestion(question_id.to_string()))?;
    answer.value = Some(value);
    answer.saved_at = Some(saved_at);
    Ok(())
}

/// Freeze the attempt and auto-grade every objective answer.
///
/// When no question needs a human the attempt goes straight to
/// `evaluated` in this same call.
pub fn submit(
    attempt: &mut Attempt,
    definition: &AssessmentDefinition,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    ensure_bound(attempt, definition)?;
    if attempt.status != AttemptStatus::InProgress {
        return Err(EngineError::AlreadySubmitted(attempt.id));
    }

    for answer in &mut attempt.answers {
        let question = definition
            .question(&answer.question_id)
            .ok_or_else(|| EngineError::UnknownQuestion(answer.question_id.clone()))?;
        let score = grader::score(question, answer.value.as_ref());
        answer.outcome = score.outcome;
        answer.marks_awarded = score.marks_awarded;
    }

    attempt.total_score = attempt.marks_sum();
    attempt.submitted_at = Some(now);
    if definition.is_all_objective() {
        attempt.status = AttemptStatus::Evaluated;
        attempt.evaluated_at = Some(now);
    } else {
        attempt.status = AttemptStatus::Submitted;
    }
    Ok(())
}

/// Apply a grader's marks and finalize the attempt.
///
/// On an already evaluated attempt this is a no-op when the grading would
/// produce exactly the stored result, and a conflict otherwise.
pub fn evaluate(
    attempt: &mut Attempt,
    definition: &AssessmentDefinition,
    grading: &Grading,
    now: DateTime<Utc>,
) -> Result<Applied, EngineError> {
    ensure_bound(attempt, definition)?;
    if attempt.status == AttemptStatus::InProgress {
        return Err(EngineError::NotSubmitted(attempt.id));
    }
    check_grading(definition, grading)?;

    let answers: Vec<AnswerRecord> = attempt
        .answers
        .iter()
        .map(|answer| merge_grade(answer, grading))
        .collect();
    let feedback = grading.normalized_feedback();

    if attempt.status == AttemptStatus::Evaluated {
        if answers == attempt.answers && feedback == attempt.feedback {
            return Ok(Applied::Unchanged);
        }
        return Err(EngineError::EvaluationConflict(attempt.id));
    }

    attempt.answers = answers;
    attempt.total_score = attempt.marks_sum();
    attempt.feedback = feedback;
    attempt.grader_id = Some(grading.grader_id.clone());
    attempt.status = AttemptStatus::Evaluated;
    attempt.evaluated_at = Some(now);
    Ok(Applied::Changed)
}

fn merge_grade(answer: &AnswerRecord, grading: &Grading) -> AnswerRecord {
    let mut merged = answer.clone();
    if answer.kind != QuestionKind::Subjective {
        return merged;
    }
    if let Some(entry) = grading.entry(&answer.question_id) {
        merged.outcome = GradingOutcome::Graded;
        merged.marks_awarded = entry.marks_awarded;
        merged.comment = entry
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
    }
    merged
}
