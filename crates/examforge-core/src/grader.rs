//! Automatic scoring of objective questions.
//!
//! Scoring is exact and all-or-nothing: no partial credit, no fuzzy
//! matching, no case folding beyond what the canonical value encodes.

use serde::{Deserialize, Serialize};

use crate::model::{AnswerValue, GradingOutcome, Question, QuestionKind};

/// Outcome and marks for a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub outcome: GradingOutcome,
    pub marks_awarded: f64,
}

impl Score {
    fn pending() -> Self {
        Self {
            outcome: GradingOutcome::Pending,
            marks_awarded: 0.0,
        }
    }

    fn incorrect() -> Self {
        Self {
            outcome: GradingOutcome::Incorrect,
            marks_awarded: 0.0,
        }
    }
}

/// Score `value` against `question`.
///
/// Subjective questions are left pending with zero marks. An unanswered
/// objective question, or one without a canonical answer, scores incorrect.
pub fn score(question: &Question, value: Option<&AnswerValue>) -> Score {
    if question.kind == QuestionKind::Subjective {
        return Score::pending();
    }

    match (question.answer.as_ref(), value) {
        (Some(canonical), Some(submitted)) if answers_match(canonical, submitted) => Score {
            outcome: GradingOutcome::Correct,
            marks_awarded: question.max_marks,
        },
        _ => Score::incorrect(),
    }
}

/// Structural equality, defined per variant.
pub fn answers_match(canonical: &AnswerValue, submitted: &AnswerValue) -> bool {
    match (canonical, submitted) {
        (AnswerValue::Scalar(a), AnswerValue::Scalar(b)) => a == b,
        (AnswerValue::MultiSelect(a), AnswerValue::MultiSelect(b)) => a == b,
        (AnswerValue::FreeText(a), AnswerValue::FreeText(b)) => a == b,
        _ => false,
    }
}
