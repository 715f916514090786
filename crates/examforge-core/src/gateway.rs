//! Manual grading gateway.
//!
//! Validates a grader's submission as a whole before any of it is applied.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{DenyReason, EngineError};
use crate::model::{AssessmentDefinition, GradeEntry, QuestionKind};

/// A grader's evaluation of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub grader_id: String,
    /// One entry per subjective question.
    #[serde(default)]
    pub marks: Vec<GradeEntry>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl Grading {
    /// Feedback with blank text treated as absent.
    pub fn normalized_feedback(&self) -> Option<String> {
        self.feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    }

    pub fn entry(&self, question_id: &str) -> Option<&GradeEntry> {
        self.marks.iter().find(|e| e.question_id == question_id)
    }
}

/// Check a grading against its definition.
///
/// Rejects the whole grading on the first problem; nothing is partially
/// accepted.
pub fn check_grading(
    definition: &AssessmentDefinition,
    grading: &Grading,
) -> Result<(), EngineError> {
    if !definition.grader_allowed(&grading.grader_id) {
        return Err(EngineError::AccessDenied(DenyReason::GraderNotAuthorized));
    }

    let mut seen = HashSet::new();
    for entry in &grading.marks {
        let question = definition
            .question(&entry.question_id)
            .ok_or_else(|| EngineError::UnknownQuestion(entry.question_id.clone()))?;
        if question.kind != QuestionKind::Subjective {
            return Err(EngineError::NotSubjective(entry.question_id.clone()));
        }
        if !seen.insert(entry.question_id.as_str()) {
            return Err(EngineError::DuplicateMarks(entry.question_id.clone()));
        }
        let in_range = entry.marks_awarded.is_finite()
            && entry.marks_awarded >= 0.0
            && entry.marks_awarded <= question.max_marks;
        if !in_range {
            return Err(EngineError::MarksOutOfRange {
                question_id: entry.question_id.clone(),
                awarded: entry.marks_awarded,
                max: question.max_marks,
            });
        }
    }

    if let Some(missing) = definition
        .questions
        .iter()
        .find(|q| q.kind == QuestionKind::Subjective && !seen.contains(q.id.as_str()))
    {
        return Err(EngineError::MissingMarks(missing.id.clone()));
    }

    Ok(())
}
