//! Core data model types for examforge.
//!
//! Assessment definitions are owned by the catalog and never mutated here.
//! Attempts are owned exclusively by the engine.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a stored attempt.
pub type AttemptId = Uuid;

/// Whether a question is graded by exact comparison or by a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Objective,
    Subjective,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Objective => "objective",
            QuestionKind::Subjective => "subjective",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "objective" | "mcq" => Ok(QuestionKind::Objective),
            "subjective" | "essay" => Ok(QuestionKind::Subjective),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

/// A submitted or canonical answer.
///
/// Comparison is per variant: a `Scalar` never equals a `FreeText` even if
/// the strings are the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// A single selected option or short exact answer.
    Scalar(String),
    /// A set of selected options; order is irrelevant.
    MultiSelect(BTreeSet<String>),
    /// Free-form text.
    FreeText(String),
}

impl AnswerValue {
    /// Approximate payload size in bytes, used for request limits.
    pub fn payload_len(&self) -> usize {
        match self {
            AnswerValue::Scalar(s) | AnswerValue::FreeText(s) => s.len(),
            AnswerValue::MultiSelect(items) => items.iter().map(|i| i.len()).sum(),
        }
    }
}

/// Who may attempt an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccessPolicy {
    Public,
    Assigned { students: BTreeSet<String> },
}

impl AccessPolicy {
    pub fn permits(&self, student_id: &str) -> bool {
        match self {
            AccessPolicy::Public => true,
            AccessPolicy::Assigned { students } => students.contains(student_id),
        }
    }
}

/// A single question inside an assessment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier, unique within the assessment.
    pub id: String,
    pub kind: QuestionKind,
    /// Maximum marks (finite, non-negative).
    pub max_marks: f64,
    /// Canonical answer; present for objective questions only.
    #[serde(default)]
    pub answer: Option<AnswerValue>,
    /// Question text shown to students.
    #[serde(default)]
    pub prompt: String,
}

/// An immutable, versioned assessment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDefinition {
    pub id: String,
    pub title: String,
    /// Bumped on every republication.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub published: bool,
    /// Start of the access window (inclusive).
    pub starts_at: DateTime<Utc>,
    /// End of the access window (inclusive).
    pub ends_at: DateTime<Utc>,
    pub access: AccessPolicy,
    /// Per-attempt duration cap, counted from `started_at`.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    /// Graders allowed to evaluate; empty means any grader.
    #[serde(default)]
    pub graders: Vec<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

fn default_version() -> u32 {
    1
}

impl AssessmentDefinition {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// True when nothing in this assessment needs a human grader.
    ///
    /// An assessment without questions counts as all-objective.
    pub fn is_all_objective(&self) -> bool {
        self.questions
            .iter()
            .all(|q| q.kind == QuestionKind::Objective)
    }

    pub fn max_score(&self) -> f64 {
        self.questions.iter().map(|q| q.max_marks).sum()
    }

    pub fn grader_allowed(&self, grader_id: &str) -> bool {
        self.graders.is_empty() || self.graders.iter().any(|g| g == grader_id)
    }
}

/// Attempt status. Only ever advances forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Evaluated,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "submitted" => Ok(AttemptStatus::Submitted),
            "evaluated" => Ok(AttemptStatus::Evaluated),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Grading outcome of a single answer.
///
/// Objective answers use `Ungraded`, `Correct`, `Incorrect`; subjective
/// answers use `Pending` and `Graded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingOutcome {
    Ungraded,
    Correct,
    Incorrect,
    Pending,
    Graded,
}

impl GradingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingOutcome::Ungraded => "ungraded",
            GradingOutcome::Correct => "correct",
            GradingOutcome::Incorrect => "incorrect",
            GradingOutcome::Pending => "pending",
            GradingOutcome::Graded => "graded",
        }
    }

    /// Initial outcome for a freshly created answer of the given kind.
    pub fn initial(kind: QuestionKind) -> Self {
        match kind {
            QuestionKind::Objective => GradingOutcome::Ungraded,
            QuestionKind::Subjective => GradingOutcome::Pending,
        }
    }
}

impl fmt::Display for GradingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradingOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ungraded" => Ok(GradingOutcome::Ungraded),
            "correct" => Ok(GradingOutcome::Correct),
            "incorrect" => Ok(GradingOutcome::Incorrect),
            "pending" => Ok(GradingOutcome::Pending),
            "graded" => Ok(GradingOutcome::Graded),
            other => Err(format!("unknown grading outcome: {other}")),
        }
    }
}

/// One student's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub kind: QuestionKind,
    /// `None` until the student saves something.
    #[serde(default)]
    pub value: Option<AnswerValue>,
    pub outcome: GradingOutcome,
    pub marks_awarded: f64,
    /// Grader comment for subjective answers.
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    /// An unanswered record for `question`.
    pub fn blank(question: &Question) -> Self {
        Self {
            question_id: question.id.clone(),
            kind: question.kind,
            value: None,
            outcome: GradingOutcome::initial(question.kind),
            marks_awarded: 0.0,
            comment: None,
            saved_at: None,
        }
    }
}

/// A student's single attempt at a single assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub assessment_id: String,
    pub student_id: String,
    /// Definition version the attempt was started against.
    pub definition_version: u32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Derived from the answers; never set directly by clients.
    pub total_score: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub grader_id: Option<String>,
    /// One record per question, in definition order.
    pub answers: Vec<AnswerRecord>,
}

impl Attempt {
    /// A fresh in-progress attempt with a blank record for every question.
    pub fn new(definition: &AssessmentDefinition, student_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            assessment_id: definition.id.clone(),
            student_id: student_id.to_string(),
            definition_version: definition.version,
            status: AttemptStatus::InProgress,
            started_at: now,
            submitted_at: None,
            evaluated_at: None,
            total_score: 0.0,
            feedback: None,
            grader_id: None,
            answers: definition.questions.iter().map(AnswerRecord::blank).collect(),
        }
    }

    pub fn answer(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    pub fn answer_mut(&mut self, question_id: &str) -> Option<&mut AnswerRecord> {
        self.answers.iter_mut().find(|a| a.question_id == question_id)
    }

    pub fn marks_sum(&self) -> f64 {
        self.answers.iter().map(|a| a.marks_awarded).sum()
    }

    /// Holds for every submitted or evaluated attempt.
    pub fn is_score_consistent(&self) -> bool {
        self.status == AttemptStatus::InProgress || self.total_score == self.marks_sum()
    }
}

/// Grader-supplied marks for one subjective question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub question_id: String,
    pub marks_awarded: f64,
    #[serde(default)]
    pub comment: Option<String>,
}
