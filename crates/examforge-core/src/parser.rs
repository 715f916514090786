//! TOML assessment definition parser.
//!
//! Loads assessment definitions from TOML files and directories, and
//! validates them.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{AccessPolicy, AnswerValue, AssessmentDefinition, Question, QuestionKind};

/// Intermediate TOML structure for parsing assessment files.
#[derive(Debug, Deserialize)]
struct TomlAssessmentFile {
    assessment: TomlAssessmentHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlAssessmentHeader {
    id: String,
    title: String,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_true")]
    published: bool,
    starts_at: String,
    ends_at: String,
    #[serde(default = "default_access")]
    access: String,
    #[serde(default)]
    students: Vec<String>,
    #[serde(default)]
    time_limit_secs: Option<u64>,
    #[serde(default)]
    graders: Vec<String>,
}

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_access() -> String {
    "public".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    kind: String,
    max_marks: f64,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    answer: Option<AnswerValue>,
}

/// Parse a single TOML file into an `AssessmentDefinition`.
pub fn parse_assessment(path: &Path) -> Result<AssessmentDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assessment file: {}", path.display()))?;

    parse_assessment_str(&content, path)
}

/// Parse a TOML string into an `AssessmentDefinition` (useful for testing).
pub fn parse_assessment_str(content: &str, source_path: &Path) -> Result<AssessmentDefinition> {
    let parsed: TomlAssessmentFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    let header = parsed.assessment;

    let access = match header.access.to_lowercase().as_str() {
        "public" => AccessPolicy::Public,
        "assigned" => AccessPolicy::Assigned {
            students: header.students.into_iter().collect::<BTreeSet<_>>(),
        },
        other => anyhow::bail!("unknown access policy: {other}"),
    };

    let mut seen_ids = HashSet::new();
    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let kind: QuestionKind = q.kind.parse().map_err(|e: String| anyhow::anyhow!("{}", e))?;
            if !q.max_marks.is_finite() || q.max_marks < 0.0 {
                anyhow::bail!(
                    "question {}: max_marks must be a finite, non-negative number, got {}",
                    q.id,
                    q.max_marks
                );
            }
            if !seen_ids.insert(q.id.clone()) {
                anyhow::bail!("duplicate question ID: {}", q.id);
            }
            Ok(Question {
                id: q.id,
                kind,
                max_marks: q.max_marks,
                answer: q.answer,
                prompt: q.prompt,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AssessmentDefinition {
        id: header.id,
        title: header.title,
        version: header.version,
        published: header.published,
        starts_at: parse_instant("starts_at", &header.starts_at)?,
        ends_at: parse_instant("ends_at", &header.ends_at)?,
        access,
        time_limit_secs: header.time_limit_secs,
        graders: header.graders,
        questions,
    })
}

fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{field} is not an RFC 3339 timestamp: {value}"))
}

/// Recursively load all `.toml` assessment files from a directory.
pub fn load_assessment_directory(dir: &Path) -> Result<Vec<AssessmentDefinition>> {
    let mut definitions = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            definitions.extend(load_assessment_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_assessment(&path) {
                Ok(definition) => definitions.push(definition),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(definitions)
}

/// A warning from assessment validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn assessment(message: impl Into<String>) -> Self {
        Self {
            question_id: None,
            message: message.into(),
        }
    }

    fn question(id: &str, message: impl Into<String>) -> Self {
        Self {
            question_id: Some(id.to_string()),
            message: message.into(),
        }
    }
}

/// Validate an assessment definition for common issues.
pub fn validate_assessment(definition: &AssessmentDefinition) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if definition.ends_at < definition.starts_at {
        warnings.push(ValidationWarning::assessment(
            "ends_at is before starts_at; the assessment can never be attempted",
        ));
    }

    if let AccessPolicy::Assigned { students } = &definition.access {
        if students.is_empty() {
            warnings.push(ValidationWarning::assessment(
                "access is assigned but no students are listed",
            ));
        }
    }

    if definition.questions.is_empty() {
        warnings.push(ValidationWarning::assessment(
            "assessment has no questions; submissions are evaluated immediately with score 0",
        ));
    }

    if definition.time_limit_secs == Some(0) {
        warnings.push(ValidationWarning::assessment(
            "time_limit_secs is 0; attempts close as soon as they start",
        ));
    }

    for question in &definition.questions {
        match (question.kind, &question.answer) {
            (QuestionKind::Objective, None) => warnings.push(ValidationWarning::question(
                &question.id,
                "objective question has no canonical answer and can never be scored correct",
            )),
            (QuestionKind::Subjective, Some(_)) => warnings.push(ValidationWarning::question(
                &question.id,
                "subjective question has a canonical answer, which will be ignored",
            )),
            _ => {}
        }
    }

    warnings
}
