//! SQLite-backed attempt store.
//!
//! One row per attempt plus one row per answer. Every mutation runs in a
//! `BEGIN IMMEDIATE` transaction so concurrent writers (threads or
//! processes) serialize on the database write lock.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use tokio::runtime::{Handle, RuntimeFlavor};
use uuid::Uuid;

use examforge_core::error::FrozenReason;
use examforge_core::lifecycle::Applied;
use examforge_core::model::{
    AnswerRecord, AnswerValue, Attempt, AttemptId, AttemptStatus, GradingOutcome, QuestionKind,
};
use examforge_core::traits::{AttemptStore, InsertOutcome, Modified, Transition};
use examforge_core::EngineError;

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS attempts (
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            definition_version INTEGER NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            submitted_at TEXT,
            evaluated_at TEXT,
            total_score REAL NOT NULL,
            feedback TEXT,
            grader_id TEXT,
            UNIQUE (assessment_id, student_id)
        );

        CREATE TABLE IF NOT EXISTS answers (
            attempt_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            question_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            value TEXT,
            outcome TEXT NOT NULL,
            marks_awarded REAL NOT NULL,
            comment TEXT,
            saved_at TEXT,
            PRIMARY KEY (attempt_id, question_id),
            FOREIGN KEY (attempt_id) REFERENCES attempts(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_attempts_assessment_status
        ON attempts(assessment_id, status);
    ";

    /// Open or create an attempt database at the given path.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let db = Connection::open(path)
            .with_context(|| format!("Failed to open attempt store at {}", path.display()))?;
        let store = Self::initialize(db)?;
        tracing::info!(path = %path.display(), "opened sqlite attempt store");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory attempt store")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> anyhow::Result<Self> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )
        .context("Failed to set attempt store pragmas")?;
        db.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create attempt store schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, EngineError> {
        self.db
            .lock()
            .map_err(|_| EngineError::from(anyhow!("attempt store connection lock poisoned")))
    }
}

/// Run connection work where blocking is allowed.
///
/// On a multi-thread runtime the worker hands its other tasks off while
/// SQLite waits on locks or disk; elsewhere the work runs inline.
fn blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

fn begin(conn: &mut Connection) -> anyhow::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to start attempt store transaction")
}

fn ts(value: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches chronological order.
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in attempt store: {value}"))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

fn parse_enum<T: FromStr<Err = String>>(value: &str) -> anyhow::Result<T> {
    value.parse::<T>().map_err(|e| anyhow!(e))
}

struct AttemptRow {
    id: String,
    assessment_id: String,
    student_id: String,
    definition_version: u32,
    status: String,
    started_at: String,
    submitted_at: Option<String>,
    evaluated_at: Option<String>,
    total_score: f64,
    feedback: Option<String>,
    grader_id: Option<String>,
}

const ATTEMPT_COLUMNS: &str = "id, assessment_id, student_id, definition_version, status, \
     started_at, submitted_at, evaluated_at, total_score, feedback, grader_id";

impl AttemptRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            assessment_id: row.get(1)?,
            student_id: row.get(2)?,
            definition_version: row.get(3)?,
            status: row.get(4)?,
            started_at: row.get(5)?,
            submitted_at: row.get(6)?,
            evaluated_at: row.get(7)?,
            total_score: row.get(8)?,
            feedback: row.get(9)?,
            grader_id: row.get(10)?,
        })
    }

    fn into_attempt(self, answers: Vec<AnswerRecord>) -> anyhow::Result<Attempt> {
        Ok(Attempt {
            id: Uuid::parse_str(&self.id)
                .with_context(|| format!("Invalid attempt id: {}", self.id))?,
            assessment_id: self.assessment_id,
            student_id: self.student_id,
            definition_version: self.definition_version,
            status: parse_enum(&self.status)?,
            started_at: parse_ts(&self.started_at)?,
            submitted_at: parse_opt_ts(self.submitted_at)?,
            evaluated_at: parse_opt_ts(self.evaluated_at)?,
            total_score: self.total_score,
            feedback: self.feedback,
            grader_id: self.grader_id,
            answers,
        })
    }
}

fn load_answers(conn: &Connection, attempt_id: &str) -> anyhow::Result<Vec<AnswerRecord>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT question_id, kind, value, outcome, marks_awarded, comment, saved_at
             FROM answers
             WHERE attempt_id = ?1
             ORDER BY position ASC",
        )
        .context("Failed to prepare answer query")?;

    let rows = stmt
        .query_map(params![attempt_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .context("Failed to query answers")?;

    let mut answers = Vec::new();
    for row in rows {
        let (question_id, kind, value, outcome, marks_awarded, comment, saved_at) =
            row.context("Failed to read answer row")?;
        let value = value
            .map(|json| serde_json::from_str::<AnswerValue>(&json))
            .transpose()
            .with_context(|| format!("Invalid stored answer for question {question_id}"))?;
        answers.push(AnswerRecord {
            kind: parse_enum::<QuestionKind>(&kind)?,
            outcome: parse_enum::<GradingOutcome>(&outcome)?,
            value,
            marks_awarded,
            comment,
            saved_at: parse_opt_ts(saved_at)?,
            question_id,
        });
    }
    Ok(answers)
}

fn load_attempt(conn: &Connection, attempt_id: AttemptId) -> anyhow::Result<Option<Attempt>> {
    let id = attempt_id.to_string();
    let row = conn
        .query_row(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"),
            params![id],
            AttemptRow::from_row,
        )
        .optional()
        .context("Failed to query attempt")?;
    match row {
        Some(row) => {
            let answers = load_answers(conn, &id)?;
            Ok(Some(row.into_attempt(answers)?))
        }
        None => Ok(None),
    }
}

fn load_by_key(
    conn: &Connection,
    assessment_id: &str,
    student_id: &str,
) -> anyhow::Result<Option<Attempt>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE assessment_id = ?1 AND student_id = ?2"
            ),
            params![assessment_id, student_id],
            AttemptRow::from_row,
        )
        .optional()
        .context("Failed to query attempt by key")?;
    match row {
        Some(row) => {
            let answers = load_answers(conn, &row.id)?;
            Ok(Some(row.into_attempt(answers)?))
        }
        None => Ok(None),
    }
}

fn write_answers(tx: &Transaction<'_>, attempt: &Attempt) -> anyhow::Result<()> {
    let id = attempt.id.to_string();
    let mut stmt = tx
        .prepare_cached(
            "INSERT INTO answers
                (attempt_id, position, question_id, kind, value, outcome, marks_awarded, comment, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                position = excluded.position,
                kind = excluded.kind,
                value = excluded.value,
                outcome = excluded.outcome,
                marks_awarded = excluded.marks_awarded,
                comment = excluded.comment,
                saved_at = excluded.saved_at",
        )
        .context("Failed to prepare answer upsert")?;

    for (position, answer) in attempt.answers.iter().enumerate() {
        let value = answer
            .value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode answer value")?;
        stmt.execute(params![
            id,
            position as i64,
            answer.question_id,
            answer.kind.as_str(),
            value,
            answer.outcome.as_str(),
            answer.marks_awarded,
            answer.comment,
            answer.saved_at.as_ref().map(ts),
        ])
        .with_context(|| format!("Failed to write answer {}", answer.question_id))?;
    }
    Ok(())
}

fn update_attempt(tx: &Transaction<'_>, attempt: &Attempt) -> anyhow::Result<()> {
    tx.execute(
        "UPDATE attempts SET
            status = ?2,
            submitted_at = ?3,
            evaluated_at = ?4,
            total_score = ?5,
            feedback = ?6,
            grader_id = ?7
         WHERE id = ?1",
        params![
            attempt.id.to_string(),
            attempt.status.as_str(),
            attempt.submitted_at.as_ref().map(ts),
            attempt.evaluated_at.as_ref().map(ts),
            attempt.total_score,
            attempt.feedback,
            attempt.grader_id,
        ],
    )
    .context("Failed to update attempt")?;
    write_answers(tx, attempt)
}

#[async_trait]
impl AttemptStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_if_absent(&self, attempt: Attempt) -> Result<InsertOutcome, EngineError> {
        blocking(|| -> Result<InsertOutcome, EngineError> {
            let mut conn = self.lock()?;
            let tx = begin(&mut conn)?;

            let inserted = tx
                .execute(
                    &format!(
                        "INSERT INTO attempts ({ATTEMPT_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                         ON CONFLICT (assessment_id, student_id) DO NOTHING"
                    ),
                    params![
                        attempt.id.to_string(),
                        attempt.assessment_id,
                        attempt.student_id,
                        attempt.definition_version,
                        attempt.status.as_str(),
                        ts(&attempt.started_at),
                        attempt.submitted_at.as_ref().map(ts),
                        attempt.evaluated_at.as_ref().map(ts),
                        attempt.total_score,
                        attempt.feedback,
                        attempt.grader_id,
                    ],
                )
                .context("Failed to insert attempt")?;

            if inserted == 0 {
                let existing = load_by_key(&tx, &attempt.assessment_id, &attempt.student_id)?
                    .ok_or_else(|| anyhow!("attempt key conflict without a stored attempt"))?;
                return Ok(InsertOutcome::Existing(existing));
            }

            write_answers(&tx, &attempt)?;
            tx.commit().context("Failed to commit attempt insert")?;
            Ok(InsertOutcome::Inserted(attempt))
        })
    }

    async fn get(&self, attempt_id: AttemptId) -> Result<Option<Attempt>, EngineError> {
        blocking(|| -> Result<Option<Attempt>, EngineError> {
            let conn = self.lock()?;
            Ok(load_attempt(&conn, attempt_id)?)
        })
    }

    async fn find_by_key(
        &self,
        assessment_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, EngineError> {
        blocking(|| -> Result<Option<Attempt>, EngineError> {
            let conn = self.lock()?;
            Ok(load_by_key(&conn, assessment_id, student_id)?)
        })
    }

    async fn list(
        &self,
        assessment_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<Attempt>, EngineError> {
        blocking(|| -> Result<Vec<Attempt>, EngineError> {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts
                     WHERE assessment_id = ?1 AND (?2 IS NULL OR status = ?2)
                     ORDER BY started_at ASC, id ASC"
                ))
                .context("Failed to prepare attempt list query")?;
            let rows = stmt
                .query_map(
                    params![assessment_id, status.map(|s| s.as_str())],
                    AttemptRow::from_row,
                )
                .context("Failed to list attempts")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read attempt row")?;

            let mut attempts = Vec::with_capacity(rows.len());
            for row in rows {
                let answers = load_answers(&conn, &row.id)?;
                attempts.push(row.into_attempt(answers)?);
            }
            Ok(attempts)
        })
    }

    async fn modify(
        &self,
        attempt_id: AttemptId,
        apply: Transition<'_>,
    ) -> Result<Modified, EngineError> {
        blocking(|| -> Result<Modified, EngineError> {
            let mut conn = self.lock()?;
            let tx = begin(&mut conn)?;

            let current = load_attempt(&tx, attempt_id)?
                .ok_or_else(|| EngineError::AttemptNotFound(attempt_id.to_string()))?;
            let mut working = current.clone();

            match apply(&mut working)? {
                Applied::Unchanged => Ok(Modified {
                    attempt: current,
                    changed: false,
                }),
                Applied::Changed => {
                    update_attempt(&tx, &working)?;
                    tx.commit().context("Failed to commit attempt update")?;
                    Ok(Modified {
                        attempt: working,
                        changed: true,
                    })
                }
            }
        })
    }

    /// Single-row update; avoids rewriting every answer on each autosave.
    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        question_id: &str,
        value: AnswerValue,
        saved_at: DateTime<Utc>,
    ) -> Result<AnswerRecord, EngineError> {
        blocking(|| -> Result<AnswerRecord, EngineError> {
            let mut conn = self.lock()?;
            let tx = begin(&mut conn)?;
            let id = attempt_id.to_string();

            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM attempts WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to query attempt status")?;
            let status: AttemptStatus = match status {
                Some(status) => parse_enum(&status)?,
                None => return Err(EngineError::AttemptNotFound(id)),
            };
            if status != AttemptStatus::InProgress {
                return Err(EngineError::NotMutable {
                    attempt_id,
                    reason: FrozenReason::Status(status),
                });
            }

            let json = serde_json::to_string(&value).context("Failed to encode answer value")?;
            let updated = tx
                .execute(
                    "UPDATE answers SET value = ?3, saved_at = ?4
                     WHERE attempt_id = ?1 AND question_id = ?2",
                    params![id, question_id, json, ts(&saved_at)],
                )
                .context("Failed to save answer")?;
            if updated == 0 {
                return Err(EngineError::UnknownQuestion(question_id.to_string()));
            }

            let record = load_answers(&tx, &id)?
                .into_iter()
                .find(|a| a.question_id == question_id)
                .ok_or_else(|| EngineError::UnknownQuestion(question_id.to_string()))?;
            tx.commit().context("Failed to commit answer save")?;
            Ok(record)
        })
    }
}
