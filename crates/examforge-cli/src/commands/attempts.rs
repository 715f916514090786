//! The `examforge attempts` command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use comfy_table::{Cell, Table};

use examforge_core::model::{Attempt, AttemptStatus};
use examforge_core::traits::AttemptStore;
use examforge_store::SqliteStore;

pub async fn execute(db: PathBuf, assessment_id: String, status: Option<String>) -> Result<()> {
    if !db.exists() {
        anyhow::bail!("attempt database not found: {}", db.display());
    }
    let status = status
        .map(|s| s.parse::<AttemptStatus>().map_err(|e| anyhow!(e)))
        .transpose()?;

    let store = SqliteStore::open(&db)?;
    let attempts = store.list(&assessment_id, status).await?;

    if attempts.is_empty() {
        println!("No attempts found for assessment {assessment_id}.");
        return Ok(());
    }

    println!("{}", attempts_table(&attempts));
    println!("{} attempt(s)", attempts.len());
    Ok(())
}

fn attempts_table(attempts: &[Attempt]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Attempt",
        "Student",
        "Status",
        "Score",
        "Started",
        "Submitted",
        "Grader",
    ]);

    for attempt in attempts {
        table.add_row(vec![
            Cell::new(attempt.id),
            Cell::new(&attempt.student_id),
            Cell::new(attempt.status),
            Cell::new(format!("{:.2}", attempt.total_score)),
            Cell::new(attempt.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(
                attempt
                    .submitted_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(attempt.grader_id.as_deref().unwrap_or("-")),
        ]);
    }

    table
}
