//! The `examforge init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("examforge.toml").exists() {
        println!("examforge.toml already exists, skipping.");
    } else {
        std::fs::write("examforge.toml", SAMPLE_CONFIG)?;
        println!("Created examforge.toml");
    }

    std::fs::create_dir_all("assessments")?;
    let example_path = std::path::Path::new("assessments/example.toml");
    if example_path.exists() {
        println!("assessments/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ASSESSMENT)?;
        println!("Created assessments/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit assessments/example.toml (window, questions, graders)");
    println!("  2. Run: examforge validate --assessments assessments");
    println!("  3. Run: examforge serve");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examforge configuration

assessments_dir = "./assessments"

[server]
bind = "127.0.0.1:7460"

[storage]
backend = "sqlite"
path = "./examforge.db"

[engine]
max_answer_bytes = 65536
max_feedback_bytes = 16384
"#;

const EXAMPLE_ASSESSMENT: &str = r#"[assessment]
id = "example"
title = "Example Quiz"
starts_at = "2026-01-01T00:00:00Z"
ends_at = "2030-12-31T23:59:59Z"
access = "public"
time_limit_secs = 1800

[[questions]]
id = "capital"
kind = "objective"
max_marks = 1
prompt = "What is the capital of France?"
answer = { type = "scalar", value = "Paris" }

[[questions]]
id = "primes"
kind = "objective"
max_marks = 2
prompt = "Select every prime number."
answer = { type = "multi_select", value = ["2", "3", "5"] }

[[questions]]
id = "reflection"
kind = "subjective"
max_marks = 5
prompt = "Describe one thing you learned this week."
"#;
