//! examforge CLI: serve the attempt engine and manage assessment files.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "examforge", version, about = "Assessment attempt and grading engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overrides the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Validate assessment definition files
    Validate {
        /// Path to an assessment file or directory
        #[arg(long)]
        assessments: PathBuf,
    },

    /// Create starter config and example assessments
    Init,

    /// List stored attempts for an assessment
    Attempts {
        /// SQLite attempt database
        #[arg(long)]
        db: PathBuf,

        /// Assessment id
        #[arg(long)]
        assessment: String,

        /// Only show attempts in this status (in_progress, submitted, evaluated)
        #[arg(long)]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examforge=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, bind } => commands::serve::execute(config, bind).await,
        Commands::Validate { assessments } => commands::validate::execute(assessments),
        Commands::Init => commands::init::execute(),
        Commands::Attempts {
            db,
            assessment,
            status,
        } => commands::attempts::execute(db, assessment, status).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
