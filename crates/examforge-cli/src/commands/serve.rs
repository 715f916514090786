//! The `examforge serve` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_server::{load_config_from, ExamforgeServer};

pub async fn execute(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    tracing::debug!(?config, "resolved configuration");

    let server = ExamforgeServer::new(config)?;
    server.run().await?;
    Ok(())
}
