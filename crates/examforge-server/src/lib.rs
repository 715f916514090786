//! examforge-server - HTTP binding for the attempt engine
//!
//! Loads configuration, builds the catalog and attempt store it names, and
//! serves the engine's operations as a JSON API.

pub mod config;
mod error;
pub mod http;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use examforge_core::catalog::StaticCatalog;
use examforge_core::events::LogEvents;
use examforge_core::AttemptEngine;

pub use config::{load_config, load_config_from, ExamforgeConfig, StorageBackend};
pub use error::{ApiError, ErrorResponse, ServerError};
pub use http::create_router;
pub use state::AppState;

/// The examforge HTTP server
pub struct ExamforgeServer {
    config: ExamforgeConfig,
    state: Arc<AppState>,
}

impl ExamforgeServer {
    /// Build the engine from `config`: load definitions, open the store.
    pub fn new(config: ExamforgeConfig) -> Result<Self, ServerError> {
        let catalog = StaticCatalog::from_directory(&config.assessments_dir).with_context(|| {
            format!(
                "failed to load assessments from {}",
                config.assessments_dir.display()
            )
        })?;
        if catalog.is_empty() {
            tracing::warn!(
                dir = %config.assessments_dir.display(),
                "no assessment definitions found"
            );
        }
        let store = config::build_store(&config.storage)?;

        let engine = AttemptEngine::new(Arc::new(catalog), store, config.engine.clone())
            .with_events(Arc::new(LogEvents));
        Ok(Self::with_state(config, Arc::new(AppState::new(engine))))
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ExamforgeConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ExamforgeConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server until interrupted
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.server.bind.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!(
            store = self.state.engine.store_name(),
            "examforge server listening on {}",
            addr
        );

        let router = create_router(self.state);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        tracing::info!("examforge server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
