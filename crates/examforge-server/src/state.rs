//! Shared application state for the examforge server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use examforge_core::AttemptEngine;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AttemptEngine>,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: AttemptEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
