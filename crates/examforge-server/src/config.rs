//! Server configuration and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::traits::AttemptStore;
use examforge_core::EngineConfig;
use examforge_store::{MemoryStore, SqliteStore};

/// Which attempt store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Listen address, `host:port`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database file; ignored by the memory backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
        }
    }
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Directory of assessment definition files.
    #[serde(default = "default_assessments_dir")]
    pub assessments_dir: PathBuf,
}

fn default_bind() -> String {
    "127.0.0.1:7460".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./examforge.db")
}
fn default_assessments_dir() -> PathBuf {
    PathBuf::from("./assessments")
}

impl Default for ExamforgeConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            assessments_dir: default_assessments_dir(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `EXAMFORGE_BIND`, `EXAMFORGE_DB`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<ExamforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => ExamforgeConfig::default(),
    };

    if let Ok(bind) = std::env::var("EXAMFORGE_BIND") {
        config.server.bind = bind;
    }
    if let Ok(db) = std::env::var("EXAMFORGE_DB") {
        config.storage.path = PathBuf::from(db);
    }

    config.server.bind = resolve_env_vars(&config.server.bind);
    config.storage.path = resolve_path(&config.storage.path);
    config.assessments_dir = resolve_path(&config.assessments_dir);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Create the attempt store described by `config`.
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn AttemptStore>> {
    match config.backend {
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&config.path)?)),
        StorageBackend::Memory => {
            tracing::warn!("using in-memory attempt store; attempts are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
