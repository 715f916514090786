//! In-process assessment catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::AssessmentDefinition;
use crate::parser;
use crate::traits::AssessmentCatalog;

/// A fixed set of definitions held in memory.
///
/// Definitions are shared as `Arc`s and never mutated, so every attempt
/// sees the same question set for its whole lifetime.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    definitions: HashMap<String, Arc<AssessmentDefinition>>,
}

impl StaticCatalog {
    pub fn new(definitions: impl IntoIterator<Item = AssessmentDefinition>) -> Self {
        let mut catalog = Self::default();
        for definition in definitions {
            catalog.insert(definition);
        }
        catalog
    }

    /// Load every `.toml` definition under `dir`.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let definitions = parser::load_assessment_directory(dir)?;
        tracing::info!(
            count = definitions.len(),
            dir = %dir.display(),
            "loaded assessment definitions"
        );
        Ok(Self::new(definitions))
    }

    /// Add a definition, replacing any previous one with the same id.
    pub fn insert(&mut self, definition: AssessmentDefinition) {
        if let Some(previous) = self.definitions.get(&definition.id) {
            tracing::warn!(
                assessment_id = %definition.id,
                previous_version = previous.version,
                version = definition.version,
                "replacing assessment definition"
            );
        }
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Known assessment ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl AssessmentCatalog for StaticCatalog {
    async fn get_definition(
        &self,
        assessment_id: &str,
    ) -> Result<Option<Arc<AssessmentDefinition>>> {
        Ok(self.definitions.get(assessment_id).cloned())
    }
}
