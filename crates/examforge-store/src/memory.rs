//! Process-local attempt store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use examforge_core::lifecycle::Applied;
use examforge_core::model::{Attempt, AttemptId, AttemptStatus};
use examforge_core::traits::{AttemptStore, InsertOutcome, Modified, Transition};
use examforge_core::EngineError;

type Key = (String, String);

/// Attempts held in memory.
///
/// Each attempt sits behind its own mutex, so mutations of one attempt
/// serialize while different attempts proceed independently. The key index
/// has a separate lock that makes insertion a compare-and-insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    attempts: RwLock<HashMap<AttemptId, Arc<Mutex<Attempt>>>>,
    keys: Mutex<HashMap<Key, AttemptId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, attempt_id: AttemptId) -> Result<Option<Arc<Mutex<Attempt>>>, EngineError> {
        let attempts = self
            .attempts
            .read()
            .map_err(|_| anyhow!("attempt map lock poisoned"))?;
        Ok(attempts.get(&attempt_id).cloned())
    }

    fn snapshot(slot: &Mutex<Attempt>) -> Result<Attempt, EngineError> {
        Ok(lock(slot)?.clone())
    }

    fn all(&self) -> Result<Vec<Arc<Mutex<Attempt>>>, EngineError> {
        let attempts = self
            .attempts
            .read()
            .map_err(|_| anyhow!("attempt map lock poisoned"))?;
        Ok(attempts.values().cloned().collect())
    }
}

fn lock(slot: &Mutex<Attempt>) -> Result<MutexGuard<'_, Attempt>, EngineError> {
    slot.lock()
        .map_err(|_| EngineError::from(anyhow!("attempt lock poisoned")))
}

#[async_trait]
impl AttemptStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_if_absent(&self, attempt: Attempt) -> Result<InsertOutcome, EngineError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| anyhow!("key index lock poisoned"))?;
        let key = (attempt.assessment_id.clone(), attempt.student_id.clone());

        if let Some(existing_id) = keys.get(&key) {
            let slot = self
                .slot(*existing_id)?
                .ok_or_else(|| anyhow!("key index points at missing attempt {existing_id}"))?;
            return Ok(InsertOutcome::Existing(Self::snapshot(&slot)?));
        }

        self.attempts
            .write()
            .map_err(|_| anyhow!("attempt map lock poisoned"))?
            .insert(attempt.id, Arc::new(Mutex::new(attempt.clone())));
        keys.insert(key, attempt.id);
        Ok(InsertOutcome::Inserted(attempt))
    }

    async fn get(&self, attempt_id: AttemptId) -> Result<Option<Attempt>, EngineError> {
        match self.slot(attempt_id)? {
            Some(slot) => Ok(Some(Self::snapshot(&slot)?)),
            None => Ok(None),
        }
    }

    async fn find_by_key(
        &self,
        assessment_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, EngineError> {
        let id = {
            let keys = self
                .keys
                .lock()
                .map_err(|_| anyhow!("key index lock poisoned"))?;
            keys.get(&(assessment_id.to_string(), student_id.to_string()))
                .copied()
        };
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        assessment_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<Attempt>, EngineError> {
        let mut attempts = Vec::new();
        for slot in self.all()? {
            let attempt = Self::snapshot(&slot)?;
            if attempt.assessment_id == assessment_id
                && status.map_or(true, |s| attempt.status == s)
            {
                attempts.push(attempt);
            }
        }
        attempts.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(attempts)
    }

    async fn modify(
        &self,
        attempt_id: AttemptId,
        apply: Transition<'_>,
    ) -> Result<Modified, EngineError> {
        let slot = self
            .slot(attempt_id)?
            .ok_or_else(|| EngineError::AttemptNotFound(attempt_id.to_string()))?;
        let mut stored = lock(&slot)?;

        let mut working = stored.clone();
        match apply(&mut working)? {
            Applied::Unchanged => Ok(Modified {
                attempt: stored.clone(),
                changed: false,
            }),
            Applied::Changed => {
                *stored = working;
                Ok(Modified {
                    attempt: stored.clone(),
                    changed: true,
                })
            }
        }
    }
}
