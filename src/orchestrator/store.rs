//! Persistence of run status.

use crate::error::{DrError, Result};
use crate::types::{RunIdentity, RunPhase, RunStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Where run status lives. Each save replaces the whole record.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Current status. Unknown runs are [`DrError::NotFound`].
    async fn load(&self, identity: &RunIdentity) -> Result<RunStatus>;

    async fn save(&self, identity: &RunIdentity, status: &RunStatus) -> Result<()>;
}

#[derive(Debug, Default)]
struct Entry {
    status: RunStatus,
    history: Vec<RunPhase>,
}

/// In-process store, also keeping the phase of every save.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    runs: Mutex<HashMap<RunIdentity, Entry>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a run known with a fresh status.
    pub fn register(&self, identity: &RunIdentity) {
        self.runs.lock().entry(identity.clone()).or_default();
    }

    /// Make a run known with an existing status.
    pub fn insert(&self, identity: &RunIdentity, status: RunStatus) {
        self.runs.lock().insert(
            identity.clone(),
            Entry {
                status,
                history: Vec::new(),
            },
        );
    }

    pub fn remove(&self, identity: &RunIdentity) {
        self.runs.lock().remove(identity);
    }

    pub fn get(&self, identity: &RunIdentity) -> Option<RunStatus> {
        self.runs.lock().get(identity).map(|e| e.status.clone())
    }

    /// Phase recorded by each save, in order.
    pub fn saved_phases(&self, identity: &RunIdentity) -> Vec<RunPhase> {
        self.runs
            .lock()
            .get(identity)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn load(&self, identity: &RunIdentity) -> Result<RunStatus> {
        self.get(identity)
            .ok_or_else(|| DrError::NotFound(identity.to_string()))
    }

    async fn save(&self, identity: &RunIdentity, status: &RunStatus) -> Result<()> {
        let mut runs = self.runs.lock();
        let entry = runs
            .get_mut(identity)
            .ok_or_else(|| DrError::NotFound(identity.to_string()))?;
        entry.status = status.clone();
        entry.history.push(status.phase);
        Ok(())
    }
}
