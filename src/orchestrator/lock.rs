//! Per-identity run serialization.

use crate::types::RunIdentity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// At most one active sequence per run identity.
///
/// Entries are created on first use and removed once the last holder or
/// waiter is gone, so the map only grows with the number of runs in flight.
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    inner: Arc<Mutex<HashMap<RunIdentity, Arc<AsyncMutex<()>>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other sequence holds `identity`.
    pub async fn acquire(&self, identity: &RunIdentity) -> RunGuard {
        let slot = {
            let mut map = self.inner.lock();
            map.entry(identity.clone()).or_default().clone()
        };
        if slot.try_lock().is_err() {
            debug!(identity = %identity, "Waiting for in-flight run");
        }
        let guard = slot.lock_owned().await;
        RunGuard {
            guard: Some(guard),
            identity: identity.clone(),
            locks: self.clone(),
        }
    }

    /// Identities currently held or waited on.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Held while a run executes.
#[derive(Debug)]
pub struct RunGuard {
    guard: Option<OwnedMutexGuard<()>>,
    identity: RunIdentity,
    locks: RunLocks,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut map = self.locks.inner.lock();
        // Release first so waiters can proceed.
        self.guard.take();
        if let Some(slot) = map.get(&self.identity) {
            if Arc::strong_count(slot) == 1 {
                map.remove(&self.identity);
            }
        }
    }
}
