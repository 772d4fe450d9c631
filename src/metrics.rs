//! Observability sink for run outcomes.
//!
//! The orchestrator reports through [`MetricsSink`] and never touches a
//! metrics registry itself. The operator plugs in a Prometheus-backed sink;
//! tests use [`InMemoryMetrics`].

use crate::types::{RunIdentity, RunPhase};
use parking_lot::Mutex;
use std::collections::HashMap;

pub trait MetricsSink: Send + Sync {
    /// Final outcome of a run (1 on success, 0 otherwise).
    fn set_success(&self, identity: &RunIdentity, success: bool);

    fn observe_backup(&self, seconds: f64);

    fn observe_restore(&self, seconds: f64);

    /// A run entered `phase`.
    fn record_phase(&self, identity: &RunIdentity, phase: RunPhase);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_success(&self, _identity: &RunIdentity, _success: bool) {}
    fn observe_backup(&self, _seconds: f64) {}
    fn observe_restore(&self, _seconds: f64) {}
    fn record_phase(&self, _identity: &RunIdentity, _phase: RunPhase) {}
}

#[derive(Debug, Default)]
struct Recorded {
    success: HashMap<RunIdentity, bool>,
    backups: Vec<f64>,
    restores: Vec<f64>,
    phases: Vec<(RunIdentity, RunPhase)>,
}

/// Keeps every observation in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    inner: Mutex<Recorded>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&self, identity: &RunIdentity) -> Option<bool> {
        self.inner.lock().success.get(identity).copied()
    }

    pub fn backup_observations(&self) -> Vec<f64> {
        self.inner.lock().backups.clone()
    }

    pub fn restore_observations(&self) -> Vec<f64> {
        self.inner.lock().restores.clone()
    }

    /// Phases entered by `identity`, in order.
    pub fn phases(&self, identity: &RunIdentity) -> Vec<RunPhase> {
        self.inner
            .lock()
            .phases
            .iter()
            .filter(|(id, _)| id == identity)
            .map(|(_, phase)| *phase)
            .collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn set_success(&self, identity: &RunIdentity, success: bool) {
        self.inner.lock().success.insert(identity.clone(), success);
    }

    fn observe_backup(&self, seconds: f64) {
        self.inner.lock().backups.push(seconds);
    }

    fn observe_restore(&self, seconds: f64) {
        self.inner.lock().restores.push(seconds);
    }

    fn record_phase(&self, identity: &RunIdentity, phase: RunPhase) {
        self.inner.lock().phases.push((identity.clone(), phase));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_records_per_identity() {
        let metrics = InMemoryMetrics::new();
        let a = RunIdentity::new("ns", "a");
        let b = RunIdentity::new("ns", "b");

        metrics.record_phase(&a, RunPhase::BackingUp);
        metrics.record_phase(&b, RunPhase::BackingUp);
        metrics.record_phase(&a, RunPhase::Failed);
        metrics.set_success(&a, false);
        metrics.observe_backup(2.5);

        assert_eq!(metrics.phases(&a), vec![RunPhase::BackingUp, RunPhase::Failed]);
        assert_eq!(metrics.success(&a), Some(false));
        assert_eq!(metrics.success(&b), None);
        assert_eq!(metrics.backup_observations(), vec![2.5]);
    }
}
