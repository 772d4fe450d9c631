//! Common test utilities for integration tests.

pub mod cluster_sim;
pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use chaosdr::chaos::ChaosRegistry;
use chaosdr::metrics::InMemoryMetrics;
use chaosdr::orchestrator::{
    Collaborators, InMemoryStatusStore, Orchestrator, OrchestratorSettings,
};
use chaosdr::wait::PollConfig;
use chaosdr::RunIdentity;

// Re-export common types
pub use cluster_sim::*;
pub use fixtures::*;

/// Settings with short timeouts so failing paths finish quickly.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        backup_timeout: Duration::from_secs(5),
        chaos_call_timeout: Duration::from_secs(2),
        cleanup_timeout: Duration::from_secs(2),
        poll: PollConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(1),
        },
        attestation_timeout: Duration::from_secs(2),
        bucket: "backups".to_string(),
        run_timeout: Duration::from_secs(30),
        status_timeout: Duration::from_secs(2),
    }
}

/// An orchestrator wired to recording fakes, plus handles to inspect them.
pub struct Harness {
    pub cluster: Arc<SimCluster>,
    pub backup: Arc<RecordingBackup>,
    pub validator: Arc<RecordingValidator>,
    pub attestation: Arc<RecordingAttestation>,
    pub store: Arc<InMemoryStatusStore>,
    pub metrics: Arc<InMemoryMetrics>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(fast_settings())
    }

    pub fn with_settings(settings: OrchestratorSettings) -> Self {
        let cluster = Arc::new(SimCluster::new());
        let backup = Arc::new(RecordingBackup::new());
        let validator = Arc::new(RecordingValidator::new());
        let attestation = Arc::new(RecordingAttestation::new());
        let store = Arc::new(InMemoryStatusStore::new());
        let metrics = Arc::new(InMemoryMetrics::new());

        let parts = Collaborators {
            backup: backup.clone(),
            chaos: Arc::new(ChaosRegistry::with_defaults(cluster.clone())),
            validator: validator.clone(),
            attestation: attestation.clone(),
            store: store.clone(),
            metrics: metrics.clone(),
        };

        Self {
            cluster,
            backup,
            validator,
            attestation,
            store,
            metrics,
            orchestrator: Arc::new(Orchestrator::new(parts, settings)),
        }
    }

    /// Register a fresh run in `default` and give its app two pods.
    pub fn run(&self, name: &str) -> RunIdentity {
        let identity = RunIdentity::new("default", name);
        self.store.register(&identity);
        self.cluster.add_pod("default", "redis-1", &[("app", "redis")]);
        self.cluster.add_pod("default", "redis-0", &[("app", "redis")]);
        identity
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
