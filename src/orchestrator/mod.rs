//! DR-test state machine.
//!
//! [`Orchestrator::execute`] drives one run through
//!
//! ```text
//! Pending → BackingUp → InjectingChaos → AwaitingEffect → Restoring
//!         → Validating → Attesting → Succeeded | Failed
//! ```
//!
//! The status record is saved on entry to every phase, before the phase's
//! work starts. The first error moves the run to `Failed` and skips the
//! remaining phases. Nothing escapes `execute`: every failure ends up in the
//! status record and the returned [`RunOutcome`].
//!
//! Runs are safe to trigger more than once. A terminal run returns
//! immediately, concurrent triggers for one identity are serialized by
//! [`RunLocks`], and a run found mid-flight resumes, skipping the backup and
//! the injection when their artifacts are already recorded.

mod lock;
mod store;

pub use lock::{RunGuard, RunLocks};
pub use store::{InMemoryStatusStore, StatusStore};

use crate::attestation::{AttestationClient, Evidence};
use crate::backup::{BackupEngine, BackupRequest, RestoreRequest};
use crate::chaos::{ChaosRegistry, ChaosRequest};
use crate::config::OperatorConfig;
use crate::error::{DrError, Result};
use crate::metrics::MetricsSink;
use crate::shutdown::{Bounded, CancellationSignal, CancellationSource};
use crate::types::{
    AttestationRecord, ChaosHandle, RunIdentity, RunPhase, RunStatus, TestRunSpec,
};
use crate::validation::Validator;
use crate::wait::{EffectWaiter, PollConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Timeouts and constants the state machine runs with.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub backup_timeout: Duration,
    pub chaos_call_timeout: Duration,
    pub cleanup_timeout: Duration,
    pub poll: PollConfig,
    pub attestation_timeout: Duration,
    pub bucket: String,
    /// Upper bound on a whole run.
    pub run_timeout: Duration,
    pub status_timeout: Duration,
}

impl From<&OperatorConfig> for OrchestratorSettings {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            backup_timeout: config.backup.timeout,
            chaos_call_timeout: config.chaos.call_timeout,
            cleanup_timeout: config.chaos.cleanup_timeout,
            poll: PollConfig::from(&config.chaos),
            attestation_timeout: config.attestation.timeout,
            bucket: config.attestation.bucket.clone(),
            run_timeout: config.controller.run_timeout,
            status_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OperatorConfig::default())
    }
}

/// The strategies one orchestrator works with.
pub struct Collaborators {
    pub backup: Arc<dyn BackupEngine>,
    pub chaos: Arc<ChaosRegistry>,
    pub validator: Arc<dyn Validator>,
    pub attestation: Arc<dyn AttestationClient>,
    pub store: Arc<dyn StatusStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Result of one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run reached a terminal phase during this call.
    Completed(RunStatus),
    /// The run was already terminal; nothing was done.
    AlreadyTerminal(RunStatus),
    /// The run identity is unknown; nothing was done.
    NotFound,
    /// The status record could not be read or written. The caller should
    /// trigger again later.
    Deferred { reason: String },
}

impl RunOutcome {
    pub fn status(&self) -> Option<&RunStatus> {
        match self {
            RunOutcome::Completed(s) | RunOutcome::AlreadyTerminal(s) => Some(s),
            _ => None,
        }
    }
}

pub struct Orchestrator {
    backup: Arc<dyn BackupEngine>,
    chaos: Arc<ChaosRegistry>,
    validator: Arc<dyn Validator>,
    attestation: Arc<dyn AttestationClient>,
    store: Arc<dyn StatusStore>,
    metrics: Arc<dyn MetricsSink>,
    settings: OrchestratorSettings,
    locks: RunLocks,
}

impl Orchestrator {
    pub fn new(parts: Collaborators, settings: OrchestratorSettings) -> Self {
        Self {
            backup: parts.backup,
            chaos: parts.chaos,
            validator: parts.validator,
            attestation: parts.attestation,
            store: parts.store,
            metrics: parts.metrics,
            settings,
            locks: RunLocks::new(),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Drive the run `identity` to a terminal phase.
    pub async fn execute(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        cancel: &CancellationSignal,
    ) -> RunOutcome {
        let span = info_span!("dr_test", namespace = %identity.namespace, name = %identity.name);
        self.execute_locked(identity, spec, cancel)
            .instrument(span)
            .await
    }

    async fn execute_locked(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        cancel: &CancellationSignal,
    ) -> RunOutcome {
        let _guard = self.locks.acquire(identity).await;

        let mut status = match self.store.load(identity).await {
            Ok(status) => status,
            Err(DrError::NotFound(_)) => {
                debug!("Run no longer exists");
                return RunOutcome::NotFound;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load run status");
                return RunOutcome::Deferred {
                    reason: e.to_string(),
                };
            }
        };

        if status.is_terminal() {
            debug!(phase = %status.phase, "Run already finished");
            return RunOutcome::AlreadyTerminal(status);
        }

        if let Err(e) = self.check_inputs(spec) {
            warn!(error = %e, "Rejected run before any side effect");
            status.fail(&e);
            return self.finish(identity, status).await;
        }

        if status.phase != RunPhase::Pending {
            info!(phase = %status.phase, "Resuming run");
        }

        let run_timeout = self.settings.run_timeout;
        let (watchdog, run_cancel) = run_signal(cancel, run_timeout);
        let result = tokio::select! {
            result = self.drive(identity, spec, &mut status, &run_cancel) => result,
            _ = watchdog => Err(DrError::Internal("run watchdog stopped".to_string())),
        };
        // Only the deadline cancels the run signal without the parent.
        let result = result.map_err(|e| match e {
            DrError::Cancelled(_) if run_cancel.is_cancelled() && !cancel.is_cancelled() => {
                DrError::Timeout {
                    operation: "run".to_string(),
                    after: run_timeout,
                }
            }
            other => other,
        });

        match result {
            Ok(()) => {
                if let Err(e) = status.succeed() {
                    status.fail(&e);
                } else {
                    info!(phase = %status.phase, "DR test succeeded");
                }
            }
            Err(e) => {
                error!(phase = %status.phase, error = %e, reason = %e.kind(), "DR test failed");
                status.fail(&e);
            }
        }

        if let Some(handle) = status.chaos.clone() {
            self.cleanup_chaos(&handle).await;
        }
        self.finish(identity, status).await
    }

    /// Known chaos type, well-formed parameters and validation settings.
    fn check_inputs(&self, spec: &TestRunSpec) -> Result<()> {
        spec.validate()?;
        self.chaos.validate(&spec.chaos_type, &spec.chaos_parameters)
    }

    async fn drive(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        status: &mut RunStatus,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        self.backup_phase(identity, spec, status, cancel).await?;
        let handle = self.inject_phase(identity, spec, status, cancel).await?;
        self.await_effect_phase(identity, status, &handle, cancel).await?;
        self.restore_phase(identity, status, cancel).await?;
        let checks = self.validate_phase(identity, spec, status, cancel).await?;
        self.attest_phase(identity, spec, status, checks, cancel).await
    }

    async fn backup_phase(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        status: &mut RunStatus,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        if let Some(name) = &status.backup_name {
            debug!(backup = %name, "Backup already recorded, skipping");
            return Ok(());
        }
        self.enter_phase(identity, status, RunPhase::BackingUp).await?;

        let request = BackupRequest {
            name: identity.backup_name(),
            namespace: identity.namespace.clone(),
            selector: spec.app_selector.clone(),
        };
        let started = Instant::now();
        let ack = self
            .backup
            .create_backup(&request)
            .bounded("backup", self.settings.backup_timeout, cancel)
            .await?;
        let seconds = started.elapsed().as_secs_f64();

        info!(
            backup = %ack.artifact,
            engine = %self.backup.name(),
            already_existed = ack.already_existed,
            seconds,
            "Backup completed"
        );
        status.backup_name = Some(ack.artifact);
        status.backup_duration_seconds = Some(seconds);
        self.metrics.observe_backup(seconds);
        Ok(())
    }

    async fn inject_phase(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        status: &mut RunStatus,
        cancel: &CancellationSignal,
    ) -> Result<ChaosHandle> {
        if let Some(handle) = &status.chaos {
            if status.phase > RunPhase::InjectingChaos {
                debug!(chaos = %handle.name, "Chaos already injected, skipping");
                return Ok(handle.clone());
            }
        }

        self.enter_phase(identity, status, RunPhase::InjectingChaos).await?;

        let request = ChaosRequest {
            chaos_type: spec.chaos_type.clone(),
            identity: identity.clone(),
            selector: spec.app_selector.clone(),
            parameters: spec.chaos_parameters.clone(),
        };
        let handle = match status.chaos.clone() {
            Some(handle) => {
                info!(chaos = %handle.name, "Re-injecting recorded chaos");
                handle
            }
            None => {
                let handle = self
                    .chaos
                    .plan(&request)
                    .bounded("chaos planning", self.settings.chaos_call_timeout, cancel)
                    .await?;
                // Record the targets before anything is injected.
                status.chaos = Some(handle.clone());
                self.save(identity, status).await?;
                handle
            }
        };

        self.chaos
            .inject(&request, &handle)
            .bounded("chaos injection", self.settings.chaos_call_timeout, cancel)
            .await?;

        info!(chaos_type = %handle.chaos_type, chaos = %handle.name, "Chaos injected");
        Ok(handle)
    }

    async fn await_effect_phase(
        &self,
        identity: &RunIdentity,
        status: &mut RunStatus,
        handle: &ChaosHandle,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        self.enter_phase(identity, status, RunPhase::AwaitingEffect).await?;

        let registry = &self.chaos;
        let report = EffectWaiter::new(self.settings.poll.clone())
            .wait_for(&handle.chaos_type, cancel, move || registry.is_effective(handle))
            .await?;

        info!(polls = report.polls, waited_ms = report.waited.as_millis(), "Chaos took effect");
        status.effect_wait_seconds = Some(report.waited.as_secs_f64());
        Ok(())
    }

    async fn restore_phase(
        &self,
        identity: &RunIdentity,
        status: &mut RunStatus,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        self.enter_phase(identity, status, RunPhase::Restoring).await?;

        let backup_name = status
            .backup_name
            .clone()
            .unwrap_or_else(|| identity.backup_name());
        let request = RestoreRequest {
            backup_name,
            source_namespace: identity.namespace.clone(),
            target_namespace: identity.sandbox_namespace(),
        };
        status.sandbox_namespace = Some(request.target_namespace.clone());

        let started = Instant::now();
        let ack = self
            .backup
            .create_restore(&request)
            .bounded("restore", self.settings.backup_timeout, cancel)
            .await?;
        let seconds = started.elapsed().as_secs_f64();

        info!(restore = %ack.artifact, sandbox = %request.target_namespace, seconds, "Restore completed");
        status.restore_name = Some(ack.artifact);
        status.restore_duration_seconds = Some(seconds);
        self.metrics.observe_restore(seconds);
        Ok(())
    }

    async fn validate_phase(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        status: &mut RunStatus,
        cancel: &CancellationSignal,
    ) -> Result<Vec<String>> {
        self.enter_phase(identity, status, RunPhase::Validating).await?;

        // Each check carries its own timeout; this only bounds the whole.
        let report = self
            .validator
            .validate(&spec.validation_config, cancel)
            .bounded("validation", self.settings.run_timeout, cancel)
            .await?;
        Ok(report.passed.iter().map(|c| c.as_str().to_string()).collect())
    }

    async fn attest_phase(
        &self,
        identity: &RunIdentity,
        spec: &TestRunSpec,
        status: &mut RunStatus,
        checks_passed: Vec<String>,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        self.enter_phase(identity, status, RunPhase::Attesting).await?;

        let mut evidence = Evidence::new(identity, &spec.chaos_type);
        evidence.backup_name = status.backup_name.clone().unwrap_or_default();
        evidence.restore_name = status.restore_name.clone().unwrap_or_default();
        evidence.sandbox_namespace = status.sandbox_namespace.clone().unwrap_or_default();
        evidence.checks_passed = checks_passed;
        let bytes = evidence.to_bytes()?;

        let object_key = identity.proof_object_key();
        let ack = self
            .attestation
            .submit_proof(&bytes, &self.settings.bucket, &object_key)
            .bounded("attestation", self.settings.attestation_timeout, cancel)
            .await?;

        status.attestation = Some(AttestationRecord {
            checksum: ack.checksum,
            object_path: ack.object_path,
        });
        Ok(())
    }

    /// Record entry into `phase` and persist it. On resume the recorded
    /// phase may already be at or past `phase`; it never moves backwards.
    async fn enter_phase(
        &self,
        identity: &RunIdentity,
        status: &mut RunStatus,
        phase: RunPhase,
    ) -> Result<()> {
        if status.phase < phase {
            status.enter(phase)?;
            self.metrics.record_phase(identity, phase);
            info!(phase = %phase, "Entering phase");
        } else {
            debug!(phase = %phase, recorded = %status.phase, "Re-running phase");
        }
        self.save(identity, status).await
    }

    async fn save(&self, identity: &RunIdentity, status: &RunStatus) -> Result<()> {
        self.store
            .save(identity, status)
            .bounded(
                "status update",
                self.settings.status_timeout,
                &CancellationSignal::never(),
            )
            .await
    }

    /// Best-effort removal of an injected fault.
    async fn cleanup_chaos(&self, handle: &ChaosHandle) {
        let result = self
            .chaos
            .cleanup(handle)
            .bounded(
                "chaos cleanup",
                self.settings.cleanup_timeout,
                &CancellationSignal::never(),
            )
            .await;
        match result {
            Ok(()) => debug!(chaos = %handle.name, "Chaos cleaned up"),
            Err(e) => warn!(chaos = %handle.name, error = %e, "Chaos cleanup failed"),
        }
    }

    /// Persist a terminal status and report it.
    async fn finish(&self, identity: &RunIdentity, status: RunStatus) -> RunOutcome {
        self.metrics.record_phase(identity, status.phase);
        self.metrics.set_success(identity, status.success);

        match self.save(identity, &status).await {
            Ok(()) => RunOutcome::Completed(status),
            Err(e) => {
                error!(error = %e, "Failed to record final status");
                RunOutcome::Deferred {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Signal for one run: fires when `parent` does or when `timeout` passes.
/// The returned watchdog must be polled alongside the run for the timeout to
/// be observed; it never completes.
fn run_signal(
    parent: &CancellationSignal,
    timeout: Duration,
) -> (impl Future<Output = ()>, CancellationSignal) {
    let (source, signal) = CancellationSource::new();
    let parent = parent.clone();
    let watchdog = async move {
        tokio::select! {
            reason = parent.cancelled() => source.cancel(reason),
            _ = tokio::time::sleep(timeout) => {
                source.cancel(format!("run deadline of {:?} passed", timeout))
            }
        }
        std::future::pending::<()>().await
    };
    (watchdog, signal)
}
