// Test fixtures: recording fakes for every orchestrator collaborator

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chaosdr::attestation::{checksum, AttestationClient, ProofAck};
use chaosdr::backup::{Ack, BackupEngine, BackupRequest, RestoreRequest};
use chaosdr::shutdown::CancellationSignal;
use chaosdr::validation::{CheckKind, ValidationConfig, ValidationReport, Validator};
use chaosdr::{DrError, Result, TestRunSpec};
use parking_lot::Mutex;

/// How a fake call should behave.
#[derive(Debug, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    /// Return this error.
    Fail(DrError),
    /// Never complete.
    Hang,
    /// Complete after a delay.
    Delay(Duration),
}

impl Clone for Behavior {
    fn clone(&self) -> Self {
        match self {
            Behavior::Succeed => Behavior::Succeed,
            Behavior::Fail(e) => Behavior::Fail(clone_error(e)),
            Behavior::Hang => Behavior::Hang,
            Behavior::Delay(d) => Behavior::Delay(*d),
        }
    }
}

impl Behavior {
    async fn apply(&self) -> Result<()> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(e) => Err(clone_error(e)),
            Behavior::Hang => std::future::pending().await,
            Behavior::Delay(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
        }
    }
}

/// DrError is not Clone; rebuild the variants the fakes use.
fn clone_error(err: &DrError) -> DrError {
    match err {
        DrError::ExternalTool {
            tool,
            operation,
            exit_code,
            output,
            retryable,
        } => DrError::ExternalTool {
            tool: tool.clone(),
            operation: operation.clone(),
            exit_code: *exit_code,
            output: output.clone(),
            retryable: *retryable,
        },
        DrError::AttestationRejected(m) => DrError::AttestationRejected(m.clone()),
        DrError::AttestationTransport(m) => DrError::AttestationTransport(m.clone()),
        DrError::ScriptFailed { exit_code, output } => DrError::ScriptFailed {
            exit_code: *exit_code,
            output: output.clone(),
        },
        DrError::UnexpectedStatusCode { got, want } => DrError::UnexpectedStatusCode {
            got: *got,
            want: *want,
        },
        other => DrError::Internal(other.to_string()),
    }
}

/// Backup engine recording every request.
#[derive(Default)]
pub struct RecordingBackup {
    backups: Mutex<Vec<BackupRequest>>,
    restores: Mutex<Vec<RestoreRequest>>,
    backup_behavior: Mutex<Behavior>,
    restore_behavior: Mutex<Behavior>,
}

impl RecordingBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_backup(&self, behavior: Behavior) -> &Self {
        *self.backup_behavior.lock() = behavior;
        self
    }

    pub fn on_restore(&self, behavior: Behavior) -> &Self {
        *self.restore_behavior.lock() = behavior;
        self
    }

    pub fn backups(&self) -> Vec<BackupRequest> {
        self.backups.lock().clone()
    }

    pub fn restores(&self) -> Vec<RestoreRequest> {
        self.restores.lock().clone()
    }
}

#[async_trait]
impl BackupEngine for RecordingBackup {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create_backup(&self, request: &BackupRequest) -> Result<Ack> {
        self.backups.lock().push(request.clone());
        let behavior = self.backup_behavior.lock().clone();
        behavior.apply().await?;
        Ok(Ack::created(request.name.clone()))
    }

    async fn create_restore(&self, request: &RestoreRequest) -> Result<Ack> {
        self.restores.lock().push(request.clone());
        let behavior = self.restore_behavior.lock().clone();
        behavior.apply().await?;
        Ok(Ack::created(format!("restore-{}", request.backup_name)))
    }
}

/// Validator returning a configured result.
pub struct RecordingValidator {
    calls: Mutex<Vec<ValidationConfig>>,
    behavior: Mutex<Behavior>,
}

impl RecordingValidator {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behavior: Mutex::new(Behavior::Succeed),
        }
    }

    pub fn on_validate(&self, behavior: Behavior) -> &Self {
        *self.behavior.lock() = behavior;
        self
    }

    pub fn calls(&self) -> Vec<ValidationConfig> {
        self.calls.lock().clone()
    }
}

impl Default for RecordingValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for RecordingValidator {
    async fn validate(
        &self,
        config: &ValidationConfig,
        _cancel: &CancellationSignal,
    ) -> Result<ValidationReport> {
        self.calls.lock().push(config.clone());
        let behavior = self.behavior.lock().clone();
        behavior.apply().await?;
        Ok(ValidationReport {
            passed: config.planned_checks(),
        })
    }
}

/// A submitted proof.
#[derive(Debug, Clone)]
pub struct Submission {
    pub evidence: serde_json::Value,
    pub bucket: String,
    pub object_key: String,
    pub checksum: String,
}

/// Attestation client that accepts proofs and keeps them.
#[derive(Default)]
pub struct RecordingAttestation {
    submissions: Mutex<Vec<Submission>>,
    behavior: Mutex<Behavior>,
}

impl RecordingAttestation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(&self, behavior: Behavior) -> &Self {
        *self.behavior.lock() = behavior;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl AttestationClient for RecordingAttestation {
    async fn submit_proof(&self, evidence: &[u8], bucket: &str, object_key: &str) -> Result<ProofAck> {
        let digest = checksum(evidence);
        self.submissions.lock().push(Submission {
            evidence: serde_json::from_slice(evidence)?,
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            checksum: digest.clone(),
        });
        let behavior = self.behavior.lock().clone();
        behavior.apply().await?;
        Ok(ProofAck {
            checksum: digest,
            object_path: format!("{}/{}", bucket, object_key),
        })
    }
}

/// HTTP prober answering with a fixed status code.
pub struct StubProber {
    pub status: u16,
    pub calls: AtomicUsize,
}

impl StubProber {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl chaosdr::validation::HttpProber for StubProber {
    async fn get_status(&self, _url: &str) -> Result<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status)
    }
}

/// Query backend answering with a fixed row count.
pub struct StubQuery {
    pub rows: u64,
    pub calls: AtomicUsize,
}

impl StubQuery {
    pub fn new(rows: u64) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl chaosdr::validation::QueryBackend for StubQuery {
    async fn count_rows(&self, _connection_string: &str, _query: &str) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows)
    }
}

pub fn selector(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// pod-delete against `app=redis`.
pub fn pod_delete_spec() -> TestRunSpec {
    TestRunSpec {
        app_selector: selector(&[("app", "redis")]),
        chaos_type: "pod-delete".to_string(),
        ..Default::default()
    }
}

/// network-delay of 100ms with 10ms jitter against `app=redis`.
pub fn network_delay_spec() -> TestRunSpec {
    TestRunSpec {
        app_selector: selector(&[("app", "redis")]),
        chaos_type: "network-delay".to_string(),
        chaos_parameters: selector(&[("delay", "100ms"), ("jitter", "10ms")]),
        ..Default::default()
    }
}

/// A spec with every validation check configured.
pub fn fully_validated(mut spec: TestRunSpec) -> TestRunSpec {
    spec.validation_config = ValidationConfig {
        script: Some("redis-cli ping".to_string()),
        api_endpoint: Some("http://redis.sandbox:8080/health".to_string()),
        expected_status_code: 200,
        database_query: Some(chaosdr::validation::DatabaseQuery {
            connection_string: "sqlite://restored.db".to_string(),
            query: "SELECT id FROM orders".to_string(),
            expected_rows: 3,
        }),
    };
    spec
}

pub fn check_names(kinds: &[CheckKind]) -> Vec<&'static str> {
    kinds.iter().map(CheckKind::as_str).collect()
}
