//! Core types shared across the DR-test phases.

use crate::error::{DrError, Result};
use crate::validation::ValidationConfig;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label selector: key/value pairs identifying the target workload.
pub type Selector = BTreeMap<String, String>;

/// Free-form chaos parameters, interpreted by the chaos type's handler.
pub type ChaosParameters = BTreeMap<String, String>;

/// Render a selector the way label-selector flags expect it (`k1=v1,k2=v2`).
///
/// Keys are emitted in sorted order so the rendering is stable.
pub fn format_selector(selector: &Selector) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Stable identity of a test run.
///
/// Every artifact name is derived from it, so a retried trigger reuses the
/// artifacts of the earlier attempt instead of creating new ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunIdentity {
    pub namespace: String,
    pub name: String,
}

impl RunIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn backup_name(&self) -> String {
        format!("dr-backup-{}", self.name)
    }

    pub fn sandbox_namespace(&self) -> String {
        format!("sandbox-{}", self.name)
    }

    pub fn chaos_object_name(&self) -> String {
        format!("chaos-{}", self.name)
    }

    pub fn proof_object_key(&self) -> String {
        format!("proof-{}", self.name)
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What a single DR test should do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSpec {
    /// Labels selecting the application under test
    pub app_selector: Selector,

    /// Chaos type, e.g. `pod-delete` or `network-delay`
    pub chaos_type: String,

    /// Parameters for the chaos type
    #[serde(default)]
    pub chaos_parameters: ChaosParameters,

    /// Checks run against the restored application
    #[serde(default)]
    pub validation_config: ValidationConfig,
}

impl TestRunSpec {
    /// Reject specs that cannot possibly succeed.
    pub fn validate(&self) -> Result<()> {
        if self.app_selector.is_empty() {
            return Err(DrError::InvalidSpec(
                "appSelector must contain at least one label".to_string(),
            ));
        }
        if self.chaos_type.trim().is_empty() {
            return Err(DrError::InvalidSpec("chaosType must be set".to_string()));
        }
        self.validation_config.validate()
    }
}

/// Phases of a run, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
    JsonSchema,
)]
pub enum RunPhase {
    #[default]
    Pending,
    BackingUp,
    InjectingChaos,
    AwaitingEffect,
    Restoring,
    Validating,
    Attesting,
    Succeeded,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }

    /// Transitions only move forward; `Failed` is reachable from any
    /// non-terminal phase.
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunPhase::Failed => true,
            RunPhase::Succeeded => *self == RunPhase::Attesting,
            _ => next > *self,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Pending => "Pending",
            RunPhase::BackingUp => "BackingUp",
            RunPhase::InjectingChaos => "InjectingChaos",
            RunPhase::AwaitingEffect => "AwaitingEffect",
            RunPhase::Restoring => "Restoring",
            RunPhase::Validating => "Validating",
            RunPhase::Attesting => "Attesting",
            RunPhase::Succeeded => "Succeeded",
            RunPhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the proof submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRecord {
    pub checksum: String,
    pub object_path: String,
}

/// Handle of an injected fault, recorded so cleanup can find it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChaosHandle {
    /// Chaos type that produced the handle
    pub chaos_type: String,
    /// Namespace the fault lives in
    pub namespace: String,
    /// Name of the fault object, or of the pod that was terminated
    pub name: String,
    /// UIDs of the affected instances
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Persistent status record of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RunPhase,

    /// True only once attestation succeeded
    #[serde(default)]
    pub success: bool,

    /// Error message of the failing phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Error classification of the failing phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Whether the failure looked transient
    #[serde(default)]
    pub retryable: bool,

    /// Phase the run was in when it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<RunPhase>,

    /// Validation check that failed (`script`, `http` or `query`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_check: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chaos: Option<ChaosHandle>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_duration_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_duration_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect_wait_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `next`, stamping the transition time.
    pub fn enter(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(DrError::Internal(format!(
                "illegal phase transition {} -> {}",
                self.phase, next
            )));
        }
        let now = Utc::now().to_rfc3339();
        if self.started_at.is_none() {
            self.started_at = Some(now.clone());
        }
        if next.is_terminal() {
            self.completed_at = Some(now.clone());
        }
        self.phase = next;
        self.last_transition_time = Some(now);
        Ok(())
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, err: &DrError) {
        if !self.is_terminal() {
            self.failed_phase = Some(self.phase);
        }
        // Failed is reachable from every non-terminal phase.
        let _ = self.enter(RunPhase::Failed);
        self.failed_check = err.failed_check().map(str::to_string);
        self.success = false;
        self.error_message = Some(err.to_string());
        self.reason = Some(err.kind().as_str().to_string());
        self.retryable = err.is_retryable();
    }

    /// Record success.
    pub fn succeed(&mut self) -> Result<()> {
        self.enter(RunPhase::Succeeded)?;
        self.success = true;
        self.error_message = None;
        self.reason = None;
        self.retryable = false;
        Ok(())
    }
}
