//! Velero-backed engine.

use super::{reports_already_exists, tool_error, Ack, BackupEngine, BackupRequest, RestoreRequest};
use crate::config::BackupConfig;
use crate::error::{DrError, Result};
use crate::process::CommandRunner;
use crate::types::format_selector;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Drives the `velero` CLI.
pub struct VeleroEngine {
    binary: String,
    velero_namespace: String,
    runner: Arc<dyn CommandRunner>,
}

impl VeleroEngine {
    pub fn new(config: &BackupConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let binary = config
            .binary
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "velero".to_string());
        Self {
            binary,
            velero_namespace: config.velero_namespace.clone(),
            runner,
        }
    }

    /// Name Velero gives the restore of `backup`.
    pub fn restore_name(backup: &str) -> String {
        format!("restore-{}", backup)
    }

    async fn velero(&self, args: Vec<String>) -> Result<crate::process::CommandOutput> {
        let mut full = args;
        full.push("--namespace".to_string());
        full.push(self.velero_namespace.clone());
        self.runner.run(&self.binary, &full).await
    }

    /// Phase Velero reports for an artifact, `None` when it does not exist.
    async fn phase_of(&self, kind: &str, name: &str) -> Result<Option<String>> {
        let out = self
            .velero(vec![
                kind.to_string(),
                "get".to_string(),
                name.to_string(),
                "-o".to_string(),
                "json".to_string(),
            ])
            .await?;

        if !out.success() {
            if out.output.to_ascii_lowercase().contains("not found") {
                debug!(kind = %kind, name = %name, "No existing artifact");
                return Ok(None);
            }
            // Existence is unknown; creating another artifact would be a guess.
            let mut err = tool_error("velero", &format!("{} get", kind), &out);
            if let DrError::ExternalTool { retryable, .. } = &mut err {
                *retryable = true;
            }
            return Err(err);
        }

        let phase = parse_phase(&out.output).unwrap_or_default();
        debug!(kind = %kind, name = %name, phase = %phase, "Found existing artifact");
        Ok(Some(phase))
    }

    /// Create `name` unless it exists, then require Velero to report it
    /// `Completed`.
    async fn ensure(&self, kind: &str, name: &str, create_args: Vec<String>) -> Result<Ack> {
        if let Some(phase) = self.phase_of(kind, name).await? {
            info!(kind = %kind, name = %name, "Artifact already exists");
            require_completed(kind, name, &phase)?;
            return Ok(Ack::existing(name));
        }

        let operation = format!("{} create", kind);
        let out = self.velero(create_args).await?;
        let already_existed = if out.success() {
            false
        } else if reports_already_exists(&out) {
            true
        } else {
            return Err(tool_error("velero", &operation, &out));
        };

        // `--wait` exits 0 whatever phase the artifact ends in.
        let phase = self.phase_of(kind, name).await?.ok_or_else(|| {
            status_error(&operation, format!("{} {} not found after create", kind, name), true)
        })?;
        require_completed(kind, name, &phase)?;

        Ok(if already_existed {
            Ack::existing(name)
        } else {
            Ack::created(name)
        })
    }
}

fn parse_phase(output: &str) -> Option<String> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(output.get(start..=end)?).ok()?;
    value
        .pointer("/status/phase")
        .and_then(|p| p.as_str())
        .map(str::to_string)
}

fn status_error(operation: &str, output: String, retryable: bool) -> DrError {
    DrError::ExternalTool {
        tool: "velero".to_string(),
        operation: operation.to_string(),
        exit_code: Some(0),
        output,
        retryable,
    }
}

fn require_completed(kind: &str, name: &str, phase: &str) -> Result<()> {
    match phase {
        "Completed" => Ok(()),
        "Failed" | "PartiallyFailed" | "FailedValidation" => Err(status_error(
            &format!("{} create", kind),
            format!("{} {} finished in phase {}", kind, name, phase),
            false,
        )),
        other => Err(status_error(
            &format!("{} create", kind),
            format!("{} {} is not complete (phase '{}')", kind, name, other),
            true,
        )),
    }
}

#[async_trait]
impl BackupEngine for VeleroEngine {
    fn name(&self) -> &str {
        "velero"
    }

    async fn create_backup(&self, request: &BackupRequest) -> Result<Ack> {
        let args = vec![
            "backup".to_string(),
            "create".to_string(),
            request.name.clone(),
            "--selector".to_string(),
            format_selector(&request.selector),
            "--include-namespaces".to_string(),
            request.namespace.clone(),
            "--wait".to_string(),
        ];
        self.ensure("backup", &request.name, args).await
    }

    async fn create_restore(&self, request: &RestoreRequest) -> Result<Ack> {
        let restore = Self::restore_name(&request.backup_name);
        let args = vec![
            "restore".to_string(),
            "create".to_string(),
            restore.clone(),
            "--from-backup".to_string(),
            request.backup_name.clone(),
            "--namespace-mappings".to_string(),
            format!("{}:{}", request.source_namespace, request.target_namespace),
            "--wait".to_string(),
        ];
        self.ensure("restore", &restore, args).await
    }
}
