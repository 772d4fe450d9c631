//! Backup engines.
//!
//! The orchestrator only sees [`BackupEngine`]. Which tool sits behind it is
//! chosen once at startup from [`BackupConfig`](crate::config::BackupConfig).
//!
//! Both operations are safe to repeat with the same name: an engine first
//! looks for the artifact and reports it as already existing instead of
//! creating a second one.

mod restic;
mod velero;

pub use restic::ResticEngine;
pub use velero::VeleroEngine;

use crate::config::{BackupConfig, BackupTool};
use crate::error::{DrError, Result};
use crate::process::{looks_transient, CommandOutput, CommandRunner};
use crate::types::Selector;
use async_trait::async_trait;
use std::sync::Arc;

/// Request to back up the workload matched by `selector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    /// Artifact name, derived from the run identity
    pub name: String,
    /// Namespace the workload lives in
    pub namespace: String,
    pub selector: Selector,
}

/// Request to restore a backup into an isolated namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub backup_name: String,
    pub source_namespace: String,
    pub target_namespace: String,
}

/// Acknowledgment of a backup or restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Name of the artifact the tool created (or found)
    pub artifact: String,
    /// True when the artifact existed before this call
    pub already_existed: bool,
}

impl Ack {
    pub fn created(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            already_existed: false,
        }
    }

    pub fn existing(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            already_existed: true,
        }
    }
}

/// Uniform contract over backup/restore tools.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    /// Tool name, used in logs.
    fn name(&self) -> &str;

    async fn create_backup(&self, request: &BackupRequest) -> Result<Ack>;

    async fn create_restore(&self, request: &RestoreRequest) -> Result<Ack>;
}

/// Build the engine selected in configuration.
pub fn from_config(config: &BackupConfig, runner: Arc<dyn CommandRunner>) -> Arc<dyn BackupEngine> {
    match config.tool {
        BackupTool::Velero => Arc::new(VeleroEngine::new(config, runner)),
        BackupTool::Restic => Arc::new(ResticEngine::new(config, runner)),
    }
}

/// Turn a failed tool invocation into an error, keeping its output.
pub(crate) fn tool_error(tool: &str, operation: &str, out: &CommandOutput) -> DrError {
    DrError::ExternalTool {
        tool: tool.to_string(),
        operation: operation.to_string(),
        exit_code: out.exit_code,
        output: out.output.trim().to_string(),
        retryable: looks_transient(&out.output),
    }
}

/// True when the tool refused because the artifact is already there.
pub(crate) fn reports_already_exists(out: &CommandOutput) -> bool {
    out.output.to_ascii_lowercase().contains("already exists")
}
