//! Restic-backed engine.
//!
//! Restic has no notion of named backups, so the backup name is attached as
//! a snapshot tag together with the selector labels, and looked up by tag.

use super::{tool_error, Ack, BackupEngine, BackupRequest, RestoreRequest};
use crate::config::BackupConfig;
use crate::error::Result;
use crate::process::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ResticEngine {
    binary: String,
    repository: Option<String>,
    source: PathBuf,
    restore_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

/// Subset of `restic snapshots --json` output we care about.
#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    short_id: String,
}

impl ResticEngine {
    pub fn new(config: &BackupConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let binary = config
            .binary
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "restic".to_string());
        Self {
            binary,
            repository: config.restic_repository.clone(),
            source: config.restic_source.clone(),
            restore_root: config.restic_restore_root.clone(),
            runner,
        }
    }

    async fn restic(&self, mut args: Vec<String>) -> Result<CommandOutput> {
        if let Some(repo) = &self.repository {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        self.runner.run(&self.binary, &args).await
    }

    /// Short id of the snapshot tagged `tag`, if any.
    async fn find_snapshot(&self, tag: &str) -> Result<Option<String>> {
        let out = self
            .restic(vec![
                "snapshots".to_string(),
                "--tag".to_string(),
                tag.to_string(),
                "--json".to_string(),
            ])
            .await?;
        if !out.success() {
            return Err(tool_error("restic", "snapshots", &out));
        }

        match serde_json::from_str::<Vec<Snapshot>>(out.output.trim()) {
            Ok(snapshots) => Ok(snapshots.into_iter().next().map(|s| s.short_id)),
            Err(e) => {
                // Unparseable listing: fall through to a fresh backup.
                warn!(error = %e, "Could not parse restic snapshot listing");
                Ok(None)
            }
        }
    }

    fn restore_target(&self, namespace: &str) -> PathBuf {
        self.restore_root.join(namespace)
    }
}

#[async_trait]
impl BackupEngine for ResticEngine {
    fn name(&self) -> &str {
        "restic"
    }

    async fn create_backup(&self, request: &BackupRequest) -> Result<Ack> {
        if let Some(id) = self.find_snapshot(&request.name).await? {
            info!(backup = %request.name, snapshot = %id, "Snapshot already exists");
            return Ok(Ack::existing(&request.name));
        }

        let mut args = vec!["backup".to_string(), "--tag".to_string(), request.name.clone()];
        for (k, v) in &request.selector {
            args.push("--tag".to_string());
            args.push(format!("{}={}", k, v));
        }
        args.push(self.source.display().to_string());

        let out = self.restic(args).await?;
        if !out.success() {
            return Err(tool_error("restic", "backup", &out));
        }
        debug!(backup = %request.name, "Restic backup finished");
        Ok(Ack::created(&request.name))
    }

    async fn create_restore(&self, request: &RestoreRequest) -> Result<Ack> {
        let restore = format!("restore-{}", request.backup_name);
        let target = self.restore_target(&request.target_namespace);

        let out = self
            .restic(vec![
                "restore".to_string(),
                "latest".to_string(),
                "--tag".to_string(),
                request.backup_name.clone(),
                "--target".to_string(),
                target.display().to_string(),
            ])
            .await?;
        if !out.success() {
            return Err(tool_error("restic", "restore", &out));
        }
        info!(restore = %restore, target = %target.display(), "Restic restore finished");
        Ok(Ack::created(restore))
    }
}
