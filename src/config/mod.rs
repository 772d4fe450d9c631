//! Configuration module for the DR-test operator.

use crate::error::{DrError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the operator and its orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Controller configuration.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Backup engine configuration.
    #[serde(default)]
    pub backup: BackupConfig,
    /// Chaos injection configuration.
    #[serde(default)]
    pub chaos: ChaosConfig,
    /// Validation check configuration.
    #[serde(default)]
    pub validation: ValidationSettings,
    /// Attestation service configuration.
    #[serde(default)]
    pub attestation: AttestationConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl OperatorConfig {
    /// Load configuration from a file.
    ///
    /// `.yaml`/`.yml` files are parsed as YAML, `.json` as JSON and anything
    /// else as TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DrError::Config(format!("Failed to read config file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| DrError::Config(format!("Failed to parse config: {}", e)))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| DrError::Config(format!("Failed to parse config: {}", e)))?,
            _ => toml::from_str(&content)
                .map_err(|e| DrError::Config(format!("Failed to parse config: {}", e)))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then apply `CHAOSDR_*` environment overrides.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ns) = lookup("CHAOSDR_NAMESPACE") {
            self.controller.namespace = ns;
        }
        if let Some(tool) = lookup("CHAOSDR_BACKUP_TOOL") {
            match tool.to_ascii_lowercase().as_str() {
                "velero" => self.backup.tool = BackupTool::Velero,
                "restic" => self.backup.tool = BackupTool::Restic,
                other => tracing::warn!(tool = %other, "Ignoring unknown CHAOSDR_BACKUP_TOOL"),
            }
        }
        if let Some(endpoint) = lookup("CHAOSDR_ATTESTATION_ENDPOINT") {
            self.attestation.endpoint = endpoint;
        }
        if let Some(bucket) = lookup("CHAOSDR_ATTESTATION_BUCKET") {
            self.attestation.bucket = bucket;
        }
        if let Some(level) = lookup("CHAOSDR_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chaos.poll_interval.is_zero() {
            return Err(DrError::InvalidConfig {
                field: "chaos.poll_interval".to_string(),
                reason: "Poll interval must be non-zero".to_string(),
            });
        }

        if self.chaos.poll_interval >= self.chaos.effect_timeout {
            return Err(DrError::InvalidConfig {
                field: "chaos.effect_timeout".to_string(),
                reason: "Effect timeout must exceed the poll interval".to_string(),
            });
        }

        if self.attestation.bucket.trim().is_empty() {
            return Err(DrError::InvalidConfig {
                field: "attestation.bucket".to_string(),
                reason: "Bucket must not be empty".to_string(),
            });
        }

        if reqwest::Url::parse(&self.attestation.endpoint).is_err() {
            return Err(DrError::InvalidConfig {
                field: "attestation.endpoint".to_string(),
                reason: format!("'{}' is not a valid URL", self.attestation.endpoint),
            });
        }

        Ok(())
    }

    /// Create a fast-polling configuration for local clusters.
    pub fn development() -> Self {
        Self {
            controller: ControllerConfig {
                namespace: String::new(),
                requeue_interval: Duration::from_secs(10),
                run_timeout: Duration::from_secs(600),
            },
            chaos: ChaosConfig {
                poll_interval: Duration::from_millis(500),
                effect_timeout: Duration::from_secs(60),
                ..ChaosConfig::default()
            },
            attestation: AttestationConfig {
                endpoint: "http://127.0.0.1:50051".to_string(),
                ..AttestationConfig::default()
            },
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
                ..ObservabilityConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Namespace to watch (empty for all namespaces).
    #[serde(default)]
    pub namespace: String,
    /// Requeue interval for runs that are not yet terminal.
    #[serde(with = "humantime_serde", default = "default_requeue_interval")]
    pub requeue_interval: Duration,
    /// Upper bound on a whole run.
    #[serde(with = "humantime_serde", default = "default_run_timeout")]
    pub run_timeout: Duration,
}

fn default_requeue_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(3600)
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            requeue_interval: default_requeue_interval(),
            run_timeout: default_run_timeout(),
        }
    }
}

/// Which backup tool to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupTool {
    #[default]
    Velero,
    Restic,
}

/// Backup engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Tool selected at startup.
    #[serde(default)]
    pub tool: BackupTool,
    /// Path to the tool binary (defaults to the tool name on `PATH`).
    pub binary: Option<PathBuf>,
    /// Namespace Velero itself runs in.
    #[serde(default = "default_velero_namespace")]
    pub velero_namespace: String,
    /// Restic repository (passed as `--repo`).
    pub restic_repository: Option<String>,
    /// Path restic backs up.
    #[serde(default = "default_restic_source")]
    pub restic_source: PathBuf,
    /// Root under which restic restores, one directory per sandbox namespace.
    #[serde(default = "default_restic_restore_root")]
    pub restic_restore_root: PathBuf,
    /// Per-call timeout for backup and restore.
    #[serde(with = "humantime_serde", default = "default_backup_timeout")]
    pub timeout: Duration,
}

fn default_velero_namespace() -> String {
    "velero".to_string()
}

fn default_restic_source() -> PathBuf {
    PathBuf::from("/data")
}

fn default_restic_restore_root() -> PathBuf {
    PathBuf::from("/restore")
}

fn default_backup_timeout() -> Duration {
    Duration::from_secs(900)
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            tool: BackupTool::Velero,
            binary: None,
            velero_namespace: default_velero_namespace(),
            restic_repository: None,
            restic_source: default_restic_source(),
            restic_restore_root: default_restic_restore_root(),
            timeout: default_backup_timeout(),
        }
    }
}

/// Chaos injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfig {
    /// Interval between effect checks.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// How long to wait for the fault to take effect.
    #[serde(with = "humantime_serde", default = "default_effect_timeout")]
    pub effect_timeout: Duration,
    /// Per-call timeout for apply.
    #[serde(with = "humantime_serde", default = "default_chaos_call_timeout")]
    pub call_timeout: Duration,
    /// Timeout for best-effort cleanup.
    #[serde(with = "humantime_serde", default = "default_chaos_call_timeout")]
    pub cleanup_timeout: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_effect_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_chaos_call_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            effect_timeout: default_effect_timeout(),
            call_timeout: default_chaos_call_timeout(),
            cleanup_timeout: default_chaos_call_timeout(),
        }
    }
}

/// Validation check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Shell used to run validation scripts.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Timeout for the script check.
    #[serde(with = "humantime_serde", default = "default_script_timeout")]
    pub script_timeout: Duration,
    /// Timeout for the HTTP probe.
    #[serde(with = "humantime_serde", default = "default_http_timeout")]
    pub http_timeout: Duration,
    /// Timeout for the data query.
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub query_timeout: Duration,
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_script_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            script_timeout: default_script_timeout(),
            http_timeout: default_http_timeout(),
            query_timeout: default_query_timeout(),
        }
    }
}

/// Attestation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationConfig {
    /// Base URL of the proof service.
    #[serde(default = "default_attestation_endpoint")]
    pub endpoint: String,
    /// Storage bucket proofs are written to.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Request timeout.
    #[serde(with = "humantime_serde", default = "default_attestation_timeout")]
    pub timeout: Duration,
}

fn default_attestation_endpoint() -> String {
    "http://sidecar:50051".to_string()
}

fn default_bucket() -> String {
    "backups".to_string()
}

fn default_attestation_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_attestation_endpoint(),
            bucket: default_bucket(),
            timeout: default_attestation_timeout(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Metrics bind address.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
    /// Health probe bind address.
    #[serde(default = "default_health_addr")]
    pub health_addr: SocketAddr,
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable JSON logging.
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_health_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            health_addr: default_health_addr(),
            log_level: default_log_level(),
            json_logs: default_json_logs(),
        }
    }
}

/// Parse a duration string such as `100ms`, `1.5s` or `1m30s`.
///
/// Accepts the units `ns`, `us`, `µs`, `ms`, `s`, `m` and `h`. A bare number
/// is read as milliseconds.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{}'", input))?;
        if num_len == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{}'", input))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(format!("unknown unit '{}' in duration '{}'", other, input)),
        };
        total += value * seconds_per_unit;
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(total).map_err(|e| format!("invalid duration '{}': {}", input, e))
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
