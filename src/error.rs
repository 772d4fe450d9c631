//! Error types for DR-test orchestration.
//!
//! This module provides a unified error type [`DrError`] for every phase of a
//! DR test run, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Input**: malformed or missing chaos parameters and validation settings.
//!   These are raised before any external side effect.
//! - **Backup**: the external backup tool exited non-zero.
//! - **Chaos**: no matching target, driver failures and effect timeouts.
//! - **Validation**: script, HTTP probe and data-query check failures.
//! - **Attestation**: the proof service rejected the evidence or was unreachable.
//! - **Control**: cancellation and per-call timeouts.
//!
//! # Example
//!
//! ```rust
//! use chaosdr::error::{DrError, ErrorKind};
//!
//! let err = DrError::UnexpectedStatusCode { got: 503, want: 200 };
//! assert_eq!(err.kind(), ErrorKind::ValidationCheckFailed);
//! assert_eq!(err.failed_check(), Some("http"));
//! assert!(!err.is_retryable());
//! ```

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for DR-test operations.
#[derive(Error, Debug)]
pub enum DrError {
    #[error("Not found: {0}")]
    NotFound(String),

    // Input errors
    #[error("Unsupported chaos type: {0}")]
    UnsupportedChaosType(String),

    #[error("Missing parameter '{parameter}' for chaos type {chaos_type}")]
    MissingParameter { chaos_type: String, parameter: String },

    #[error("Invalid parameter '{parameter}' for chaos type {chaos_type}: {reason}")]
    InvalidParameter {
        chaos_type: String,
        parameter: String,
        reason: String,
    },

    #[error("Invalid test spec: {0}")]
    InvalidSpec(String),

    // Backup engine errors
    #[error("{tool} {operation} failed (exit code {}): {output}", display_code(.exit_code))]
    ExternalTool {
        tool: String,
        operation: String,
        exit_code: Option<i32>,
        output: String,
        retryable: bool,
    },

    // Chaos errors
    #[error("No pods in namespace {namespace} match selector {selector}")]
    NoMatchingTarget { namespace: String, selector: String },

    #[error("Chaos {chaos_type} did not take effect within {waited:?}")]
    ChaosTimeout { chaos_type: String, waited: Duration },

    #[error("Chaos driver error: {0}")]
    ChaosDriver(String),

    #[error("Cluster API unavailable: {0}")]
    ClusterUnavailable(String),

    // Validation check errors
    #[error("Validation script failed (exit code {}): {output}", display_code(.exit_code))]
    ScriptFailed {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Unexpected status code: got {got}, expected {want}")]
    UnexpectedStatusCode { got: u16, want: u16 },

    #[error("Unexpected row count: got {got}, expected {want}")]
    UnexpectedRowCount { got: u64, want: u64 },

    #[error("HTTP probe failed: {0}")]
    ProbeConnection(String),

    #[error("Data query failed: {0}")]
    QueryConnection(String),

    // Attestation errors
    #[error("Attestation rejected: {0}")]
    AttestationRejected(String),

    #[error("Attestation request failed: {0}")]
    AttestationTransport(String),

    // Control flow
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    // Persistence
    #[error("Status update failed: {0}")]
    Status(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Coarse classification written into the run status as `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    ValidationInput,
    ExternalTool,
    NoMatchingTarget,
    ChaosTimeout,
    ChaosDriver,
    ValidationCheckFailed,
    Attestation,
    Cancelled,
    Timeout,
    Status,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ValidationInput => "ValidationInputError",
            ErrorKind::ExternalTool => "ExternalToolError",
            ErrorKind::NoMatchingTarget => "NoMatchingTarget",
            ErrorKind::ChaosTimeout => "ChaosTimeout",
            ErrorKind::ChaosDriver => "ChaosDriverError",
            ErrorKind::ValidationCheckFailed => "ValidationCheckFailed",
            ErrorKind::Attestation => "AttestationError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Status => "StatusError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DrError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DrError::NotFound(_) => ErrorKind::NotFound,
            DrError::UnsupportedChaosType(_)
            | DrError::MissingParameter { .. }
            | DrError::InvalidParameter { .. }
            | DrError::InvalidSpec(_) => ErrorKind::ValidationInput,
            DrError::ExternalTool { .. } => ErrorKind::ExternalTool,
            DrError::NoMatchingTarget { .. } => ErrorKind::NoMatchingTarget,
            DrError::ChaosTimeout { .. } => ErrorKind::ChaosTimeout,
            DrError::ChaosDriver(_) | DrError::ClusterUnavailable(_) => ErrorKind::ChaosDriver,
            DrError::ScriptFailed { .. }
            | DrError::UnexpectedStatusCode { .. }
            | DrError::UnexpectedRowCount { .. }
            | DrError::ProbeConnection(_)
            | DrError::QueryConnection(_) => ErrorKind::ValidationCheckFailed,
            DrError::AttestationRejected(_) | DrError::AttestationTransport(_) => {
                ErrorKind::Attestation
            }
            DrError::Cancelled(_) => ErrorKind::Cancelled,
            DrError::Timeout { .. } => ErrorKind::Timeout,
            DrError::Status(_) => ErrorKind::Status,
            DrError::Config(_) | DrError::InvalidConfig { .. } => ErrorKind::Config,
            DrError::Io(_) | DrError::Serialization(_) | DrError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Name of the validation check that produced this error, if any.
    pub fn failed_check(&self) -> Option<&'static str> {
        match self {
            DrError::ScriptFailed { .. } => Some("script"),
            DrError::UnexpectedStatusCode { .. } | DrError::ProbeConnection(_) => Some("http"),
            DrError::UnexpectedRowCount { .. } | DrError::QueryConnection(_) => Some("query"),
            _ => None,
        }
    }

    /// Check if the underlying cause is transient.
    ///
    /// The orchestrator never retries on its own; this is recorded in the
    /// run status so the caller can decide whether re-triggering is useful.
    pub fn is_retryable(&self) -> bool {
        match self {
            DrError::ExternalTool { retryable, .. } => *retryable,
            DrError::Timeout { .. }
            | DrError::ChaosTimeout { .. }
            | DrError::ProbeConnection(_)
            | DrError::QueryConnection(_)
            | DrError::AttestationTransport(_)
            | DrError::ClusterUnavailable(_)
            | DrError::Status(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for DrError {
    fn from(e: serde_json::Error) -> Self {
        DrError::Serialization(e.to_string())
    }
}

/// Result type alias for DR-test operations.
pub type Result<T> = std::result::Result<T, DrError>;
