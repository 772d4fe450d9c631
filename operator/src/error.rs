//! Error types for the ChaosDR operator

use chaosdr::DrError;
use thiserror::Error;

/// Main error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("CRD not installed. Please install the ChaosDRTest CRD first.")]
    CrdNotInstalled,

    #[error("Run could not be recorded: {0}")]
    Deferred(String),

    #[error(transparent)]
    Dr(#[from] DrError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Whether a kube error is an API response with `code`.
pub fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == code)
}

/// Map a kube error from the chaos driver boundary. Throttling, server-side
/// failures and transport problems are worth polling again; anything else is
/// final.
pub fn chaos_error(context: &str, err: kube::Error) -> DrError {
    let transient = match &err {
        kube::Error::Api(resp) => resp.code == 429 || resp.code >= 500,
        _ => true,
    };
    let message = format!("{}: {}", context, err);
    if transient {
        DrError::ClusterUnavailable(message)
    } else {
        DrError::ChaosDriver(message)
    }
}
