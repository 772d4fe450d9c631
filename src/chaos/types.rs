//! Chaos request and cluster-facing types.

use crate::types::{ChaosParameters, RunIdentity, Selector};
use serde::{Deserialize, Serialize};

/// What to inject, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosRequest {
    pub chaos_type: String,
    /// Run the fault belongs to. Fault object names derive from it.
    pub identity: RunIdentity,
    pub selector: Selector,
    pub parameters: ChaosParameters,
}

impl ChaosRequest {
    /// Namespace the fault is scoped to.
    pub fn namespace(&self) -> &str {
        &self.identity.namespace
    }
}

/// A pod, as far as chaos is concerned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodRef {
    pub name: String,
    pub uid: String,
}

impl PodRef {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
        }
    }
}

/// Desired network-delay fault object.
///
/// Durations are kept as the strings the user wrote; the fault driver
/// parses them itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDelaySpec {
    pub name: String,
    pub namespace: String,
    pub selector: Selector,
    pub latency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}
