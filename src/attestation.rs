//! Proof submission to the attestation service.
//!
//! After validation passes, the orchestrator builds an [`Evidence`] document
//! for the run, and submits it to the proof service under a key derived
//! from the run identity. The service stores the bytes and answers with the
//! SHA-256 digest it computed, which must match ours.

use crate::config::AttestationConfig;
use crate::error::{DrError, Result};
use crate::types::RunIdentity;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Evidence recorded for a validated run.
///
/// Field order is fixed, so the serialized bytes (and their digest) only
/// depend on the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub namespace: String,
    pub name: String,
    pub chaos_type: String,
    pub backup_name: String,
    pub restore_name: String,
    pub sandbox_namespace: String,
    pub checks_passed: Vec<String>,
}

impl Evidence {
    pub fn new(identity: &RunIdentity, chaos_type: &str) -> Self {
        Self {
            namespace: identity.namespace.clone(),
            name: identity.name.clone(),
            chaos_type: chaos_type.to_string(),
            backup_name: String::new(),
            restore_name: String::new(),
            sandbox_namespace: String::new(),
            checks_passed: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Hex SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Acknowledgment from the proof service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofAck {
    pub checksum: String,
    pub object_path: String,
}

#[async_trait]
pub trait AttestationClient: Send + Sync {
    async fn submit_proof(&self, evidence: &[u8], bucket: &str, object_key: &str) -> Result<ProofAck>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofRequest<'a> {
    data: String,
    bucket: &'a str,
    object: &'a str,
    expected_checksum: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProofResponse {
    success: bool,
    #[serde(default)]
    checksum: String,
    #[serde(default)]
    object_path: String,
    #[serde(default)]
    validation_error: String,
}

/// JSON-over-HTTP client for the proof service.
pub struct HttpAttestationClient {
    client: reqwest::Client,
    url: String,
}

impl HttpAttestationClient {
    pub fn new(config: &AttestationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DrError::Config(format!("failed to build attestation client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("{}/v1/proofs", config.endpoint.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AttestationClient for HttpAttestationClient {
    async fn submit_proof(&self, evidence: &[u8], bucket: &str, object_key: &str) -> Result<ProofAck> {
        let expected = checksum(evidence);
        let request = ProofRequest {
            data: BASE64.encode(evidence),
            bucket,
            object: object_key,
            expected_checksum: &expected,
        };

        debug!(url = %self.url, bucket = %bucket, object = %object_key, "Submitting proof");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DrError::AttestationTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DrError::AttestationTransport(format!(
                "proof service returned {}: {}",
                status,
                body.trim()
            )));
        }

        let reply: ProofResponse = response
            .json()
            .await
            .map_err(|e| DrError::AttestationTransport(format!("invalid response: {}", e)))?;

        if !reply.success {
            let reason = if reply.validation_error.is_empty() {
                "proof service reported failure".to_string()
            } else {
                reply.validation_error
            };
            return Err(DrError::AttestationRejected(reason));
        }
        if reply.checksum != expected {
            return Err(DrError::AttestationRejected(format!(
                "checksum mismatch: sent {}, service computed {}",
                expected, reply.checksum
            )));
        }

        info!(object_path = %reply.object_path, checksum = %reply.checksum, "Proof stored");
        Ok(ProofAck {
            checksum: reply.checksum,
            object_path: reply.object_path,
        })
    }
}
