//! Run status kept in the `status` subresource of each ChaosDRTest.

use async_trait::async_trait;
use chaosdr::orchestrator::StatusStore;
use chaosdr::{DrError, Result, RunIdentity, RunStatus};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::crd::ChaosDRTest;

const FIELD_MANAGER: &str = "chaosdr-operator";

#[derive(Clone)]
pub struct KubeStatusStore {
    client: Client,
}

impl KubeStatusStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ChaosDRTest> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl StatusStore for KubeStatusStore {
    async fn load(&self, identity: &RunIdentity) -> Result<RunStatus> {
        let test = self
            .api(&identity.namespace)
            .get_opt(&identity.name)
            .await
            .map_err(|e| DrError::Status(format!("get {}: {}", identity, e)))?
            .ok_or_else(|| DrError::NotFound(identity.to_string()))?;

        Ok(test.status.unwrap_or_default())
    }

    async fn save(&self, identity: &RunIdentity, status: &RunStatus) -> Result<()> {
        let patch = json!({ "status": status });
        let pp = PatchParams::apply(FIELD_MANAGER);

        match self
            .api(&identity.namespace)
            .patch_status(&identity.name, &pp, &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(run = %identity, phase = %status.phase, "Status updated");
                Ok(())
            }
            Err(e) if crate::error::is_status(&e, 404) => Err(DrError::NotFound(identity.to_string())),
            Err(e) => Err(DrError::Status(format!("patch {}: {}", identity, e))),
        }
    }
}
