//! `pod-delete`: terminate one pod of the workload.

use super::{ChaosCluster, ChaosHandler, ChaosRequest};
use crate::error::{DrError, Result};
use crate::types::{format_selector, ChaosHandle, ChaosParameters};
use async_trait::async_trait;
use tracing::info;

pub struct PodDelete;

#[async_trait]
impl ChaosHandler for PodDelete {
    fn chaos_type(&self) -> &'static str {
        "pod-delete"
    }

    fn validate(&self, _parameters: &ChaosParameters) -> Result<()> {
        Ok(())
    }

    async fn plan(&self, cluster: &dyn ChaosCluster, request: &ChaosRequest) -> Result<ChaosHandle> {
        let mut pods = cluster
            .list_pods(request.namespace(), &request.selector)
            .await?;
        pods.sort();

        let victim = pods.into_iter().next().ok_or_else(|| DrError::NoMatchingTarget {
            namespace: request.namespace().to_string(),
            selector: format_selector(&request.selector),
        })?;

        Ok(ChaosHandle {
            chaos_type: self.chaos_type().to_string(),
            namespace: request.namespace().to_string(),
            name: victim.name,
            targets: vec![victim.uid],
        })
    }

    async fn inject(
        &self,
        cluster: &dyn ChaosCluster,
        _request: &ChaosRequest,
        handle: &ChaosHandle,
    ) -> Result<()> {
        let Some(uid) = handle.targets.first() else {
            return Ok(());
        };
        // The UID pins the delete to the planned pod, never its replacement.
        if cluster.delete_pod(&handle.namespace, &handle.name, uid).await? {
            info!(pod = %handle.name, uid = %uid, "Deleted pod");
        } else {
            info!(pod = %handle.name, uid = %uid, "Planned pod already gone");
        }
        Ok(())
    }

    async fn cleanup(&self, _cluster: &dyn ChaosCluster, _handle: &ChaosHandle) -> Result<()> {
        // Nothing to undo; the workload controller replaces the pod.
        Ok(())
    }

    async fn check_effect(&self, cluster: &dyn ChaosCluster, handle: &ChaosHandle) -> Result<bool> {
        let Some(uid) = handle.targets.first() else {
            return Ok(true);
        };
        let exists = cluster.pod_exists(&handle.namespace, &handle.name, uid).await?;
        Ok(!exists)
    }
}
