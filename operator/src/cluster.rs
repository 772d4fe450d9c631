//! Kubernetes implementation of the chaos cluster boundary.

use async_trait::async_trait;
use chaosdr::chaos::{ChaosCluster, NetworkDelaySpec, PodRef};
use chaosdr::{format_selector, Result, Selector};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams, Preconditions};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::chaos_mesh::{all_injected, NetworkChaos};
use crate::error::{chaos_error, is_status};

/// Pods through the core API, delay faults through Chaos Mesh.
#[derive(Clone)]
pub struct KubeChaosCluster {
    client: Client,
}

impl KubeChaosCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn network_chaos(&self, namespace: &str) -> Api<NetworkChaos> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ChaosCluster for KubeChaosCluster {
    async fn list_pods(&self, namespace: &str, selector: &Selector) -> Result<Vec<PodRef>> {
        let lp = ListParams::default().labels(&format_selector(selector));
        let pods = self
            .pods(namespace)
            .list(&lp)
            .await
            .map_err(|e| chaos_error("list pods", e))?;

        Ok(pods
            .items
            .iter()
            .filter(|p| p.metadata.deletion_timestamp.is_none())
            .map(|p| PodRef::new(p.name_any(), p.uid().unwrap_or_default()))
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, pod: &str, uid: &str) -> Result<bool> {
        let dp = DeleteParams {
            preconditions: Some(Preconditions {
                uid: Some(uid.to_string()),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };
        match self.pods(namespace).delete(pod, &dp).await {
            Ok(_) => Ok(true),
            // 409: the name now belongs to a replacement pod.
            Err(e) if is_status(&e, 404) || is_status(&e, 409) => {
                debug!(pod = %pod, uid = %uid, "Pod already gone");
                Ok(false)
            }
            Err(e) => Err(chaos_error("delete pod", e)),
        }
    }

    async fn pod_exists(&self, namespace: &str, name: &str, uid: &str) -> Result<bool> {
        let pod = self
            .pods(namespace)
            .get_opt(name)
            .await
            .map_err(|e| chaos_error("get pod", e))?;

        // A replacement pod may reuse the name; only the same UID counts.
        Ok(pod.is_some_and(|p| p.uid().as_deref() == Some(uid)))
    }

    async fn create_network_chaos(&self, spec: &NetworkDelaySpec) -> Result<()> {
        let chaos = NetworkChaos::from_delay_spec(spec);
        match self
            .network_chaos(&spec.namespace)
            .create(&PostParams::default(), &chaos)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 409) => {
                debug!(name = %spec.name, "NetworkChaos already exists");
                Ok(())
            }
            Err(e) => Err(chaos_error("create NetworkChaos", e)),
        }
    }

    async fn delete_network_chaos(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .network_chaos(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(chaos_error("delete NetworkChaos", e)),
        }
    }

    async fn network_chaos_injected(&self, namespace: &str, name: &str) -> Result<Option<bool>> {
        let chaos = self
            .network_chaos(namespace)
            .get_opt(name)
            .await
            .map_err(|e| chaos_error("get NetworkChaos", e))?;

        Ok(chaos.and_then(|c| all_injected(c.status.as_ref())))
    }
}
