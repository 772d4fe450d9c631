//! In-memory cluster for chaos unit tests.

use super::{ChaosCluster, NetworkDelaySpec, PodRef};
use crate::error::Result;
use crate::types::Selector;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<Vec<PodRef>>,
    deleted: Mutex<Vec<PodRef>>,
    linger: AtomicBool,
    created: Mutex<Vec<NetworkDelaySpec>>,
    removed: Mutex<Vec<String>>,
    injected: Mutex<Option<bool>>,
}

impl FakeCluster {
    pub fn with_pods(pods: Vec<PodRef>) -> Self {
        let cluster = Self::default();
        *cluster.pods.lock() = pods;
        cluster
    }

    pub fn add_pod(&self, pod: PodRef) {
        self.pods.lock().push(pod);
    }

    /// Keep reporting deleted pods as present, as if termination is slow.
    pub fn keep_deleted_pods(&self, linger: bool) {
        self.linger.store(linger, Ordering::SeqCst);
    }

    pub fn set_injected(&self, state: Option<bool>) {
        *self.injected.lock() = state;
    }

    pub fn deleted_pods(&self) -> Vec<String> {
        self.deleted.lock().iter().map(|p| p.name.clone()).collect()
    }

    pub fn created_network_chaos(&self) -> Vec<NetworkDelaySpec> {
        self.created.lock().clone()
    }

    pub fn deleted_network_chaos(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl ChaosCluster for FakeCluster {
    async fn list_pods(&self, _namespace: &str, _selector: &Selector) -> Result<Vec<PodRef>> {
        Ok(self.pods.lock().clone())
    }

    async fn delete_pod(&self, _namespace: &str, pod: &str, uid: &str) -> Result<bool> {
        let mut pods = self.pods.lock();
        let Some(idx) = pods.iter().position(|p| p.name == pod && p.uid == uid) else {
            return Ok(false);
        };
        let removed = pods.remove(idx);
        self.deleted.lock().push(removed);
        Ok(true)
    }

    async fn pod_exists(&self, _namespace: &str, name: &str, uid: &str) -> Result<bool> {
        let matches = |p: &PodRef| p.name == name && p.uid == uid;
        if self.linger.load(Ordering::SeqCst) && self.deleted.lock().iter().any(matches) {
            return Ok(true);
        }
        Ok(self.pods.lock().iter().any(matches))
    }

    async fn create_network_chaos(&self, spec: &NetworkDelaySpec) -> Result<()> {
        let mut created = self.created.lock();
        if !created.iter().any(|s| s.name == spec.name) {
            created.push(spec.clone());
        }
        Ok(())
    }

    async fn delete_network_chaos(&self, _namespace: &str, name: &str) -> Result<()> {
        self.created.lock().retain(|s| s.name != name);
        self.removed.lock().push(name.to_string());
        Ok(())
    }

    async fn network_chaos_injected(&self, _namespace: &str, _name: &str) -> Result<Option<bool>> {
        Ok(*self.injected.lock())
    }
}
