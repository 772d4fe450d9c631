// Cluster simulation for integration tests
// Simulates a namespace of pods and the network-delay fault driver

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chaosdr::chaos::{ChaosCluster, NetworkDelaySpec, PodRef};
use chaosdr::{DrError, Result, Selector};
use parking_lot::Mutex;

/// A pod in the simulated cluster
#[derive(Debug, Clone)]
struct SimPod {
    pod: PodRef,
    labels: Selector,
}

/// A network-delay fault object and how many polls it needs to report
/// injection.
#[derive(Debug, Clone)]
struct SimChaos {
    spec: NetworkDelaySpec,
    polls_until_injected: Option<u32>,
}

#[derive(Default)]
struct State {
    pods: BTreeMap<(String, String), SimPod>,
    next_uid: u64,
    replace_deleted: bool,
    chaos: HashMap<(String, String), SimChaos>,
    inject_after: Option<u32>,
    deleted_pods: Vec<String>,
    created_chaos: Vec<NetworkDelaySpec>,
    deleted_chaos: Vec<String>,
    calls: usize,
    fail_apply: Option<String>,
}

/// In-memory stand-in for the cluster API.
///
/// Deleted pods are replaced under the same name with a fresh UID, as a
/// workload controller would do. Network chaos reports injection on the
/// first status poll unless configured otherwise.
pub struct SimCluster {
    state: Mutex<State>,
}

impl SimCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                replace_deleted: true,
                inject_after: Some(0),
                ..State::default()
            }),
        }
    }

    /// Add a pod with the given labels to `namespace`.
    pub fn add_pod(&self, namespace: &str, name: &str, labels: &[(&str, &str)]) -> String {
        let mut state = self.state.lock();
        state.next_uid += 1;
        let uid = format!("uid-{}", state.next_uid);
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        state.pods.insert(
            (namespace.to_string(), name.to_string()),
            SimPod {
                pod: PodRef::new(name, uid.clone()),
                labels,
            },
        );
        uid
    }

    /// Whether deleted pods come back with a new UID.
    pub fn replace_deleted_pods(&self, replace: bool) {
        self.state.lock().replace_deleted = replace;
    }

    /// Polls a fault object needs before it reports injection; `None` never
    /// reports.
    pub fn inject_after_polls(&self, polls: Option<u32>) {
        self.state.lock().inject_after = polls;
    }

    /// Make every mutating call fail with a driver error.
    pub fn fail_mutations(&self, message: &str) {
        self.state.lock().fail_apply = Some(message.to_string());
    }

    pub fn deleted_pods(&self) -> Vec<String> {
        self.state.lock().deleted_pods.clone()
    }

    pub fn created_network_chaos(&self) -> Vec<NetworkDelaySpec> {
        self.state.lock().created_chaos.clone()
    }

    pub fn deleted_network_chaos(&self) -> Vec<String> {
        self.state.lock().deleted_chaos.clone()
    }

    /// Fault objects still present.
    pub fn live_network_chaos(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.lock().chaos.keys().map(|(_, n)| n.clone()).collect();
        names.sort();
        names
    }

    pub fn pod_uid(&self, namespace: &str, name: &str) -> Option<String> {
        self.state
            .lock()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .map(|p| p.pod.uid.clone())
    }

    /// Number of calls made through the cluster boundary.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }
}

impl Default for SimCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(labels: &Selector, selector: &Selector) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[async_trait]
impl ChaosCluster for SimCluster {
    async fn list_pods(&self, namespace: &str, selector: &Selector) -> Result<Vec<PodRef>> {
        let mut state = self.state.lock();
        state.calls += 1;
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), p)| ns == namespace && matches(&p.labels, selector))
            .map(|(_, p)| p.pod.clone())
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, pod: &str, uid: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls += 1;
        if let Some(message) = &state.fail_apply {
            return Err(DrError::ChaosDriver(message.clone()));
        }
        let key = (namespace.to_string(), pod.to_string());
        if !state.pods.get(&key).is_some_and(|p| p.pod.uid == uid) {
            return Ok(false);
        }
        let Some(removed) = state.pods.remove(&key) else {
            return Ok(false);
        };
        state.deleted_pods.push(pod.to_string());
        if state.replace_deleted {
            state.next_uid += 1;
            let uid = format!("uid-{}", state.next_uid);
            state.pods.insert(
                key,
                SimPod {
                    pod: PodRef::new(pod, uid),
                    labels: removed.labels,
                },
            );
        }
        Ok(true)
    }

    async fn pod_exists(&self, namespace: &str, name: &str, uid: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls += 1;
        Ok(state
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .is_some_and(|p| p.pod.uid == uid))
    }

    async fn create_network_chaos(&self, spec: &NetworkDelaySpec) -> Result<()> {
        let mut state = self.state.lock();
        state.calls += 1;
        if let Some(message) = &state.fail_apply {
            return Err(DrError::ChaosDriver(message.clone()));
        }
        let key = (spec.namespace.clone(), spec.name.clone());
        if state.chaos.contains_key(&key) {
            return Ok(());
        }
        let polls_until_injected = state.inject_after;
        state.created_chaos.push(spec.clone());
        state.chaos.insert(
            key,
            SimChaos {
                spec: spec.clone(),
                polls_until_injected,
            },
        );
        Ok(())
    }

    async fn delete_network_chaos(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls += 1;
        if state
            .chaos
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
        {
            state.deleted_chaos.push(name.to_string());
        }
        Ok(())
    }

    async fn network_chaos_injected(&self, namespace: &str, name: &str) -> Result<Option<bool>> {
        let mut state = self.state.lock();
        state.calls += 1;
        let Some(chaos) = state.chaos.get_mut(&(namespace.to_string(), name.to_string())) else {
            return Ok(None);
        };
        debug_assert_eq!(chaos.spec.name, name);
        Ok(match chaos.polls_until_injected.as_mut() {
            None => Some(false),
            Some(0) => Some(true),
            Some(n) => {
                *n -= 1;
                Some(false)
            }
        })
    }
}
