//! Fault injection for DR tests.
//!
//! Chaos types are pluggable: each one is a [`ChaosHandler`] registered in a
//! [`ChaosRegistry`] under its type name. Handlers never talk to the cluster
//! directly; they go through the [`ChaosCluster`] boundary, which the
//! operator implements on top of the Kubernetes API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ChaosRegistry                  │
//! │   "pod-delete" ─► PodDelete                  │
//! │   "network-delay" ─► NetworkDelay            │
//! ├──────────────────────────────────────────────┤
//! │               ChaosCluster                   │
//! │   pods │ NetworkChaos objects                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use chaosdr::chaos::{ChaosRegistry, ChaosRequest};
//!
//! let registry = ChaosRegistry::with_defaults(cluster);
//! registry.validate("network-delay", &params)?;
//! let handle = registry.plan(&request).await?;
//! registry.inject(&request, &handle).await?;
//! while !registry.is_effective(&handle).await? { /* poll */ }
//! registry.cleanup(&handle).await?;
//! ```

mod network_delay;
mod pod_delete;
mod registry;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use network_delay::NetworkDelay;
pub use pod_delete::PodDelete;
pub use registry::ChaosRegistry;
pub use types::{ChaosRequest, NetworkDelaySpec, PodRef};

use crate::error::Result;
use crate::types::{ChaosHandle, ChaosParameters, Selector};
use async_trait::async_trait;

/// Cluster operations the chaos handlers need.
#[async_trait]
pub trait ChaosCluster: Send + Sync {
    /// Pods in `namespace` matching every label of `selector`.
    async fn list_pods(&self, namespace: &str, selector: &Selector) -> Result<Vec<PodRef>>;

    /// Delete the pod named `pod` only while it still has the given UID.
    /// Returns false when that pod is already gone or was replaced.
    async fn delete_pod(&self, namespace: &str, pod: &str, uid: &str) -> Result<bool>;

    /// Whether the pod named `name` with the given UID still exists.
    async fn pod_exists(&self, namespace: &str, name: &str, uid: &str) -> Result<bool>;

    /// Create a network-delay fault object. An existing object with the same
    /// name counts as success.
    async fn create_network_chaos(&self, spec: &NetworkDelaySpec) -> Result<()>;

    /// Delete a network-delay fault object. A missing object counts as success.
    async fn delete_network_chaos(&self, namespace: &str, name: &str) -> Result<()>;

    /// Injection state of a fault object: `None` while the driver has not
    /// reported yet, `Some(true)` once every target is injected.
    async fn network_chaos_injected(&self, namespace: &str, name: &str) -> Result<Option<bool>>;
}

/// One chaos type.
#[async_trait]
pub trait ChaosHandler: Send + Sync {
    /// Name the type is registered under.
    fn chaos_type(&self) -> &'static str;

    /// Check the parameters without touching the cluster.
    fn validate(&self, parameters: &ChaosParameters) -> Result<()>;

    /// Choose what the fault will hit, without changing the cluster.
    ///
    /// The handle is recorded before [`inject`](Self::inject) runs, so a
    /// resumed run injects into the same targets.
    async fn plan(&self, cluster: &dyn ChaosCluster, request: &ChaosRequest) -> Result<ChaosHandle>;

    /// Inject the planned fault. Repeating it for the same handle must not
    /// widen the fault.
    async fn inject(
        &self,
        cluster: &dyn ChaosCluster,
        request: &ChaosRequest,
        handle: &ChaosHandle,
    ) -> Result<()>;

    /// Remove the fault. Must tolerate a fault that is already gone.
    async fn cleanup(&self, cluster: &dyn ChaosCluster, handle: &ChaosHandle) -> Result<()>;

    /// True once the fault's effect is observable.
    async fn check_effect(&self, cluster: &dyn ChaosCluster, handle: &ChaosHandle) -> Result<bool>;
}
