//! Chaos type registry.

use super::{ChaosCluster, ChaosHandler, ChaosRequest, NetworkDelay, PodDelete};
use crate::error::{DrError, Result};
use crate::types::{ChaosHandle, ChaosParameters};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps chaos type names to handlers and dispatches to them.
pub struct ChaosRegistry {
    cluster: Arc<dyn ChaosCluster>,
    handlers: HashMap<String, Arc<dyn ChaosHandler>>,
}

impl ChaosRegistry {
    /// Empty registry bound to `cluster`.
    pub fn new(cluster: Arc<dyn ChaosCluster>) -> Self {
        Self {
            cluster,
            handlers: HashMap::new(),
        }
    }

    /// Registry with the built-in `pod-delete` and `network-delay` types.
    pub fn with_defaults(cluster: Arc<dyn ChaosCluster>) -> Self {
        let mut registry = Self::new(cluster);
        registry.register(Arc::new(PodDelete));
        registry.register(Arc::new(NetworkDelay));
        registry
    }

    /// Register a handler, replacing any handler with the same type name.
    pub fn register(&mut self, handler: Arc<dyn ChaosHandler>) {
        let name = handler.chaos_type().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(chaos_type = %name, "Replaced chaos handler");
        }
    }

    /// Registered type names, sorted.
    pub fn chaos_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    fn handler(&self, chaos_type: &str) -> Result<&Arc<dyn ChaosHandler>> {
        self.handlers
            .get(chaos_type)
            .ok_or_else(|| DrError::UnsupportedChaosType(chaos_type.to_string()))
    }

    /// Check that the type is known and its parameters are well formed.
    pub fn validate(&self, chaos_type: &str, parameters: &ChaosParameters) -> Result<()> {
        self.handler(chaos_type)?.validate(parameters)
    }

    /// Validate the request and choose its targets. Touches nothing.
    pub async fn plan(&self, request: &ChaosRequest) -> Result<ChaosHandle> {
        let handler = self.handler(&request.chaos_type)?;
        handler.validate(&request.parameters)?;
        debug!(chaos_type = %request.chaos_type, identity = %request.identity, "Planning chaos");
        handler.plan(self.cluster.as_ref(), request).await
    }

    /// Inject a planned fault. Safe to repeat with the same handle.
    pub async fn inject(&self, request: &ChaosRequest, handle: &ChaosHandle) -> Result<()> {
        self.handler(&handle.chaos_type)?
            .inject(self.cluster.as_ref(), request, handle)
            .await
    }

    pub async fn cleanup(&self, handle: &ChaosHandle) -> Result<()> {
        self.handler(&handle.chaos_type)?
            .cleanup(self.cluster.as_ref(), handle)
            .await
    }

    /// Whether the fault behind `handle` has taken effect.
    pub async fn is_effective(&self, handle: &ChaosHandle) -> Result<bool> {
        self.handler(&handle.chaos_type)?
            .check_effect(self.cluster.as_ref(), handle)
            .await
    }
}
