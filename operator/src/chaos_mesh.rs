//! Chaos Mesh `NetworkChaos` resource, limited to the fields the network
//! delay fault uses.

use chaosdr::chaos::NetworkDelaySpec;
use chaosdr::Selector;
use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition Chaos Mesh sets once every selected pod carries the fault.
pub const ALL_INJECTED: &str = "AllInjected";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chaos-mesh.org",
    version = "v1alpha1",
    kind = "NetworkChaos",
    plural = "networkchaos",
    status = "NetworkChaosStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkChaosSpec {
    /// Fault action; always `delay` here
    pub action: String,

    /// Target selection mode; always `all` here
    pub mode: String,

    pub selector: PodSelector,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelaySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSelector {
    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default)]
    pub label_selectors: Selector,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DelaySpec {
    pub latency: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkChaosStatus {
    #[serde(default)]
    pub conditions: Vec<ChaosCondition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChaosCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NetworkChaos {
    /// Build the object for a delay fault.
    pub fn from_delay_spec(spec: &NetworkDelaySpec) -> Self {
        let mut chaos = NetworkChaos::new(
            &spec.name,
            NetworkChaosSpec {
                action: "delay".to_string(),
                mode: "all".to_string(),
                selector: PodSelector {
                    namespaces: vec![spec.namespace.clone()],
                    label_selectors: spec.selector.clone(),
                },
                delay: Some(DelaySpec {
                    latency: spec.latency.clone(),
                    jitter: spec.jitter.clone(),
                    correlation: spec.correlation.clone(),
                }),
                duration: spec.duration.clone(),
            },
        );
        chaos.metadata = ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(
                [(
                    "app.kubernetes.io/managed-by".to_string(),
                    "chaosdr-operator".to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..ObjectMeta::default()
        };
        chaos
    }
}

/// Injection state from the object's status. `None` until Chaos Mesh has
/// reported the `AllInjected` condition.
pub fn all_injected(status: Option<&NetworkChaosStatus>) -> Option<bool> {
    status?
        .conditions
        .iter()
        .find(|c| c.type_ == ALL_INJECTED)
        .map(|c| c.status.eq_ignore_ascii_case("true"))
}
