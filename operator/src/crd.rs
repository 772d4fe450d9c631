//! Custom Resource Definitions for ChaosDR

use chaosdr::validation::ValidationConfig;
use chaosdr::{ChaosParameters, RunStatus, Selector, TestRunSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// ChaosDRTest CRD
// ============================================================================

/// ChaosDRTest describes one disaster-recovery drill for an application
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chaosdr.io",
    version = "v1",
    kind = "ChaosDRTest",
    plural = "chaosdrtests",
    shortname = "cdt",
    status = "RunStatus",
    namespaced,
    printcolumn = r#"{"name":"Chaos","type":"string","jsonPath":".spec.chaosType"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Success","type":"boolean","jsonPath":".status.success"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosDRTestSpec {
    /// Labels selecting the application under test
    pub app_selector: Selector,

    /// Chaos type to inject (pod-delete, network-delay)
    pub chaos_type: String,

    /// Parameters for the chaos type
    #[serde(default)]
    pub chaos_parameters: ChaosParameters,

    /// Checks run against the restored copy
    #[serde(default)]
    pub validation_config: ValidationConfig,

    /// Older single-script form, used when validationConfig.script is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_script: Option<String>,
}

impl ChaosDRTestSpec {
    /// The run spec the orchestrator executes.
    pub fn to_run_spec(&self) -> TestRunSpec {
        let mut validation_config = self.validation_config.clone();
        if validation_config.script().is_none() {
            if let Some(script) = self
                .validation_script
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                validation_config.script = Some(script.to_string());
            }
        }

        TestRunSpec {
            app_selector: self.app_selector.clone(),
            chaos_type: self.chaos_type.clone(),
            chaos_parameters: self.chaos_parameters.clone(),
            validation_config,
        }
    }
}
