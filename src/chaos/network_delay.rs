//! `network-delay`: add latency to every pod of the workload.
//!
//! Parameters:
//!
//! | key           | required | meaning                                   |
//! |---------------|----------|-------------------------------------------|
//! | `delay`       | yes      | added latency, e.g. `100ms`               |
//! | `jitter`      | no       | latency variation, e.g. `10ms`            |
//! | `correlation` | no       | percentage in `[0, 100]`                  |
//! | `duration`    | no       | how long the fault stays active           |

use super::{ChaosCluster, ChaosHandler, ChaosRequest, NetworkDelaySpec};
use crate::config::parse_duration;
use crate::error::{DrError, Result};
use crate::types::{ChaosHandle, ChaosParameters};
use async_trait::async_trait;
use tracing::{debug, info};

const CHAOS_TYPE: &str = "network-delay";

pub struct NetworkDelay;

impl NetworkDelay {
    fn invalid(parameter: &str, reason: impl Into<String>) -> DrError {
        DrError::InvalidParameter {
            chaos_type: CHAOS_TYPE.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    fn check_duration(parameter: &str, value: &str) -> Result<()> {
        // The fault driver needs an explicit unit.
        if value.trim().parse::<f64>().is_ok() {
            return Err(Self::invalid(parameter, format!("'{}' has no unit", value)));
        }
        parse_duration(value).map_err(|e| Self::invalid(parameter, e))?;
        Ok(())
    }

    fn optional<'a>(parameters: &'a ChaosParameters, key: &str) -> Option<&'a str> {
        parameters
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn build_spec(request: &ChaosRequest) -> Result<NetworkDelaySpec> {
        let params = &request.parameters;
        let latency = Self::optional(params, "delay").ok_or_else(|| DrError::MissingParameter {
            chaos_type: CHAOS_TYPE.to_string(),
            parameter: "delay".to_string(),
        })?;

        Ok(NetworkDelaySpec {
            name: request.identity.chaos_object_name(),
            namespace: request.namespace().to_string(),
            selector: request.selector.clone(),
            latency: latency.to_string(),
            jitter: Self::optional(params, "jitter").map(str::to_string),
            correlation: Self::optional(params, "correlation").map(str::to_string),
            duration: Self::optional(params, "duration").map(str::to_string),
        })
    }
}

#[async_trait]
impl ChaosHandler for NetworkDelay {
    fn chaos_type(&self) -> &'static str {
        CHAOS_TYPE
    }

    fn validate(&self, parameters: &ChaosParameters) -> Result<()> {
        let delay = Self::optional(parameters, "delay").ok_or_else(|| DrError::MissingParameter {
            chaos_type: CHAOS_TYPE.to_string(),
            parameter: "delay".to_string(),
        })?;
        Self::check_duration("delay", delay)?;

        for key in ["jitter", "duration"] {
            if let Some(value) = Self::optional(parameters, key) {
                Self::check_duration(key, value)?;
            }
        }

        if let Some(value) = Self::optional(parameters, "correlation") {
            let pct: f64 = value
                .parse()
                .map_err(|_| Self::invalid("correlation", format!("'{}' is not a number", value)))?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(Self::invalid("correlation", "must be between 0 and 100"));
            }
        }
        Ok(())
    }

    async fn plan(&self, _cluster: &dyn ChaosCluster, request: &ChaosRequest) -> Result<ChaosHandle> {
        let spec = Self::build_spec(request)?;
        Ok(ChaosHandle {
            chaos_type: CHAOS_TYPE.to_string(),
            namespace: spec.namespace,
            name: spec.name,
            targets: Vec::new(),
        })
    }

    async fn inject(
        &self,
        cluster: &dyn ChaosCluster,
        request: &ChaosRequest,
        handle: &ChaosHandle,
    ) -> Result<()> {
        let mut spec = Self::build_spec(request)?;
        spec.name = handle.name.clone();
        debug!(name = %spec.name, latency = %spec.latency, "Creating network delay");
        // An object left by an earlier attempt counts as created.
        cluster.create_network_chaos(&spec).await?;
        info!(name = %spec.name, namespace = %spec.namespace, "Network delay injected");
        Ok(())
    }

    async fn cleanup(&self, cluster: &dyn ChaosCluster, handle: &ChaosHandle) -> Result<()> {
        cluster
            .delete_network_chaos(&handle.namespace, &handle.name)
            .await
    }

    async fn check_effect(&self, cluster: &dyn ChaosCluster, handle: &ChaosHandle) -> Result<bool> {
        let injected = cluster
            .network_chaos_injected(&handle.namespace, &handle.name)
            .await?;
        Ok(injected.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::testing::FakeCluster;
    use crate::types::RunIdentity;

    fn params(pairs: &[(&str, &str)]) -> ChaosParameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn request(parameters: ChaosParameters) -> ChaosRequest {
        ChaosRequest {
            chaos_type: CHAOS_TYPE.to_string(),
            identity: RunIdentity::new("apps", "web"),
            selector: params(&[("app", "web")]),
            parameters,
        }
    }

    #[test]
    fn test_delay_is_required() {
        for p in [params(&[]), params(&[("delay", "  ")]), params(&[("jitter", "10ms")])] {
            let err = NetworkDelay.validate(&p).unwrap_err();
            assert!(matches!(err, DrError::MissingParameter { ref parameter, .. } if parameter == "delay"));
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(NetworkDelay.validate(&params(&[("delay", "fast")])).is_err());
        assert!(NetworkDelay.validate(&params(&[("delay", "100")])).is_err());
        assert!(NetworkDelay
            .validate(&params(&[("delay", "100ms"), ("correlation", "150")]))
            .is_err());
        assert!(NetworkDelay
            .validate(&params(&[("delay", "100ms"), ("jitter", "abc")]))
            .is_err());
    }

    #[test]
    fn test_oversized_duration_is_invalid() {
        for key in ["delay", "jitter", "duration"] {
            let mut p = params(&[("delay", "100ms")]);
            p.insert(key.to_string(), "99999999999999999999h".to_string());
            let err = NetworkDelay.validate(&p).unwrap_err();
            assert!(
                matches!(err, DrError::InvalidParameter { ref parameter, .. } if parameter == key),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn test_accepts_full_parameter_set() {
        NetworkDelay
            .validate(&params(&[
                ("delay", "100ms"),
                ("jitter", "10ms"),
                ("correlation", "25"),
                ("duration", "5m"),
            ]))
            .unwrap();
    }

    #[tokio::test]
    async fn test_spec_carries_values_verbatim() {
        let cluster = FakeCluster::default();
        let req = request(params(&[("delay", "100ms"), ("jitter", "10ms")]));
        let handle = NetworkDelay.plan(&cluster, &req).await.unwrap();
        assert!(cluster.created_network_chaos().is_empty());
        NetworkDelay.inject(&cluster, &req, &handle).await.unwrap();

        assert_eq!(handle.name, "chaos-web");
        let created = cluster.created_network_chaos();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].latency, "100ms");
        assert_eq!(created[0].jitter.as_deref(), Some("10ms"));
        assert_eq!(created[0].correlation, None);
    }

    #[tokio::test]
    async fn test_effect_follows_injection_state() {
        let cluster = FakeCluster::default();
        let req = request(params(&[("delay", "50ms")]));
        let handle = NetworkDelay.plan(&cluster, &req).await.unwrap();
        NetworkDelay.inject(&cluster, &req, &handle).await.unwrap();

        assert!(!NetworkDelay.check_effect(&cluster, &handle).await.unwrap());
        cluster.set_injected(Some(true));
        assert!(NetworkDelay.check_effect(&cluster, &handle).await.unwrap());

        NetworkDelay.cleanup(&cluster, &handle).await.unwrap();
        assert_eq!(cluster.deleted_network_chaos(), vec!["chaos-web".to_string()]);
    }
}
