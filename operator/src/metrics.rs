//! Prometheus metrics for the ChaosDR operator

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chaosdr::metrics::MetricsSink;
use chaosdr::{RunIdentity, RunPhase};
use prometheus::{
    histogram_opts, linear_buckets, opts, CounterVec, GaugeVec, Histogram, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::Error;

/// Metrics of every run handled by this process, in a private registry.
pub struct PrometheusMetrics {
    registry: Registry,
    test_success: GaugeVec,
    backup_duration: Histogram,
    restore_duration: Histogram,
    runs: CounterVec,
    phase_transitions: CounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, Error> {
        let registry = Registry::new();

        let test_success = GaugeVec::new(
            opts!("chaosdr_test_success", "Whether the last DR test run succeeded (1) or not (0)"),
            &["namespace", "name"],
        )?;
        let backup_duration = Histogram::with_opts(histogram_opts!(
            "chaosdr_backup_duration_seconds",
            "Duration of backup operations",
            linear_buckets(1.0, 5.0, 10)?
        ))?;
        let restore_duration = Histogram::with_opts(histogram_opts!(
            "chaosdr_restore_duration_seconds",
            "Duration of restore operations",
            linear_buckets(1.0, 5.0, 10)?
        ))?;
        let runs = CounterVec::new(
            opts!("chaosdr_runs_total", "DR test runs that reached a terminal phase"),
            &["result"],
        )?;
        let phase_transitions = CounterVec::new(
            opts!("chaosdr_phase_transitions_total", "Phases entered by DR test runs"),
            &["phase"],
        )?;

        registry.register(Box::new(test_success.clone()))?;
        registry.register(Box::new(backup_duration.clone()))?;
        registry.register(Box::new(restore_duration.clone()))?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(phase_transitions.clone()))?;

        Ok(Self {
            registry,
            test_success,
            backup_duration,
            restore_duration,
            runs,
            phase_transitions,
        })
    }

    /// Text exposition of every metric.
    pub fn render(&self) -> Result<String, Error> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_success(&self, identity: &RunIdentity, success: bool) {
        self.test_success
            .with_label_values(&[identity.namespace.as_str(), identity.name.as_str()])
            .set(if success { 1.0 } else { 0.0 });
        let result = if success { "success" } else { "failure" };
        self.runs.with_label_values(&[result]).inc();
    }

    fn observe_backup(&self, seconds: f64) {
        self.backup_duration.observe(seconds);
    }

    fn observe_restore(&self, seconds: f64) {
        self.restore_duration.observe(seconds);
    }

    fn record_phase(&self, _identity: &RunIdentity, phase: RunPhase) {
        self.phase_transitions
            .with_label_values(&[phase.as_str()])
            .inc();
    }
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Serve `/metrics` on `addr` until `shutdown` resolves.
pub async fn run_metrics_server<F>(
    addr: SocketAddr,
    metrics: Arc<PrometheusMetrics>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server started");
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown)
        .await
}
