//! ChaosDR Kubernetes Operator
//!
//! Runs ChaosDRTest disaster-recovery drills: backup, chaos injection,
//! restore into a sandbox namespace, validation and attestation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use chaosdr::attestation::HttpAttestationClient;
use chaosdr::chaos::ChaosRegistry;
use chaosdr::config::OperatorConfig;
use chaosdr::orchestrator::{Collaborators, Orchestrator, OrchestratorSettings};
use chaosdr::process::TokioCommandRunner;
use chaosdr::shutdown::{ShutdownCoordinator, SignalHandler};
use chaosdr::validation::CheckValidator;
use clap::{Parser, ValueEnum};
use kube::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod chaos_mesh;
mod cluster;
mod controller;
mod crd;
mod error;
mod health;
mod metrics;
mod status_store;

use cluster::KubeChaosCluster;
use controller::Controller;
use health::Readiness;
use metrics::PrometheusMetrics;
use status_store::KubeStatusStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "chaosdr-operator")]
#[command(about = "Kubernetes Operator running ChaosDRTest disaster-recovery drills")]
struct Args {
    /// Configuration file (YAML, JSON or TOML)
    #[arg(short, long, env = "CHAOSDR_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace to watch (empty for all namespaces)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Metrics server address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Health check address
    #[arg(long)]
    health_addr: Option<SocketAddr>,

    /// Log level, used when RUST_LOG is unset
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Start from the fast-polling development configuration
    #[arg(long)]
    development: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<OperatorConfig> {
        let mut config = if self.development {
            let mut config = OperatorConfig::development();
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        } else {
            OperatorConfig::load(self.config.as_ref()).context("failed to load configuration")?
        };

        if let Some(ns) = &self.namespace {
            config.controller.namespace = ns.clone();
        }
        if let Some(addr) = self.metrics_addr {
            config.observability.metrics_addr = addr;
        }
        if let Some(addr) = self.health_addr {
            config.observability.health_addr = addr;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.json_logs = format == LogFormat::Json;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    init_tracing(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;

    info!("Starting ChaosDR Kubernetes Operator");
    info!(
        namespace = %config.controller.namespace,
        backup_tool = ?config.backup.tool,
        "Watching namespace"
    );

    let client = Client::try_default().await?;
    let metrics = Arc::new(PrometheusMetrics::new()?);

    let chaos = ChaosRegistry::with_defaults(Arc::new(KubeChaosCluster::new(client.clone())));
    info!(chaos_types = ?chaos.chaos_types(), "Chaos types registered");

    let parts = Collaborators {
        backup: chaosdr::backup::from_config(&config.backup, Arc::new(TokioCommandRunner)),
        chaos: Arc::new(chaos),
        validator: Arc::new(CheckValidator::from_settings(&config.validation)?),
        attestation: Arc::new(HttpAttestationClient::new(&config.attestation)?),
        store: Arc::new(KubeStatusStore::new(client.clone())),
        metrics: metrics.clone(),
    };
    let orchestrator = Arc::new(Orchestrator::new(parts, OrchestratorSettings::from(&config)));

    let coordinator = ShutdownCoordinator::new();
    tokio::spawn(SignalHandler::new(coordinator.clone()).run());

    let readiness = Readiness::new();

    let metrics_handle = {
        let stop = coordinator.clone();
        tokio::spawn(metrics::run_metrics_server(
            config.observability.metrics_addr,
            metrics,
            async move { stop.wait_for_shutdown().await },
        ))
    };

    let health_handle = {
        let stop = coordinator.clone();
        tokio::spawn(health::run_health_server(
            config.observability.health_addr,
            readiness.clone(),
            async move { stop.wait_for_shutdown().await },
        ))
    };

    let controller = Controller::new(
        client,
        &config.controller,
        orchestrator,
        coordinator.clone(),
        readiness,
    );

    // In-flight runs see the cancellation and fail; give them a bounded
    // window to record that before exiting.
    let result = tokio::select! {
        result = controller.run() => result,
        _ = async {
            coordinator.wait_for_shutdown().await;
            tokio::time::sleep(coordinator.timeout()).await;
        } => {
            warn!(timeout = ?coordinator.timeout(), "Shutdown timeout exceeded");
            Ok(())
        }
    };

    coordinator.shutdown();
    for (name, handle) in [("metrics", metrics_handle), ("health", health_handle)] {
        match handle.await {
            Ok(Ok(())) => info!(server = name, "Server stopped"),
            Ok(Err(e)) => error!(server = name, error = %e, "Server failed"),
            Err(e) => error!(server = name, error = %e, "Server task panicked"),
        }
    }

    result?;
    info!("Operator stopped");
    Ok(())
}
