//! Kubernetes controller for ChaosDRTest resources

use std::sync::Arc;
use std::time::Duration;

use chaosdr::config::ControllerConfig;
use chaosdr::orchestrator::{Orchestrator, RunOutcome};
use chaosdr::shutdown::ShutdownCoordinator;
use chaosdr::RunIdentity;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller as KubeController};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::crd::ChaosDRTest;
use crate::error::Error;
use crate::health::Readiness;

/// Shared state handed to every reconciliation
pub struct Context {
    pub orchestrator: Arc<Orchestrator>,
    pub shutdown: ShutdownCoordinator,
    pub requeue_interval: Duration,
}

/// Main controller for ChaosDRTest resources
pub struct Controller {
    client: Client,
    namespace: String,
    readiness: Readiness,
    context: Arc<Context>,
}

impl Controller {
    pub fn new(
        client: Client,
        config: &ControllerConfig,
        orchestrator: Arc<Orchestrator>,
        shutdown: ShutdownCoordinator,
        readiness: Readiness,
    ) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            readiness,
            context: Arc::new(Context {
                orchestrator,
                shutdown,
                requeue_interval: config.requeue_interval,
            }),
        }
    }

    /// Run the controller until shutdown.
    pub async fn run(&self) -> Result<(), Error> {
        info!("Starting ChaosDR controller");

        let tests: Api<ChaosDRTest> = if self.namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), &self.namespace)
        };

        // Verify CRD is installed
        let lp = ListParams::default().limit(1);
        if let Err(e) = tests.list(&lp).await {
            error!("Failed to list ChaosDRTests. Is the CRD installed? Error: {}", e);
            return Err(Error::CrdNotInstalled);
        }

        info!("CRD verification successful");
        self.readiness.set_ready(true);

        // The shutdown trigger must be Sync, so bridge the signal through a oneshot.
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = self.context.shutdown.clone();
        tokio::spawn(async move {
            shutdown.wait_for_shutdown().await;
            let _ = stop_tx.send(());
        });

        KubeController::new(tests, Config::default())
            .graceful_shutdown_on(async move {
                let _ = stop_rx.await;
            })
            .run(reconcile, error_policy, Arc::clone(&self.context))
            .for_each(|result| async move {
                match result {
                    Ok((obj, action)) => {
                        debug!(name = %obj.name, ?action, "Reconciliation successful");
                    }
                    Err(e) => {
                        warn!(error = %e, "Reconciliation error");
                    }
                }
            })
            .await;

        self.readiness.set_ready(false);
        info!("Controller stopped");
        Ok(())
    }
}

/// Reconcile a ChaosDRTest: drive its run to a terminal phase.
async fn reconcile(test: Arc<ChaosDRTest>, ctx: Arc<Context>) -> Result<Action, Error> {
    let identity = RunIdentity::new(test.namespace().unwrap_or_default(), test.name_any());

    if test.metadata.deletion_timestamp.is_some() {
        debug!(run = %identity, "Test is being deleted");
        return Ok(Action::await_change());
    }

    info!(run = %identity, "Reconciling ChaosDRTest");
    let spec = test.spec.to_run_spec();
    let outcome = ctx
        .orchestrator
        .execute(&identity, &spec, &ctx.shutdown.signal())
        .await;

    outcome_action(&identity, outcome)
}

/// What the controller does after a trigger. Terminal runs wait for a spec
/// change; a run whose status could not be recorded is retried.
fn outcome_action(identity: &RunIdentity, outcome: RunOutcome) -> Result<Action, Error> {
    match outcome {
        RunOutcome::Completed(status) => {
            info!(run = %identity, phase = %status.phase, success = status.success, "Run finished");
            Ok(Action::await_change())
        }
        RunOutcome::AlreadyTerminal(_) | RunOutcome::NotFound => Ok(Action::await_change()),
        RunOutcome::Deferred { reason } => Err(Error::Deferred(reason)),
    }
}

/// Error policy for reconciliation failures
fn error_policy(_test: Arc<ChaosDRTest>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(error = %error, "Reconciliation error, will retry");
    Action::requeue(ctx.requeue_interval)
}
