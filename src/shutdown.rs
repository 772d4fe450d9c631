//! Graceful shutdown and cancellation for DR test runs.
//!
//! A [`ShutdownCoordinator`] turns OS signals into a process-wide
//! cancellation. Each run receives a [`CancellationSignal`] and races every
//! external call against it, so no call outlives a shutdown request.

use crate::error::{DrError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Maximum time to wait for in-flight runs before force exit.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Sending half of a cancellation.
#[derive(Clone)]
pub struct CancellationSource {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl CancellationSource {
    /// Create a source and its first signal.
    pub fn new() -> (Self, CancellationSignal) {
        let (tx, rx) = watch::channel(None);
        (Self { tx: Arc::new(tx) }, CancellationSignal { rx })
    }

    /// Cancel every signal derived from this source. Only the first reason sticks.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// Get another signal bound to this source.
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of a cancellation; cheap to clone.
#[derive(Clone, Debug)]
pub struct CancellationSignal {
    rx: watch::Receiver<Option<String>>,
}

impl CancellationSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = CancellationSource::new();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Why the signal fired, if it has.
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolve once cancelled. Pends forever if the source is dropped uncancelled.
    pub async fn cancelled(&self) -> String {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Fail fast if already cancelled.
    pub fn check(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(DrError::Cancelled(reason)),
            None => Ok(()),
        }
    }
}

/// Shutdown coordinator for managing graceful operator termination.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    source: CancellationSource,
    /// Flag indicating if shutdown has been initiated.
    is_shutting_down: Arc<AtomicBool>,
    /// Shutdown timeout.
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a new shutdown coordinator with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let (source, _) = CancellationSource::new();
        Self {
            source,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// Signal handed to each run.
    pub fn signal(&self) -> CancellationSignal {
        self.source.signal()
    }

    /// Check if shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown");
            self.source.cancel("operator shutting down");
        }
    }

    /// Wait for shutdown signal (for use in select! macros).
    pub async fn wait_for_shutdown(&self) {
        self.signal().cancelled().await;
    }

    /// Get shutdown timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal handler for graceful shutdown.
pub struct SignalHandler {
    coordinator: ShutdownCoordinator,
}

impl SignalHandler {
    /// Create a new signal handler.
    pub fn new(coordinator: ShutdownCoordinator) -> Self {
        Self { coordinator }
    }

    /// Install signal handlers and run the handler loop.
    /// Returns when a shutdown signal is received.
    #[cfg(unix)]
    pub async fn run(self) {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        self.coordinator.shutdown();
    }

    /// Install signal handlers (Windows version).
    #[cfg(windows)]
    pub async fn run(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        info!("Received Ctrl+C");
        self.coordinator.shutdown();
    }
}

/// Extension trait bounding a fallible future by a timeout and a cancellation signal.
pub trait Bounded<T>: Future<Output = Result<T>> + Sized {
    /// Run until completion, cancellation or `timeout`, whichever comes first.
    fn bounded(
        self,
        operation: &str,
        timeout: Duration,
        cancel: &CancellationSignal,
    ) -> impl Future<Output = Result<T>> + Send
    where
        Self: Send;
}

impl<F, T> Bounded<T> for F
where
    F: Future<Output = Result<T>> + Send,
    T: Send,
{
    async fn bounded(
        self,
        operation: &str,
        timeout: Duration,
        cancel: &CancellationSignal,
    ) -> Result<T> {
        cancel.check()?;
        tokio::select! {
            result = tokio::time::timeout(timeout, self) => match result {
                Ok(inner) => inner,
                Err(_) => Err(DrError::Timeout {
                    operation: operation.to_string(),
                    after: timeout,
                }),
            },
            reason = cancel.cancelled() => {
                info!(operation = %operation, reason = %reason, "Operation cancelled");
                Err(DrError::Cancelled(reason))
            }
        }
    }
}
