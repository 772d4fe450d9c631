//! Bounded polling for fault effects.
//!
//! After injection the orchestrator does not sleep for a fixed time. It polls
//! an effect predicate on an interval until the predicate holds, the deadline
//! passes, or the run is cancelled.

use crate::config::ChaosConfig;
use crate::error::{DrError, Result};
use crate::shutdown::{Bounded, CancellationSignal};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Polling configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between two probes.
    pub interval: Duration,
    /// Total time allowed for the effect to show up.
    pub timeout: Duration,
    /// Bound on a single probe.
    pub call_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from(&ChaosConfig::default())
    }
}

impl From<&ChaosConfig> for PollConfig {
    fn from(config: &ChaosConfig) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.effect_timeout,
            call_timeout: config.call_timeout,
        }
    }
}

/// Outcome of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitReport {
    pub polls: u32,
    pub waited: Duration,
}

/// Polls an effect predicate until it holds.
pub struct EffectWaiter {
    config: PollConfig,
}

impl EffectWaiter {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Poll `probe` until it returns `true`.
    ///
    /// Retryable probe errors count as "not yet". Any other probe error ends
    /// the wait. Running out of time yields [`DrError::ChaosTimeout`].
    pub async fn wait_for<F, Fut>(
        &self,
        chaos_type: &str,
        cancel: &CancellationSignal,
        mut probe: F,
    ) -> Result<WaitReport>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>> + Send,
    {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut polls = 0;

        loop {
            polls += 1;
            match probe()
                .bounded("effect probe", self.config.call_timeout, cancel)
                .await
            {
                Ok(true) => {
                    let waited = started.elapsed();
                    debug!(chaos_type = %chaos_type, polls, waited_ms = waited.as_millis(), "Chaos effect observed");
                    return Ok(WaitReport { polls, waited });
                }
                Ok(false) => {}
                Err(e @ DrError::Cancelled(_)) => return Err(e),
                Err(e) if e.is_retryable() => {
                    warn!(chaos_type = %chaos_type, error = %e, "Effect probe failed, polling again");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DrError::ChaosTimeout {
                    chaos_type: chaos_type.to_string(),
                    waited: now - started,
                });
            }

            let pause = self.config.interval.min(deadline - now);
            tokio::select! {
                _ = sleep(pause) => {}
                reason = cancel.cancelled() => return Err(DrError::Cancelled(reason)),
            }
        }
    }
}
