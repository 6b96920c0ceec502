//! Periodic runner for sync cycles.
//!
//! Runs one cycle per tick, never two at once. After a failed cycle the next attempt
//! is delayed with exponential backoff instead of the regular interval; the backoff
//! resets once a cycle succeeds or finds nothing to sync.

use crate::sync::{SyncOrchestrator, SyncOutcome};

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for the periodic scheduler
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Delay between cycles after success or an empty log
    pub interval: Duration,
    /// Upper bound for the delay after repeated failures
    pub max_backoff: Duration,
    /// Randomization applied to failure delays, between 0.0 and 1.0
    pub jitter: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_backoff: Duration::from_secs(15 * 60),
            jitter: 0.5,
        }
    }
}

pub struct SyncScheduler {
    orchestrator: SyncOrchestrator,
    config: ScheduleConfig,
    backoff: ExponentialBackoff,
}

impl SyncScheduler {
    pub fn new(orchestrator: SyncOrchestrator, config: ScheduleConfig) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(config.interval)
            .with_randomization_factor(config.jitter)
            .with_multiplier(2.0)
            .with_max_interval(config.max_backoff)
            .with_max_elapsed_time(None)
            .build();
        Self {
            orchestrator,
            config,
            backoff,
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Run a single cycle. Its outcome is logged by the orchestrator's event handlers.
    pub async fn run_once(&mut self) -> SyncOutcome {
        info!("Sync started");
        self.orchestrator.run_cycle().await
    }

    /// Delay before the next cycle, given the outcome of the last one.
    pub fn next_delay(&mut self, outcome: &SyncOutcome) -> Duration {
        if outcome.is_failed() {
            self.backoff
                .next_backoff()
                .unwrap_or(self.config.max_backoff)
        } else {
            self.backoff.reset();
            self.config.interval
        }
    }

    /// Run cycles until `shutdown` resolves. A cycle in flight is always finished.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let outcome = self.run_once().await;
            let delay = self.next_delay(&outcome);
            if outcome.is_failed() {
                warn!("Retrying in {:.1}s", delay.as_secs_f64());
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping sync scheduler");
                    break;
                }
            }
        }
    }
}
