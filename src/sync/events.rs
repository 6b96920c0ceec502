//! Lifecycle notifications for sync cycles.
//!
//! The orchestrator publishes a `CycleEvent` at every phase change, after every
//! dispatched action and when a cycle ends. Handlers observe these without being
//! able to influence the cycle; logging is one such handler and is always
//! registered.

use crate::sync::{CycleStats, SyncAction, SyncPhase};

use tracing::{debug, error, info, warn};

/// Events that occur during a sync cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// The orchestrator moved to a new phase
    PhaseChanged { from: SyncPhase, to: SyncPhase },
    /// One compiled action reached the remote side
    ActionDispatched { action: SyncAction },
    /// The log held nothing to sync
    NothingToSync,
    /// The batch was dispatched and committed
    CycleCompleted { stats: CycleStats },
    /// The cycle was abandoned in `phase`; nothing was marked synced
    CycleFailed { phase: SyncPhase, cause: String },
}

/// Trait for observing cycle events.
#[async_trait::async_trait]
pub trait CycleEventHandler: Send + Sync {
    async fn handle(&mut self, event: &CycleEvent);

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Delivers each event to every registered handler, in registration order.
pub struct CycleEventBus {
    handlers: Vec<Box<dyn CycleEventHandler>>,
}

impl CycleEventBus {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Box<dyn CycleEventHandler>) {
        debug!("Registered cycle event handler {}", handler.name());
        self.handlers.push(handler);
    }

    pub async fn publish(&mut self, event: &CycleEvent) {
        for handler in &mut self.handlers {
            handler.handle(event).await;
        }
    }
}

impl Default for CycleEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes cycle events to the tracing log.
pub struct LoggingHandler;

#[async_trait::async_trait]
impl CycleEventHandler for LoggingHandler {
    async fn handle(&mut self, event: &CycleEvent) {
        match event {
            CycleEvent::PhaseChanged { from, to } => debug!("Sync phase {} -> {}", from, to),
            CycleEvent::ActionDispatched { action } => debug!("Dispatched {}", action),
            CycleEvent::NothingToSync => warn!("Nothing to sync"),
            CycleEvent::CycleCompleted { stats } => info!("Sync cycle committed: {}", stats.summary()),
            CycleEvent::CycleFailed { phase, cause } => {
                error!("Sync cycle failed while {}: {}", phase, cause)
            }
        }
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
