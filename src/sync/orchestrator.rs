//! Sync orchestrator and entry point for one sync cycle.
//!
//! A cycle walks `Idle -> Collecting -> Compiling -> Dispatching -> Committing -> Idle`:
//! it reads every unsynced event, compiles them into at most one action per entity,
//! dispatches the actions one by one in compiled order, and finally stamps the whole
//! collected batch with the cycle's start time. Any failure moves the orchestrator to
//! `Failed` before the stamp is written, so the next cycle sees the same batch again.
//!
//! `run_cycle` takes `&mut self`; holding the orchestrator is what guarantees one
//! cycle at a time. All per-cycle working state lives in a `SyncCycle` that is
//! dropped when the cycle ends.

use crate::event_log::{EventId, EventLogRepository, MutationEvent};
use crate::sync::{
    ActionCompiler, ActionDispatcher, CycleEvent, CycleEventBus, CycleEventHandler, CycleStats,
    LoggingHandler, SyncAction, SyncError, SyncOutcome, SyncPhase,
};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Working set of a single cycle.
pub struct SyncCycle {
    started_at: DateTime<Utc>,
    clock: Instant,
    batch: Vec<MutationEvent>,
    actions: Vec<SyncAction>,
}

impl SyncCycle {
    fn new(started_at: DateTime<Utc>, batch: Vec<MutationEvent>) -> Self {
        Self {
            started_at,
            clock: Instant::now(),
            batch,
            actions: Vec::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn batch(&self) -> &[MutationEvent] {
        &self.batch
    }

    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    /// Ids of every collected event, including those compiled away.
    fn batch_ids(&self) -> Vec<EventId> {
        self.batch.iter().map(|e| e.id).collect()
    }
}

pub struct SyncOrchestrator {
    log: Arc<dyn EventLogRepository>,
    dispatcher: ActionDispatcher,
    events: CycleEventBus,
    phase: SyncPhase,
    last_stats: Option<CycleStats>,
}

impl SyncOrchestrator {
    pub fn new(log: Arc<dyn EventLogRepository>, dispatcher: ActionDispatcher) -> Self {
        let mut events = CycleEventBus::new();
        events.register_handler(Box::new(LoggingHandler));
        Self {
            log,
            dispatcher,
            events,
            phase: SyncPhase::Idle,
            last_stats: None,
        }
    }

    pub fn register_handler(&mut self, handler: Box<dyn CycleEventHandler>) {
        self.events.register_handler(handler);
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Statistics of the last committed cycle.
    pub fn last_stats(&self) -> Option<&CycleStats> {
        self.last_stats.as_ref()
    }

    /// Run one collect, compile, dispatch, commit cycle.
    pub async fn run_cycle(&mut self) -> SyncOutcome {
        self.phase = SyncPhase::Idle;
        let started_at = Utc::now();

        match self.execute(started_at).await {
            Ok(Some(stats)) => {
                let synced = stats.events_synced;
                self.last_stats = Some(stats.clone());
                self.events
                    .publish(&CycleEvent::CycleCompleted { stats })
                    .await;
                self.transition(SyncPhase::Idle).await;
                SyncOutcome::Synced(synced)
            }
            Ok(None) => {
                self.events.publish(&CycleEvent::NothingToSync).await;
                self.transition(SyncPhase::Idle).await;
                SyncOutcome::NothingToSync
            }
            Err(err) => {
                let phase = self.phase;
                self.transition(SyncPhase::Failed).await;
                self.events
                    .publish(&CycleEvent::CycleFailed {
                        phase,
                        cause: err.to_string(),
                    })
                    .await;
                SyncOutcome::Failed(err)
            }
        }
    }

    async fn execute(&mut self, started_at: DateTime<Utc>) -> Result<Option<CycleStats>, SyncError> {
        self.transition(SyncPhase::Collecting).await;
        let batch = self.log.fetch_unsynced().await?;
        if batch.is_empty() {
            return Ok(None);
        }
        let mut cycle = SyncCycle::new(started_at, batch);
        let mut stats = CycleStats::new(cycle.started_at(), cycle.batch().len());
        info!("Collected {} unsynced events", cycle.batch().len());

        self.transition(SyncPhase::Compiling).await;
        cycle.actions = ActionCompiler::compile(cycle.batch()).collect();
        stats.actions_compiled = cycle.actions().len();

        self.transition(SyncPhase::Dispatching).await;
        for action in cycle.actions() {
            self.dispatcher
                .dispatch(action)
                .await
                .map_err(|source| SyncError::Dispatch {
                    action: *action,
                    source,
                })?;
            stats.record_dispatched(action.kind);
            self.events
                .publish(&CycleEvent::ActionDispatched { action: *action })
                .await;
        }

        self.transition(SyncPhase::Committing).await;
        stats.events_synced = self
            .log
            .mark_synced(&cycle.batch_ids(), cycle.started_at())
            .await?;
        stats.elapsed = cycle.clock.elapsed();

        Ok(Some(stats))
    }

    async fn transition(&mut self, to: SyncPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        self.events
            .publish(&CycleEvent::PhaseChanged { from, to })
            .await;
    }
}
