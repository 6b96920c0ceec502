//! Statistics for a single sync cycle.

use crate::event_log::MutationKind;

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Counters for one cycle, reported when the cycle commits.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStats {
    /// Cycle start; also the `synced_at` stamp written on commit.
    pub started_at: DateTime<Utc>,
    pub events_collected: usize,
    pub actions_compiled: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub events_synced: usize,
    pub elapsed: Duration,
}

impl CycleStats {
    pub fn new(started_at: DateTime<Utc>, events_collected: usize) -> Self {
        Self {
            started_at,
            events_collected,
            actions_compiled: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            events_synced: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn record_dispatched(&mut self, kind: MutationKind) {
        match kind {
            MutationKind::Created => self.created += 1,
            MutationKind::Updated => self.updated += 1,
            MutationKind::Deleted => self.deleted += 1,
        }
    }

    pub fn dispatched(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Events that produced no remote call of their own.
    pub fn compacted(&self) -> usize {
        self.events_collected.saturating_sub(self.actions_compiled)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} events -> {} actions ({} created, {} updated, {} deleted, {} compacted), {} marked synced in {:.2}s",
            self.events_collected,
            self.actions_compiled,
            self.created,
            self.updated,
            self.deleted,
            self.compacted(),
            self.events_synced,
            self.elapsed.as_secs_f64()
        )
    }
}
