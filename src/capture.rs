//! Change capture hook.
//!
//! The entity-owning layer calls the hook for every create, update and delete of a
//! tracked entity, while it still holds whatever guards its own mutation. The hook
//! appends the matching event to the mutation log; if the append fails the caller
//! must abandon the mutation, so a committed mutation always has its event and an
//! event never outlives a rolled-back mutation.

use crate::entities::{EntityKey, Trackable};
use crate::event_log::{EventLogRepository, LogStoreError, MutationEvent, MutationKind, NewMutationEvent};

use std::sync::Arc;
use tracing::debug;

/// A mutation about to be committed, described by the entity it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedMutation {
    pub key: EntityKey,
    pub kind: MutationKind,
}

impl CapturedMutation {
    pub fn of<E: Trackable>(entity: &E, kind: MutationKind) -> Self {
        Self {
            key: entity.entity_key(),
            kind,
        }
    }
}

#[derive(Clone)]
pub struct ChangeCaptureHook {
    log: Arc<dyn EventLogRepository>,
}

impl ChangeCaptureHook {
    pub fn new(log: Arc<dyn EventLogRepository>) -> Self {
        Self { log }
    }

    /// Record exactly one event for `entity`.
    ///
    /// Store failures are returned to the caller, which must roll its mutation back.
    pub async fn on_mutation<E: Trackable>(
        &self,
        entity: &E,
        kind: MutationKind,
    ) -> Result<MutationEvent, LogStoreError> {
        let event = self
            .log
            .insert(NewMutationEvent::new(entity.entity_key(), kind))
            .await?;
        debug!("Captured {} of {} as event {}", kind, event.key(), event.id);
        Ok(event)
    }

    /// Record several mutations that commit together, such as a cascading delete.
    ///
    /// Either all events are appended, in the given order, or none are.
    pub async fn on_mutations(
        &self,
        mutations: &[CapturedMutation],
    ) -> Result<Vec<MutationEvent>, LogStoreError> {
        let events = mutations
            .iter()
            .map(|m| NewMutationEvent::new(m.key, m.kind))
            .collect();
        let appended = self.log.append(events).await?;
        debug!("Captured {} mutations in one batch", appended.len());
        Ok(appended)
    }
}
