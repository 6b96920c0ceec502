//! Action compiler.
//!
//! Folds an ordered batch of mutation events into at most one sync action per
//! entity. Each entity's events are reduced left to right:
//!
//! | current   | next      | result                    |
//! |-----------|-----------|---------------------------|
//! | `Created` | `Deleted` | entity dropped from batch |
//! | `Updated` | `Deleted` | `Deleted`                 |
//! | anything  | otherwise | current kind kept         |
//!
//! The compiler only picks the verb. Payloads are loaded from live state at
//! dispatch time, so a later `Updated` after `Created` needs no action of its own.

use crate::entities::{EntityId, EntityKey, TrackedEntityType};
use crate::event_log::{MutationEvent, MutationKind};

use std::collections::HashMap;
use std::fmt;

/// The single net operation one entity needs replayed on the remote side.
///
/// Built fresh every cycle and discarded after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncAction {
    pub key: EntityKey,
    pub kind: MutationKind,
}

impl SyncAction {
    pub fn new(key: EntityKey, kind: MutationKind) -> Self {
        Self { key, kind }
    }

    pub fn entity_type(&self) -> TrackedEntityType {
        self.key.entity_type
    }

    pub fn entity_id(&self) -> EntityId {
        self.key.entity_id
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

enum Reduction {
    Keep,
    Replace(MutationKind),
    Cancel,
}

fn reduce(current: MutationKind, next: MutationKind) -> Reduction {
    match (current, next) {
        (MutationKind::Created, MutationKind::Deleted) => Reduction::Cancel,
        (MutationKind::Updated, MutationKind::Deleted) => Reduction::Replace(MutationKind::Deleted),
        _ => Reduction::Keep,
    }
}

/// Compiled actions, in the order each entity's first surviving event appeared.
pub struct CompiledActions {
    slots: std::iter::Flatten<std::vec::IntoIter<Option<SyncAction>>>,
}

impl Iterator for CompiledActions {
    type Item = SyncAction;

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.next()
    }
}

pub struct ActionCompiler;

impl ActionCompiler {
    /// Compile `events`, which must be in ascending id order.
    ///
    /// A cancelled entity that shows up again later in the batch starts a fresh
    /// group positioned at that later event.
    pub fn compile(events: &[MutationEvent]) -> CompiledActions {
        debug_assert!(events.windows(2).all(|w| w[0].id < w[1].id));

        // Index into `slots` of each entity's open group.
        let mut open: HashMap<EntityKey, usize> = HashMap::new();
        let mut slots: Vec<Option<SyncAction>> = Vec::new();

        for event in events {
            let key = event.key();
            let Some(&slot) = open.get(&key) else {
                open.insert(key, slots.len());
                slots.push(Some(SyncAction::new(key, event.kind)));
                continue;
            };

            let Some(action) = slots[slot].as_mut() else {
                continue;
            };
            match reduce(action.kind, event.kind) {
                Reduction::Keep => {}
                Reduction::Replace(kind) => action.kind = kind,
                Reduction::Cancel => {
                    slots[slot] = None;
                    open.remove(&key);
                }
            }
        }

        CompiledActions {
            slots: slots.into_iter().flatten(),
        }
    }
}
