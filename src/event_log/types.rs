//! Types for the append-only mutation log

use crate::entities::{EntityId, EntityKey, TrackedEntityType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing log position, shared across all entity types.
pub type EventId = u64;

/// The kind of mutation recorded by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

impl MutationKind {
    pub const ALL: [MutationKind; 3] = [
        MutationKind::Created,
        MutationKind::Updated,
        MutationKind::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Created => "created",
            MutationKind::Updated => "updated",
            MutationKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged create/update/delete of a tracked entity.
///
/// Immutable once written, except for the one-time `synced_at` stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: EventId,
    pub entity_type: TrackedEntityType,
    pub entity_id: EntityId,
    pub kind: MutationKind,
    pub logged_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl MutationEvent {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id)
    }

    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}

/// An event that has been captured but not yet assigned a log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMutationEvent {
    pub key: EntityKey,
    pub kind: MutationKind,
    pub logged_at: DateTime<Utc>,
}

impl NewMutationEvent {
    pub fn new(key: EntityKey, kind: MutationKind) -> Self {
        Self {
            key,
            kind,
            logged_at: Utc::now(),
        }
    }

    pub(crate) fn into_event(self, id: EventId) -> MutationEvent {
        MutationEvent {
            id,
            entity_type: self.key.entity_type,
            entity_id: self.key.entity_id,
            kind: self.kind,
            logged_at: self.logged_at,
            synced_at: None,
        }
    }
}

/// Error types for mutation log storage
#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt log entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Unknown event id {0}")]
    UnknownEvent(EventId),

    #[error("Log store unavailable: {0}")]
    Unavailable(String),
}
