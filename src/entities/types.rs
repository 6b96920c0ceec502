//! Types for the entities that participate in change capture.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entity within its type.
pub type EntityId = u64;

/// The closed set of entity classes whose mutations are captured and synced.
///
/// Serialized as the stable type name, which is also the log's grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackedEntityType {
    #[serde(rename = "news_post")]
    Post,
    #[serde(rename = "news_comment")]
    Comment,
}

impl TrackedEntityType {
    pub const ALL: [TrackedEntityType; 2] = [TrackedEntityType::Post, TrackedEntityType::Comment];

    /// Stable name used as the grouping key in the mutation log.
    pub fn name(&self) -> &'static str {
        match self {
            TrackedEntityType::Post => "news_post",
            TrackedEntityType::Comment => "news_comment",
        }
    }

    /// Path of the remote list resource, relative to the remote base URL.
    pub fn list_path(&self) -> &'static str {
        match self {
            TrackedEntityType::Post => "posts",
            TrackedEntityType::Comment => "comments",
        }
    }

    /// Look up a type by its stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for TrackedEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `(entity_type, entity_id)` pair; the unit events are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: TrackedEntityType,
    pub entity_id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: TrackedEntityType, entity_id: EntityId) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.entity_id)
    }
}

/// Capability contract for entities that participate in change capture.
///
/// Implementors declare their tracked type and identity, and know how to render
/// themselves in the remote wire format.
pub trait Trackable: Send + Sync {
    const ENTITY_TYPE: TrackedEntityType;

    fn entity_id(&self) -> EntityId;

    /// Serialize the live instance into the remote wire format.
    fn to_sync_format(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn entity_key(&self) -> EntityKey {
        EntityKey::new(Self::ENTITY_TYPE, self.entity_id())
    }
}

/// A news post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub user_id: u32,
    pub title: String,
    pub body: String,
}

impl Trackable for Post {
    const ENTITY_TYPE: TrackedEntityType = TrackedEntityType::Post;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn to_sync_format(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub name: String,
    pub email: String,
    pub body: String,
}

impl Trackable for Comment {
    const ENTITY_TYPE: TrackedEntityType = TrackedEntityType::Comment;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn to_sync_format(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Error types for entity-state lookup
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity store unavailable: {0}")]
    Unavailable(String),
}

/// Error types for mutations applied through the entity store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Change capture failed: {0}")]
    Capture(#[from] crate::event_log::LogStoreError),

    #[error("{0} not found")]
    NotFound(EntityKey),
}
