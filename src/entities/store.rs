//! In-memory entity store with change capture.
//!
//! Stands in for the entity-owning layer: it holds the live posts and comments,
//! answers state lookups for the dispatcher, and runs the change capture hook under
//! the same lock as each mutation so the pair commits or fails together.

use crate::capture::{CapturedMutation, ChangeCaptureHook};
use crate::entities::{
    Comment, EntityId, EntityKey, LookupError, Post, StoreError, Trackable, TrackedEntityType,
};
use crate::event_log::MutationKind;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Entity-state lookup consumed by the action dispatcher.
#[async_trait::async_trait]
pub trait EntityLookup: Send + Sync {
    /// Current wire-format state of the entity, or `None` if it no longer exists.
    async fn lookup(&self, key: EntityKey) -> Result<Option<serde_json::Value>, LookupError>;
}

/// Live entity tables, one per tracked type.
#[derive(Default)]
pub struct EntityTables {
    posts: BTreeMap<EntityId, Post>,
    comments: BTreeMap<EntityId, Comment>,
}

/// Entities the store can hold; maps each type to its table.
pub trait StoredEntity: Trackable + Clone + 'static {
    fn table(tables: &mut EntityTables) -> &mut BTreeMap<EntityId, Self>;
}

impl StoredEntity for Post {
    fn table(tables: &mut EntityTables) -> &mut BTreeMap<EntityId, Self> {
        &mut tables.posts
    }
}

impl StoredEntity for Comment {
    fn table(tables: &mut EntityTables) -> &mut BTreeMap<EntityId, Self> {
        &mut tables.comments
    }
}

/// Seed data for the store, loaded without capturing any events.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl EntitySnapshot {
    pub async fn load(path: &Path) -> Result<Self, LookupError> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: EntitySnapshot = serde_json::from_str(&content)?;
        debug!(
            "Loaded {} posts and {} comments from {:?}",
            snapshot.posts.len(),
            snapshot.comments.len(),
            path
        );
        Ok(snapshot)
    }

    /// Wire-format state of one entity in the snapshot.
    pub fn state(&self, key: EntityKey) -> Result<Option<serde_json::Value>, LookupError> {
        let state = match key.entity_type {
            TrackedEntityType::Post => self
                .posts
                .iter()
                .find(|p| p.id == key.entity_id)
                .map(|p| p.to_sync_format()),
            TrackedEntityType::Comment => self
                .comments
                .iter()
                .find(|c| c.id == key.entity_id)
                .map(|c| c.to_sync_format()),
        };
        Ok(state.transpose()?)
    }
}

#[async_trait::async_trait]
impl EntityLookup for EntitySnapshot {
    async fn lookup(&self, key: EntityKey) -> Result<Option<serde_json::Value>, LookupError> {
        self.state(key)
    }
}

/// Lookup over a snapshot file kept current by the entity-owning process.
///
/// The file is re-read on every lookup, so each dispatch sees the state as of
/// that moment rather than as of startup.
pub struct SnapshotFileLookup {
    path: PathBuf,
}

impl SnapshotFileLookup {
    /// Check that the file parses now, so a bad path fails at startup.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LookupError> {
        let path = path.into();
        let snapshot = EntitySnapshot::load(&path).await?;
        info!(
            "Resolving entity state from {:?} ({} posts, {} comments at startup)",
            path,
            snapshot.posts.len(),
            snapshot.comments.len()
        );
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl EntityLookup for SnapshotFileLookup {
    async fn lookup(&self, key: EntityKey) -> Result<Option<serde_json::Value>, LookupError> {
        EntitySnapshot::load(&self.path).await?.state(key)
    }
}

pub struct EntityStore {
    tables: Mutex<EntityTables>,
    capture: ChangeCaptureHook,
}

impl EntityStore {
    pub fn new(capture: ChangeCaptureHook) -> Self {
        Self::with_snapshot(capture, EntitySnapshot::default())
    }

    pub fn with_snapshot(capture: ChangeCaptureHook, snapshot: EntitySnapshot) -> Self {
        let tables = EntityTables {
            posts: snapshot.posts.into_iter().map(|p| (p.id, p)).collect(),
            comments: snapshot.comments.into_iter().map(|c| (c.id, c)).collect(),
        };
        Self {
            tables: Mutex::new(tables),
            capture,
        }
    }

    pub async fn get<E: StoredEntity>(&self, id: EntityId) -> Option<E> {
        let mut tables = self.tables.lock().await;
        E::table(&mut tables).get(&id).cloned()
    }

    /// Insert or replace an entity, capturing `Created` or `Updated` accordingly.
    pub async fn save<E: StoredEntity>(&self, entity: E) -> Result<MutationKind, StoreError> {
        let mut tables = self.tables.lock().await;
        let id = entity.entity_id();
        let kind = if E::table(&mut tables).contains_key(&id) {
            MutationKind::Updated
        } else {
            MutationKind::Created
        };

        self.capture.on_mutation(&entity, kind).await?;
        E::table(&mut tables).insert(id, entity);
        Ok(kind)
    }

    pub async fn delete_comment(&self, id: EntityId) -> Result<Comment, StoreError> {
        let mut tables = self.tables.lock().await;
        let comment = tables
            .comments
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(EntityKey::new(TrackedEntityType::Comment, id)))?;

        self.capture
            .on_mutation(&comment, MutationKind::Deleted)
            .await?;
        tables.comments.remove(&id);
        Ok(comment)
    }

    /// Delete a post together with its comments.
    ///
    /// The comments' deletions are captured before the post's, in one append.
    pub async fn delete_post(&self, id: EntityId) -> Result<Post, StoreError> {
        let mut tables = self.tables.lock().await;
        let post = tables
            .posts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(EntityKey::new(TrackedEntityType::Post, id)))?;

        let cascaded: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.post_id == id)
            .cloned()
            .collect();
        let mut mutations: Vec<CapturedMutation> = cascaded
            .iter()
            .map(|c| CapturedMutation::of(c, MutationKind::Deleted))
            .collect();
        mutations.push(CapturedMutation::of(&post, MutationKind::Deleted));

        self.capture.on_mutations(&mutations).await?;
        for comment in &cascaded {
            tables.comments.remove(&comment.id);
        }
        tables.posts.remove(&id);

        debug!(
            "Deleted {} with {} cascaded comments",
            post.entity_key(),
            cascaded.len()
        );
        Ok(post)
    }
}

#[async_trait::async_trait]
impl EntityLookup for EntityStore {
    async fn lookup(&self, key: EntityKey) -> Result<Option<serde_json::Value>, LookupError> {
        let tables = self.tables.lock().await;
        let state = match key.entity_type {
            TrackedEntityType::Post => tables.posts.get(&key.entity_id).map(|p| p.to_sync_format()),
            TrackedEntityType::Comment => tables
                .comments
                .get(&key.entity_id)
                .map(|c| c.to_sync_format()),
        };
        Ok(state.transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventLogRepository, MemoryEventLog};
    use crate::testing::FailingEventLog;
    use serde_json::json;
    use std::sync::Arc;

    fn post(id: EntityId) -> Post {
        Post {
            id,
            user_id: 99999942,
            title: format!("post {id}"),
            body: "body".into(),
        }
    }

    fn comment(id: EntityId, post_id: EntityId) -> Comment {
        Comment {
            id,
            post_id,
            name: "reader".into(),
            email: "reader@example.com".into(),
            body: "nice".into(),
        }
    }

    fn store_with_log() -> (EntityStore, Arc<MemoryEventLog>) {
        let log = Arc::new(MemoryEventLog::new());
        let store = EntityStore::new(ChangeCaptureHook::new(log.clone()));
        (store, log)
    }

    #[tokio::test]
    async fn save_captures_created_then_updated() {
        let (store, log) = store_with_log();

        assert_eq!(store.save(post(1)).await.unwrap(), MutationKind::Created);
        let mut edited = post(1);
        edited.title = "edited".into();
        assert_eq!(store.save(edited).await.unwrap(), MutationKind::Updated);

        let kinds: Vec<_> = log.fetch_all().await.unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![MutationKind::Created, MutationKind::Updated]);
        assert_eq!(store.get::<Post>(1).await.unwrap().title, "edited");
    }

    #[tokio::test]
    async fn failed_capture_rolls_back_mutation() {
        let store = EntityStore::new(ChangeCaptureHook::new(Arc::new(FailingEventLog)));

        let err = store.save(post(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Capture(_)));
        assert!(store.get::<Post>(1).await.is_none());
    }

    #[tokio::test]
    async fn deleting_post_cascades_to_comments() {
        let (store, log) = store_with_log();
        store.save(post(1)).await.unwrap();
        store.save(comment(5, 1)).await.unwrap();
        store.save(comment(6, 2)).await.unwrap();

        store.delete_post(1).await.unwrap();

        let events = log.fetch_all().await.unwrap();
        let tail: Vec<_> = events[3..].iter().map(|e| (e.key().to_string(), e.kind)).collect();
        assert_eq!(
            tail,
            vec![
                ("news_comment#5".to_string(), MutationKind::Deleted),
                ("news_post#1".to_string(), MutationKind::Deleted),
            ]
        );
        assert!(store.get::<Comment>(5).await.is_none());
        assert!(store.get::<Comment>(6).await.is_some());
    }

    #[tokio::test]
    async fn deleting_missing_entity_captures_nothing() {
        let (store, log) = store_with_log();

        let err = store.delete_comment(9).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(log.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_returns_current_wire_state() {
        let (store, _log) = store_with_log();
        store.save(post(3)).await.unwrap();

        let state = store
            .lookup(EntityKey::new(TrackedEntityType::Post, 3))
            .await
            .unwrap();
        assert_eq!(
            state,
            Some(json!({"id": 3, "user_id": 99999942, "title": "post 3", "body": "body"}))
        );
        assert!(
            store
                .lookup(EntityKey::new(TrackedEntityType::Comment, 3))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn snapshot_seeds_without_capture() {
        let log = Arc::new(MemoryEventLog::new());
        let snapshot: EntitySnapshot = serde_json::from_value(json!({
            "posts": [{"id": 1, "user_id": 2, "title": "t", "body": "b"}]
        }))
        .unwrap();

        let store = EntityStore::with_snapshot(ChangeCaptureHook::new(log.clone()), snapshot);

        assert!(store.get::<Post>(1).await.is_some());
        assert!(log.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_file_lookup_sees_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        let write = |snapshot: serde_json::Value| {
            let path = path.clone();
            async move { tokio::fs::write(&path, snapshot.to_string()).await.unwrap() }
        };
        write(json!({"posts": [{"id": 1, "user_id": 2, "title": "first", "body": "b"}]})).await;

        let lookup = SnapshotFileLookup::open(&path).await.unwrap();
        let key = EntityKey::new(TrackedEntityType::Post, 1);
        let created = EntityKey::new(TrackedEntityType::Comment, 7);
        assert_eq!(lookup.lookup(key).await.unwrap().unwrap()["title"], "first");
        assert!(lookup.lookup(created).await.unwrap().is_none());

        write(json!({
            "posts": [{"id": 1, "user_id": 2, "title": "edited", "body": "b"}],
            "comments": [{"id": 7, "post_id": 1, "name": "n", "email": "e@x.io", "body": "c"}]
        }))
        .await;

        assert_eq!(lookup.lookup(key).await.unwrap().unwrap()["title"], "edited");
        assert_eq!(lookup.lookup(created).await.unwrap().unwrap()["post_id"], 1);
    }

    #[tokio::test]
    async fn snapshot_file_lookup_rejects_bad_file_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = SnapshotFileLookup::open(&path).await.err().unwrap();
        assert!(matches!(err, LookupError::Serialization(_)));
        assert!(matches!(
            SnapshotFileLookup::open(dir.path().join("absent.json")).await,
            Err(LookupError::Io(_))
        ));
    }
}
