//! Action dispatcher.
//!
//! Turns one compiled action into one remote call. Creates go to the type's list
//! endpoint, updates and deletes to its item endpoint. Payloads are read from live
//! entity state at dispatch time. No retries happen here; a failed call fails the
//! cycle and the whole batch is retried next time.

use crate::entities::{EntityLookup, TrackedEntityType};
use crate::event_log::MutationKind;
use crate::sync::{DispatchError, RemoteMethod, RemoteRequest, RemoteTransport, SyncAction};

use std::sync::Arc;
use tracing::debug;

/// Default remote API the service replays changes against.
pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

pub struct ActionDispatcher {
    base_url: String,
    transport: Arc<dyn RemoteTransport>,
    lookup: Arc<dyn EntityLookup>,
}

impl ActionDispatcher {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn RemoteTransport>,
        lookup: Arc<dyn EntityLookup>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            lookup,
        }
    }

    pub fn list_url(&self, entity_type: TrackedEntityType) -> String {
        format!("{}/{}", self.base_url, entity_type.list_path())
    }

    pub fn item_url(&self, action: &SyncAction) -> String {
        format!("{}/{}/", self.list_url(action.entity_type()), action.entity_id())
    }

    /// Resolve the request for `action`, loading the entity's current state if needed.
    pub async fn build_request(&self, action: &SyncAction) -> Result<RemoteRequest, DispatchError> {
        let request = match action.kind {
            MutationKind::Created => RemoteRequest {
                method: RemoteMethod::Post,
                url: self.list_url(action.entity_type()),
                body: Some(self.current_state(action).await?),
            },
            MutationKind::Updated => RemoteRequest {
                method: RemoteMethod::Put,
                url: self.item_url(action),
                body: Some(self.current_state(action).await?),
            },
            MutationKind::Deleted => RemoteRequest {
                method: RemoteMethod::Delete,
                url: self.item_url(action),
                body: None,
            },
        };
        Ok(request)
    }

    async fn current_state(&self, action: &SyncAction) -> Result<serde_json::Value, DispatchError> {
        self.lookup
            .lookup(action.key)
            .await?
            .ok_or(DispatchError::EntityNotFound(action.key))
    }

    pub async fn dispatch(&self, action: &SyncAction) -> Result<(), DispatchError> {
        let request = self.build_request(action).await?;
        debug!("Dispatching {} via {}", action, self.transport.name());
        self.transport.send(&request).await
    }
}
