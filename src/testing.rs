//! Test doubles shared by the unit tests.

use crate::event_log::{EventId, EventLogRepository, LogStoreError, MutationEvent, NewMutationEvent};
use crate::sync::{CycleEvent, CycleEventHandler, DispatchError, RemoteRequest, RemoteTransport};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Accepts and records every request.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<RemoteRequest>>,
}

impl RecordingTransport {
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteTransport for RecordingTransport {
    async fn send(&self, request: &RemoteRequest) -> Result<(), DispatchError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Accepts the first `succeed` requests, then answers 503.
pub struct FailingTransport {
    succeed: usize,
    sent: AtomicUsize,
}

impl FailingTransport {
    pub fn always() -> Self {
        Self::after(0)
    }

    pub fn after(succeed: usize) -> Self {
        Self {
            succeed,
            sent: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl RemoteTransport for FailingTransport {
    async fn send(&self, request: &RemoteRequest) -> Result<(), DispatchError> {
        if self.sent.fetch_add(1, Ordering::SeqCst) < self.succeed {
            return Ok(());
        }
        Err(DispatchError::HttpStatus {
            method: request.method,
            url: request.url.clone(),
            status: 503,
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// A log whose storage is gone.
pub struct FailingEventLog;

#[async_trait::async_trait]
impl EventLogRepository for FailingEventLog {
    async fn append(
        &self,
        _events: Vec<NewMutationEvent>,
    ) -> Result<Vec<MutationEvent>, LogStoreError> {
        Err(LogStoreError::Unavailable("offline".into()))
    }

    async fn fetch_unsynced(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
        Err(LogStoreError::Unavailable("offline".into()))
    }

    async fn fetch_all(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
        Err(LogStoreError::Unavailable("offline".into()))
    }

    async fn mark_synced(
        &self,
        _ids: &[EventId],
        _synced_at: DateTime<Utc>,
    ) -> Result<usize, LogStoreError> {
        Err(LogStoreError::Unavailable("offline".into()))
    }
}

/// Keeps every published cycle event; clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<CycleEvent>>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<CycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CycleEventHandler for RecordingHandler {
    async fn handle(&mut self, event: &CycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
