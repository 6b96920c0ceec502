use crate::entities::{EntityKey, LookupError};
use crate::event_log::LogStoreError;
use crate::sync::{RemoteMethod, SyncAction};

/// Error types for a single action dispatch
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {url} returned status {status}")]
    HttpStatus {
        method: RemoteMethod,
        url: String,
        status: u16,
    },

    #[error("{0} no longer exists")]
    EntityNotFound(EntityKey),

    #[error("Entity lookup error: {0}")]
    Lookup(#[from] LookupError),
}

/// Cause of a failed sync cycle
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Log store error: {0}")]
    LogStore(#[from] LogStoreError),

    #[error("Dispatch of {action} failed: {source}")]
    Dispatch {
        action: SyncAction,
        #[source]
        source: DispatchError,
    },
}

/// Result of one sync cycle.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The batch was dispatched and this many events were marked synced.
    Synced(usize),
    /// The log held no unsynced events.
    NothingToSync,
    /// Nothing in the batch was marked synced; the next cycle retries it.
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }
}

/// Where the orchestrator is within a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Collecting,
    Compiling,
    Dispatching,
    Committing,
    /// The last cycle failed; the next cycle starts again from `Idle`.
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
