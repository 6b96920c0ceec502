//! Change capture and remote sync for news posts and comments.
//!
//! Mutations of tracked entities are captured into an append-only log. A sync cycle
//! compacts the unsynced tail of that log into one create, update or delete per
//! entity, replays those against the remote API, and marks the batch synced only if
//! every call succeeded.

/// Change capture hook for the entity layer
pub mod capture;
/// Command-line configuration
pub mod config;
/// Tracked entity types, store and lookup
pub mod entities;
/// Append-only mutation log
pub mod event_log;
/// Periodic cycle runner
pub mod scheduler;
/// Compilation, dispatch and orchestration of sync cycles
pub mod sync;

#[cfg(test)]
mod testing;

pub use capture::ChangeCaptureHook;
pub use scheduler::{ScheduleConfig, SyncScheduler};
pub use sync::{SyncOrchestrator, SyncOutcome};
