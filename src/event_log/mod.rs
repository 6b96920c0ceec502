//! Append-only mutation log
//!
//! Every committed create, update or delete of a tracked entity leaves one
//! `MutationEvent` here. Sync cycles read the unsynced tail and stamp it once the
//! remote side has seen it; rows are kept afterwards as an audit trail.

/// Storage backends for the log
mod repositories;
/// Event and error types
mod types;

pub use repositories::{EventLogRepository, FileEventLog, MemoryEventLog};
pub use types::*;
