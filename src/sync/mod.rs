//! Sync Module
//!
//! Replays the mutation log against the remote API, one cycle at a time:
//!
//! - `compiler`: Reduces an ordered batch of events to at most one action per entity.
//! - `dispatcher`: Resolves an action into a remote request using live entity state.
//! - `transport`: Sends resolved requests over HTTP, or only logs them in dry-run mode.
//! - `orchestrator`: Drives collect, compile, dispatch and commit as one cycle.
//! - `events`: Lifecycle notifications published by the orchestrator.
//! - `stats`: Per-cycle counters.
//!
//! A cycle either stamps its whole batch as synced or leaves all of it for the next
//! cycle. Remote calls may therefore be repeated after a failure; the remote side is
//! expected to treat creates and updates as idempotent upserts.

/// Event compaction into sync actions
pub mod compiler;
/// Remote execution of sync actions
pub mod dispatcher;
/// Cycle lifecycle notifications
pub mod events;
/// Main coordinator for a sync cycle
pub mod orchestrator;
/// Per-cycle statistics
pub mod stats;
/// Remote request transports
pub mod transport;
mod types;

pub use compiler::{ActionCompiler, CompiledActions, SyncAction};
pub use dispatcher::{ActionDispatcher, DEFAULT_BASE_URL};
pub use events::{CycleEvent, CycleEventBus, CycleEventHandler, LoggingHandler};
pub use orchestrator::{SyncCycle, SyncOrchestrator};
pub use stats::CycleStats;
pub use transport::{DryRunTransport, HttpTransport, RemoteMethod, RemoteRequest, RemoteTransport};
pub use types::*;
