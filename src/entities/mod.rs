//! Tracked entities
//!
//! Declares which entity types take part in change capture, how each is addressed
//! on the remote side and rendered in its wire format, and the state lookup the
//! dispatcher uses to build request payloads.

/// Live entity storage and state lookup
mod store;
/// Entity types and the tracking capability
mod types;

pub use store::{
    EntityLookup, EntitySnapshot, EntityStore, EntityTables, SnapshotFileLookup, StoredEntity,
};
pub use types::*;
