//! Command-line configuration for the sync service.

use crate::entities::LookupError;
use crate::event_log::LogStoreError;
use crate::scheduler::ScheduleConfig;
use crate::sync::{DEFAULT_BASE_URL, DispatchError};

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay captured post and comment changes against the remote API.
#[derive(Debug, Clone, Parser)]
#[command(name = "news-sync", version)]
pub struct SyncSettings {
    /// Base URL of the remote API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Mutation log file (one JSON event per line)
    #[arg(long, default_value = "data/mutation_log.jsonl")]
    pub log_path: PathBuf,

    /// JSON snapshot of live posts and comments, re-read for every payload
    #[arg(long)]
    pub entities: Option<PathBuf>,

    /// Run a cycle every N seconds; without it a single cycle runs and the process exits
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Longest delay between retries after failed cycles
    #[arg(long, default_value_t = 900)]
    pub max_backoff_secs: u64,

    /// Per-request timeout for remote calls
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Log requests instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Scheduler configuration, if the service should run periodically.
    pub fn schedule(&self) -> Option<ScheduleConfig> {
        self.interval_secs.map(|secs| ScheduleConfig {
            interval: Duration::from_secs(secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            ..ScheduleConfig::default()
        })
    }
}

/// Error types for service startup
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to open mutation log: {0}")]
    Log(#[from] LogStoreError),

    #[error("Failed to load entities: {0}")]
    Entities(#[from] LookupError),

    #[error("Failed to create HTTP client: {0}")]
    Transport(#[from] DispatchError),
}
