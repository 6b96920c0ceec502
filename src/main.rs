use clap::Parser;
use news_sync::config::{StartupError, SyncSettings};
use news_sync::entities::{EntityLookup, EntitySnapshot, SnapshotFileLookup};
use news_sync::event_log::{EventLogRepository, FileEventLog};
use news_sync::sync::{ActionDispatcher, DryRunTransport, HttpTransport, RemoteTransport};
use news_sync::{SyncOrchestrator, SyncOutcome, SyncScheduler};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.init();

	let settings = SyncSettings::parse();

	let scheduler = match build_scheduler(&settings).await {
		Ok(scheduler) => scheduler,
		Err(e) => {
			error!("Failed to start sync service: {}", e);
			return ExitCode::FAILURE;
		}
	};

	run(scheduler, &settings).await
}

async fn build_scheduler(settings: &SyncSettings) -> Result<SyncScheduler, StartupError> {
	let log: Arc<dyn EventLogRepository> = Arc::new(FileEventLog::open(&settings.log_path).await?);

	let lookup: Arc<dyn EntityLookup> = match &settings.entities {
		Some(path) => Arc::new(SnapshotFileLookup::open(path).await?),
		None => {
			warn!("No entity snapshot given; creates and updates will fail lookup");
			Arc::new(EntitySnapshot::default())
		}
	};

	let transport: Arc<dyn RemoteTransport> = if settings.dry_run {
		Arc::new(DryRunTransport)
	} else {
		Arc::new(HttpTransport::new(settings.request_timeout())?)
	};
	info!(
		"Replaying {:?} against {} via {} transport",
		settings.log_path,
		settings.base_url,
		transport.name()
	);

	let dispatcher = ActionDispatcher::new(settings.base_url.clone(), transport, lookup);
	let orchestrator = SyncOrchestrator::new(log, dispatcher);
	Ok(SyncScheduler::new(
		orchestrator,
		settings.schedule().unwrap_or_default(),
	))
}

async fn run(mut scheduler: SyncScheduler, settings: &SyncSettings) -> ExitCode {
	if settings.schedule().is_none() {
		return match scheduler.run_once().await {
			SyncOutcome::Failed(_) => ExitCode::FAILURE,
			SyncOutcome::Synced(_) | SyncOutcome::NothingToSync => ExitCode::SUCCESS,
		};
	}

	scheduler
		.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				error!("Failed to listen for shutdown signal: {}", e);
				std::future::pending::<()>().await;
			}
		})
		.await;
	ExitCode::SUCCESS
}
