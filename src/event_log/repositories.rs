use crate::event_log::{EventId, LogStoreError, MutationEvent, NewMutationEvent};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Repository for the append-only mutation log.
///
/// Only change capture appends, and only the sync orchestrator stamps `synced_at`.
/// Events are never removed.
#[async_trait::async_trait]
pub trait EventLogRepository: Send + Sync {
	/// Append events in the given order, all or nothing, assigning increasing ids.
	async fn append(
		&self,
		events: Vec<NewMutationEvent>,
	) -> Result<Vec<MutationEvent>, LogStoreError>;

	/// All events with no `synced_at`, in ascending id order.
	async fn fetch_unsynced(&self) -> Result<Vec<MutationEvent>, LogStoreError>;

	/// The full audit trail, in ascending id order.
	async fn fetch_all(&self) -> Result<Vec<MutationEvent>, LogStoreError>;

	/// Stamp `synced_at` on every listed event, all or nothing.
	///
	/// Returns how many events were newly stamped. Events already stamped keep their
	/// original timestamp. An unknown id fails the whole call.
	async fn mark_synced(
		&self,
		ids: &[EventId],
		synced_at: DateTime<Utc>,
	) -> Result<usize, LogStoreError>;

	async fn insert(&self, event: NewMutationEvent) -> Result<MutationEvent, LogStoreError> {
		self.append(vec![event])
			.await?
			.pop()
			.ok_or_else(|| LogStoreError::Unavailable("append returned no event".to_string()))
	}
}

/// Validate every id before stamping any, so a bad id leaves `events` untouched.
fn stamp_synced(
	events: &mut [MutationEvent],
	ids: &[EventId],
	synced_at: DateTime<Utc>,
) -> Result<usize, LogStoreError> {
	for id in ids {
		if events.binary_search_by_key(id, |e| e.id).is_err() {
			return Err(LogStoreError::UnknownEvent(*id));
		}
	}

	let wanted: HashSet<EventId> = ids.iter().copied().collect();
	let mut stamped = 0;
	for event in events.iter_mut() {
		if wanted.contains(&event.id) && event.synced_at.is_none() {
			event.synced_at = Some(synced_at);
			stamped += 1;
		}
	}
	Ok(stamped)
}

/// In-memory implementation of EventLogRepository
pub struct MemoryEventLog {
	state: Mutex<MemoryLogState>,
}

struct MemoryLogState {
	events: Vec<MutationEvent>,
	next_id: EventId,
}

impl MemoryEventLog {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MemoryLogState {
				events: Vec::new(),
				next_id: 1,
			}),
		}
	}
}

impl Default for MemoryEventLog {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl EventLogRepository for MemoryEventLog {
	async fn append(
		&self,
		events: Vec<NewMutationEvent>,
	) -> Result<Vec<MutationEvent>, LogStoreError> {
		let mut state = self.state.lock().await;
		let mut appended = Vec::with_capacity(events.len());
		for event in events {
			let event = event.into_event(state.next_id);
			state.next_id += 1;
			state.events.push(event.clone());
			appended.push(event);
		}
		Ok(appended)
	}

	async fn fetch_unsynced(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
		let state = self.state.lock().await;
		Ok(state
			.events
			.iter()
			.filter(|e| !e.is_synced())
			.cloned()
			.collect())
	}

	async fn fetch_all(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
		Ok(self.state.lock().await.events.clone())
	}

	async fn mark_synced(
		&self,
		ids: &[EventId],
		synced_at: DateTime<Utc>,
	) -> Result<usize, LogStoreError> {
		let mut state = self.state.lock().await;
		stamp_synced(&mut state.events, ids, synced_at)
	}
}

/// File-based implementation of EventLogRepository
///
/// Stores one JSON object per line. Appends go to the end of the file; stamping
/// rewrites a sibling temp file and renames it over the log so the stamp lands
/// for the whole batch or not at all. Every operation holds an exclusive lock on
/// a sibling `.lock` file, so several instances or processes can share one log.
pub struct FileEventLog {
	path: PathBuf,
	/// Where the file ended after this instance last touched it.
	tail: Mutex<Option<LogTail>>,
}

#[derive(Debug, Clone, Copy)]
struct LogTail {
	next_id: EventId,
	len: u64,
}

/// Exclusive advisory lock on the log, released on drop.
struct LogLock {
	file: std::fs::File,
}

impl Drop for LogLock {
	fn drop(&mut self) {
		if let Err(e) = FileExt::unlock(&self.file) {
			warn!("Failed to release mutation log lock: {}", e);
		}
	}
}

/// Writable end of the log file.
#[async_trait::async_trait]
trait LogSink: AsyncWrite + Unpin + Send {
	async fn sync(&mut self) -> std::io::Result<()>;

	async fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

#[async_trait::async_trait]
impl LogSink for tokio::fs::File {
	async fn sync(&mut self) -> std::io::Result<()> {
		self.sync_all().await
	}

	async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
		self.set_len(len).await
	}
}

impl FileEventLog {
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LogStoreError> {
		let path = path.into();
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}

		info!("Opened mutation log at {:?}", path);
		Ok(Self {
			path,
			tail: Mutex::new(None),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn sibling(&self, suffix: &str) -> PathBuf {
		let mut sibling = self.path.clone().into_os_string();
		sibling.push(suffix);
		PathBuf::from(sibling)
	}

	fn temp_path(&self) -> PathBuf {
		self.sibling(".tmp")
	}

	fn lock_path(&self) -> PathBuf {
		self.sibling(".lock")
	}

	/// Block until no other instance or process holds the log.
	async fn lock(&self) -> Result<LogLock, LogStoreError> {
		let lock_path = self.lock_path();
		let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
			let file = std::fs::OpenOptions::new()
				.read(true)
				.write(true)
				.create(true)
				.truncate(false)
				.open(&lock_path)?;
			file.lock_exclusive()?;
			Ok(file)
		})
		.await
		.map_err(|e| LogStoreError::Unavailable(format!("Lock task failed: {}", e)))??;
		Ok(LogLock { file })
	}

	async fn read_events(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
		let content = match tokio::fs::read_to_string(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let mut events: Vec<MutationEvent> = Vec::new();
		for (index, line) in content.lines().enumerate() {
			if line.trim().is_empty() {
				continue;
			}
			let event: MutationEvent =
				serde_json::from_str(line).map_err(|e| LogStoreError::Corrupt {
					line: index + 1,
					reason: e.to_string(),
				})?;
			if events.last().is_some_and(|prev| prev.id >= event.id) {
				return Err(LogStoreError::Corrupt {
					line: index + 1,
					reason: format!("event id {} is out of order", event.id),
				});
			}
			events.push(event);
		}
		Ok(events)
	}

	fn encode(events: &[MutationEvent]) -> Result<String, LogStoreError> {
		let mut buf = String::new();
		for event in events {
			buf.push_str(&serde_json::to_string(event)?);
			buf.push('\n');
		}
		Ok(buf)
	}

	/// Next id to assign, trusting the cached tail only if the file length still
	/// matches it. Appends and stamps both grow the file, so any write by another
	/// instance changes the length.
	async fn next_id(&self, tail: Option<LogTail>, len: u64) -> Result<EventId, LogStoreError> {
		match tail {
			Some(tail) if tail.len == len => Ok(tail.next_id),
			_ => Ok(self.read_events().await?.last().map_or(1, |e| e.id + 1)),
		}
	}

	/// Append under the lock. On any write failure the file is cut back to `len`
	/// so no partial line survives, and the cached tail is dropped.
	async fn append_to<S: LogSink>(
		&self,
		tail: &mut Option<LogTail>,
		sink: &mut S,
		len: u64,
		events: Vec<NewMutationEvent>,
	) -> Result<Vec<MutationEvent>, LogStoreError> {
		let first_id = self.next_id(*tail, len).await?;
		let appended: Vec<MutationEvent> = events
			.into_iter()
			.zip(first_id..)
			.map(|(event, id)| event.into_event(id))
			.collect();
		let content = Self::encode(&appended)?;

		if let Err(e) = write_durably(sink, content.as_bytes()).await {
			*tail = None;
			// Settle any write still in flight before cutting it off.
			let _ = sink.flush().await;
			if let Err(cut) = sink.truncate(len).await {
				error!(
					"Failed to roll back partial append to {:?}: {}",
					self.path, cut
				);
			}
			return Err(e.into());
		}

		*tail = Some(LogTail {
			next_id: first_id + appended.len() as EventId,
			len: len + content.len() as u64,
		});
		debug!("Appended {} events to {:?}", appended.len(), self.path);
		Ok(appended)
	}
}

async fn write_durably<S: LogSink>(sink: &mut S, bytes: &[u8]) -> std::io::Result<()> {
	sink.write_all(bytes).await?;
	sink.flush().await?;
	sink.sync().await
}

#[async_trait::async_trait]
impl EventLogRepository for FileEventLog {
	async fn append(
		&self,
		events: Vec<NewMutationEvent>,
	) -> Result<Vec<MutationEvent>, LogStoreError> {
		let mut tail = self.tail.lock().await;
		let _lock = self.lock().await?;

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await?;
		let len = file.metadata().await?.len();
		self.append_to(&mut tail, &mut file, len, events).await
	}

	async fn fetch_unsynced(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
		let _tail = self.tail.lock().await;
		let _lock = self.lock().await?;
		let mut events = self.read_events().await?;
		events.retain(|e| !e.is_synced());
		Ok(events)
	}

	async fn fetch_all(&self) -> Result<Vec<MutationEvent>, LogStoreError> {
		let _tail = self.tail.lock().await;
		let _lock = self.lock().await?;
		self.read_events().await
	}

	async fn mark_synced(
		&self,
		ids: &[EventId],
		synced_at: DateTime<Utc>,
	) -> Result<usize, LogStoreError> {
		let mut tail = self.tail.lock().await;
		let _lock = self.lock().await?;
		let mut events = self.read_events().await?;
		let stamped = stamp_synced(&mut events, ids, synced_at)?;
		if stamped == 0 {
			return Ok(0);
		}

		let content = Self::encode(&events)?;
		let tmp = self.temp_path();
		let mut file = tokio::fs::File::create(&tmp).await?;
		write_durably(&mut file, content.as_bytes()).await?;
		drop(file);
		tokio::fs::rename(&tmp, &self.path).await?;

		*tail = Some(LogTail {
			next_id: events.last().map_or(1, |e| e.id + 1),
			len: content.len() as u64,
		});
		info!(
			"Marked {} events synced at {} in {:?}",
			stamped,
			synced_at.to_rfc3339(),
			self.path
		);
		Ok(stamped)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::entities::{EntityKey, TrackedEntityType};
	use crate::event_log::MutationKind;
	use std::pin::Pin;
	use std::task::{Context, Poll};

	fn new_event(entity_id: u64, kind: MutationKind) -> NewMutationEvent {
		NewMutationEvent::new(EntityKey::new(TrackedEntityType::Post, entity_id), kind)
	}

	/// Accepts `budget` bytes, then fails like a full disk.
	struct ShortSink {
		file: tokio::fs::File,
		budget: usize,
	}

	impl AsyncWrite for ShortSink {
		fn poll_write(
			mut self: Pin<&mut Self>,
			cx: &mut Context<'_>,
			buf: &[u8],
		) -> Poll<std::io::Result<usize>> {
			let this = &mut *self;
			if this.budget == 0 {
				return Poll::Ready(Err(std::io::Error::other("no space left on device")));
			}
			let n = buf.len().min(this.budget);
			let poll = Pin::new(&mut this.file).poll_write(cx, &buf[..n]);
			if let Poll::Ready(Ok(written)) = &poll {
				this.budget -= *written;
			}
			poll
		}

		fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
			Pin::new(&mut self.file).poll_flush(cx)
		}

		fn poll_shutdown(
			mut self: Pin<&mut Self>,
			cx: &mut Context<'_>,
		) -> Poll<std::io::Result<()>> {
			Pin::new(&mut self.file).poll_shutdown(cx)
		}
	}

	#[async_trait::async_trait]
	impl LogSink for ShortSink {
		async fn sync(&mut self) -> std::io::Result<()> {
			self.file.sync_all().await
		}

		async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
			self.file.set_len(len).await
		}
	}

	async fn insert_many(log: &FileEventLog, count: u64) {
		for id in 0..count {
			log.insert(new_event(id, MutationKind::Updated)).await.unwrap();
		}
	}

	async fn sync_pending(log: &FileEventLog, rounds: usize) -> usize {
		let mut stamped = 0;
		for _ in 0..rounds {
			let ids: Vec<EventId> = log
				.fetch_unsynced()
				.await
				.unwrap()
				.iter()
				.map(|e| e.id)
				.collect();
			stamped += log.mark_synced(&ids, Utc::now()).await.unwrap();
			tokio::task::yield_now().await;
		}
		stamped
	}

	#[tokio::test]
	async fn memory_log_assigns_increasing_ids() {
		let log = MemoryEventLog::new();
		let first = log.insert(new_event(1, MutationKind::Created)).await.unwrap();
		let rest = log
			.append(vec![
				new_event(2, MutationKind::Created),
				new_event(1, MutationKind::Updated),
			])
			.await
			.unwrap();

		assert_eq!(first.id, 1);
		assert_eq!(rest.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3]);
		assert!(rest.iter().all(|e| e.synced_at.is_none()));
	}

	#[tokio::test]
	async fn mark_synced_touches_only_listed_events() {
		let log = MemoryEventLog::new();
		for id in 1..=3 {
			log.insert(new_event(id, MutationKind::Created)).await.unwrap();
		}
		let at = Utc::now();

		assert_eq!(log.mark_synced(&[1, 3], at).await.unwrap(), 2);

		let unsynced = log.fetch_unsynced().await.unwrap();
		assert_eq!(unsynced.len(), 1);
		assert_eq!(unsynced[0].id, 2);
		let all = log.fetch_all().await.unwrap();
		assert_eq!(all[0].synced_at, Some(at));
		assert_eq!(all[2].synced_at, Some(at));
	}

	#[tokio::test]
	async fn mark_synced_with_unknown_id_changes_nothing() {
		let log = MemoryEventLog::new();
		log.insert(new_event(1, MutationKind::Created)).await.unwrap();

		let err = log.mark_synced(&[1, 42], Utc::now()).await.unwrap_err();
		assert!(matches!(err, LogStoreError::UnknownEvent(42)));
		assert_eq!(log.fetch_unsynced().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn restamping_keeps_original_timestamp() {
		let log = MemoryEventLog::new();
		log.insert(new_event(1, MutationKind::Created)).await.unwrap();
		let first = Utc::now();
		log.mark_synced(&[1], first).await.unwrap();

		let later = first + chrono::Duration::seconds(60);
		assert_eq!(log.mark_synced(&[1], later).await.unwrap(), 0);
		assert_eq!(log.fetch_all().await.unwrap()[0].synced_at, Some(first));
	}

	#[tokio::test]
	async fn file_log_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("mutation_log.jsonl");

		{
			let log = FileEventLog::open(&path).await.unwrap();
			log.append(vec![
				new_event(1, MutationKind::Created),
				new_event(1, MutationKind::Updated),
			])
			.await
			.unwrap();
		}

		let log = FileEventLog::open(&path).await.unwrap();
		let next = log.insert(new_event(2, MutationKind::Created)).await.unwrap();
		assert_eq!(next.id, 3);

		let at = Utc::now();
		log.mark_synced(&[1, 2], at).await.unwrap();

		let reopened = FileEventLog::open(&path).await.unwrap();
		let unsynced = reopened.fetch_unsynced().await.unwrap();
		assert_eq!(unsynced.len(), 1);
		assert_eq!(unsynced[0].id, 3);
		assert_eq!(reopened.fetch_all().await.unwrap()[1].synced_at, Some(at));
		assert!(!reopened.temp_path().exists());
	}

	#[tokio::test]
	async fn file_log_reports_corrupt_line() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mutation_log.jsonl");
		tokio::fs::write(&path, "{\"not\": \"an event\"}\n").await.unwrap();

		let log = FileEventLog::open(&path).await.unwrap();
		let err = log.fetch_unsynced().await.unwrap_err();
		assert!(matches!(err, LogStoreError::Corrupt { line: 1, .. }));
	}

	#[tokio::test]
	async fn missing_file_reads_as_empty_log() {
		let dir = tempfile::tempdir().unwrap();
		let log = FileEventLog::open(dir.path().join("absent.jsonl")).await.unwrap();
		assert!(log.fetch_all().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn failed_append_leaves_no_partial_line() {
		let dir = tempfile::tempdir().unwrap();
		let log = FileEventLog::open(dir.path().join("mutation_log.jsonl"))
			.await
			.unwrap();
		log.insert(new_event(1, MutationKind::Created)).await.unwrap();

		let file = tokio::fs::OpenOptions::new()
			.append(true)
			.open(log.path())
			.await
			.unwrap();
		let len = file.metadata().await.unwrap().len();
		let mut sink = ShortSink { file, budget: 40 };
		let mut tail = log.tail.lock().await;
		let err = log
			.append_to(
				&mut tail,
				&mut sink,
				len,
				vec![
					new_event(2, MutationKind::Created),
					new_event(1, MutationKind::Updated),
				],
			)
			.await
			.unwrap_err();
		assert!(matches!(err, LogStoreError::Io(_)));
		assert!(tail.is_none());
		drop(tail);
		drop(sink);

		assert_eq!(tokio::fs::metadata(log.path()).await.unwrap().len(), len);
		assert_eq!(log.fetch_unsynced().await.unwrap().len(), 1);
		let next = log.insert(new_event(2, MutationKind::Created)).await.unwrap();
		assert_eq!(next.id, 2);
	}

	#[tokio::test]
	async fn instances_sharing_a_file_lose_no_events() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mutation_log.jsonl");
		let a = FileEventLog::open(&path).await.unwrap();
		let b = FileEventLog::open(&path).await.unwrap();

		a.insert(new_event(1, MutationKind::Created)).await.unwrap();
		assert_eq!(b.insert(new_event(2, MutationKind::Created)).await.unwrap().id, 2);
		// a's cached tail predates b's append
		assert_eq!(a.insert(new_event(3, MutationKind::Created)).await.unwrap().id, 3);

		let ((), (), stamped) = tokio::join!(
			insert_many(&a, 20),
			insert_many(&b, 20),
			sync_pending(&a, 10),
		);

		let all = b.fetch_all().await.unwrap();
		let ids: Vec<EventId> = all.iter().map(|e| e.id).collect();
		assert_eq!(ids, (1..=43).collect::<Vec<_>>());
		let unsynced = all.iter().filter(|e| !e.is_synced()).count();
		assert_eq!(stamped + unsynced, 43);
	}

	#[tokio::test]
	async fn stamping_leaves_no_temp_file_and_keeps_lock_sibling() {
		let dir = tempfile::tempdir().unwrap();
		let log = FileEventLog::open(dir.path().join("mutation_log.jsonl"))
			.await
			.unwrap();
		log.insert(new_event(1, MutationKind::Created)).await.unwrap();

		assert_eq!(log.mark_synced(&[1], Utc::now()).await.unwrap(), 1);
		assert!(!log.temp_path().exists());
		assert!(log.lock_path().exists());
		assert!(log.fetch_unsynced().await.unwrap().is_empty());
	}
}
