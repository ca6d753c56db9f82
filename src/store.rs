use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use crate::engine::EngineError;
use crate::model::Event;
use crate::wal::Wal;

/// Durable home of the event history. The engine keeps its indexes in memory
/// and only applies an event after `append` has returned `Ok`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Durably record one event. An event is all-or-nothing.
    async fn append(&self, event: &Event) -> Result<(), EngineError>;

    /// Every event recorded so far, oldest first.
    async fn replay(&self) -> Result<Vec<Event>, EngineError>;

    /// Replace the whole history with `snapshot`.
    async fn compact(&self, snapshot: Vec<Event>) -> Result<(), EngineError>;

    async fn appends_since_compact(&self) -> u64;
}

fn storage_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::StorageFailure(e.to_string())
}

// ── In-memory store ──────────────────────────────────────────────

/// Non-durable store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryLog>,
    fail_next: AtomicBool,
}

#[derive(Default)]
struct MemoryLog {
    events: Vec<Event>,
    appends_since_compact: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `append` fail without recording anything.
    pub fn fail_next_append(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.inner.lock().await.events.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn append(&self, event: &Event) -> Result<(), EngineError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::StorageFailure("injected append failure".into()));
        }
        let mut log = self.inner.lock().await;
        log.events.push(event.clone());
        log.appends_since_compact += 1;
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<Event>, EngineError> {
        Ok(self.inner.lock().await.events.clone())
    }

    async fn compact(&self, snapshot: Vec<Event>) -> Result<(), EngineError> {
        let mut log = self.inner.lock().await;
        log.events = snapshot;
        log.appends_since_compact = 0;
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.inner.lock().await.appends_since_compact
    }
}

// ── WAL-backed store ─────────────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL file. Appends that arrive while a batch is being collected
/// share a single fsync (group commit).
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch: Vec<PendingAppend> = Vec::new();
        let mut trailing = None;
        match cmd {
            WalCommand::Append { event, response } => batch.push((event, response)),
            other => trailing = Some(other),
        }

        while trailing.is_none() {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => trailing = Some(other),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            commit_batch(&mut wal, batch);
        }
        if let Some(cmd) = trailing {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let events: Vec<&Event> = batch.iter().map(|(event, _)| event).collect();
    let result = wal.commit(&events);
    if let Err(e) = &result {
        warn!("WAL batch of {} rolled back: {e}", events.len());
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let _ = response.send(wal.rewrite(&snapshot));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// File-backed store. Must be opened inside a tokio runtime.
pub struct WalStore {
    path: PathBuf,
    tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    pub fn open(path: &Path) -> io::Result<Self> {
        let recovered = Wal::recover(path)?;
        if recovered.discarded_bytes > 0 {
            warn!(
                "truncated {} trailing bytes of {}",
                recovered.discarded_bytes,
                path.display()
            );
        }
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Ok(Self {
            path: path.to_path_buf(),
            tx,
        })
    }

    async fn request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<io::Result<T>>,
    ) -> Result<T, EngineError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::StorageFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageFailure("WAL writer dropped response".into()))?
            .map_err(storage_err)
    }
}

#[async_trait]
impl RecordStore for WalStore {
    async fn append(&self, event: &Event) -> Result<(), EngineError> {
        let (response, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response,
        };
        self.request(cmd, rx).await
    }

    async fn replay(&self) -> Result<Vec<Event>, EngineError> {
        let replay = Wal::replay(&self.path).map_err(storage_err)?;
        if replay.discarded_bytes > 0 {
            warn!(
                "discarded {} trailing bytes of {}",
                replay.discarded_bytes,
                self.path.display()
            );
        }
        Ok(replay.events)
    }

    async fn compact(&self, snapshot: Vec<Event>) -> Result<(), EngineError> {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::Compact { snapshot, response }, rx).await
    }

    async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        if self
            .tx
            .send(WalCommand::AppendsSinceCompact { response })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
