//! Engine lifecycle: startup indexing, the file watcher pump, idle-driven
//! vector-index unloading, and graceful shutdown.
//!
//! Startup is synchronous (no handshake to rush here, unlike an MCP
//! server), but keeps the same phase structure so a caller embedding this
//! engine can report progress: run incremental (or first-run full)
//! indexing, refresh reachability, attach the watcher, and only then
//! consider the engine ready.
//!
//! The watcher and idle-unload are *pumped*, not backgrounded on their own
//! threads: `StorageManager` wraps a usearch index and a Tantivy writer,
//! neither of which this crate assumes are safe to hand to another thread
//! behind a lock. The host calls `pump_watcher`/`maybe_unload_idle`
//! periodically from whichever thread already owns the engine — the same
//! contract `oc_indexer::watcher::WatcherHandle` already expects of its
//! caller.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{select, Sender};

use oc_indexer::report::IndexConfig;
use oc_indexer::{incremental, reachability, watcher, WatcherHandle};
use oc_storage::manager::StorageManager;

use crate::error::RetrievalError;

/// Unload the vector index after this long without a recorded query.
pub const DEFAULT_IDLE_UNLOAD_AFTER: Duration = Duration::from_secs(300);
/// How often the startup watchdog logs if still running past this phase.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(15);
/// BFS depth cap for reachability refreshes triggered by the watcher.
pub const DEFAULT_REACHABILITY_MAX_DEPTH: u32 = 10;

/// Startup phase, reported by the watchdog thread if a phase runs long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Indexing,
    ComputingReachability,
    StartingWatcher,
    Ready,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Indexing => "indexing",
            Self::ComputingReachability => "computing_reachability",
            Self::StartingWatcher => "starting_watcher",
            Self::Ready => "ready",
        }
    }
}

/// Configuration for a lifecycle-managed engine instance.
pub struct LifecycleConfig {
    pub project_root: PathBuf,
    pub repo_id: String,
    pub embedding_dim: usize,
    pub batch_size: usize,
    pub idle_unload_after: Duration,
    pub watchdog_interval: Duration,
    pub reachability_max_depth: u32,
    /// If false, the file watcher is not started (useful for one-shot CLI
    /// invocations that don't want a watcher outliving the call).
    pub enable_watcher: bool,
}

impl LifecycleConfig {
    pub fn new(project_root: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            repo_id: repo_id.into(),
            embedding_dim: 384,
            batch_size: 1000,
            idle_unload_after: DEFAULT_IDLE_UNLOAD_AFTER,
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            reachability_max_depth: DEFAULT_REACHABILITY_MAX_DEPTH,
            enable_watcher: true,
        }
    }

    fn index_config(&self) -> IndexConfig {
        IndexConfig {
            repo_id: self.repo_id.clone(),
            batch_size: self.batch_size,
            embedding_dim: self.embedding_dim,
        }
    }
}

/// What happened during the startup indexing pass, for logging/diagnostics.
#[derive(Debug, Clone)]
pub struct StartupReport {
    pub fell_back_to_full: bool,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub total_symbols: usize,
    pub reachability_entries: Option<usize>,
    pub startup_duration: Duration,
}

/// What happened during one `pump_watcher` call.
#[derive(Debug, Clone, Default)]
pub struct WatcherPumpReport {
    pub events_processed: usize,
    pub any_reindexed: bool,
    pub reachability_entries: Option<usize>,
}

/// A running engine instance: open storage plus an optional attached file
/// watcher. Owns the `StorageManager` directly — all storage access,
/// including watcher-driven reindexing and idle-unload, happens on
/// whichever thread holds `&mut LifecycleOrchestrator`.
pub struct LifecycleOrchestrator {
    storage: StorageManager,
    phase: Arc<Mutex<Phase>>,
    last_activity: Arc<AtomicU64>,
    config: LifecycleConfig,
    watcher_handle: Option<WatcherHandle>,
    stop_tx: Option<Sender<()>>,
    watchdog_thread: Option<JoinHandle<()>>,
}

impl LifecycleOrchestrator {
    /// Run startup to completion (indexing + reachability), attach the
    /// watcher, and return the running instance.
    #[tracing::instrument(skip(config), fields(project_root = %config.project_root.display()))]
    pub fn start(config: LifecycleConfig) -> Result<(Self, StartupReport), RetrievalError> {
        let start = Instant::now();
        let phase = Arc::new(Mutex::new(Phase::Starting));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let watchdog_thread = spawn_watchdog(
            Arc::clone(&phase),
            stop_rx,
            config.watchdog_interval,
        );

        set_phase(&phase, Phase::Indexing);
        let index_result =
            oc_indexer::index_incremental(&config.project_root, &config.index_config())?;
        tracing::info!(
            indexed = index_result.report.files_indexed,
            unchanged = index_result.files_unchanged,
            deleted = index_result.files_deleted,
            fell_back_to_full = index_result.fell_back_to_full,
            "startup indexing complete"
        );

        let mut storage =
            StorageManager::open_with_dimension(&config.project_root, config.embedding_dim)?;

        set_phase(&phase, Phase::ComputingReachability);
        let reachability_entries = reachability::refresh_reachability(
            storage.graph_mut(),
            config.reachability_max_depth,
        )?;

        set_phase(&phase, Phase::StartingWatcher);
        let mut watcher_handle = None;
        if config.enable_watcher {
            match watcher::start_watching(&config.project_root) {
                Ok(handle) => watcher_handle = Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "file watcher failed to start; running without live reindexing");
                }
            }
        }

        set_phase(&phase, Phase::Ready);

        let report = StartupReport {
            fell_back_to_full: index_result.fell_back_to_full,
            files_indexed: index_result.report.files_indexed,
            files_unchanged: index_result.files_unchanged,
            files_deleted: index_result.files_deleted,
            total_symbols: index_result.report.total_symbols,
            reachability_entries,
            startup_duration: start.elapsed(),
        };

        let orchestrator = Self {
            storage,
            phase,
            last_activity: Arc::new(AtomicU64::new(now_epoch_secs())),
            config,
            watcher_handle,
            stop_tx: Some(stop_tx),
            watchdog_thread: Some(watchdog_thread),
        };

        Ok((orchestrator, report))
    }

    /// Read-only access to the underlying storage (for query tools).
    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Mutable access to the underlying storage (for query tools and
    /// rename operations that write back through the same connection).
    pub fn storage_mut(&mut self) -> &mut StorageManager {
        &mut self.storage
    }

    /// Current startup phase (always `Ready` once `start` has returned,
    /// exposed mainly for tests and diagnostics).
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    /// The configuration this instance was started with.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Mark the engine as active, resetting the idle-unload countdown.
    /// Callers (search, trace, query tools) should call this on every
    /// incoming request before touching storage.
    pub fn record_activity(&self) {
        self.last_activity.store(now_epoch_secs(), Ordering::Relaxed);
    }

    /// Seconds since the last recorded activity.
    pub fn idle_seconds(&self) -> u64 {
        now_epoch_secs().saturating_sub(self.last_activity.load(Ordering::Relaxed))
    }

    /// Drain any pending watcher events and reindex the affected files.
    /// A no-op returning `None` if no watcher is attached. The host should
    /// call this periodically (e.g. once per request, or on a timer it
    /// already owns).
    pub fn pump_watcher(&mut self) -> Result<Option<WatcherPumpReport>, RetrievalError> {
        let Some(handle) = self.watcher_handle.as_ref() else {
            return Ok(None);
        };

        let mut batch = Vec::new();
        while let Ok(ev) = handle.events.try_recv() {
            batch.push(ev);
        }
        if batch.is_empty() {
            return Ok(Some(WatcherPumpReport::default()));
        }

        let results = incremental::process_events(
            &self.config.project_root,
            &batch,
            &self.config.repo_id,
            &mut self.storage,
        );

        let mut any_reindexed = false;
        for result in results {
            match result {
                Ok(report) => {
                    any_reindexed = true;
                    tracing::info!(
                        file = %report.file_path,
                        added = report.added,
                        modified = report.modified,
                        removed = report.removed,
                        "incremental reindex"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "incremental reindex failed"),
            }
        }

        let reachability_entries = if any_reindexed
            && reachability::is_reachability_stale(self.storage.graph())?
        {
            reachability::refresh_reachability(
                self.storage.graph_mut(),
                self.config.reachability_max_depth,
            )?
        } else {
            None
        };

        Ok(Some(WatcherPumpReport {
            events_processed: batch.len(),
            any_reindexed,
            reachability_entries,
        }))
    }

    /// If idle past `idle_unload_after`, flush and drop the in-memory
    /// vector index. Returns whether an unload happened. The host should
    /// call this periodically (the same tick that drives `pump_watcher`
    /// is a natural place).
    pub fn maybe_unload_idle(&mut self) -> Result<bool, RetrievalError> {
        let idle_for = self.idle_seconds();
        if idle_for < self.config.idle_unload_after.as_secs() {
            return Ok(false);
        }
        if self.storage.vector().is_empty() {
            return Ok(false);
        }
        self.storage.flush()?;
        self.storage.unload_vector()?;
        tracing::info!(idle_for_secs = idle_for, "vector index unloaded after inactivity");
        Ok(true)
    }

    /// Reload the vector index from disk if it was unloaded. Query paths
    /// that need vector search should call this before `search_knn`.
    pub fn ensure_vector_loaded(&mut self) -> Result<(), RetrievalError> {
        if self.storage.vector().is_empty() {
            self.storage.reload_vector()?;
        }
        Ok(())
    }

    /// Stop the watcher and watchdog, flush storage, and return.
    pub fn shutdown(mut self) -> Result<(), RetrievalError> {
        tracing::info!("shutting down");

        // Closing the channel (dropping the only Sender) unblocks the
        // watchdog's `select!` on `stop_rx`, since crossbeam treats a
        // sender-less channel as permanently closed for pending recvs.
        drop(self.stop_tx.take());
        if let Some(handle) = self.watchdog_thread.take() {
            let _ = handle.join();
        }

        if let Some(handle) = self.watcher_handle.take() {
            let remaining = handle.stop();
            if !remaining.is_empty() {
                tracing::info!(
                    count = remaining.len(),
                    "discarding unprocessed watcher events at shutdown"
                );
            }
        }

        self.storage.flush()?;
        tracing::info!("shutdown complete");
        Ok(())
    }
}

fn set_phase(phase: &Arc<Mutex<Phase>>, next: Phase) {
    *phase.lock().unwrap() = next;
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn spawn_watchdog(
    phase: Arc<Mutex<Phase>>,
    stop_rx: crossbeam_channel::Receiver<()>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now();
        let ticker = crossbeam_channel::tick(interval);
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    let current = *phase.lock().unwrap();
                    if current == Phase::Ready {
                        break;
                    }
                    tracing::warn!(
                        elapsed_secs = start.elapsed().as_secs(),
                        phase = current.as_str(),
                        "startup still running"
                    );
                }
            }
        }
    })
}
