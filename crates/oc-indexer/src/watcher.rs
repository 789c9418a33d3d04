use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use notify::{Event, EventKind, ModifyKind, RecommendedWatcher, RecursiveMode, RenameMode, Watcher};

use oc_parser::ParserRegistry;

use crate::error::IndexerError;
use crate::scanner::{scan_files, GENERATED_PATTERNS, VENDOR_DIRS};

/// Default debounce window (spec §4.5: `debounce_delay`, default 200ms).
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// How often the flush thread checks the pending queue for expired entries.
const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// A change event emitted by the watcher after path filtering and debouncing.
///
/// Note: these events are based on filesystem notification only. The consumer
/// must call `should_reindex` to check content hashes and skip metadata-only
/// changes before performing actual re-indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// File was created (and did not already exist at watcher start).
    Created(PathBuf),
    /// Pre-existing file's content changed.
    Modified(PathBuf),
    /// File was deleted.
    Deleted(PathBuf),
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
        }
    }
}

/// The kind half of a pending debounce-queue entry, tracked separately from
/// the path since the path is already the map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Created,
    Modified,
    Deleted,
}

impl PendingKind {
    fn into_event(self, path: PathBuf) -> ChangeEvent {
        match self {
            PendingKind::Created => ChangeEvent::Created(path),
            PendingKind::Modified => ChangeEvent::Modified(path),
            PendingKind::Deleted => ChangeEvent::Deleted(path),
        }
    }
}

/// Apply the spec's dedup rules (§4.5) when a new event arrives for a path
/// that already has a pending entry. Returns `None` when the pair cancels
/// out to a net no-op (CREATED then DELETED).
fn merge_pending(existing: PendingKind, incoming: PendingKind) -> Option<PendingKind> {
    use PendingKind::*;
    match (existing, incoming) {
        (Created, Deleted) => None,
        (_, Deleted) => Some(Deleted),
        (Created, Modified) => Some(Created),
        (_, incoming) => Some(incoming),
    }
}

type PendingMap = Arc<Mutex<HashMap<PathBuf, (PendingKind, Instant)>>>;

/// Handle to a running file watcher. Dropping it leaves the background
/// threads running; call `stop()` to shut them down and collect any events
/// still in flight.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    /// Receiver for filtered, debounced change events.
    pub events: Receiver<ChangeEvent>,
    project_root: PathBuf,
    stop_flag: Arc<AtomicBool>,
    pending: PendingMap,
    tx: Sender<ChangeEvent>,
    tick_thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Stop watching: signal the flush thread, force-flush whatever is
    /// still in the debounce queue (no point waiting out their timers on
    /// shutdown), join the thread, then drain the channel.
    ///
    /// Returns all events that were buffered or force-flushed.
    pub fn stop(mut self) -> Vec<ChangeEvent> {
        self.stop_flag.store(true, Ordering::SeqCst);

        let remaining: Vec<(PathBuf, PendingKind)> = {
            let mut map = self.pending.lock().unwrap();
            map.drain().map(|(path, (kind, _))| (path, kind)).collect()
        };
        for (path, kind) in remaining {
            let _ = self.tx.send(kind.into_event(path));
        }

        if let Some(handle) = self.tick_thread.take() {
            let _ = handle.join();
        }

        let mut events = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            events.push(ev);
        }
        events
    }

    /// The project root this watcher monitors.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

/// Start watching a project directory for source file changes.
///
/// Runs a hand-rolled debounce queue (spec §4.5) on top of raw `notify`
/// events rather than delegating coalescing to a third-party debouncer:
/// CREATED/MODIFIED/DELETED are tracked as distinct event kinds per path so
/// the dedup rules (CREATED→DELETED cancels, CREATED→MODIFIED stays
/// CREATED, DELETED always wins) can be applied exactly, and a path whose
/// net effect cancels out never reaches the consumer at all.
///
/// A `seen_files` set is seeded from an initial scan so the first CREATE
/// notification for a file that already existed at startup (common with
/// editors that save via temp-file-then-rename) is coerced to MODIFIED.
pub fn start_watching(project_path: &Path) -> Result<WatcherHandle, IndexerError> {
    let project_root = project_path
        .canonicalize()
        .map_err(|e| IndexerError::Watcher(format!("cannot canonicalize path: {e}")))?;

    let seen_files: HashSet<PathBuf> = scan_files(&project_root).files.into_iter().collect();

    let (tx, rx) = crossbeam_channel::bounded::<ChangeEvent>(4096);
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let stop_flag = Arc::new(AtomicBool::new(false));

    let root_for_watcher = project_root.clone();
    let pending_for_watcher = Arc::clone(&pending);

    let event_handler = move |res: Result<Event, notify::Error>| {
        let event = match res {
            Ok(e) => e,
            Err(_) => return,
        };
        handle_raw_event(&root_for_watcher, &seen_files, &pending_for_watcher, event);
    };

    let mut watcher = notify::recommended_watcher(event_handler)
        .map_err(|e| IndexerError::Watcher(format!("failed to create watcher: {e}")))?;
    watcher
        .watch(&project_root, RecursiveMode::Recursive)
        .map_err(|e| IndexerError::Watcher(format!("failed to start watching: {e}")))?;

    let tick_pending = Arc::clone(&pending);
    let tick_stop = Arc::clone(&stop_flag);
    let tick_tx = tx.clone();
    let tick_thread = std::thread::spawn(move || {
        flush_loop(tick_pending, tick_stop, tick_tx, DEFAULT_DEBOUNCE);
    });

    Ok(WatcherHandle {
        _watcher: watcher,
        events: rx,
        project_root,
        stop_flag,
        pending,
        tx,
        tick_thread: Some(tick_thread),
    })
}

/// Background loop: every tick, pop any debounce-queue entries whose timer
/// has expired and send them as change events.
fn flush_loop(pending: PendingMap, stop_flag: Arc<AtomicBool>, tx: Sender<ChangeEvent>, delay: Duration) {
    while !stop_flag.load(Ordering::SeqCst) {
        std::thread::sleep(TICK_INTERVAL);
        let mut expired = Vec::new();
        {
            let mut map = pending.lock().unwrap();
            let now = Instant::now();
            map.retain(|path, (kind, ts)| {
                if now.duration_since(*ts) >= delay {
                    expired.push((path.clone(), *kind));
                    false
                } else {
                    true
                }
            });
        }
        for (path, kind) in expired {
            let _ = tx.send(kind.into_event(path));
        }
    }
}

/// Translate one raw `notify` event into zero or more debounce-queue updates.
fn handle_raw_event(root: &Path, seen_files: &HashSet<PathBuf>, pending: &PendingMap, event: Event) {
    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                add_pending(root, seen_files, pending, path, PendingKind::Created);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            // Rename reported as a single event carrying [from, to].
            add_pending(root, seen_files, pending, &event.paths[0], PendingKind::Deleted);
            add_pending(root, seen_files, pending, &event.paths[1], PendingKind::Created);
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                add_pending(root, seen_files, pending, path, PendingKind::Deleted);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                add_pending(root, seen_files, pending, path, PendingKind::Created);
            }
        }
        EventKind::Modify(_) => {
            for path in &event.paths {
                add_pending(root, seen_files, pending, path, PendingKind::Modified);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                add_pending(root, seen_files, pending, path, PendingKind::Deleted);
            }
        }
        EventKind::Access(_) | EventKind::Other | EventKind::Any => {}
    }
}

fn add_pending(
    root: &Path,
    seen_files: &HashSet<PathBuf>,
    pending: &PendingMap,
    abs_path: &Path,
    kind: PendingKind,
) {
    // Skip symlinks (scanner also skips them).
    if abs_path.symlink_metadata().map_or(false, |m| m.file_type().is_symlink()) {
        return;
    }

    let rel_path = match abs_path.strip_prefix(root) {
        Ok(r) => r,
        Err(_) => return,
    };

    if !is_watchable_path(rel_path) {
        return;
    }

    // A CREATE notification for a file already present at watcher startup
    // is a re-save, not a genuine creation (editors commonly write via a
    // temp file + rename).
    let kind = if kind == PendingKind::Created && seen_files.contains(rel_path) {
        PendingKind::Modified
    } else {
        kind
    };

    let rel_path = rel_path.to_path_buf();
    let mut map = pending.lock().unwrap();
    let now = Instant::now();
    match map.get(&rel_path).copied() {
        Some((existing, _)) => match merge_pending(existing, kind) {
            Some(merged) => {
                map.insert(rel_path, (merged, now));
            }
            None => {
                map.remove(&rel_path);
            }
        },
        None => {
            map.insert(rel_path, (kind, now));
        }
    }
}

/// Check if a file's content hash differs from the stored hash, indicating
/// it should be re-indexed. Returns `true` if re-indexing is needed.
///
/// `stored_hash` is the XXH3-64 hash from the `files` table.
/// `current_content` is the raw file bytes to hash and compare.
pub fn should_reindex(current_content: &[u8], stored_hash: u64) -> bool {
    let current_hash = xxhash_rust::xxh3::xxh3_64(current_content);
    current_hash != stored_hash
}

/// Check whether a relative path passes the watcher filter rules.
///
/// This applies the same rules as the scanner:
/// - Skip vendor directories
/// - Skip generated file patterns
/// - Skip hidden directories/files
/// - Only accept files with supported language extensions
fn is_watchable_path(rel_path: &Path) -> bool {
    // Check each component for vendor dirs and hidden dirs
    for component in rel_path.components() {
        if let std::path::Component::Normal(name) = component {
            let name_str = name.to_string_lossy();
            // Skip hidden directories/files (starting with '.')
            if name_str.starts_with('.') {
                return false;
            }
            // Skip vendor directories
            if VENDOR_DIRS.contains(&name_str.as_ref()) {
                return false;
            }
        }
    }

    // Skip generated file patterns
    if let Some(file_name) = rel_path.file_name() {
        let name = file_name.to_string_lossy();
        for pattern in GENERATED_PATTERNS {
            if name.contains(pattern) {
                return false;
            }
        }
    }

    // Only accept files with supported language extensions
    let ext = rel_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    if ext.is_empty() {
        return false;
    }

    ParserRegistry::language_for_extension(&ext).is_some()
}
