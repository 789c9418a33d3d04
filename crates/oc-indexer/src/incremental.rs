use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use oc_core::{CodeSymbol, RelationKind, SymbolId};
use oc_parser::{is_binary, parse_file_with_tree, ParserRegistry};
use oc_storage::graph::FileMetadata;
use oc_storage::manager::StorageManager;

use crate::embedding::{embed_symbols, HashEmbedder};
use crate::error::IndexerError;
use crate::watcher::{should_reindex, ChangeEvent};

/// Maximum file size considered for indexing.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Categories resulting from diffing old vs new symbol sets.
#[derive(Debug)]
pub struct SymbolDiff {
    /// Symbols that exist in new but not in old.
    pub added: Vec<CodeSymbol>,
    /// Symbol IDs that exist in old but not in new.
    pub removed: Vec<SymbolId>,
    /// Symbols that exist in both but have different body_hash.
    pub modified: Vec<CodeSymbol>,
    /// Count of symbols unchanged (same ID and body_hash).
    pub unchanged_count: usize,
}

/// Compute the diff between old symbols (from storage) and new symbols (from parser).
///
/// Classification uses deterministic symbol IDs:
/// - Added: ID in new but not old → INSERT
/// - Removed: ID in old but not new → DELETE
/// - Modified: ID in both but body_hash differs → UPDATE
/// - Unchanged: ID in both with same body_hash → SKIP
pub fn diff_symbols(old_symbols: &[CodeSymbol], new_symbols: &[CodeSymbol]) -> SymbolDiff {
    let old_map: HashMap<SymbolId, u64> = old_symbols
        .iter()
        .map(|s| (s.id, s.body_hash))
        .collect();

    let new_map: HashMap<SymbolId, &CodeSymbol> = new_symbols
        .iter()
        .map(|s| (s.id, s))
        .collect();

    let old_ids: HashSet<SymbolId> = old_map.keys().copied().collect();
    let new_ids: HashSet<SymbolId> = new_map.keys().copied().collect();

    let added: Vec<CodeSymbol> = new_ids
        .difference(&old_ids)
        .map(|id| (*new_map[id]).clone())
        .collect();

    let removed: Vec<SymbolId> = old_ids.difference(&new_ids).copied().collect();

    let mut modified = Vec::new();
    let mut unchanged_count = 0usize;

    for id in old_ids.intersection(&new_ids) {
        let old_hash = old_map[id];
        let new_sym = new_map[id];
        if new_sym.body_hash != old_hash {
            modified.push((*new_sym).clone());
        } else {
            unchanged_count += 1;
        }
    }

    SymbolDiff {
        added,
        removed,
        modified,
        unchanged_count,
    }
}

/// Report for a single incremental file update.
#[derive(Debug)]
pub struct IncrementalReport {
    pub file_path: String,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub skipped_unchanged_hash: bool,
    /// IDs that were added or modified and therefore need (re-)embedding.
    pub changed_ids: Vec<SymbolId>,
    /// IDs that were removed and whose vectors have already been cleaned up.
    pub removed_ids: Vec<SymbolId>,
}

/// Process a single file change incrementally.
///
/// Pipeline: hash check → re-parse → diff → atomic SQLite replace of the
/// file's data → embed added/modified symbols → Tantivy update → done.
///
/// The SQLite write goes through `incremental_update_atomic` so the delete
/// of the file's stale rows and the insert of its new rows happen in one
/// transaction with deferred FK checking, matching the full pipeline's
/// atomicity guarantee instead of a sequence of independent statements.
/// Tantivy and the vector store are only touched after that commit succeeds.
pub fn update_file(
    project_path: &Path,
    rel_path: &str,
    repo_id: &str,
    storage: &mut StorageManager,
) -> Result<IncrementalReport, IndexerError> {
    let abs_path = project_path.join(rel_path);

    // Validate that the resolved path stays within the project root.
    // If the file doesn't exist, canonicalize will fail — fall through to the
    // fs::read below which handles NotFound by calling delete_file.
    match abs_path.canonicalize() {
        Ok(canonical) => {
            let canonical_root = project_path.canonicalize().map_err(IndexerError::Io)?;
            if !canonical.starts_with(&canonical_root) {
                return Err(IndexerError::PipelineFailed {
                    stage: "path_validation".into(),
                    reason: format!("path outside project root: {}", rel_path),
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // File doesn't exist — let the read below handle it
        }
        Err(e) => {
            return Err(IndexerError::PipelineFailed {
                stage: "path_validation".into(),
                reason: format!("cannot canonicalize path: {e}"),
            });
        }
    }

    // Read the file; if it was deleted between event and processing, fall back to delete
    let content = match fs::read(&abs_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return delete_file(rel_path, storage);
        }
        Err(e) => return Err(IndexerError::Io(e)),
    };
    let file_size = content.len() as u64;

    // Hash check: compare against stored hash
    if let Some(stored_meta) = storage.graph().get_file(rel_path)? {
        if !should_reindex(&content, stored_meta.content_hash) {
            return Ok(IncrementalReport {
                file_path: rel_path.to_string(),
                added: 0,
                removed: 0,
                modified: 0,
                unchanged: 0,
                skipped_unchanged_hash: true,
                changed_ids: vec![],
                removed_ids: vec![],
            });
        }
    }

    // Size check
    if file_size > MAX_FILE_SIZE {
        return Err(IndexerError::PipelineFailed {
            stage: "incremental_size_check".to_string(),
            reason: format!("file too large: {file_size} bytes"),
        });
    }

    // Binary check
    if is_binary(&content) {
        return Err(IndexerError::PipelineFailed {
            stage: "incremental_binary_check".to_string(),
            reason: "file is binary".to_string(),
        });
    }

    // Determine language
    let ext = Path::new(rel_path)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let language = ParserRegistry::language_for_extension(&ext).ok_or_else(|| {
        IndexerError::PipelineFailed {
            stage: "incremental_language_check".to_string(),
            reason: format!("unsupported extension: {ext}"),
        }
    })?;

    // Re-parse. body_text is already populated by the parser, so no extra
    // pass over the source bytes is needed here.
    let parse_result = parse_file_with_tree(repo_id, rel_path, &content, file_size)?;
    let new_symbols = parse_result.output.symbols;
    let new_relations = parse_result.output.relations;
    let content_hash = xxhash_rust::xxh3::xxh3_64(&content);

    // Backfill parent_id from Contains relations, same as the full pipeline.
    let parent_of: HashMap<SymbolId, SymbolId> = new_relations
        .iter()
        .filter(|r| r.kind == RelationKind::Contains)
        .map(|r| (r.target_id, r.source_id))
        .collect();
    let mut new_symbols = new_symbols;
    for sym in &mut new_symbols {
        if let Some(parent) = parent_of.get(&sym.id) {
            sym.parent_id = Some(*parent);
        }
    }

    // Get old symbols from SQLite
    let old_symbols = storage.graph().get_symbols_by_file(rel_path)?;

    // Diff (used for reporting and to scope embedding/Tantivy work; the
    // actual SQLite write below replaces the whole file atomically rather
    // than applying added/removed/modified as separate statements).
    let diff = diff_symbols(&old_symbols, &new_symbols);

    let changed_ids: Vec<SymbolId> = diff
        .added
        .iter()
        .chain(diff.modified.iter())
        .map(|s| s.id)
        .collect();
    let removed_ids: Vec<SymbolId> = diff.removed.clone();

    let report = IncrementalReport {
        file_path: rel_path.to_string(),
        added: diff.added.len(),
        removed: diff.removed.len(),
        modified: diff.modified.len(),
        unchanged: diff.unchanged_count,
        skipped_unchanged_hash: false,
        changed_ids: changed_ids.clone(),
        removed_ids: removed_ids.clone(),
    };

    // Phase 1: SQLite, single transaction. Deletes the stale rows for this
    // file (symbols/relations cascade, file metadata row removed) and
    // inserts the freshly parsed file/symbols/relations, with deferred FK
    // checking so parent/child ordering across the delete+insert never
    // trips a constraint mid-transaction.
    let now = chrono_like_now();
    let file_meta = FileMetadata {
        path: rel_path.to_string(),
        content_hash,
        language,
        size_bytes: file_size,
        symbol_count: new_symbols.len() as u32,
        last_indexed: now.clone(),
        last_modified: now,
    };
    storage.graph_mut().incremental_update_atomic(
        &[rel_path.to_string()],
        &[file_meta],
        &new_symbols,
        &[],
        &new_relations,
    )?;

    // Phase 2: embeddings for added/modified symbols, then vector cleanup
    // for removed symbols. Unchanged symbols keep their existing vector.
    let to_embed: Vec<CodeSymbol> = diff
        .added
        .iter()
        .chain(diff.modified.iter())
        .cloned()
        .collect();
    if !to_embed.is_empty() {
        let embedder = HashEmbedder::new(storage.vector().dimension());
        for (id, vector) in embed_symbols(&embedder, &to_embed) {
            storage.vector_mut().add_vector(id, &vector)?;
        }
    }
    for id in &removed_ids {
        storage.vector_mut().remove_vector(*id)?;
    }

    // Phase 3: Tantivy updates (only after SQLite succeeds)
    for id in &diff.removed {
        storage.fulltext_mut().delete_document(*id)?;
    }
    for sym in &diff.modified {
        storage.fulltext_mut().delete_document(sym.id)?;
    }
    for sym in &diff.added {
        storage.fulltext_mut().add_document(sym, sym.body_text.as_deref())?;
    }
    for sym in &diff.modified {
        storage.fulltext_mut().add_document(sym, sym.body_text.as_deref())?;
    }

    Ok(report)
}

/// Handle a file deletion: remove all symbols, relations, vectors, Tantivy
/// docs, and file metadata.
///
/// The SQLite side goes through `incremental_update_atomic` with an empty
/// insert set, so the delete of the file's row (and the cascade it
/// triggers) commits as a single transaction. Vector and Tantivy cleanup
/// happen only after that commit succeeds.
pub fn delete_file(
    rel_path: &str,
    storage: &mut StorageManager,
) -> Result<IncrementalReport, IndexerError> {
    // Get all symbols for this file before deleting
    let old_symbols = storage.graph().get_symbols_by_file(rel_path)?;
    let removed_count = old_symbols.len();
    let removed_ids: Vec<SymbolId> = old_symbols.iter().map(|s| s.id).collect();

    // Phase 1: SQLite (source of truth), single transaction
    storage.graph_mut().incremental_update_atomic(
        &[rel_path.to_string()],
        &[],
        &[],
        &[],
        &[],
    )?;

    // Phase 2: vector store cleanup
    for id in &removed_ids {
        storage.vector_mut().remove_vector(*id)?;
    }

    // Phase 3: Tantivy (only after SQLite succeeds)
    for sym in &old_symbols {
        storage.fulltext_mut().delete_document(sym.id)?;
    }

    Ok(IncrementalReport {
        file_path: rel_path.to_string(),
        added: 0,
        removed: removed_count,
        modified: 0,
        unchanged: 0,
        skipped_unchanged_hash: false,
        changed_ids: vec![],
        removed_ids,
    })
}

/// Process a batch of change events from the watcher.
///
/// Each event is processed incrementally. Returns a report per file.
pub fn process_events(
    project_path: &Path,
    events: &[ChangeEvent],
    repo_id: &str,
    storage: &mut StorageManager,
) -> Vec<Result<IncrementalReport, IndexerError>> {
    // The watcher already applies the dedup/coalescing state machine
    // (§4.5) before handing events here, so each path appears at most once
    // with its final kind. Still fold defensively in case a caller passes
    // a raw, undebounced batch.
    let mut latest: HashMap<String, &ChangeEvent> = HashMap::new();
    for event in events {
        let path = event.path().to_string_lossy().replace('\\', "/");
        latest.insert(path, event);
    }

    latest
        .into_iter()
        .map(|(path, event)| match event {
            ChangeEvent::Created(_) | ChangeEvent::Modified(_) => {
                update_file(project_path, &path, repo_id, storage)
            }
            ChangeEvent::Deleted(_) => delete_file(&path, storage),
        })
        .collect()
}

fn chrono_like_now() -> String {
    use std::time::SystemTime;
    let dur = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();
    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;
    let (year, month, day) = days_to_ymd(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

fn days_to_ymd(mut days: u64) -> (u64, u64, u64) {
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }
    let leap = is_leap(year);
    let months: [u64; 12] = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut month = 1u64;
    for &m in &months {
        if days < m {
            break;
        }
        days -= m;
        month += 1;
    }
    (year, month, days + 1)
}

fn is_leap(y: u64) -> bool {
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}
