use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use tracing;

use oc_core::{CodeSymbol, RelationKind, SymbolId};
use oc_parser::{is_binary, parse_file_with_tree, ParserRegistry};
use oc_storage::graph::FileMetadata;
use oc_storage::manager::StorageManager;

use crate::embedding::{embed_symbols, HashEmbedder};
use crate::error::IndexerError;
use crate::incremental;
use crate::report::{IndexConfig, IndexReport, SkipReason};
use crate::scanner::scan_files;

/// Maximum file size considered for indexing. Larger files are skipped
/// rather than failed.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Outcome of attempting to parse a single file.
enum FileOutcome {
    Parsed {
        rel_path: String,
        symbols: Vec<CodeSymbol>,
        relations: Vec<oc_core::CodeRelation>,
        content_hash: u64,
        file_size: u64,
        language: oc_core::Language,
    },
    Skipped(SkipReason),
    Failed(String, String),
}

/// Run a full indexing pipeline on a project directory.
///
/// Pipeline: scan → filter → parallel parse (rayon) → sequential store → Tantivy index.
///
/// Returns an `IndexReport` with statistics about the indexing run.
#[tracing::instrument(skip(config))]
pub fn index(project_path: &Path, config: &IndexConfig) -> Result<IndexReport, IndexerError> {
    let start = Instant::now();

    // 1. Scan for files
    let scan_result = scan_files(project_path);
    let total_files_scanned = scan_result.files.len();
    tracing::info!(files = total_files_scanned, "index started");

    // 2. Open storage
    let mut storage = StorageManager::open_with_dimension(project_path, config.embedding_dim)?;

    // 3. Clear existing data for a clean full reindex.
    // This prevents ghost entries from deleted files and Tantivy index bloat.
    storage
        .graph_mut()
        .clear()
        .map_err(|e| IndexerError::PipelineFailed {
            stage: "clear_graph".to_string(),
            reason: e.to_string(),
        })?;
    storage
        .fulltext_mut()
        .clear()
        .map_err(|e| IndexerError::PipelineFailed {
            stage: "clear_fulltext".to_string(),
            reason: e.to_string(),
        })?;

    // 4. Parallel parse
    let parent_span = tracing::Span::current();
    let outcomes: Vec<FileOutcome> = scan_result
        .files
        .par_iter()
        .map(|rel_path| {
            let _guard = tracing::debug_span!(parent: &parent_span, "parse_file", path = %rel_path.display()).entered();
            let rel_str = normalize_path(rel_path);
            let abs_path = project_path.join(rel_path);

            // Read file metadata
            let metadata = match fs::metadata(&abs_path) {
                Ok(m) => m,
                Err(e) => return FileOutcome::Failed(rel_str, e.to_string()),
            };

            let file_size = metadata.len();

            // Size check
            if file_size > MAX_FILE_SIZE {
                return FileOutcome::Skipped(SkipReason::TooLarge);
            }

            // Read file content
            let content = match fs::read(&abs_path) {
                Ok(c) => c,
                Err(e) => return FileOutcome::Failed(rel_str, e.to_string()),
            };

            // Binary check
            if is_binary(&content) {
                return FileOutcome::Skipped(SkipReason::Binary);
            }

            // Language resolution happens inside parse_file_with_tree; files with
            // no wired visitor still go through File-Level Indexing rather than
            // being skipped, so the only languages skipped here are ones the
            // registry maps to no extension at all.
            let lang = match ParserRegistry::language_for_extension(&extension_from_path(rel_path)) {
                Some(l) => l,
                None => return FileOutcome::Skipped(SkipReason::UnsupportedLanguage),
            };

            match parse_file_with_tree(&config.repo_id, &rel_str, &content, file_size) {
                Ok(result) => {
                    let content_hash = xxhash_rust::xxh3::xxh3_64(&content);
                    FileOutcome::Parsed {
                        rel_path: rel_str,
                        symbols: result.output.symbols,
                        relations: result.output.relations,
                        content_hash,
                        file_size,
                        language: lang,
                    }
                }
                Err(e) => {
                    use oc_parser::error::ParserError;
                    match &e {
                        ParserError::FileTooLarge { .. } => FileOutcome::Skipped(SkipReason::TooLarge),
                        ParserError::InvalidEncoding { .. } => FileOutcome::Skipped(SkipReason::Binary),
                        ParserError::UnsupportedLanguage { .. } => {
                            FileOutcome::Skipped(SkipReason::UnsupportedLanguage)
                        }
                        ParserError::ParseFailed { .. } => FileOutcome::Failed(rel_str, e.to_string()),
                    }
                }
            }
        })
        .collect();

    // 5. Accumulate into the indexing buffer, flushing (store + embed +
    // fulltext) whenever it crosses a threshold so memory and embedding
    // work stay bounded on large repositories instead of growing with the
    // whole project.
    let mut files_indexed = 0usize;
    let mut files_skipped: HashMap<SkipReason, usize> = HashMap::new();
    let mut files_failed = 0usize;
    let mut failed_details: Vec<(String, String)> = Vec::new();
    let mut total_symbols = 0usize;
    let mut valid_relation_count = 0usize;

    let mut buffer = crate::buffer::IndexingBuffer::new();

    for outcome in outcomes {
        match outcome {
            FileOutcome::Parsed {
                rel_path,
                symbols,
                relations,
                content_hash,
                file_size,
                language,
            } => {
                total_symbols += symbols.len();
                files_indexed += 1;

                buffer.add_result(
                    crate::buffer::FileAction::Indexed,
                    crate::buffer::FileRecord { path: rel_path, language, content_hash, size_bytes: file_size },
                    symbols,
                    Vec::new(),
                    relations,
                );

                if buffer.should_flush() {
                    valid_relation_count += flush_buffer(&mut storage, &mut buffer, config)?;
                }
            }
            FileOutcome::Skipped(reason) => {
                *files_skipped.entry(reason).or_insert(0) += 1;
            }
            FileOutcome::Failed(path, reason) => {
                files_failed += 1;
                failed_details.push((path, reason));
            }
        }
    }
    valid_relation_count += flush_buffer(&mut storage, &mut buffer, config)?;

    // Transitive closure for O(1) impact-analysis lookups. A full reindex
    // always recomputes from scratch since the graph just changed wholesale.
    let closure_count = crate::reachability::compute_transitive_closure(
        storage.graph_mut(),
        crate::reachability::DEFAULT_MAX_DEPTH,
    )
    .map_err(|e| IndexerError::PipelineFailed {
        stage: "compute_reachability".to_string(),
        reason: e.to_string(),
    })?;
    tracing::info!(entries = closure_count, "reachability closure computed");

    // Commit Tantivy and flush
    storage.flush().map_err(|e| IndexerError::PipelineFailed {
        stage: "flush".to_string(),
        reason: e.to_string(),
    })?;

    let duration = start.elapsed();

    tracing::info!(
        files = files_indexed,
        symbols = total_symbols,
        duration_secs = %format!("{:.2}", duration.as_secs_f64()),
        "index completed"
    );

    Ok(IndexReport {
        total_files_scanned,
        files_indexed,
        files_skipped,
        files_failed,
        failed_details,
        total_symbols,
        total_relations: valid_relation_count,
        duration,
    })
}

/// Flush a batch out of the indexing buffer: derive `parent_id` from
/// `Contains` relations within the batch, filter relations to those with a
/// known source, store symbols/relations/file metadata, embed the batch's
/// symbols, index them into fulltext, then clear the buffer for reuse.
/// Returns the number of relations that passed filtering.
fn flush_buffer(
    storage: &mut StorageManager,
    buffer: &mut crate::buffer::IndexingBuffer,
    config: &IndexConfig,
) -> Result<usize, IndexerError> {
    if buffer.is_empty() {
        return Ok(0);
    }

    let parent_of: HashMap<SymbolId, SymbolId> = buffer
        .relations
        .iter()
        .filter(|r| r.kind == RelationKind::Contains)
        .map(|r| (r.target_id, r.source_id))
        .collect();
    for sym in &mut buffer.symbols {
        if let Some(parent) = parent_of.get(&sym.id) {
            sym.parent_id = Some(*parent);
        }
    }

    let known_ids: HashSet<SymbolId> = buffer.symbols.iter().map(|s| s.id).collect();
    let valid_relations: Vec<oc_core::CodeRelation> =
        buffer.relations.drain(..).filter(|r| known_ids.contains(&r.source_id)).collect();
    let valid_relation_count = valid_relations.len();

    if !buffer.symbols.is_empty() {
        storage
            .graph_mut()
            .insert_symbols(&buffer.symbols, config.batch_size)
            .map_err(|e| IndexerError::PipelineFailed { stage: "store_symbols".to_string(), reason: e.to_string() })?;
    }
    if !valid_relations.is_empty() {
        storage
            .graph_mut()
            .insert_relations(&valid_relations, config.batch_size)
            .map_err(|e| IndexerError::PipelineFailed { stage: "store_relations".to_string(), reason: e.to_string() })?;
    }

    let now = chrono_like_now();
    let mut symbol_counts: HashMap<&str, u32> = HashMap::new();
    for sym in &buffer.symbols {
        let path = sym.file_path.to_str().unwrap_or_default();
        *symbol_counts.entry(path).or_insert(0) += 1;
    }
    for file in &buffer.files {
        let meta = FileMetadata {
            path: file.path.clone(),
            content_hash: file.content_hash,
            language: file.language,
            size_bytes: file.size_bytes,
            symbol_count: *symbol_counts.get(file.path.as_str()).unwrap_or(&0),
            last_indexed: now.clone(),
            last_modified: now.clone(),
        };
        storage
            .graph_mut()
            .upsert_file(&meta)
            .map_err(|e| IndexerError::PipelineFailed { stage: "store_file_metadata".to_string(), reason: e.to_string() })?;
    }

    if !buffer.symbols.is_empty() {
        let embedder = HashEmbedder::new(storage.vector().dimension());
        for (id, vector) in embed_symbols(&embedder, &buffer.symbols) {
            storage
                .vector_mut()
                .add_vector(id, &vector)
                .map_err(|e| IndexerError::PipelineFailed { stage: "embed_symbols".to_string(), reason: e.to_string() })?;
        }
    }

    for sym in &buffer.symbols {
        storage
            .fulltext_mut()
            .add_document(sym, sym.body_text.as_deref())
            .map_err(|e| IndexerError::PipelineFailed { stage: "fulltext_index".to_string(), reason: e.to_string() })?;
    }

    buffer.clear();
    Ok(valid_relation_count)
}

/// Extract file extension from a path.
fn extension_from_path(p: &Path) -> String {
    p.extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Normalize a path to forward-slash format.
fn normalize_path(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

/// Simple timestamp string (RFC 3339-ish) without pulling in chrono.
fn chrono_like_now() -> String {
    use std::time::SystemTime;
    let dur = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}Z", dur.as_secs())
}

/// Result of an incremental indexing run.
#[derive(Debug)]
pub struct IncrementalIndexResult {
    /// Compatible report with standard indexing statistics.
    pub report: IndexReport,
    /// Symbol IDs that were added or modified (need embedding).
    pub changed_symbol_ids: Vec<SymbolId>,
    /// Symbol IDs that were removed (vectors already cleaned up).
    pub removed_symbol_ids: Vec<SymbolId>,
    /// Number of files that were unchanged (hash match).
    pub files_unchanged: usize,
    /// Number of files that were deleted since last index.
    pub files_deleted: usize,
    /// Whether we fell back to a full index (first run or empty DB).
    pub fell_back_to_full: bool,
}

/// Run an incremental indexing pipeline on a project directory.
///
/// On first run (empty database), falls back to full indexing.
/// On subsequent runs, only re-parses and updates changed files.
///
/// Returns an `IncrementalIndexResult` with changed/removed symbol IDs
/// so the caller can selectively re-embed only what changed.
#[tracing::instrument(skip(config))]
pub fn index_incremental(
    project_path: &Path,
    config: &IndexConfig,
) -> Result<IncrementalIndexResult, IndexerError> {
    let start = Instant::now();

    // 1. Scan for files on disk
    let scan_result = scan_files(project_path);
    let total_files_scanned = scan_result.files.len();
    tracing::info!(files = total_files_scanned, "incremental index started");

    // 2. Open storage WITHOUT clearing
    let mut storage = StorageManager::open_with_dimension(project_path, config.embedding_dim)?;

    // 3. Get files already in the database
    let db_files = storage.graph().list_files().map_err(|e| IndexerError::PipelineFailed {
        stage: "list_files".to_string(),
        reason: e.to_string(),
    })?;

    // 4. First-run detection: if DB has no files, fall back to full index
    if db_files.is_empty() {
        tracing::info!("empty database detected, falling back to full index");

        // Drop storage before full index opens its own
        drop(storage);

        // Run full index
        let report = index(project_path, config)?;

        // Re-open storage to collect all symbol IDs
        let fresh_storage =
            StorageManager::open_with_dimension(project_path, config.embedding_dim)?;
        let all_symbol_ids = collect_all_symbol_ids(&fresh_storage)?;

        let duration = start.elapsed();
        return Ok(IncrementalIndexResult {
            report: IndexReport {
                total_files_scanned: report.total_files_scanned,
                files_indexed: report.files_indexed,
                files_skipped: report.files_skipped,
                files_failed: report.files_failed,
                failed_details: report.failed_details,
                total_symbols: report.total_symbols,
                total_relations: report.total_relations,
                duration,
            },
            changed_symbol_ids: all_symbol_ids,
            removed_symbol_ids: vec![],
            files_unchanged: 0,
            files_deleted: 0,
            fell_back_to_full: true,
        });
    }

    // 5. Build lookup maps for file classification
    let db_file_map: HashMap<String, &FileMetadata> =
        db_files.iter().map(|f| (f.path.clone(), f)).collect();
    let db_paths: HashSet<&str> = db_file_map.keys().map(|s| s.as_str()).collect();

    // Normalize scanned paths
    let disk_files: Vec<String> = scan_result.files.iter().map(|p| normalize_path(p)).collect();
    let disk_paths: HashSet<&str> = disk_files.iter().map(|s| s.as_str()).collect();

    // 6. Classify files
    let deleted_paths: Vec<&str> = db_paths.difference(&disk_paths).copied().collect();
    let mut added_or_modified: Vec<&str> = Vec::new();
    let mut files_unchanged = 0usize;

    for path in &disk_files {
        if let Some(stored) = db_file_map.get(path.as_str()) {
            // File exists in DB — check hash
            let abs_path = project_path.join(path);
            let content = match fs::read(&abs_path) {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // File disappeared between scan and read — treat as deleted
                    continue;
                }
                Err(e) => return Err(IndexerError::Io(e)),
            };
            let content_hash = xxhash_rust::xxh3::xxh3_64(&content);
            if content_hash == stored.content_hash {
                files_unchanged += 1;
            } else {
                added_or_modified.push(path.as_str());
            }
        } else {
            // New file not in DB
            added_or_modified.push(path.as_str());
        }
    }

    tracing::info!(
        deleted = deleted_paths.len(),
        changed = added_or_modified.len(),
        unchanged = files_unchanged,
        "file classification done"
    );

    // 7. Process deletions
    let mut all_changed_ids: Vec<SymbolId> = Vec::new();
    let mut all_removed_ids: Vec<SymbolId> = Vec::new();
    let mut files_deleted_count = 0usize;
    let mut files_failed = 0usize;
    let mut failed_details: Vec<(String, String)> = Vec::new();

    for path in &deleted_paths {
        match incremental::delete_file(path, &mut storage) {
            Ok(report) => {
                all_removed_ids.extend(report.removed_ids);
                files_deleted_count += 1;
            }
            Err(e) => {
                files_failed += 1;
                failed_details.push((path.to_string(), e.to_string()));
                tracing::warn!(path = %path, error = %e, "failed to delete file");
            }
        }
    }

    // 8. Process added/modified files
    let mut files_indexed = 0usize;

    for path in &added_or_modified {
        match incremental::update_file(project_path, path, &config.repo_id, &mut storage) {
            Ok(report) => {
                all_changed_ids.extend(report.changed_ids);
                all_removed_ids.extend(report.removed_ids);
                files_indexed += 1;
            }
            Err(e) => {
                files_failed += 1;
                failed_details.push((path.to_string(), e.to_string()));
                tracing::warn!(path = %path, error = %e, "failed to update file");
            }
        }
    }

    // 9. Clean up vectors for removed symbols
    for id in &all_removed_ids {
        if let Err(e) = storage.vector_mut().remove_vector(*id) {
            tracing::debug!(id = %id, error = %e, "vector remove failed (may not exist)");
        }
    }

    // 10. Refresh reachability only if it's missing or drifted from the
    // relations graph — incremental runs are frequent enough that a full
    // recompute every time would dominate the run.
    match crate::reachability::refresh_reachability(
        storage.graph_mut(),
        crate::reachability::DEFAULT_MAX_DEPTH,
    ) {
        Ok(Some(count)) => tracing::info!(entries = count, "reachability closure refreshed"),
        Ok(None) => tracing::debug!("reachability already up to date"),
        Err(e) => tracing::warn!(error = %e, "reachability refresh failed"),
    }

    // 11. Flush all backends
    storage.flush().map_err(|e| IndexerError::PipelineFailed {
        stage: "flush".to_string(),
        reason: e.to_string(),
    })?;

    // Gather final statistics from storage
    let total_symbols = storage.graph().count_symbols().unwrap_or(0);

    let duration = start.elapsed();

    tracing::info!(
        files_indexed = files_indexed,
        files_unchanged = files_unchanged,
        files_deleted = files_deleted_count,
        changed_symbols = all_changed_ids.len(),
        removed_symbols = all_removed_ids.len(),
        duration_secs = %format!("{:.2}", duration.as_secs_f64()),
        "incremental index completed"
    );

    Ok(IncrementalIndexResult {
        report: IndexReport {
            total_files_scanned,
            files_indexed,
            files_skipped: HashMap::new(),
            files_failed,
            failed_details,
            total_symbols,
            total_relations: 0, // Not tracked in incremental mode
            duration,
        },
        changed_symbol_ids: all_changed_ids,
        removed_symbol_ids: all_removed_ids,
        files_unchanged,
        files_deleted: files_deleted_count,
        fell_back_to_full: false,
    })
}

/// Collect all symbol IDs from storage (used after full index fallback).
fn collect_all_symbol_ids(storage: &StorageManager) -> Result<Vec<SymbolId>, IndexerError> {
    let mut ids = Vec::new();
    let mut offset = 0;
    let batch_size = 1000;
    loop {
        let syms = storage
            .graph()
            .list_symbols(batch_size, offset)
            .map_err(|e| IndexerError::PipelineFailed {
                stage: "collect_symbol_ids".to_string(),
                reason: e.to_string(),
            })?;
        if syms.is_empty() {
            break;
        }
        ids.extend(syms.iter().map(|s| s.id));
        offset += syms.len();
    }
    Ok(ids)
}
