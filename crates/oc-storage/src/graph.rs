use std::path::Path;

use oc_core::{
    CodeRelation, CodeSymbol, Identifier, IdentifierId, Language, RelationKind, SymbolId,
    SymbolKind,
};
use rusqlite::{params, Connection, OptionalExtension};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::StorageError;

/// Current schema version. Increment when schema changes.
const SCHEMA_VERSION: u32 = 1;

/// Direction for graph traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    Both,
}

/// A symbol discovered during k-hop traversal.
#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub symbol_id: SymbolId,
    pub depth: u32,
    pub relation_kind: RelationKind,
}

/// File metadata stored in the `files` table.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: String,
    pub content_hash: u64,
    pub language: Language,
    pub size_bytes: u64,
    pub symbol_count: u32,
    pub last_indexed: String,
    pub last_modified: String,
}

/// Aggregate counts returned by `GraphStore::incremental_update_atomic`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicUpdateCounts {
    pub files_cleaned: usize,
    pub files_added: usize,
    pub symbols_added: usize,
    pub identifiers_added: usize,
    pub identifiers_skipped: usize,
    pub relations_added: usize,
    pub relations_skipped: usize,
}

/// Repository metadata stored in the `repositories` table.
#[derive(Debug, Clone)]
pub struct RepoMetadata {
    pub id: String,
    pub path: String,
    pub name: String,
    pub created_at: String,
}

/// SQLite-backed graph storage for symbols and relations.
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open or create a graph store at the given SQLite database path.
    ///
    /// If the schema version doesn't match, returns `Err` so the caller
    /// can purge `.openace/` and retry.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        configure_pragmas(&conn)?;

        let stored_version = get_user_version(&conn)?;
        if stored_version != 0 && stored_version != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: stored_version,
            });
        }

        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;

        Ok(Self { conn })
    }

    /// Open an in-memory graph store (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    // -- Symbol CRUD --

    /// Insert symbols in batched transactions.
    /// `batch_size`: 1000 for bulk, 100 for incremental.
    pub fn insert_symbols(
        &mut self,
        symbols: &[CodeSymbol],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        let now = now_rfc3339();
        for chunk in symbols.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO symbols \
                     (id, workspace_id, name, qualified_name, kind, language, file_path, \
                      line_start, line_end, byte_start, byte_end, \
                      signature, doc_comment, visibility, parent_id, code_context, \
                      semantic_group, confidence, content_type, reference_count, \
                      body_hash, body_text, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                              ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
                )?;
                for sym in chunk {
                    stmt.execute(params![
                        sym.id.as_bytes().as_slice(),
                        sym.workspace_id,
                        sym.name,
                        sym.qualified_name,
                        sym.kind.ordinal() as i64,
                        sym.language.ordinal() as i64,
                        sym.file_path.to_string_lossy().as_ref(),
                        sym.line_range.start as i64,
                        sym.line_range.end as i64,
                        sym.byte_range.start as i64,
                        sym.byte_range.end as i64,
                        sym.signature.as_deref(),
                        sym.doc_comment.as_deref(),
                        sym.visibility.as_deref(),
                        sym.parent_id.map(|p| p.as_bytes().to_vec()),
                        sym.code_context.as_deref(),
                        sym.semantic_group.as_deref(),
                        sym.confidence as f64,
                        sym.content_type.as_deref(),
                        sym.reference_count as i64,
                        sym.body_hash as i64,
                        sym.body_text.as_deref(),
                        &now,
                        &now,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Update existing symbols in batched transactions (no FK cascade).
    ///
    /// Unlike `insert_symbols` which uses `INSERT OR REPLACE` (triggering
    /// `ON DELETE CASCADE`), this uses `UPDATE` to preserve cross-file
    /// relations pointing to the modified symbols.
    pub fn update_symbols(
        &mut self,
        symbols: &[CodeSymbol],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        let now = now_rfc3339();
        for chunk in symbols.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE symbols SET \
                     workspace_id = ?2, name = ?3, qualified_name = ?4, kind = ?5, language = ?6, \
                     file_path = ?7, line_start = ?8, line_end = ?9, \
                     byte_start = ?10, byte_end = ?11, \
                     signature = ?12, doc_comment = ?13, visibility = ?14, parent_id = ?15, \
                     code_context = ?16, semantic_group = ?17, confidence = ?18, \
                     content_type = ?19, reference_count = ?20, body_hash = ?21, \
                     body_text = ?22, updated_at = ?23 \
                     WHERE id = ?1",
                )?;
                for sym in chunk {
                    stmt.execute(params![
                        sym.id.as_bytes().as_slice(),
                        sym.workspace_id,
                        sym.name,
                        sym.qualified_name,
                        sym.kind.ordinal() as i64,
                        sym.language.ordinal() as i64,
                        sym.file_path.to_string_lossy().as_ref(),
                        sym.line_range.start as i64,
                        sym.line_range.end as i64,
                        sym.byte_range.start as i64,
                        sym.byte_range.end as i64,
                        sym.signature.as_deref(),
                        sym.doc_comment.as_deref(),
                        sym.visibility.as_deref(),
                        sym.parent_id.map(|p| p.as_bytes().to_vec()),
                        sym.code_context.as_deref(),
                        sym.semantic_group.as_deref(),
                        sym.confidence as f64,
                        sym.content_type.as_deref(),
                        sym.reference_count as i64,
                        sym.body_hash as i64,
                        sym.body_text.as_deref(),
                        &now,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Query a symbol by its ID.
    pub fn get_symbol(&self, id: SymbolId) -> Result<Option<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.as_bytes().as_slice()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_symbol(row)?)),
            None => Ok(None),
        }
    }

    /// Query all symbols for a given file path.
    pub fn get_symbols_by_file(&self, file_path: &str) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE file_path = ?1",
        )?;
        let mut rows = stmt.query(params![file_path])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols by name (exact match).
    pub fn get_symbols_by_name(&self, name: &str) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE name = ?1",
        )?;
        let mut rows = stmt.query(params![name])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols whose name matches any of `names` (exact match, batch
    /// `IN (...)`). Used for naming-variant lookups where a symbol may
    /// appear under several spelling conventions.
    pub fn get_symbols_by_names(&self, names: &[String]) -> Result<Vec<CodeSymbol>, StorageError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (0..names.len()).map(|_| "?".to_string()).collect();
        let sql = format!(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE name IN ({})",
            placeholders.join(",")
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(names.iter()))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols by qualified name (exact match).
    pub fn get_symbols_by_qualified_name(
        &self,
        qualified_name: &str,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE qualified_name = ?1",
        )?;
        let mut rows = stmt.query(params![qualified_name])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols by case-insensitive name match, optionally restricted
    /// to a set of kinds. First fuzzy-lookup strategy: catches a query that
    /// differs from the real name only in casing.
    pub fn find_symbols_case_insensitive(
        &self,
        name: &str,
        kinds: Option<&[SymbolKind]>,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let kind_clause = kinds.map(|ks| {
            let placeholders: Vec<String> = (0..ks.len()).map(|_| "?".to_string()).collect();
            format!(" AND kind IN ({})", placeholders.join(","))
        });
        let kind_filter = kind_clause.as_deref().unwrap_or("");
        let sql = format!(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE name = ?1 COLLATE NOCASE{kind_filter}"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(name.to_string())];
        if let Some(ks) = kinds {
            for k in ks {
                bound.push(Box::new(k.ordinal() as i64));
            }
        }
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols whose name contains `fragment` (case-insensitive
    /// substring), optionally restricted to a set of kinds. Second
    /// fuzzy-lookup strategy, scored by the caller from name-length ratio.
    pub fn find_symbols_by_substring(
        &self,
        fragment: &str,
        kinds: Option<&[SymbolKind]>,
        limit: usize,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let kind_clause = kinds.map(|ks| {
            let placeholders: Vec<String> = (0..ks.len()).map(|_| "?".to_string()).collect();
            format!(" AND kind IN ({})", placeholders.join(","))
        });
        let kind_filter = kind_clause.as_deref().unwrap_or("");
        let sql = format!(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE name LIKE ?1 ESCAPE '\\'{kind_filter} LIMIT ?{}",
            if let Some(ks) = kinds { ks.len() + 2 } else { 2 }
        );
        let pattern = format!("%{}%", escape_like(fragment));
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(pattern)];
        if let Some(ks) = kinds {
            for k in ks {
                bound.push(Box::new(k.ordinal() as i64));
            }
        }
        bound.push(Box::new(limit as i64));
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols whose name length falls within `[min_len, max_len]`,
    /// optionally restricted to a set of kinds. Used to build a small
    /// candidate pool ahead of an O(n*m) Levenshtein-distance scan rather
    /// than scanning every symbol in the store.
    pub fn find_symbols_by_name_length_range(
        &self,
        min_len: usize,
        max_len: usize,
        kinds: Option<&[SymbolKind]>,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let kind_clause = kinds.map(|ks| {
            let placeholders: Vec<String> = (0..ks.len()).map(|_| "?".to_string()).collect();
            format!(" AND kind IN ({})", placeholders.join(","))
        });
        let kind_filter = kind_clause.as_deref().unwrap_or("");
        let sql = format!(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols WHERE LENGTH(name) BETWEEN ?1 AND ?2{kind_filter}"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(min_len as i64), Box::new(max_len as i64)];
        if let Some(ks) = kinds {
            for k in ks {
                bound.push(Box::new(k.ordinal() as i64));
            }
        }
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// List all symbols with pagination, ordered by ID for deterministic iteration.
    pub fn list_symbols(&self, limit: usize, offset: usize) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, visibility, parent_id, code_context, \
             semantic_group, confidence, content_type, reference_count, \
             body_hash, body_text \
             FROM symbols ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let mut rows = stmt.query(params![limit as i64, offset as i64])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Count total number of symbols in the store.
    pub fn count_symbols(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Count total number of indexed files in the store.
    pub fn count_files(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a symbol by ID. Relations are cascaded via ON DELETE CASCADE.
    pub fn delete_symbol(&mut self, id: SymbolId) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM symbols WHERE id = ?1",
            params![id.as_bytes().as_slice()],
        )?;
        Ok(affected > 0)
    }

    /// Delete all relations that reference a given file path (in the relation's file_path column).
    pub fn delete_relations_by_file(&mut self, file_path: &str) -> Result<usize, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM relations WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(affected)
    }

    /// Delete all symbols (and cascading relations) for a file path.
    pub fn delete_symbols_by_file(&mut self, file_path: &str) -> Result<usize, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM symbols WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(affected)
    }

    // -- Relation CRUD --

    /// Insert relations in batched transactions.
    pub fn insert_relations(
        &mut self,
        relations: &[CodeRelation],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        for chunk in relations.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO relations \
                     (id, source_id, target_id, kind, file_path, line, confidence, workspace_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for rel in chunk {
                    let rel_id = compute_relation_id(rel);
                    stmt.execute(params![
                        rel_id.as_slice(),
                        rel.source_id.as_bytes().as_slice(),
                        rel.target_id.as_bytes().as_slice(),
                        rel.kind.ordinal() as i64,
                        rel.file_path.to_string_lossy().as_ref(),
                        rel.line as i64,
                        rel.confidence as f64,
                        rel.workspace_id,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// K-hop graph traversal with cycle detection.
    ///
    /// Uses iterative BFS in Rust (not recursive CTE) for reliable cycle
    /// detection and per-node fanout limiting.
    pub fn traverse_khop(
        &self,
        start: SymbolId,
        max_depth: u32,
        max_fanout: u32,
        direction: TraversalDirection,
    ) -> Result<Vec<TraversalHit>, StorageError> {
        self.traverse_khop_filtered(start, max_depth, max_fanout, direction, None)
    }

    /// K-hop graph traversal restricted to a set of relation kinds, e.g. only
    /// `Calls` edges for a call chain, or only `Contains` for a containment
    /// hierarchy. `None` behaves like [`Self::traverse_khop`].
    pub fn traverse_khop_filtered(
        &self,
        start: SymbolId,
        max_depth: u32,
        max_fanout: u32,
        direction: TraversalDirection,
        relation_kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<TraversalHit>, StorageError> {
        let max_depth = max_depth.min(5);
        let mut visited = std::collections::HashSet::new();
        visited.insert(start.0);

        let mut frontier: Vec<SymbolId> = vec![start];
        let mut results = Vec::new();

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();

            for sym_id in &frontier {
                let neighbors =
                    self.get_neighbors(*sym_id, direction, max_fanout, relation_kinds)?;
                for (neighbor_id, rel_kind) in neighbors {
                    if visited.insert(neighbor_id.0) {
                        results.push(TraversalHit {
                            symbol_id: neighbor_id,
                            depth,
                            relation_kind: rel_kind,
                        });
                        next_frontier.push(neighbor_id);
                    }
                }
            }

            frontier = next_frontier;
        }

        Ok(results)
    }

    fn get_neighbors(
        &self,
        sym_id: SymbolId,
        direction: TraversalDirection,
        max_fanout: u32,
        relation_kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<(SymbolId, RelationKind)>, StorageError> {
        let id_bytes = sym_id.as_bytes();
        let mut results = Vec::new();

        let kind_clause = relation_kinds.map(|kinds| {
            let placeholders: Vec<String> = (0..kinds.len()).map(|_| "?".to_string()).collect();
            format!(" AND kind IN ({})", placeholders.join(","))
        });
        let kind_filter = kind_clause.as_deref().unwrap_or("");

        if direction == TraversalDirection::Outgoing || direction == TraversalDirection::Both {
            let sql =
                format!("SELECT target_id, kind FROM relations WHERE source_id = ?1{kind_filter} LIMIT ?2");
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let mut rows = if let Some(kinds) = relation_kinds {
                let mut bound: Vec<Box<dyn rusqlite::ToSql>> =
                    vec![Box::new(id_bytes.to_vec())];
                for k in kinds {
                    bound.push(Box::new(k.ordinal() as i64));
                }
                bound.push(Box::new(max_fanout as i64));
                stmt.query(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?
            } else {
                stmt.query(params![id_bytes.as_slice(), max_fanout as i64])?
            };
            while let Some(row) = rows.next()? {
                if let Some((sid, rk)) = parse_neighbor_row(row)? {
                    results.push((sid, rk));
                }
            }
        }

        if direction == TraversalDirection::Incoming || direction == TraversalDirection::Both {
            let remaining = max_fanout.saturating_sub(results.len() as u32);
            if remaining > 0 {
                let sql = format!(
                    "SELECT source_id, kind FROM relations WHERE target_id = ?1{kind_filter} LIMIT ?2"
                );
                let mut stmt = self.conn.prepare_cached(&sql)?;
                let mut rows = if let Some(kinds) = relation_kinds {
                    let mut bound: Vec<Box<dyn rusqlite::ToSql>> =
                        vec![Box::new(id_bytes.to_vec())];
                    for k in kinds {
                        bound.push(Box::new(k.ordinal() as i64));
                    }
                    bound.push(Box::new(remaining as i64));
                    stmt.query(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?
                } else {
                    stmt.query(params![id_bytes.as_slice(), remaining as i64])?
                };
                while let Some(row) = rows.next()? {
                    if let Some((sid, rk)) = parse_neighbor_row(row)? {
                        results.push((sid, rk));
                    }
                }
            }
        }

        Ok(results)
    }

    // -- Identifier CRUD --

    /// Insert identifiers in batched transactions. Rows whose required FK
    /// (`containing_symbol_id`, when set) is invalid are dropped by the
    /// caller before this is reached.
    pub fn insert_identifiers(
        &mut self,
        identifiers: &[Identifier],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        for chunk in identifiers.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO identifiers \
                     (id, workspace_id, name, kind, language, file_path, \
                      byte_start, byte_end, line, containing_symbol_id, \
                      target_symbol_id, confidence, code_context) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for ident in chunk {
                    stmt.execute(params![
                        ident.id.as_bytes().as_slice(),
                        ident.workspace_id,
                        ident.name,
                        ident.kind.ordinal() as i64,
                        ident.language.ordinal() as i64,
                        ident.file_path.to_string_lossy().as_ref(),
                        ident.byte_start as i64,
                        ident.byte_end as i64,
                        ident.line as i64,
                        ident.containing_symbol_id.map(|s| s.as_bytes().to_vec()),
                        ident.target_symbol_id.map(|s| s.as_bytes().to_vec()),
                        ident.confidence as f64,
                        ident.code_context.as_deref(),
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Query all identifiers for a given file path.
    pub fn get_identifiers_by_file(&self, file_path: &str) -> Result<Vec<Identifier>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, kind, language, file_path, \
             byte_start, byte_end, line, containing_symbol_id, \
             target_symbol_id, confidence, code_context \
             FROM identifiers WHERE file_path = ?1",
        )?;
        let mut rows = stmt.query(params![file_path])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_identifier(row)?);
        }
        Ok(results)
    }

    /// Identifiers that reference `target` either by resolved
    /// `target_symbol_id` or by raw `name`, excluding any scoped to
    /// `target` itself. Used to recover call-site callers the extractor
    /// couldn't resolve into a `relations` row at index time.
    pub fn get_identifiers_referencing(
        &self,
        name: &str,
        target: SymbolId,
    ) -> Result<Vec<Identifier>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, kind, language, file_path, \
             byte_start, byte_end, line, containing_symbol_id, \
             target_symbol_id, confidence, code_context \
             FROM identifiers \
             WHERE (name = ?1 OR target_symbol_id = ?2) \
               AND containing_symbol_id IS NOT NULL \
               AND containing_symbol_id != ?2",
        )?;
        let mut rows = stmt.query(params![name, target.as_bytes().as_slice()])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_identifier(row)?);
        }
        Ok(results)
    }

    /// Query identifiers whose `target_symbol_id` is still unresolved.
    pub fn get_unresolved_identifiers(&self) -> Result<Vec<Identifier>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, workspace_id, name, kind, language, file_path, \
             byte_start, byte_end, line, containing_symbol_id, \
             target_symbol_id, confidence, code_context \
             FROM identifiers WHERE target_symbol_id IS NULL",
        )?;
        let mut rows = stmt.query([])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_identifier(row)?);
        }
        Ok(results)
    }

    /// Resolve a previously-unresolved identifier to its target symbol.
    pub fn update_identifier_target(
        &mut self,
        id: IdentifierId,
        target: SymbolId,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE identifiers SET target_symbol_id = ?2 WHERE id = ?1",
            params![id.as_bytes().as_slice(), target.as_bytes().as_slice()],
        )?;
        Ok(affected > 0)
    }

    /// Delete all identifiers scoped to a file path.
    pub fn delete_identifiers_by_file(&mut self, file_path: &str) -> Result<usize, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM identifiers WHERE file_path = ?1", params![file_path])?;
        Ok(affected)
    }

    // -- Reference counts --

    /// Reset every symbol's `reference_count` to its inbound relationship
    /// count. Intended to run once after a batch of heavy writes, not per
    /// symbol.
    pub fn update_reference_counts(&mut self) -> Result<usize, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("UPDATE symbols SET reference_count = 0", [])?;
        let affected = tx.execute(
            "UPDATE symbols SET reference_count = ( \
                SELECT COUNT(*) FROM relations WHERE relations.target_id = symbols.id \
             )",
            [],
        )?;
        tx.commit()?;
        Ok(affected)
    }

    // -- Reachability (materialized transitive closure) --

    /// Bulk-insert reachability rows, replacing any existing `(source, target)` pair.
    pub fn add_reachability_batch(
        &mut self,
        rows: &[(SymbolId, SymbolId, u32)],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        for chunk in rows.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO reachability (source_id, target_id, min_distance) \
                     VALUES (?1, ?2, ?3)",
                )?;
                for (source, target, dist) in chunk {
                    stmt.execute(params![
                        source.as_bytes().as_slice(),
                        target.as_bytes().as_slice(),
                        *dist as i64,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Wipe the entire reachability table (full rebuild).
    pub fn clear_reachability(&mut self) -> Result<usize, StorageError> {
        let affected = self.conn.execute("DELETE FROM reachability", [])?;
        Ok(affected)
    }

    /// All targets reachable from `source`, with their shortest distance.
    pub fn get_reachability_from_source(
        &self,
        source: SymbolId,
        max_distance: Option<u32>,
    ) -> Result<Vec<(SymbolId, u32)>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT target_id, min_distance FROM reachability \
             WHERE source_id = ?1 AND (?2 IS NULL OR min_distance <= ?2) \
             ORDER BY min_distance",
        )?;
        let mut rows = stmt.query(params![
            source.as_bytes().as_slice(),
            max_distance.map(|d| d as i64)
        ])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(parse_reachability_row(row)?);
        }
        Ok(results)
    }

    /// All sources that can reach `target`, with their shortest distance.
    pub fn get_reachability_for_target(
        &self,
        target: SymbolId,
        max_distance: Option<u32>,
    ) -> Result<Vec<(SymbolId, u32)>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT source_id, min_distance FROM reachability \
             WHERE target_id = ?1 AND (?2 IS NULL OR min_distance <= ?2) \
             ORDER BY min_distance",
        )?;
        let mut rows = stmt.query(params![
            target.as_bytes().as_slice(),
            max_distance.map(|d| d as i64)
        ])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(parse_reachability_row(row)?);
        }
        Ok(results)
    }

    /// O(1) point lookup: can `source` reach `target` via any path already
    /// materialized in the reachability table?
    pub fn can_reach(&self, source: SymbolId, target: SymbolId) -> Result<bool, StorageError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM reachability WHERE source_id = ?1 AND target_id = ?2 LIMIT 1",
                params![source.as_bytes().as_slice(), target.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Shortest known hop distance from `source` to `target`, if reachable.
    pub fn get_distance(
        &self,
        source: SymbolId,
        target: SymbolId,
    ) -> Result<Option<u32>, StorageError> {
        let dist: Option<i64> = self
            .conn
            .query_row(
                "SELECT min_distance FROM reachability WHERE source_id = ?1 AND target_id = ?2",
                params![source.as_bytes().as_slice(), target.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dist.map(|d| d as u32))
    }

    /// Number of rows currently in the reachability table.
    pub fn count_reachability(&self) -> Result<usize, StorageError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM reachability", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of edges currently in the relations table.
    pub fn count_relations(&self) -> Result<usize, StorageError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Full relation rows pointing *at* `target`, optionally restricted to a
    /// set of kinds (e.g. only `Calls` for "who calls this"). Ordered by
    /// file path then line for stable, readable output.
    pub fn get_relations_to(
        &self,
        target: SymbolId,
        kinds: Option<&[RelationKind]>,
        limit: usize,
    ) -> Result<Vec<CodeRelation>, StorageError> {
        self.get_relations_by_column("target_id", target, kinds, limit)
    }

    /// Full relation rows originating *from* `source`, optionally restricted
    /// to a set of kinds.
    pub fn get_relations_from(
        &self,
        source: SymbolId,
        kinds: Option<&[RelationKind]>,
        limit: usize,
    ) -> Result<Vec<CodeRelation>, StorageError> {
        self.get_relations_by_column("source_id", source, kinds, limit)
    }

    fn get_relations_by_column(
        &self,
        filter_column: &str,
        anchor: SymbolId,
        kinds: Option<&[RelationKind]>,
        limit: usize,
    ) -> Result<Vec<CodeRelation>, StorageError> {
        let kind_clause = kinds.map(|ks| {
            let placeholders: Vec<String> = (0..ks.len()).map(|_| "?".to_string()).collect();
            format!(" AND kind IN ({})", placeholders.join(","))
        });
        let kind_filter = kind_clause.as_deref().unwrap_or("");
        let sql = format!(
            "SELECT source_id, target_id, kind, file_path, line, confidence, workspace_id \
             FROM relations WHERE {filter_column} = ?1{kind_filter} \
             ORDER BY file_path, line LIMIT ?{}",
            if let Some(ks) = kinds { ks.len() + 2 } else { 2 }
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let id_bytes = anchor.as_bytes();
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id_bytes.to_vec())];
        if let Some(ks) = kinds {
            for k in ks {
                bound.push(Box::new(k.ordinal() as i64));
            }
        }
        bound.push(Box::new(limit as i64));
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_relation(row)?);
        }
        Ok(results)
    }

    /// Every `(source_id, target_id)` edge in the relations table, for
    /// building an in-memory adjacency list ahead of a BFS closure pass.
    pub fn get_all_relation_edges(&self) -> Result<Vec<(SymbolId, SymbolId)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT source_id, target_id FROM relations")?;
        let mut rows = stmt.query([])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let source: Vec<u8> = row.get(0)?;
            let target: Vec<u8> = row.get(1)?;
            results.push((blob_to_symbol_id(source)?, blob_to_symbol_id(target)?));
        }
        Ok(results)
    }

    // -- Workspace lifecycle --

    /// Delete every symbol (and cascading relations/identifiers) scoped to
    /// `workspace_id`, then drop any reachability rows left dangling by the
    /// deletion.
    pub fn clear_workspace(&mut self, workspace_id: &str) -> Result<usize, StorageError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM symbols WHERE workspace_id = ?1",
            params![workspace_id],
        )?;
        tx.execute(
            "DELETE FROM reachability WHERE \
             source_id NOT IN (SELECT id FROM symbols) \
             OR target_id NOT IN (SELECT id FROM symbols)",
            [],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    // -- Atomic incremental update --

    /// Replace the data for a batch of files in a single transaction: delete
    /// stale files (cascading to their symbols/relations/identifiers), then
    /// insert the new files, symbols (parents before children), identifiers,
    /// and relations. Rows with a dangling required FK are dropped instead of
    /// failing the whole batch; rolls back entirely if any step errors.
    pub fn incremental_update_atomic(
        &mut self,
        files_to_clean: &[String],
        file_data: &[FileMetadata],
        symbols: &[CodeSymbol],
        identifiers: &[Identifier],
        relations: &[CodeRelation],
    ) -> Result<AtomicUpdateCounts, StorageError> {
        let now = now_rfc3339();
        let mut counts = AtomicUpdateCounts::default();

        let tx = self.conn.transaction()?;
        tx.execute_batch("PRAGMA defer_foreign_keys = ON")?;

        let batch_symbol_ids: std::collections::HashSet<SymbolId> =
            symbols.iter().map(|s| s.id).collect();

        let mut valid_symbol_ids: std::collections::HashSet<SymbolId> = {
            let mut stmt = tx.prepare("SELECT id FROM symbols")?;
            let mut rows = stmt.query([])?;
            let mut ids = std::collections::HashSet::new();
            while let Some(row) = rows.next()? {
                let blob: Vec<u8> = row.get(0)?;
                ids.insert(blob_to_symbol_id(blob)?);
            }
            ids
        };
        valid_symbol_ids.extend(&batch_symbol_ids);

        // Step 1: delete stale files. CASCADE removes their symbols,
        // relations, and identifiers; drop those symbol ids from the valid
        // set, then re-admit anything the batch is about to re-insert.
        if !files_to_clean.is_empty() {
            let placeholders = files_to_clean.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let select = format!("SELECT id FROM symbols WHERE file_path IN ({placeholders})");
            let mut stmt = tx.prepare(&select)?;
            let path_params: Vec<&dyn rusqlite::ToSql> =
                files_to_clean.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let mut rows = stmt.query(path_params.as_slice())?;
            let mut deleted_ids = std::collections::HashSet::new();
            while let Some(row) = rows.next()? {
                let blob: Vec<u8> = row.get(0)?;
                deleted_ids.insert(blob_to_symbol_id(blob)?);
            }
            for id in &deleted_ids {
                valid_symbol_ids.remove(id);
            }
            valid_symbol_ids.extend(&batch_symbol_ids);

            let mut del_stmt = tx.prepare_cached("DELETE FROM files WHERE path = ?1")?;
            for path in files_to_clean {
                del_stmt.execute(params![path])?;
            }
            counts.files_cleaned = files_to_clean.len();
        }

        // Step 2: insert the new file records.
        if !file_data.is_empty() {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO files \
                 (path, content_hash, language, size_bytes, symbol_count, last_indexed, last_modified) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for meta in file_data {
                stmt.execute(params![
                    meta.path,
                    meta.content_hash as i64,
                    meta.language.ordinal() as i64,
                    meta.size_bytes as i64,
                    meta.symbol_count as i64,
                    meta.last_indexed,
                    meta.last_modified,
                ])?;
            }
            counts.files_added = file_data.len();
        }

        // Step 3: insert symbols, parents before children so deferred FK
        // checking never has to carry a child past the commit that depends
        // on a parent the batch hasn't written yet.
        if !symbols.is_empty() {
            let sorted = topo_sort_symbols(symbols);
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO symbols \
                 (id, workspace_id, name, qualified_name, kind, language, file_path, \
                  line_start, line_end, byte_start, byte_end, \
                  signature, doc_comment, visibility, parent_id, code_context, \
                  semantic_group, confidence, content_type, reference_count, \
                  body_hash, body_text, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                          ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            )?;
            for sym in &sorted {
                let parent_id = sym.parent_id.filter(|p| valid_symbol_ids.contains(p));
                stmt.execute(params![
                    sym.id.as_bytes().as_slice(),
                    sym.workspace_id,
                    sym.name,
                    sym.qualified_name,
                    sym.kind.ordinal() as i64,
                    sym.language.ordinal() as i64,
                    sym.file_path.to_string_lossy().as_ref(),
                    sym.line_range.start as i64,
                    sym.line_range.end as i64,
                    sym.byte_range.start as i64,
                    sym.byte_range.end as i64,
                    sym.signature.as_deref(),
                    sym.doc_comment.as_deref(),
                    sym.visibility.as_deref(),
                    parent_id.map(|p| p.as_bytes().to_vec()),
                    sym.code_context.as_deref(),
                    sym.semantic_group.as_deref(),
                    sym.confidence as f64,
                    sym.content_type.as_deref(),
                    sym.reference_count as i64,
                    sym.body_hash as i64,
                    sym.body_text.as_deref(),
                    &now,
                    &now,
                ])?;
            }
            counts.symbols_added = sorted.len();
        }

        // Step 4: insert identifiers. `containing_symbol_id`, when set, must
        // resolve inside this transaction or the row is dropped entirely;
        // `target_symbol_id` is nulled out instead since it's informational.
        if !identifiers.is_empty() {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO identifiers \
                 (id, workspace_id, name, kind, language, file_path, \
                  byte_start, byte_end, line, containing_symbol_id, \
                  target_symbol_id, confidence, code_context) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for ident in identifiers {
                if let Some(containing) = ident.containing_symbol_id {
                    if !valid_symbol_ids.contains(&containing) {
                        counts.identifiers_skipped += 1;
                        continue;
                    }
                }
                let target = ident
                    .target_symbol_id
                    .filter(|t| valid_symbol_ids.contains(t));
                stmt.execute(params![
                    ident.id.as_bytes().as_slice(),
                    ident.workspace_id,
                    ident.name,
                    ident.kind.ordinal() as i64,
                    ident.language.ordinal() as i64,
                    ident.file_path.to_string_lossy().as_ref(),
                    ident.byte_start as i64,
                    ident.byte_end as i64,
                    ident.line as i64,
                    ident.containing_symbol_id.map(|s| s.as_bytes().to_vec()),
                    target.map(|s| s.as_bytes().to_vec()),
                    ident.confidence as f64,
                    ident.code_context.as_deref(),
                ])?;
                counts.identifiers_added += 1;
            }
        }

        // Step 5: insert relations. Both endpoints are NOT NULL FKs, so any
        // row with a dangling source or target is dropped.
        if !relations.is_empty() {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO relations \
                 (id, source_id, target_id, kind, file_path, line, confidence, workspace_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for rel in relations {
                if !valid_symbol_ids.contains(&rel.source_id)
                    || !valid_symbol_ids.contains(&rel.target_id)
                {
                    counts.relations_skipped += 1;
                    continue;
                }
                let rel_id = compute_relation_id(rel);
                stmt.execute(params![
                    rel_id.as_slice(),
                    rel.source_id.as_bytes().as_slice(),
                    rel.target_id.as_bytes().as_slice(),
                    rel.kind.ordinal() as i64,
                    rel.file_path.to_string_lossy().as_ref(),
                    rel.line as i64,
                    rel.confidence as f64,
                    rel.workspace_id,
                ])?;
                counts.relations_added += 1;
            }
        }

        tx.commit()?;
        Ok(counts)
    }

    // -- File metadata --

    pub fn upsert_file(&mut self, meta: &FileMetadata) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO files \
             (path, content_hash, language, size_bytes, symbol_count, last_indexed, last_modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meta.path,
                meta.content_hash as i64,
                meta.language.ordinal() as i64,
                meta.size_bytes as i64,
                meta.symbol_count as i64,
                meta.last_indexed,
                meta.last_modified,
            ],
        )?;
        Ok(())
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, content_hash, language, size_bytes, symbol_count, \
             last_indexed, last_modified FROM files WHERE path = ?1",
        )?;
        let mut rows = stmt.query(params![path])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_file_metadata(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_file_by_content_hash(
        &self,
        content_hash: u64,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, content_hash, language, size_bytes, symbol_count, \
             last_indexed, last_modified FROM files WHERE content_hash = ?1",
        )?;
        let mut rows = stmt.query(params![content_hash as i64])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_file_metadata(row)?);
        }
        Ok(results)
    }

    pub fn delete_file(&mut self, path: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(affected > 0)
    }

    // -- Repository metadata --

    pub fn upsert_repo(&mut self, meta: &RepoMetadata) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO repositories (id, path, name, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![meta.id, meta.path, meta.name, meta.created_at],
        )?;
        Ok(())
    }

    pub fn get_repo(&self, id: &str) -> Result<Option<RepoMetadata>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, path, name, created_at FROM repositories WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(RepoMetadata {
                id: row.get(0)?,
                path: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })),
            None => Ok(None),
        }
    }

    /// Expose the raw connection for advanced usage (e.g., testing).
    #[doc(hidden)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn configure_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\
         PRAGMA busy_timeout = 10000;\
         PRAGMA synchronous = NORMAL;\
         PRAGMA wal_autocheckpoint = 10000;\
         PRAGMA mmap_size = 536870912;\
         PRAGMA temp_store = MEMORY;\
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn get_user_version(conn: &Connection) -> Result<u32, StorageError> {
    let v: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symbols (
            id          BLOB PRIMARY KEY,
            workspace_id TEXT NOT NULL DEFAULT '',
            name        TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            kind        INTEGER NOT NULL,
            language    INTEGER NOT NULL,
            file_path   TEXT NOT NULL,
            line_start  INTEGER NOT NULL,
            line_end    INTEGER NOT NULL,
            byte_start  INTEGER NOT NULL,
            byte_end    INTEGER NOT NULL,
            signature   TEXT,
            doc_comment TEXT,
            visibility  TEXT,
            parent_id   BLOB,
            code_context TEXT,
            semantic_group TEXT,
            confidence  REAL NOT NULL DEFAULT 1.0,
            content_type TEXT,
            reference_count INTEGER NOT NULL DEFAULT 0,
            body_hash   INTEGER NOT NULL,
            body_text   TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_qualified ON symbols(qualified_name);
        CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);
        CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_id);
        CREATE INDEX IF NOT EXISTS idx_symbols_reference_count ON symbols(reference_count DESC);
        CREATE INDEX IF NOT EXISTS idx_symbols_workspace ON symbols(workspace_id);

        CREATE TABLE IF NOT EXISTS relations (
            id          BLOB PRIMARY KEY,
            source_id   BLOB NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            target_id   BLOB NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            kind        INTEGER NOT NULL,
            file_path   TEXT NOT NULL,
            line        INTEGER NOT NULL,
            confidence  REAL NOT NULL,
            workspace_id TEXT NOT NULL DEFAULT '',
            UNIQUE(source_id, target_id, kind, file_path, line)
        );

        CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id);
        CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);
        CREATE INDEX IF NOT EXISTS idx_relations_kind ON relations(kind);
        CREATE INDEX IF NOT EXISTS idx_relations_workspace ON relations(workspace_id);

        CREATE TABLE IF NOT EXISTS identifiers (
            id          BLOB PRIMARY KEY,
            workspace_id TEXT NOT NULL DEFAULT '',
            name        TEXT NOT NULL,
            kind        INTEGER NOT NULL,
            language    INTEGER NOT NULL,
            file_path   TEXT NOT NULL,
            byte_start  INTEGER NOT NULL,
            byte_end    INTEGER NOT NULL,
            line        INTEGER NOT NULL,
            containing_symbol_id BLOB REFERENCES symbols(id) ON DELETE CASCADE,
            target_symbol_id BLOB REFERENCES symbols(id) ON DELETE SET NULL,
            confidence  REAL NOT NULL,
            code_context TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_identifiers_name ON identifiers(name);
        CREATE INDEX IF NOT EXISTS idx_identifiers_file ON identifiers(file_path);
        CREATE INDEX IF NOT EXISTS idx_identifiers_containing ON identifiers(containing_symbol_id);
        CREATE INDEX IF NOT EXISTS idx_identifiers_workspace ON identifiers(workspace_id);

        CREATE TABLE IF NOT EXISTS files (
            path          TEXT PRIMARY KEY,
            content_hash  INTEGER NOT NULL,
            language      INTEGER NOT NULL,
            size_bytes    INTEGER NOT NULL,
            symbol_count  INTEGER NOT NULL,
            last_indexed  TEXT NOT NULL,
            last_modified TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_files_language ON files(language);

        CREATE TABLE IF NOT EXISTS repositories (
            id          TEXT PRIMARY KEY,
            path        TEXT NOT NULL,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reachability (
            source_id   BLOB NOT NULL,
            target_id   BLOB NOT NULL,
            min_distance INTEGER NOT NULL,
            PRIMARY KEY (source_id, target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reachability_source_dist ON reachability(source_id, min_distance);
        CREATE INDEX IF NOT EXISTS idx_reachability_target_dist ON reachability(target_id, min_distance);",
    )?;
    Ok(())
}

fn now_rfc3339() -> String {
    // We avoid pulling in chrono/time crates. Use a simple UTC timestamp.
    // Format: 2024-01-15T10:30:00Z
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    // Compute from epoch seconds
    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    // Days to Y-M-D (simplified leap year calculation from epoch 1970-01-01)
    let (year, month, day) = days_to_ymd(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

fn days_to_ymd(mut days: u64) -> (u64, u64, u64) {
    // Civil days from epoch algorithm
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

fn compute_relation_id(rel: &CodeRelation) -> [u8; 16] {
    let input = format!(
        "{}|{}|{}|{}|{}",
        rel.source_id,
        rel.target_id,
        rel.kind.ordinal(),
        rel.file_path.to_string_lossy(),
        rel.line
    );
    xxh3_128(input.as_bytes()).to_le_bytes()
}

fn blob_to_symbol_id(blob: Vec<u8>) -> Result<SymbolId, StorageError> {
    if blob.len() != 16 {
        return Err(StorageError::TransactionFailed {
            reason: format!("invalid symbol id length: {}", blob.len()),
        });
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&blob);
    Ok(SymbolId::from_bytes(bytes))
}

/// Topologically sort symbols so parents precede children (BFS from roots).
/// A "root" is any symbol whose `parent_id` is absent or points outside this
/// batch; symbols whose parent is unreachable (cycle, or parent missing from
/// `symbols`) are appended as extra roots so no symbol is silently dropped.
fn topo_sort_symbols(symbols: &[CodeSymbol]) -> Vec<&CodeSymbol> {
    use std::collections::HashMap;

    let by_id: HashMap<SymbolId, &CodeSymbol> = symbols.iter().map(|s| (s.id, s)).collect();
    let mut children_of: HashMap<SymbolId, Vec<&CodeSymbol>> = HashMap::new();
    let mut roots = Vec::new();

    for sym in symbols {
        match sym.parent_id {
            Some(parent) if by_id.contains_key(&parent) => {
                children_of.entry(parent).or_default().push(sym);
            }
            _ => roots.push(sym),
        }
    }

    let mut sorted = Vec::with_capacity(symbols.len());
    let mut visited = std::collections::HashSet::with_capacity(symbols.len());
    let mut queue: std::collections::VecDeque<&CodeSymbol> = roots.into_iter().collect();
    while let Some(sym) = queue.pop_front() {
        if !visited.insert(sym.id) {
            continue;
        }
        sorted.push(sym);
        if let Some(children) = children_of.get(&sym.id) {
            queue.extend(children.iter().copied());
        }
    }

    // Anything left unvisited sits on a parent cycle; append in original order.
    if sorted.len() < symbols.len() {
        for sym in symbols {
            if visited.insert(sym.id) {
                sorted.push(sym);
            }
        }
    }

    sorted
}

fn parse_neighbor_row(
    row: &rusqlite::Row<'_>,
) -> Result<Option<(SymbolId, RelationKind)>, StorageError> {
    let blob: Vec<u8> = row.get(0)?;
    if blob.len() != 16 {
        return Ok(None);
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&blob);
    let kind_ord: i64 = row.get(1)?;
    match RelationKind::from_ordinal(kind_ord as u8) {
        Some(rk) => Ok(Some((SymbolId::from_bytes(bytes), rk))),
        None => Ok(None),
    }
}

/// Escape `%`, `_`, and `\` for use inside a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_relation(row: &rusqlite::Row<'_>) -> Result<CodeRelation, StorageError> {
    let source: Vec<u8> = row.get(0)?;
    let target: Vec<u8> = row.get(1)?;
    let kind_ord: i64 = row.get(2)?;
    let kind = RelationKind::from_ordinal(kind_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid relation kind ordinal: {}", kind_ord),
        }
    })?;
    let file_path: String = row.get(3)?;
    let line: i64 = row.get(4)?;
    let confidence: f64 = row.get(5)?;
    Ok(CodeRelation {
        source_id: blob_to_symbol_id(source)?,
        target_id: blob_to_symbol_id(target)?,
        kind,
        file_path: file_path.into(),
        line: line as u32,
        confidence: confidence as f32,
        workspace_id: row.get(6)?,
    })
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> Result<CodeSymbol, StorageError> {
    let id_blob: Vec<u8> = row.get(0)?;
    if id_blob.len() != 16 {
        return Err(StorageError::TransactionFailed {
            reason: format!("invalid symbol id length: {}", id_blob.len()),
        });
    }
    let mut id_bytes = [0u8; 16];
    id_bytes.copy_from_slice(&id_blob);

    let kind_ord: i64 = row.get(4)?;
    let lang_ord: i64 = row.get(5)?;
    let file_path_str: String = row.get(6)?;
    let line_start: i64 = row.get(7)?;
    let line_end: i64 = row.get(8)?;
    let byte_start: i64 = row.get(9)?;
    let byte_end: i64 = row.get(10)?;
    let parent_blob: Option<Vec<u8>> = row.get(14)?;
    let confidence: f64 = row.get(17)?;
    let reference_count: i64 = row.get(19)?;
    let body_hash: i64 = row.get(20)?;

    let kind = SymbolKind::from_ordinal(kind_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid symbol kind ordinal: {}", kind_ord),
        }
    })?;
    let language = Language::from_ordinal(lang_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid language ordinal: {}", lang_ord),
        }
    })?;

    let parent_id = match parent_blob {
        Some(blob) if blob.len() == 16 => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&blob);
            Some(SymbolId::from_bytes(bytes))
        }
        _ => None,
    };

    Ok(CodeSymbol {
        id: SymbolId::from_bytes(id_bytes),
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        kind,
        language,
        file_path: file_path_str.into(),
        byte_range: (byte_start as usize)..(byte_end as usize),
        line_range: (line_start as u32)..(line_end as u32),
        signature: row.get(11)?,
        doc_comment: row.get(12)?,
        visibility: row.get(13)?,
        parent_id,
        code_context: row.get(15)?,
        semantic_group: row.get(16)?,
        confidence: confidence as f32,
        content_type: row.get(18)?,
        reference_count: reference_count as u32,
        body_hash: body_hash as u64,
        body_text: row.get(21)?,
    })
}

fn row_to_identifier(row: &rusqlite::Row<'_>) -> Result<Identifier, StorageError> {
    let id_blob: Vec<u8> = row.get(0)?;
    let mut id_bytes = [0u8; 16];
    if id_blob.len() != 16 {
        return Err(StorageError::TransactionFailed {
            reason: format!("invalid identifier id length: {}", id_blob.len()),
        });
    }
    id_bytes.copy_from_slice(&id_blob);

    let kind_ord: i64 = row.get(3)?;
    let lang_ord: i64 = row.get(4)?;
    let file_path_str: String = row.get(5)?;
    let byte_start: i64 = row.get(6)?;
    let byte_end: i64 = row.get(7)?;
    let line: i64 = row.get(8)?;
    let containing_blob: Option<Vec<u8>> = row.get(9)?;
    let target_blob: Option<Vec<u8>> = row.get(10)?;
    let confidence: f64 = row.get(11)?;

    let kind = SymbolKind::from_ordinal(kind_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid symbol kind ordinal: {}", kind_ord),
        }
    })?;
    let language = Language::from_ordinal(lang_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid language ordinal: {}", lang_ord),
        }
    })?;

    let blob_to_symbol_id = |blob: Option<Vec<u8>>| -> Option<SymbolId> {
        blob.filter(|b| b.len() == 16).map(|b| {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&b);
            SymbolId::from_bytes(bytes)
        })
    };

    Ok(Identifier {
        id: IdentifierId::from_bytes(id_bytes),
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        kind,
        language,
        file_path: file_path_str.into(),
        byte_start: byte_start as usize,
        byte_end: byte_end as usize,
        line: line as u32,
        containing_symbol_id: blob_to_symbol_id(containing_blob),
        target_symbol_id: blob_to_symbol_id(target_blob),
        confidence: confidence as f32,
        code_context: row.get(12)?,
    })
}

fn parse_reachability_row(row: &rusqlite::Row<'_>) -> Result<(SymbolId, u32), StorageError> {
    let blob: Vec<u8> = row.get(0)?;
    if blob.len() != 16 {
        return Err(StorageError::TransactionFailed {
            reason: format!("invalid reachability symbol id length: {}", blob.len()),
        });
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&blob);
    let dist: i64 = row.get(1)?;
    Ok((SymbolId::from_bytes(bytes), dist as u32))
}

fn row_to_file_metadata(row: &rusqlite::Row<'_>) -> Result<FileMetadata, StorageError> {
    let content_hash: i64 = row.get(1)?;
    let lang_ord: i64 = row.get(2)?;
    let size: i64 = row.get(3)?;
    let sym_count: i64 = row.get(4)?;

    let language = Language::from_ordinal(lang_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid language ordinal: {}", lang_ord),
        }
    })?;

    Ok(FileMetadata {
        path: row.get(0)?,
        content_hash: content_hash as u64,
        language,
        size_bytes: size as u64,
        symbol_count: sym_count as u32,
        last_indexed: row.get(5)?,
        last_modified: row.get(6)?,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_symbol(name: &str, file: &str, byte_start: usize, byte_end: usize) -> CodeSymbol {
        CodeSymbol {
            id: SymbolId::generate("test-repo", file, name, byte_start, byte_end),
            name: name.split('.').last().unwrap_or(name).to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            language: Language::Python,
            file_path: PathBuf::from(file),
            byte_range: byte_start..byte_end,
            line_range: 0..10,
            signature: Some(format!("def {}()", name)),
            doc_comment: None,
            body_hash: 12345,
            ..Default::default()
        }
    }

    fn make_relation(
        source: &CodeSymbol,
        target: &CodeSymbol,
        kind: RelationKind,
    ) -> CodeRelation {
        CodeRelation {
            source_id: source.id,
            target_id: target.id,
            kind,
            file_path: source.file_path.clone(),
            line: 5,
            confidence: kind.default_confidence(),
            workspace_id: String::new(),
        }
    }

    #[test]
    fn symbol_round_trip() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let sym = make_symbol("module.my_func", "src/main.py", 0, 100);
        store.insert_symbols(&[sym.clone()], 1000).unwrap();

        let loaded = store.get_symbol(sym.id).unwrap().unwrap();
        assert_eq!(loaded.id, sym.id);
        assert_eq!(loaded.name, sym.name);
        assert_eq!(loaded.qualified_name, sym.qualified_name);
        assert_eq!(loaded.kind, sym.kind);
        assert_eq!(loaded.language, sym.language);
        assert_eq!(loaded.file_path, sym.file_path);
        assert_eq!(loaded.byte_range, sym.byte_range);
        assert_eq!(loaded.line_range, sym.line_range);
        assert_eq!(loaded.signature, sym.signature);
        assert_eq!(loaded.doc_comment, sym.doc_comment);
        assert_eq!(loaded.body_hash, sym.body_hash);
    }

    #[test]
    fn symbol_query_by_file() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let s1 = make_symbol("a.foo", "src/a.py", 0, 50);
        let s2 = make_symbol("a.bar", "src/a.py", 60, 120);
        let s3 = make_symbol("b.baz", "src/b.py", 0, 80);
        store.insert_symbols(&[s1, s2, s3], 1000).unwrap();

        let a_symbols = store.get_symbols_by_file("src/a.py").unwrap();
        assert_eq!(a_symbols.len(), 2);

        let b_symbols = store.get_symbols_by_file("src/b.py").unwrap();
        assert_eq!(b_symbols.len(), 1);
    }

    #[test]
    fn relation_referential_integrity() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let s1 = make_symbol("a.foo", "src/a.py", 0, 50);
        let s2 = make_symbol("a.bar", "src/a.py", 60, 120);
        store.insert_symbols(&[s1.clone(), s2.clone()], 1000).unwrap();

        let rel = make_relation(&s1, &s2, RelationKind::Calls);
        store.insert_relations(&[rel], 1000).unwrap();

        // Delete s1 → relation should be cascaded
        store.delete_symbol(s1.id).unwrap();

        // Verify no orphan relations
        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn khop_traversal_with_cycle() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = make_symbol("a", "src/a.py", 0, 10);
        let b = make_symbol("b", "src/a.py", 20, 30);
        let c = make_symbol("c", "src/a.py", 40, 50);
        store
            .insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000)
            .unwrap();

        // A→B→C→A (cycle)
        let rels = vec![
            make_relation(&a, &b, RelationKind::Calls),
            make_relation(&b, &c, RelationKind::Calls),
            make_relation(&c, &a, RelationKind::Calls),
        ];
        store.insert_relations(&rels, 1000).unwrap();

        let hits = store
            .traverse_khop(a.id, 3, 50, TraversalDirection::Outgoing)
            .unwrap();

        // Should find B and C but not revisit A
        let ids: Vec<u128> = hits.iter().map(|h| h.symbol_id.0).collect();
        assert!(ids.contains(&b.id.0));
        assert!(ids.contains(&c.id.0));
        assert!(!ids.contains(&a.id.0));
    }

    #[test]
    fn batch_transaction_splitting() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let symbols: Vec<CodeSymbol> = (0..250)
            .map(|i| make_symbol(&format!("sym_{}", i), "src/a.py", i * 100, (i + 1) * 100))
            .collect();

        // Batch size 100 → should split into 3 transactions (100, 100, 50)
        store.insert_symbols(&symbols, 100).unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 250);
    }

    #[test]
    fn schema_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");

        // Create initial store
        {
            let _store = GraphStore::open(&db_path).unwrap();
        }

        // Manually set version to something wrong
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.pragma_update(None, "user_version", 999u32).unwrap();
        }

        // Reopen should fail with SchemaMismatch
        let result = GraphStore::open(&db_path);
        assert!(matches!(result, Err(StorageError::SchemaMismatch { .. })));
    }

    #[test]
    fn file_metadata_crud() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let meta = FileMetadata {
            path: "src/main.py".to_string(),
            content_hash: 0xDEADBEEF,
            language: Language::Python,
            size_bytes: 1024,
            symbol_count: 5,
            last_indexed: "2025-01-01T00:00:00Z".to_string(),
            last_modified: "2025-01-01T00:00:00Z".to_string(),
        };
        store.upsert_file(&meta).unwrap();

        let loaded = store.get_file("src/main.py").unwrap().unwrap();
        assert_eq!(loaded.content_hash, 0xDEADBEEF);
        assert_eq!(loaded.symbol_count, 5);

        let by_hash = store.get_file_by_content_hash(0xDEADBEEF).unwrap();
        assert_eq!(by_hash.len(), 1);

        store.delete_file("src/main.py").unwrap();
        assert!(store.get_file("src/main.py").unwrap().is_none());
    }

    #[test]
    fn repo_metadata_crud() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let meta = RepoMetadata {
            id: "abc123".to_string(),
            path: "/home/user/project".to_string(),
            name: "project".to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };
        store.upsert_repo(&meta).unwrap();

        let loaded = store.get_repo("abc123").unwrap().unwrap();
        assert_eq!(loaded.path, "/home/user/project");
        assert_eq!(loaded.name, "project");
    }

    #[test]
    fn symbol_deletion_cascades_relations() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let s1 = make_symbol("x.foo", "src/x.py", 0, 50);
        let s2 = make_symbol("x.bar", "src/x.py", 60, 120);
        let s3 = make_symbol("x.baz", "src/x.py", 130, 200);
        store
            .insert_symbols(&[s1.clone(), s2.clone(), s3.clone()], 1000)
            .unwrap();

        let rels = vec![
            make_relation(&s1, &s2, RelationKind::Calls),
            make_relation(&s2, &s3, RelationKind::Calls),
            make_relation(&s1, &s3, RelationKind::Contains),
        ];
        store.insert_relations(&rels, 1000).unwrap();

        // Delete s1 → 2 relations involving s1 should be removed
        store.delete_symbol(s1.id).unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))
            .unwrap();
        // Only s2→s3 should remain
        assert_eq!(count, 1);
    }

    #[test]
    fn file_based_symbol_deletion() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let s1 = make_symbol("a.one", "src/a.py", 0, 50);
        let s2 = make_symbol("a.two", "src/a.py", 60, 120);
        let s3 = make_symbol("b.three", "src/b.py", 0, 80);
        store
            .insert_symbols(&[s1, s2, s3], 1000)
            .unwrap();

        let deleted = store.delete_symbols_by_file("src/a.py").unwrap();
        assert_eq!(deleted, 2);

        let remaining: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn khop_fanout_limit() {
        let mut store = GraphStore::open_in_memory().unwrap();

        // Create a hub with many spokes
        let hub = make_symbol("hub", "src/hub.py", 0, 10);
        let mut all_symbols = vec![hub.clone()];
        let mut all_rels = Vec::new();

        for i in 0..100 {
            let spoke = make_symbol(
                &format!("spoke_{}", i),
                "src/hub.py",
                (i + 1) * 100,
                (i + 2) * 100,
            );
            all_rels.push(make_relation(&hub, &spoke, RelationKind::Calls));
            all_symbols.push(spoke);
        }

        store.insert_symbols(&all_symbols, 1000).unwrap();
        store.insert_relations(&all_rels, 1000).unwrap();

        // Fanout limit = 10
        let hits = store
            .traverse_khop(hub.id, 1, 10, TraversalDirection::Outgoing)
            .unwrap();
        assert!(hits.len() <= 10);
    }

    #[test]
    fn khop_filtered_by_relation_kind() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let parent = make_symbol("Widget", "src/a.py", 0, 10);
        let method = make_symbol("render", "src/a.py", 10, 20);
        let callee = make_symbol("helper", "src/a.py", 20, 30);
        store
            .insert_symbols(&[parent.clone(), method.clone(), callee.clone()], 1000)
            .unwrap();
        store
            .insert_relations(
                &[
                    make_relation(&parent, &method, RelationKind::Contains),
                    make_relation(&method, &callee, RelationKind::Calls),
                ],
                1000,
            )
            .unwrap();

        let calls_only = store
            .traverse_khop_filtered(
                parent.id,
                2,
                50,
                TraversalDirection::Outgoing,
                Some(&[RelationKind::Calls]),
            )
            .unwrap();
        assert!(calls_only.is_empty());

        let contains_only = store
            .traverse_khop_filtered(
                parent.id,
                2,
                50,
                TraversalDirection::Outgoing,
                Some(&[RelationKind::Contains]),
            )
            .unwrap();
        assert_eq!(contains_only.len(), 1);
        assert_eq!(contains_only[0].symbol_id, method.id);
    }

    #[test]
    fn list_symbols_pagination() {
        let mut store = GraphStore::open_in_memory().unwrap();
        // Insert 10 symbols
        let symbols: Vec<CodeSymbol> = (0..10)
            .map(|i| make_symbol(&format!("sym_{}", i), "src/a.py", i * 100, (i + 1) * 100))
            .collect();
        store.insert_symbols(&symbols, 1000).unwrap();

        // Page 1: first 3
        let page1 = store.list_symbols(3, 0).unwrap();
        assert_eq!(page1.len(), 3);

        // Page 2: next 3
        let page2 = store.list_symbols(3, 3).unwrap();
        assert_eq!(page2.len(), 3);

        // No overlap between pages
        let page1_ids: Vec<_> = page1.iter().map(|s| s.id).collect();
        let page2_ids: Vec<_> = page2.iter().map(|s| s.id).collect();
        for id in &page1_ids {
            assert!(!page2_ids.contains(id));
        }

        // All 10
        let all = store.list_symbols(100, 0).unwrap();
        assert_eq!(all.len(), 10);

        // Beyond end
        let empty = store.list_symbols(10, 100).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn count_symbols_accuracy() {
        let mut store = GraphStore::open_in_memory().unwrap();
        assert_eq!(store.count_symbols().unwrap(), 0);

        let symbols: Vec<CodeSymbol> = (0..5)
            .map(|i| make_symbol(&format!("sym_{}", i), "src/a.py", i * 100, (i + 1) * 100))
            .collect();
        store.insert_symbols(&symbols, 1000).unwrap();
        assert_eq!(store.count_symbols().unwrap(), 5);

        // Delete one
        store.delete_symbol(symbols[0].id).unwrap();
        assert_eq!(store.count_symbols().unwrap(), 4);
    }

    #[test]
    fn list_symbols_empty_table() {
        let store = GraphStore::open_in_memory().unwrap();
        let result = store.list_symbols(10, 0).unwrap();
        assert!(result.is_empty());
        assert_eq!(store.count_symbols().unwrap(), 0);
    }

    #[test]
    fn reference_counts_reflect_inbound_relations() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = make_symbol("a", "src/a.py", 0, 10);
        let b = make_symbol("b", "src/a.py", 20, 30);
        let c = make_symbol("c", "src/a.py", 40, 50);
        store
            .insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000)
            .unwrap();

        let rels = vec![
            make_relation(&a, &c, RelationKind::Calls),
            make_relation(&b, &c, RelationKind::Calls),
        ];
        store.insert_relations(&rels, 1000).unwrap();
        store.update_reference_counts().unwrap();

        assert_eq!(store.get_symbol(c.id).unwrap().unwrap().reference_count, 2);
        assert_eq!(store.get_symbol(a.id).unwrap().unwrap().reference_count, 0);
    }

    #[test]
    fn identifier_round_trip_and_resolution() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let sym = make_symbol("module.my_func", "src/main.py", 0, 100);
        store.insert_symbols(&[sym.clone()], 1000).unwrap();

        let ident = Identifier {
            id: IdentifierId::generate("", "src/main.py", "my_func", 200, 207),
            workspace_id: String::new(),
            name: "my_func".to_string(),
            kind: SymbolKind::Reference,
            language: Language::Python,
            file_path: PathBuf::from("src/main.py"),
            byte_start: 200,
            byte_end: 207,
            line: 12,
            containing_symbol_id: None,
            target_symbol_id: None,
            confidence: 0.7,
            code_context: None,
        };
        store.insert_identifiers(&[ident.clone()], 100).unwrap();

        let unresolved = store.get_unresolved_identifiers().unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].name, "my_func");

        store.update_identifier_target(ident.id, sym.id).unwrap();
        assert!(store.get_unresolved_identifiers().unwrap().is_empty());

        let by_file = store.get_identifiers_by_file("src/main.py").unwrap();
        assert_eq!(by_file[0].target_symbol_id, Some(sym.id));
    }

    #[test]
    fn reachability_round_trip() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = make_symbol("a", "src/a.py", 0, 10);
        let b = make_symbol("b", "src/a.py", 20, 30);
        let c = make_symbol("c", "src/a.py", 40, 50);
        store
            .insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000)
            .unwrap();

        store
            .add_reachability_batch(&[(a.id, b.id, 1), (a.id, c.id, 2)], 100)
            .unwrap();

        let from_a = store.get_reachability_from_source(a.id, None).unwrap();
        assert_eq!(from_a.len(), 2);

        let within_one = store.get_reachability_from_source(a.id, Some(1)).unwrap();
        assert_eq!(within_one.len(), 1);

        let to_c = store.get_reachability_for_target(c.id, None).unwrap();
        assert_eq!(to_c, vec![(a.id, 2)]);

        store.clear_reachability().unwrap();
        assert!(store.get_reachability_from_source(a.id, None).unwrap().is_empty());
    }

    #[test]
    fn clear_workspace_cascades_relations_and_identifiers() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let mut a = make_symbol("a", "src/a.py", 0, 10);
        a.workspace_id = "ws1".to_string();
        let mut b = make_symbol("b", "src/a.py", 20, 30);
        b.workspace_id = "ws1".to_string();
        store.insert_symbols(&[a.clone(), b.clone()], 1000).unwrap();
        store
            .insert_relations(&[make_relation(&a, &b, RelationKind::Calls)], 1000)
            .unwrap();

        let deleted = store.clear_workspace("ws1").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_symbols().unwrap(), 0);

        let relation_count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(relation_count, 0);
    }

    #[test]
    fn atomic_update_orders_parents_before_children_and_drops_dangling_rows() {
        let mut store = GraphStore::open_in_memory().unwrap();

        let mut class_sym = make_symbol("Widget", "src/widget.py", 0, 200);
        class_sym.kind = SymbolKind::Class;
        let mut method_sym = make_symbol("Widget.render", "src/widget.py", 20, 80);
        method_sym.parent_id = Some(class_sym.id);

        let dangling_parent = SymbolId::generate("test-repo", "nowhere.py", "ghost", 0, 1);
        let mut orphan_sym = make_symbol("Widget.orphan", "src/widget.py", 100, 150);
        orphan_sym.parent_id = Some(dangling_parent);

        let identifier = Identifier {
            id: IdentifierId::generate("", "src/widget.py", "render", 30, 36),
            workspace_id: String::new(),
            name: "render".to_string(),
            kind: SymbolKind::Reference,
            language: Language::Python,
            file_path: PathBuf::from("src/widget.py"),
            byte_start: 30,
            byte_end: 36,
            line: 3,
            containing_symbol_id: Some(method_sym.id),
            target_symbol_id: None,
            confidence: 0.9,
            code_context: None,
        };
        let dangling_identifier = Identifier {
            id: IdentifierId::generate("", "src/widget.py", "lost", 40, 44),
            containing_symbol_id: Some(dangling_parent),
            ..identifier.clone()
        };

        let good_relation = make_relation(&method_sym, &class_sym, RelationKind::Calls);
        let mut dangling_relation = make_relation(&orphan_sym, &class_sym, RelationKind::Calls);
        dangling_relation.target_id = dangling_parent;

        let counts = store
            .incremental_update_atomic(
                &[],
                &[],
                // Intentionally out of topological order: child before parent.
                &[method_sym.clone(), class_sym.clone(), orphan_sym.clone()],
                &[identifier.clone(), dangling_identifier],
                &[good_relation, dangling_relation],
            )
            .unwrap();

        assert_eq!(counts.symbols_added, 3);
        assert_eq!(counts.identifiers_added, 1);
        assert_eq!(counts.identifiers_skipped, 1);
        assert_eq!(counts.relations_added, 1);
        assert_eq!(counts.relations_skipped, 1);

        let fetched_method = store.get_symbol(method_sym.id).unwrap().unwrap();
        assert_eq!(fetched_method.parent_id, Some(class_sym.id));

        // parent_id pointing outside the batch and outside the DB is nulled out.
        let fetched_orphan = store.get_symbol(orphan_sym.id).unwrap().unwrap();
        assert_eq!(fetched_orphan.parent_id, None);

        let unresolved = store.get_unresolved_identifiers().unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, identifier.id);
    }

    #[test]
    fn atomic_update_cleans_files_before_reinserting() {
        let mut store = GraphStore::open_in_memory().unwrap();

        let old_sym = make_symbol("old_func", "src/a.py", 0, 50);
        store.insert_symbols(&[old_sym.clone()], 1000).unwrap();
        store
            .upsert_file(&FileMetadata {
                path: "src/a.py".to_string(),
                content_hash: 1,
                language: Language::Python,
                size_bytes: 50,
                symbol_count: 1,
                last_indexed: "2024-01-01T00:00:00Z".to_string(),
                last_modified: "2024-01-01T00:00:00Z".to_string(),
            })
            .unwrap();

        let new_sym = make_symbol("new_func", "src/a.py", 0, 60);
        let counts = store
            .incremental_update_atomic(
                &["src/a.py".to_string()],
                &[FileMetadata {
                    path: "src/a.py".to_string(),
                    content_hash: 2,
                    language: Language::Python,
                    size_bytes: 60,
                    symbol_count: 1,
                    last_indexed: "2024-01-02T00:00:00Z".to_string(),
                    last_modified: "2024-01-02T00:00:00Z".to_string(),
                }],
                &[new_sym.clone()],
                &[],
                &[],
            )
            .unwrap();

        assert_eq!(counts.files_cleaned, 1);
        assert_eq!(counts.files_added, 1);
        assert_eq!(counts.symbols_added, 1);

        assert!(store.get_symbol(old_sym.id).unwrap().is_none());
        assert!(store.get_symbol(new_sym.id).unwrap().is_some());

        let file = store.get_file("src/a.py").unwrap().unwrap();
        assert_eq!(file.content_hash, 2);
    }

    #[test]
    fn can_reach_and_get_distance_point_lookups() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = make_symbol("a", "src/a.py", 0, 10);
        let b = make_symbol("b", "src/a.py", 10, 20);
        let c = make_symbol("c", "src/a.py", 20, 30);
        store.insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000).unwrap();

        store
            .add_reachability_batch(&[(a.id, b.id, 1), (a.id, c.id, 2)], 1000)
            .unwrap();

        assert!(store.can_reach(a.id, b.id).unwrap());
        assert!(store.can_reach(a.id, c.id).unwrap());
        assert!(!store.can_reach(b.id, a.id).unwrap());

        assert_eq!(store.get_distance(a.id, b.id).unwrap(), Some(1));
        assert_eq!(store.get_distance(a.id, c.id).unwrap(), Some(2));
        assert_eq!(store.get_distance(b.id, a.id).unwrap(), None);

        assert_eq!(store.count_reachability().unwrap(), 2);
    }

    #[test]
    fn get_all_relation_edges_and_count_relations() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = make_symbol("a", "src/a.py", 0, 10);
        let b = make_symbol("b", "src/a.py", 10, 20);
        store.insert_symbols(&[a.clone(), b.clone()], 1000).unwrap();

        let relation = CodeRelation {
            source_id: a.id,
            target_id: b.id,
            kind: RelationKind::Calls,
            file_path: PathBuf::from("src/a.py"),
            line: 1,
            confidence: RelationKind::Calls.default_confidence(),
            workspace_id: String::new(),
        };
        store.insert_relations(&[relation], 1000).unwrap();

        assert_eq!(store.count_relations().unwrap(), 1);
        let edges = store.get_all_relation_edges().unwrap();
        assert_eq!(edges, vec![(a.id, b.id)]);
    }

    #[test]
    fn get_symbols_by_names_batch_lookup() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = make_symbol("user_service", "src/a.py", 0, 10);
        let b = make_symbol("UserService", "src/b.py", 0, 10);
        let c = make_symbol("unrelated", "src/c.py", 0, 10);
        store.insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000).unwrap();

        let found = store
            .get_symbols_by_names(&["user_service".to_string(), "UserService".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);

        let empty = store.get_symbols_by_names(&[]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn get_identifiers_referencing_finds_unresolved_callers() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let target = make_symbol("helper", "src/a.py", 0, 10);
        let caller = make_symbol("caller_fn", "src/a.py", 10, 20);
        store.insert_symbols(&[target.clone(), caller.clone()], 1000).unwrap();

        let ident = Identifier {
            id: IdentifierId::generate("test-repo", "src/a.py", "helper", 15, 21),
            workspace_id: String::new(),
            name: "helper".to_string(),
            kind: SymbolKind::Function,
            language: Language::Python,
            file_path: PathBuf::from("src/a.py"),
            byte_start: 15,
            byte_end: 21,
            line: 1,
            containing_symbol_id: Some(caller.id),
            target_symbol_id: None,
            confidence: 1.0,
            code_context: None,
        };
        store.insert_identifiers(&[ident], 1000).unwrap();

        let callers = store.get_identifiers_referencing("helper", target.id).unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].containing_symbol_id, Some(caller.id));
    }
}
