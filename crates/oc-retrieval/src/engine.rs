use std::collections::{HashMap, HashSet};

use oc_core::{CodeSymbol, Language, QualifiedName, RelationKind, SymbolId, SymbolKind};
use oc_storage::graph::TraversalDirection;
use oc_storage::manager::StorageManager;

use crate::error::RetrievalError;

/// RRF smoothing constant (k in `1/(rank + k)`).
const RRF_K: f64 = 60.0;

/// Score threshold under which a `text` search falls back to `semantic`
/// (spec §4.8 stage 7).
const SEMANTIC_FALLBACK_THRESHOLD: f64 = 0.3;

/// Characters/substrings whose presence in a query routes `auto` to
/// `pattern` instead of `hybrid` (spec §4.8 stage 1).
const AUTO_DETECT_CHARS: &[char] = &[':', '<', '>', '[', ']', '(', ')', '{', '}', '?', '.'];
const AUTO_DETECT_SUBSTRINGS: &[&str] = &["=>", "&&", "||"];

/// Search execution strategy (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// Full-text (BM25) only, with a semantic fallback when results are
    /// empty or weak.
    Text,
    /// Exact name/qualified-name match, the engine's analog of phrase
    /// search over punctuation-preserving patterns.
    Pattern,
    /// Vector k-NN only.
    Semantic,
    /// BM25 + vector + exact match fused via RRF (the engine's original
    /// fixed behavior, still the default fusion strategy).
    Hybrid,
    /// Resolve to `pattern` or `hybrid` based on query content.
    Auto,
}

/// Resolve `auto` to a concrete method per the query text (stage 1): special
/// characters route to `pattern`; everything else (including empty) routes
/// to `hybrid`.
fn detect_auto_method(text: &str) -> SearchMethod {
    if text.is_empty() {
        return SearchMethod::Hybrid;
    }
    let has_trigger_char = text.chars().any(|c| AUTO_DETECT_CHARS.contains(&c));
    let has_trigger_substring = AUTO_DETECT_SUBSTRINGS.iter().any(|s| text.contains(s));
    if has_trigger_char || has_trigger_substring {
        SearchMethod::Pattern
    } else {
        SearchMethod::Hybrid
    }
}

/// Search query with all configurable parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
    pub language_filter: Option<Language>,
    pub file_path_filter: Option<String>,
    pub enable_graph_expansion: bool,
    pub graph_depth: u32,
    pub bm25_pool_size: usize,
    pub exact_match_pool_size: usize,
    pub query_vector: Option<Vec<f32>>,
    pub vector_pool_size: usize,
    /// Weight multiplier for BM25 signal (default 1.0).
    pub bm25_weight: f64,
    /// Weight multiplier for vector k-NN signal (default 1.0).
    pub vector_weight: f64,
    /// Weight multiplier for exact match signal (default 1.0).
    pub exact_weight: f64,
    /// Weight multiplier for graph expansion signal (default 1.0).
    pub graph_weight: f64,
    /// BM25-specific query text; falls back to `text` if None.
    pub bm25_text: Option<String>,
    /// Identifiers for exact match signal; falls back to `text` if empty.
    pub exact_queries: Vec<String>,
    /// Enable relation-aware graph expansion sub-signals.
    /// When true, graph expansion is split into separate callers (Calls
    /// incoming), callees (Calls outgoing), and hierarchy (Contains)
    /// sub-signals, each scored independently via RRF.
    /// When false, uses the original undirected all-relation-type expansion.
    pub enable_relation_aware_graph: bool,
    /// Weight multiplier for callee graph signal (Calls outgoing).
    pub callee_weight: f64,
    /// Weight multiplier for caller graph signal (Calls incoming).
    pub caller_weight: f64,
    /// Weight multiplier for hierarchy graph signal (Contains).
    pub hierarchy_weight: f64,
    /// Search execution strategy. Defaults to `Auto`.
    pub method: SearchMethod,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 10,
            language_filter: None,
            file_path_filter: None,
            enable_graph_expansion: true,
            graph_depth: 2,
            bm25_pool_size: 100,
            exact_match_pool_size: 50,
            query_vector: None,
            vector_pool_size: 100,
            bm25_weight: 1.0,
            vector_weight: 1.0,
            exact_weight: 1.0,
            graph_weight: 1.0,
            bm25_text: None,
            exact_queries: Vec::new(),
            enable_relation_aware_graph: true,
            callee_weight: 1.5,
            caller_weight: 1.2,
            hierarchy_weight: 0.8,
            method: SearchMethod::Auto,
        }
    }

    fn effective_limit(&self) -> usize {
        self.limit.min(200)
    }

    fn effective_graph_depth(&self) -> u32 {
        self.graph_depth.min(5)
    }

    /// Return the BM25-specific text, falling back to the generic `text`.
    pub fn effective_bm25_text(&self) -> &str {
        self.bm25_text.as_deref().unwrap_or(&self.text)
    }
}

/// A single search result with fused score and provenance.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub symbol_id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line_range: (u32, u32),
    pub score: f64,
    pub match_signals: Vec<String>,
    pub related_symbols: Vec<SearchResult>,
    pub snippet: Option<String>,
}

/// A node in a call chain traversal result.
#[derive(Debug, Clone)]
pub struct CallChainNode {
    pub symbol_id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line_range: (u32, u32),
    pub depth: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub snippet: Option<String>,
}

/// Structured function context: callers, callees, and hierarchy around a symbol.
#[derive(Debug, Clone)]
pub struct FunctionContext {
    pub symbol: CallChainNode,
    pub callers: Vec<CallChainNode>,
    pub callees: Vec<CallChainNode>,
    pub hierarchy: Vec<CallChainNode>,
}

/// Accumulator for per-symbol RRF scoring.
#[derive(Debug)]
struct ScoredCandidate {
    symbol_id: SymbolId,
    score: f64,
    signals: Vec<String>,
}

/// Multi-signal retrieval engine combining BM25, exact match, and graph expansion.
pub struct RetrievalEngine<'a> {
    storage: &'a StorageManager,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(storage: &'a StorageManager) -> Self {
        Self { storage }
    }

    /// Execute a multi-signal search, fuse results via RRF, and return ranked hits.
    #[tracing::instrument(skip(self, query), fields(query, limit, result_count))]
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RetrievalError> {
        let query_text = if query.text.len() > 100 { &query.text[..100] } else { &query.text };
        let span = tracing::Span::current();
        span.record("query", query_text);
        span.record("limit", query.limit);
        tracing::debug!("search started");

        // Stage 1: method detection.
        let requested_method = query.method;
        let resolved_method = match requested_method {
            SearchMethod::Auto => detect_auto_method(&query.text),
            other => other,
        };
        tracing::debug!(?requested_method, ?resolved_method, "method resolved");

        let (mut results, direct_hit_ids) = self.run_method(query, resolved_method)?;

        // Stage 7: semantic fallback. Only triggers when the caller explicitly
        // asked for `text` — `auto` never resolves to `text` (stage 1 only
        // ever yields `pattern` or `hybrid`), so this can't double-fire.
        if requested_method == SearchMethod::Text {
            let max_score = results.iter().map(|r| r.score).fold(f64::MIN, f64::max);
            let should_fall_back = results.is_empty() || max_score < SEMANTIC_FALLBACK_THRESHOLD;
            if should_fall_back && query.query_vector.is_some() {
                tracing::info!("text search weak or empty, falling back to semantic");
                let (mut fallback_results, _) = self.run_method(query, SearchMethod::Semantic)?;
                for r in &mut fallback_results {
                    r.match_signals.push("semantic_fallback".to_string());
                }
                results = fallback_results;
            }
        }

        tracing::Span::current().record("result_count", results.len());
        tracing::info!(fused_count = results.len(), "search completed");

        Ok(results)
    }

    /// Run one resolved method end to end: collect signal(s), fuse, sort,
    /// truncate, hydrate, and attach related symbols. Returns the hydrated
    /// results plus the set of direct-hit IDs (pre-graph-expansion).
    fn run_method(
        &self,
        query: &SearchQuery,
        method: SearchMethod,
    ) -> Result<(Vec<SearchResult>, HashSet<SymbolId>), RetrievalError> {
        let mut candidates: HashMap<SymbolId, ScoredCandidate> = HashMap::new();

        match method {
            SearchMethod::Text => {
                self.collect_bm25(query, &mut candidates);
            }
            SearchMethod::Pattern => {
                self.collect_exact_match(query, &mut candidates);
            }
            SearchMethod::Semantic => {
                self.collect_vector(query, &mut candidates);
            }
            SearchMethod::Hybrid => {
                self.collect_bm25(query, &mut candidates);
                self.collect_vector(query, &mut candidates);
                self.collect_exact_match(query, &mut candidates);
            }
            SearchMethod::Auto => unreachable!("resolved before dispatch"),
        }

        // Collect seed IDs (direct signal hits) before graph expansion
        let direct_hit_ids: HashSet<SymbolId> = candidates.keys().copied().collect();

        // Graph expansion (applied to hits from direct signals), gated on
        // the caller's expand flag regardless of method.
        if query.enable_graph_expansion && !candidates.is_empty() {
            if query.enable_relation_aware_graph {
                self.expand_graph_relation_aware(query, &mut candidates);
            } else {
                self.expand_graph(query, &mut candidates);
            }
        }

        // Fuse, sort, truncate
        let limit = query.effective_limit();
        let mut scored: Vec<ScoredCandidate> = candidates.into_values().collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol_id.cmp(&b.symbol_id))
        });
        scored.truncate(limit);

        // Hydrate symbols and attach related_symbols for direct hits
        let mut results = Vec::with_capacity(scored.len());
        for candidate in &scored {
            if let Some(result) = self.hydrate_candidate(candidate)? {
                results.push(result);
            }
        }

        if query.enable_graph_expansion {
            self.attach_related_symbols(&direct_hit_ids, &mut results, query)?;
        }

        Ok((results, direct_hit_ids))
    }

    /// BM25 signal: query Tantivy, assign RRF scores by rank.
    fn collect_bm25(
        &self,
        query: &SearchQuery,
        candidates: &mut HashMap<SymbolId, ScoredCandidate>,
    ) {
        let bm25_text = query.effective_bm25_text();
        let hits = self.storage.fulltext().search_bm25(
            bm25_text,
            query.bm25_pool_size,
            query.file_path_filter.as_deref(),
            query.language_filter,
        );

        let hits = match hits {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(signal = "bm25", error = %e, "signal failed, skipping");
                return;
            }
        };

        tracing::debug!(signal = "bm25", count = hits.len(), "signal collected");

        for (rank, hit) in hits.iter().enumerate() {
            let rrf_score = 1.0 / (rank as f64 + 1.0 + RRF_K);
            let entry = candidates
                .entry(hit.symbol_id)
                .or_insert_with(|| ScoredCandidate {
                    symbol_id: hit.symbol_id,
                    score: 0.0,
                    signals: Vec::new(),
                });
            entry.score += query.bm25_weight * rrf_score;
            if !entry.signals.contains(&"bm25".to_string()) {
                entry.signals.push("bm25".to_string());
            }
        }
    }

    /// Vector k-NN signal: query the vector store, assign RRF scores by rank.
    fn collect_vector(
        &self,
        query: &SearchQuery,
        candidates: &mut HashMap<SymbolId, ScoredCandidate>,
    ) {
        let query_vec = match &query.query_vector {
            Some(v) => v,
            None => return,
        };

        let hits = match self.storage.vector().search_knn(query_vec, query.vector_pool_size) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(signal = "vector", error = %e, "signal failed, skipping");
                return;
            }
        };

        tracing::debug!(signal = "vector", count = hits.len(), "signal collected");

        for (rank, hit) in hits.iter().enumerate() {
            let rrf_score = 1.0 / (rank as f64 + 1.0 + RRF_K);
            let entry = candidates
                .entry(hit.symbol_id)
                .or_insert_with(|| ScoredCandidate {
                    symbol_id: hit.symbol_id,
                    score: 0.0,
                    signals: Vec::new(),
                });
            entry.score += query.vector_weight * rrf_score;
            if !entry.signals.contains(&"vector".to_string()) {
                entry.signals.push("vector".to_string());
            }
        }
    }

    /// Exact match signal: query SQLite name and qualified_name columns.
    /// If `exact_queries` is non-empty, iterate over each identifier;
    /// otherwise fall back to `text` for backward compatibility.
    fn collect_exact_match(
        &self,
        query: &SearchQuery,
        candidates: &mut HashMap<SymbolId, ScoredCandidate>,
    ) {
        let mut exact_hits: Vec<CodeSymbol> = Vec::new();
        let mut seen: HashSet<SymbolId> = HashSet::new();

        let terms: Vec<&str> = if query.exact_queries.is_empty() {
            vec![&query.text]
        } else {
            query.exact_queries.iter().map(|s| s.as_str()).collect()
        };

        for term in &terms {
            // Name match
            match self.storage.graph().get_symbols_by_name(term) {
                Ok(syms) => {
                    for sym in syms {
                        if seen.insert(sym.id) {
                            exact_hits.push(sym);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(signal = "exact", error = %e, "signal failed on name lookup, skipping");
                }
            }

            // Qualified name match
            match self.storage.graph().get_symbols_by_qualified_name(term) {
                Ok(syms) => {
                    for sym in syms {
                        if seen.insert(sym.id) {
                            exact_hits.push(sym);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(signal = "exact", error = %e, "signal failed on qualified name lookup, skipping");
                }
            }
        }

        // Apply filters
        exact_hits.retain(|sym| {
            if let Some(lang) = query.language_filter {
                if sym.language != lang {
                    return false;
                }
            }
            if let Some(ref prefix) = query.file_path_filter {
                if !sym.file_path.to_string_lossy().starts_with(prefix.as_str()) {
                    return false;
                }
            }
            true
        });

        exact_hits.truncate(query.exact_match_pool_size);

        tracing::debug!(signal = "exact", count = exact_hits.len(), "signal collected");

        for (rank, sym) in exact_hits.iter().enumerate() {
            let rrf_score = 1.0 / (rank as f64 + 1.0 + RRF_K);
            let entry = candidates
                .entry(sym.id)
                .or_insert_with(|| ScoredCandidate {
                    symbol_id: sym.id,
                    score: 0.0,
                    signals: Vec::new(),
                });
            entry.score += query.exact_weight * rrf_score;
            if !entry.signals.contains(&"exact".to_string()) {
                entry.signals.push("exact".to_string());
            }
        }
    }

    /// Graph expansion: for each current hit, traverse k-hop neighbors and add
    /// them as candidates with the "graph" signal.
    fn expand_graph(
        &self,
        query: &SearchQuery,
        candidates: &mut HashMap<SymbolId, ScoredCandidate>,
    ) {
        let depth = query.effective_graph_depth();
        let seed_ids: Vec<SymbolId> = candidates.keys().copied().collect();

        // Collect all graph-discovered symbol IDs with their best (smallest) depth.
        let mut graph_hits: HashMap<SymbolId, u32> = HashMap::new();

        for seed in &seed_ids {
            let traversal = self.storage.graph().traverse_khop(
                *seed,
                depth,
                50,
                TraversalDirection::Both,
            );

            let hits = match traversal {
                Ok(h) => h,
                Err(_) => continue, // graceful degradation per seed
            };

            for hit in hits {
                let entry = graph_hits.entry(hit.symbol_id).or_insert(hit.depth);
                if hit.depth < *entry {
                    *entry = hit.depth;
                }
            }
        }

        // Remove seeds themselves (they already have signal scores)
        for seed in &seed_ids {
            graph_hits.remove(seed);
        }

        // Apply filters by looking up symbols
        let mut filtered: Vec<(SymbolId, u32)> = Vec::new();
        for (sid, depth_val) in &graph_hits {
            if let Ok(Some(sym)) = self.storage.graph().get_symbol(*sid) {
                let pass_lang = query
                    .language_filter
                    .map_or(true, |l| sym.language == l);
                let pass_path = query.file_path_filter.as_ref().map_or(true, |prefix| {
                    sym.file_path.to_string_lossy().starts_with(prefix.as_str())
                });
                if pass_lang && pass_path {
                    filtered.push((*sid, *depth_val));
                }
            }
        }

        // Sort by depth (closer neighbors rank higher), then by SymbolId for determinism
        filtered.sort_by(|(sid_a, d_a), (sid_b, d_b)| d_a.cmp(d_b).then_with(|| sid_a.cmp(sid_b)));

        tracing::debug!(signal = "graph", count = filtered.len(), "signal collected");

        for (rank, (sid, _)) in filtered.iter().enumerate() {
            let rrf_score = 1.0 / (rank as f64 + 1.0 + RRF_K);
            let entry = candidates
                .entry(*sid)
                .or_insert_with(|| ScoredCandidate {
                    symbol_id: *sid,
                    score: 0.0,
                    signals: Vec::new(),
                });
            entry.score += query.graph_weight * rrf_score;
            if !entry.signals.contains(&"graph".to_string()) {
                entry.signals.push("graph".to_string());
            }
        }
    }

    /// Relation-aware graph expansion: splits traversal into three directed
    /// sub-signals, each filtered by relation type and scored independently.
    ///
    /// - **callees** (`Calls` outgoing): functions called by the seed symbol
    /// - **callers** (`Calls` incoming): functions that call the seed symbol
    /// - **hierarchy** (`Contains` both): parent/child containment relationships
    ///
    /// Each sub-signal is scored via its own RRF pass with a dedicated weight,
    /// producing finer-grained ranking than the original all-relation expansion.
    fn expand_graph_relation_aware(
        &self,
        query: &SearchQuery,
        candidates: &mut HashMap<SymbolId, ScoredCandidate>,
    ) {
        let depth = query.effective_graph_depth();
        let seed_ids: Vec<SymbolId> = candidates.keys().copied().collect();

        // Sub-signal definitions: (relation kinds, direction, signal name, weight)
        let sub_signals: &[(&[RelationKind], TraversalDirection, &str, f64)] = &[
            (
                &[RelationKind::Calls],
                TraversalDirection::Outgoing,
                "graph_callees",
                query.callee_weight,
            ),
            (
                &[RelationKind::Calls],
                TraversalDirection::Incoming,
                "graph_callers",
                query.caller_weight,
            ),
            (
                &[RelationKind::Contains],
                TraversalDirection::Both,
                "graph_hierarchy",
                query.hierarchy_weight,
            ),
        ];

        for &(relation_kinds, direction, signal_name, weight) in sub_signals {
            if weight <= 0.0 {
                continue;
            }

            let mut graph_hits: HashMap<SymbolId, u32> = HashMap::new();

            for seed in &seed_ids {
                let traversal = self.storage.graph().traverse_khop_filtered(
                    *seed,
                    depth,
                    50,
                    direction,
                    Some(relation_kinds),
                );

                let hits = match traversal {
                    Ok(h) => h,
                    Err(_) => continue,
                };

                for hit in hits {
                    let entry = graph_hits.entry(hit.symbol_id).or_insert(hit.depth);
                    if hit.depth < *entry {
                        *entry = hit.depth;
                    }
                }
            }

            // Remove seeds
            for seed in &seed_ids {
                graph_hits.remove(seed);
            }

            // Filter by language and file path
            let mut filtered: Vec<(SymbolId, u32)> = Vec::new();
            for (sid, depth_val) in &graph_hits {
                if let Ok(Some(sym)) = self.storage.graph().get_symbol(*sid) {
                    let pass_lang = query
                        .language_filter
                        .map_or(true, |l| sym.language == l);
                    let pass_path = query.file_path_filter.as_ref().map_or(true, |prefix| {
                        sym.file_path.to_string_lossy().starts_with(prefix.as_str())
                    });
                    if pass_lang && pass_path {
                        filtered.push((*sid, *depth_val));
                    }
                }
            }

            // Sort by depth then SymbolId
            filtered.sort_by(|(sid_a, d_a), (sid_b, d_b)| {
                d_a.cmp(d_b).then_with(|| sid_a.cmp(sid_b))
            });

            tracing::debug!(
                signal = signal_name,
                count = filtered.len(),
                "relation-aware sub-signal collected"
            );

            for (rank, (sid, _)) in filtered.iter().enumerate() {
                let rrf_score = 1.0 / (rank as f64 + 1.0 + RRF_K);
                let entry = candidates
                    .entry(*sid)
                    .or_insert_with(|| ScoredCandidate {
                        symbol_id: *sid,
                        score: 0.0,
                        signals: Vec::new(),
                    });
                entry.score += weight * rrf_score;
                if !entry.signals.contains(&signal_name.to_string()) {
                    entry.signals.push(signal_name.to_string());
                }
            }
        }
    }

    /// Hydrate a ScoredCandidate into a full SearchResult by fetching the symbol
    /// from the graph store.
    fn hydrate_candidate(
        &self,
        candidate: &ScoredCandidate,
    ) -> Result<Option<SearchResult>, RetrievalError> {
        let sym = self.storage.graph().get_symbol(candidate.symbol_id)?;
        let sym = match sym {
            Some(s) => s,
            None => return Ok(None),
        };

        // Truncate body_text to ~50 lines for snippet
        let snippet = sym.body_text.as_ref().map(|text| {
            let lines: Vec<&str> = text.lines().take(50).collect();
            lines.join("\n")
        });

        Ok(Some(SearchResult {
            symbol_id: sym.id,
            name: sym.name.clone(),
            qualified_name: QualifiedName::to_native(&sym.qualified_name, sym.language),
            kind: sym.kind,
            file_path: sym.file_path.to_string_lossy().into_owned(),
            line_range: (sym.line_range.start, sym.line_range.end),
            score: candidate.score,
            match_signals: candidate.signals.clone(),
            related_symbols: Vec::new(),
            snippet,
        }))
    }

    /// Convert a CodeSymbol to a SearchResult (for related_symbols).
    fn symbol_to_result(sym: &CodeSymbol, signal: &str) -> SearchResult {
        SearchResult {
            symbol_id: sym.id,
            name: sym.name.clone(),
            qualified_name: QualifiedName::to_native(&sym.qualified_name, sym.language),
            kind: sym.kind,
            file_path: sym.file_path.to_string_lossy().into_owned(),
            line_range: (sym.line_range.start, sym.line_range.end),
            score: 0.0,
            match_signals: vec![signal.to_string()],
            related_symbols: Vec::new(),
            snippet: None,
        }
    }

    /// Attach graph-expanded neighbors as `related_symbols` on each direct hit.
    /// When relation-aware mode is enabled, related symbols carry typed signal
    /// names (`graph_callers`, `graph_callees`, `graph_hierarchy`) instead of
    /// the generic `graph`.
    fn attach_related_symbols(
        &self,
        direct_hit_ids: &HashSet<SymbolId>,
        results: &mut [SearchResult],
        query: &SearchQuery,
    ) -> Result<(), RetrievalError> {
        let depth = query.effective_graph_depth();

        for result in results.iter_mut() {
            if !direct_hit_ids.contains(&result.symbol_id) {
                continue;
            }

            if query.enable_relation_aware_graph {
                let mut related = Vec::new();
                let mut seen = HashSet::new();

                let sub_signals: &[(&[RelationKind], TraversalDirection, &str)] = &[
                    (&[RelationKind::Calls], TraversalDirection::Outgoing, "graph_callees"),
                    (&[RelationKind::Calls], TraversalDirection::Incoming, "graph_callers"),
                    (&[RelationKind::Contains], TraversalDirection::Both, "graph_hierarchy"),
                ];

                for &(kinds, direction, signal_name) in sub_signals {
                    let traversal = self.storage.graph().traverse_khop_filtered(
                        result.symbol_id,
                        depth,
                        50,
                        direction,
                        Some(kinds),
                    );

                    let hits = match traversal {
                        Ok(h) => h,
                        Err(_) => continue,
                    };

                    for hit in hits {
                        if hit.symbol_id == result.symbol_id || !seen.insert(hit.symbol_id) {
                            continue;
                        }
                        if let Ok(Some(sym)) = self.storage.graph().get_symbol(hit.symbol_id) {
                            related.push(Self::symbol_to_result(&sym, signal_name));
                        }
                    }
                }

                result.related_symbols = related;
            } else {
                let traversal = self.storage.graph().traverse_khop(
                    result.symbol_id,
                    depth,
                    50,
                    TraversalDirection::Both,
                );

                let hits = match traversal {
                    Ok(h) => h,
                    Err(_) => continue,
                };

                let mut related = Vec::new();
                for hit in hits {
                    if hit.symbol_id == result.symbol_id {
                        continue;
                    }
                    if let Ok(Some(sym)) = self.storage.graph().get_symbol(hit.symbol_id) {
                        related.push(Self::symbol_to_result(&sym, "graph"));
                    }
                }
                result.related_symbols = related;
            }
        }

        Ok(())
    }

    // --- Function context (call chain traversal) ---

    /// Get structured function context for a symbol: callers, callees, and hierarchy.
    ///
    /// Performs three graph traversals from the given symbol:
    /// - callers: incoming `Calls` edges (who calls this symbol?)
    /// - callees: outgoing `Calls` edges (what does this symbol call?)
    /// - hierarchy: bidirectional `Contains` edges (parent class/module + siblings)
    pub fn get_function_context(
        &self,
        symbol_id: SymbolId,
        max_depth: u32,
        max_fanout: u32,
    ) -> Result<FunctionContext, RetrievalError> {
        let max_depth = max_depth.min(5);
        let max_fanout = max_fanout.min(200);

        // Look up the root symbol
        let root_sym = self.storage.graph().get_symbol(symbol_id)?
            .ok_or_else(|| RetrievalError::QueryFailed {
                reason: format!("symbol not found: {}", symbol_id),
            })?;

        let root_node = Self::symbol_to_chain_node(&root_sym, 0);

        // Callers: who calls this symbol? (incoming Calls edges)
        let callers = self.traverse_to_chain_nodes(
            symbol_id,
            max_depth,
            max_fanout,
            TraversalDirection::Incoming,
            &[RelationKind::Calls],
        )?;

        // Callees: what does this symbol call? (outgoing Calls edges)
        let callees = self.traverse_to_chain_nodes(
            symbol_id,
            max_depth,
            max_fanout,
            TraversalDirection::Outgoing,
            &[RelationKind::Calls],
        )?;

        // Hierarchy: parent/child containment (bidirectional Contains edges)
        let hierarchy_depth = max_depth.min(2);
        let hierarchy = self.traverse_to_chain_nodes(
            symbol_id,
            hierarchy_depth,
            max_fanout,
            TraversalDirection::Both,
            &[RelationKind::Contains],
        )?;

        Ok(FunctionContext {
            symbol: root_node,
            callers,
            callees,
            hierarchy,
        })
    }

    /// BFS traversal + hydration into `CallChainNode` list, sorted by depth then qualified_name.
    fn traverse_to_chain_nodes(
        &self,
        symbol_id: SymbolId,
        max_depth: u32,
        max_fanout: u32,
        direction: TraversalDirection,
        relation_kinds: &[RelationKind],
    ) -> Result<Vec<CallChainNode>, RetrievalError> {
        let hits = self.storage.graph().traverse_khop_filtered(
            symbol_id,
            max_depth,
            max_fanout,
            direction,
            Some(relation_kinds),
        )?;

        let mut nodes = Vec::with_capacity(hits.len());
        for hit in &hits {
            if let Ok(Some(sym)) = self.storage.graph().get_symbol(hit.symbol_id) {
                nodes.push(Self::symbol_to_chain_node(&sym, hit.depth));
            }
        }

        // Sort by depth ascending, then by qualified_name for determinism
        nodes.sort_by(|a, b| {
            a.depth.cmp(&b.depth)
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });

        Ok(nodes)
    }

    /// Convert a `CodeSymbol` into a `CallChainNode` at the given traversal depth.
    fn symbol_to_chain_node(sym: &CodeSymbol, depth: u32) -> CallChainNode {
        let snippet = sym.body_text.as_ref().map(|text| {
            let lines: Vec<&str> = text.lines().take(50).collect();
            lines.join("\n")
        });

        CallChainNode {
            symbol_id: sym.id,
            name: sym.name.clone(),
            qualified_name: QualifiedName::to_native(&sym.qualified_name, sym.language),
            kind: sym.kind,
            file_path: sym.file_path.to_string_lossy().into_owned(),
            line_range: (sym.line_range.start, sym.line_range.end),
            depth,
            signature: sym.signature.clone(),
            doc_comment: sym.doc_comment.clone(),
            snippet,
        }
    }
}

/// Compute the RRF score for a given 0-based rank.
#[inline]
pub fn rrf_score(rank: usize) -> f64 {
    1.0 / (rank as f64 + 1.0 + RRF_K)
}
