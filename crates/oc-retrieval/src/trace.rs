use std::collections::{HashMap, HashSet};
use std::time::Instant;

use oc_core::{CodeSymbol, Language, QualifiedName, RelationKind, SymbolId, SymbolKind};
use oc_indexer::naming::generate_variants;
use oc_storage::graph::TraversalDirection;
use oc_storage::manager::StorageManager;

use crate::error::RetrievalError;

/// Default hop limit when a caller doesn't specify one.
pub const DEFAULT_MAX_DEPTH: u32 = 5;
/// Hard ceiling on `max_depth`, regardless of what the caller requests.
pub const MAX_MAX_DEPTH: u32 = 10;
/// Minimum cosine similarity for a vector hit to count as a semantic match.
const SEMANTIC_SIMILARITY_THRESHOLD: f32 = 0.7;
/// Augment with variant/semantic matches only when structural hits are this sparse.
const AUGMENT_THRESHOLD: usize = 5;
/// Confidence assigned to a naming-variant match (no embedding backing it).
const VARIANT_CONFIDENCE: f32 = 0.85;

/// Direction to walk the call graph from the starting symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    Upstream,
    Downstream,
    Both,
}

impl TraceDirection {
    fn wants_downstream(self) -> bool {
        matches!(self, Self::Downstream | Self::Both)
    }

    fn wants_upstream(self) -> bool {
        matches!(self, Self::Upstream | Self::Both)
    }
}

/// How a node was connected to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Found via a real extracted relation edge, or an unresolved-identifier fallback.
    Exact,
    /// Found because its name matches a naming variant of the parent.
    Variant,
    /// Found via vector similarity above `SEMANTIC_SIMILARITY_THRESHOLD`.
    Semantic,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Variant => "variant",
            Self::Semantic => "semantic",
        }
    }
}

/// Tunables for a single `trace_call_path` call.
#[derive(Debug, Clone)]
pub struct TraceOptions {
    pub direction: TraceDirection,
    pub max_depth: u32,
    /// Narrow the starting symbol lookup to matches in this file, if any match.
    pub context_file: Option<String>,
    pub enable_semantic: bool,
    /// Precomputed embedding for the query; semantic discovery is skipped without one.
    pub query_vector: Option<Vec<f32>>,
    pub max_fanout: u32,
}

impl TraceOptions {
    pub fn new(direction: TraceDirection) -> Self {
        Self {
            direction,
            max_depth: DEFAULT_MAX_DEPTH,
            context_file: None,
            enable_semantic: true,
            query_vector: None,
            max_fanout: 50,
        }
    }

    fn effective_max_depth(&self) -> u32 {
        self.max_depth.clamp(1, MAX_MAX_DEPTH)
    }
}

/// One node of a trace tree.
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub symbol_id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line: u32,
    pub language: Language,
    /// Edge kind connecting this node to its parent; `None` for the root.
    pub relationship_kind: Option<RelationKind>,
    pub match_type: MatchType,
    pub confidence: f32,
    pub depth: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub children: Vec<TraceNode>,
}

/// Full result of a `trace_call_path` call.
#[derive(Debug, Clone)]
pub struct TracePath {
    pub query_symbol: String,
    pub direction: TraceDirection,
    pub max_depth: u32,
    pub root: Option<TraceNode>,
    pub total_nodes: usize,
    pub max_depth_reached: u32,
    pub truncated: bool,
    pub languages_found: HashSet<Language>,
    pub match_types: HashMap<String, usize>,
    pub relationship_kinds: HashMap<String, usize>,
    pub nodes_visited: usize,
    pub cycles_detected: usize,
    pub execution_time_ms: u64,
    /// Total symbols matching the starting name, before ambiguity was resolved.
    pub total_matches: usize,
    pub error: Option<String>,
}

#[derive(Default)]
struct TraceStats {
    total_nodes: usize,
    nodes_visited: usize,
    cycles_detected: usize,
    max_depth_reached: u32,
    truncated: bool,
    languages_found: HashSet<Language>,
    match_types: HashMap<String, usize>,
    relationship_kinds: HashMap<String, usize>,
}

/// A single expansion candidate discovered from a node during tree-building.
struct RelatedSymbol {
    symbol: CodeSymbol,
    relationship_kind: RelationKind,
    match_type: MatchType,
    confidence: f32,
}

/// Builds cross-language call-relationship trees rooted at a named symbol.
pub struct TraceEngine<'a> {
    storage: &'a StorageManager,
}

impl<'a> TraceEngine<'a> {
    pub fn new(storage: &'a StorageManager) -> Self {
        Self { storage }
    }

    /// Resolve `symbol_name` and build its call tree per `options`.
    #[tracing::instrument(skip(self, options), fields(symbol_name, max_depth))]
    pub fn trace_call_path(
        &self,
        symbol_name: &str,
        options: &TraceOptions,
    ) -> Result<TracePath, RetrievalError> {
        let start_time = Instant::now();
        let max_depth = options.effective_max_depth();
        tracing::Span::current().record("symbol_name", symbol_name);
        tracing::Span::current().record("max_depth", max_depth);

        let mut candidates = self.storage.graph().get_symbols_by_name(symbol_name)?;
        let total_matches = candidates.len();
        if let Some(ref file) = options.context_file {
            let narrowed: Vec<CodeSymbol> = candidates
                .iter()
                .filter(|s| s.file_path.to_string_lossy() == *file)
                .cloned()
                .collect();
            if !narrowed.is_empty() {
                candidates = narrowed;
            }
        }

        let start_symbol = match candidates.into_iter().next() {
            Some(s) => s,
            None => {
                return Ok(TracePath {
                    query_symbol: symbol_name.to_string(),
                    direction: options.direction,
                    max_depth,
                    root: None,
                    total_nodes: 0,
                    max_depth_reached: 0,
                    truncated: false,
                    languages_found: HashSet::new(),
                    match_types: HashMap::new(),
                    relationship_kinds: HashMap::new(),
                    nodes_visited: 0,
                    cycles_detected: 0,
                    execution_time_ms: start_time.elapsed().as_millis() as u64,
                    total_matches: 0,
                    error: Some(format!("no symbol named '{symbol_name}' found")),
                });
            }
        };

        let mut stats = TraceStats::default();
        let mut visited = HashSet::new();
        visited.insert(start_symbol.id);

        let root = self.build_trace_node(
            &start_symbol,
            None,
            MatchType::Exact,
            1.0,
            0,
            max_depth,
            options,
            &visited,
            &mut stats,
        );
        visited.insert(root.symbol_id);

        tracing::info!(
            total_nodes = stats.total_nodes,
            cycles_detected = stats.cycles_detected,
            "trace completed"
        );

        Ok(TracePath {
            query_symbol: symbol_name.to_string(),
            direction: options.direction,
            max_depth,
            root: Some(root),
            total_nodes: stats.total_nodes,
            max_depth_reached: stats.max_depth_reached,
            truncated: stats.truncated,
            languages_found: stats.languages_found,
            match_types: stats.match_types,
            relationship_kinds: stats.relationship_kinds,
            nodes_visited: stats.nodes_visited,
            cycles_detected: stats.cycles_detected,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
            total_matches,
            error: None,
        })
    }

    /// Recursively builds one node and its children, updating `stats` as it goes.
    ///
    /// `visited` holds every symbol on the path from the root to `current`
    /// (not the whole tree), so a diamond shape is walked down both arms
    /// instead of being collapsed after the first visit.
    #[allow(clippy::too_many_arguments)]
    fn build_trace_node(
        &self,
        current: &CodeSymbol,
        relationship_kind: Option<RelationKind>,
        match_type: MatchType,
        confidence: f32,
        depth: u32,
        max_depth: u32,
        options: &TraceOptions,
        visited: &HashSet<SymbolId>,
        stats: &mut TraceStats,
    ) -> TraceNode {
        stats.total_nodes += 1;
        stats.nodes_visited += 1;
        stats.max_depth_reached = stats.max_depth_reached.max(depth);
        stats.languages_found.insert(current.language);
        *stats
            .match_types
            .entry(match_type.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(rk) = relationship_kind {
            *stats
                .relationship_kinds
                .entry(rk.display_name().to_string())
                .or_insert(0) += 1;
        }

        let related = self.find_related_symbols(current, options, visited, stats);

        let mut children = Vec::new();
        if depth < max_depth {
            for candidate in related {
                let mut path_visited = visited.clone();
                path_visited.insert(candidate.symbol.id);
                children.push(self.build_trace_node(
                    &candidate.symbol,
                    Some(candidate.relationship_kind),
                    candidate.match_type,
                    candidate.confidence,
                    depth + 1,
                    max_depth,
                    options,
                    &path_visited,
                    stats,
                ));
            }
        } else if !related.is_empty() {
            stats.truncated = true;
        }

        Self::symbol_to_trace_node(current, relationship_kind, match_type, confidence, depth, children)
    }

    /// Find symbols one hop from `current`, per the algorithm in §4.9:
    /// structural relation edges first, an identifier-based upstream
    /// fallback when that's empty, then naming-variant and vector-assisted
    /// augmentation when structural hits are sparse.
    fn find_related_symbols(
        &self,
        current: &CodeSymbol,
        options: &TraceOptions,
        visited: &HashSet<SymbolId>,
        stats: &mut TraceStats,
    ) -> Vec<RelatedSymbol> {
        let mut results = Vec::new();
        let mut seen: HashSet<SymbolId> = HashSet::new();

        if options.direction.wants_downstream() {
            self.collect_structural_hits(
                current.id,
                TraversalDirection::Outgoing,
                options.max_fanout,
                visited,
                &mut seen,
                &mut results,
                stats,
            );
        }

        let mut found_upstream = false;
        if options.direction.wants_upstream() {
            let before = results.len();
            self.collect_structural_hits(
                current.id,
                TraversalDirection::Incoming,
                options.max_fanout,
                visited,
                &mut seen,
                &mut results,
                stats,
            );
            found_upstream = results.len() > before;

            if !found_upstream {
                self.collect_identifier_fallback(current, visited, &mut seen, &mut results);
            }
        }

        if results.len() < AUGMENT_THRESHOLD {
            self.collect_variant_matches(current, visited, &mut seen, &mut results);
        }

        if options.enable_semantic && results.len() < AUGMENT_THRESHOLD {
            self.collect_semantic_matches(current, options, visited, &mut seen, &mut results);
        }

        results
    }

    /// One-hop relation traversal in a single direction, classified `Exact`.
    #[allow(clippy::too_many_arguments)]
    fn collect_structural_hits(
        &self,
        current_id: SymbolId,
        direction: TraversalDirection,
        max_fanout: u32,
        visited: &HashSet<SymbolId>,
        seen: &mut HashSet<SymbolId>,
        results: &mut Vec<RelatedSymbol>,
        stats: &mut TraceStats,
    ) {
        let hits = match self
            .storage
            .graph()
            .traverse_khop_filtered(current_id, 1, max_fanout, direction, None)
        {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "structural traversal failed, skipping");
                return;
            }
        };

        for hit in hits {
            if hit.symbol_id == current_id {
                continue;
            }
            if visited.contains(&hit.symbol_id) {
                stats.cycles_detected += 1;
                continue;
            }
            if !seen.insert(hit.symbol_id) {
                continue;
            }
            if let Ok(Some(sym)) = self.storage.graph().get_symbol(hit.symbol_id) {
                results.push(RelatedSymbol {
                    symbol: sym,
                    relationship_kind: hit.relation_kind,
                    match_type: MatchType::Exact,
                    confidence: 1.0,
                });
            }
        }
    }

    /// Upstream fallback: an identifier named after `current` whose
    /// containing symbol wasn't resolved into a `Calls` relation.
    fn collect_identifier_fallback(
        &self,
        current: &CodeSymbol,
        visited: &HashSet<SymbolId>,
        seen: &mut HashSet<SymbolId>,
        results: &mut Vec<RelatedSymbol>,
    ) {
        let idents = match self
            .storage
            .graph()
            .get_identifiers_referencing(&current.name, current.id)
        {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(error = %e, "identifier fallback failed, skipping");
                return;
            }
        };

        for ident in idents {
            let Some(caller_id) = ident.containing_symbol_id else {
                continue;
            };
            if caller_id == current.id || visited.contains(&caller_id) || !seen.insert(caller_id) {
                continue;
            }
            if let Ok(Some(sym)) = self.storage.graph().get_symbol(caller_id) {
                results.push(RelatedSymbol {
                    symbol: sym,
                    relationship_kind: RelationKind::Calls,
                    match_type: MatchType::Exact,
                    confidence: 1.0,
                });
            }
        }
    }

    /// Augment with symbols whose name matches a naming variant of `current`.
    fn collect_variant_matches(
        &self,
        current: &CodeSymbol,
        visited: &HashSet<SymbolId>,
        seen: &mut HashSet<SymbolId>,
        results: &mut Vec<RelatedSymbol>,
    ) {
        let variants = generate_variants(&current.name);
        let names: Vec<String> = variants
            .values()
            .filter(|v| v.as_str() != current.name)
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if names.is_empty() {
            return;
        }

        let matches = match self.storage.graph().get_symbols_by_names(&names) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "variant match lookup failed, skipping");
                return;
            }
        };

        for sym in matches {
            if sym.id == current.id || visited.contains(&sym.id) || !seen.insert(sym.id) {
                continue;
            }
            results.push(RelatedSymbol {
                symbol: sym,
                relationship_kind: RelationKind::References,
                match_type: MatchType::Variant,
                confidence: VARIANT_CONFIDENCE,
            });
        }
    }

    /// Augment with cross-language symbols found via vector similarity.
    fn collect_semantic_matches(
        &self,
        current: &CodeSymbol,
        options: &TraceOptions,
        visited: &HashSet<SymbolId>,
        seen: &mut HashSet<SymbolId>,
        results: &mut Vec<RelatedSymbol>,
    ) {
        let Some(query_vec) = options.query_vector.as_ref() else {
            return;
        };

        let hits = match self.storage.vector().search_knn(query_vec, options.max_fanout as usize) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "semantic search failed, skipping");
                return;
            }
        };

        for hit in hits {
            if hit.symbol_id == current.id || visited.contains(&hit.symbol_id) || !seen.insert(hit.symbol_id) {
                continue;
            }
            let similarity = 1.0 - hit.distance;
            if similarity < SEMANTIC_SIMILARITY_THRESHOLD {
                continue;
            }
            let Ok(Some(sym)) = self.storage.graph().get_symbol(hit.symbol_id) else {
                continue;
            };
            if sym.language == current.language {
                continue;
            }
            results.push(RelatedSymbol {
                symbol: sym,
                relationship_kind: RelationKind::Calls,
                match_type: MatchType::Semantic,
                confidence: similarity,
            });
        }
    }

    fn symbol_to_trace_node(
        sym: &CodeSymbol,
        relationship_kind: Option<RelationKind>,
        match_type: MatchType,
        confidence: f32,
        depth: u32,
        children: Vec<TraceNode>,
    ) -> TraceNode {
        TraceNode {
            symbol_id: sym.id,
            name: sym.name.clone(),
            qualified_name: QualifiedName::to_native(&sym.qualified_name, sym.language),
            kind: sym.kind,
            file_path: sym.file_path.to_string_lossy().into_owned(),
            line: sym.line_range.start,
            language: sym.language,
            relationship_kind,
            match_type,
            confidence,
            depth,
            signature: sym.signature.clone(),
            doc_comment: sym.doc_comment.clone(),
            children,
        }
    }
}

/// Render a trace tree as ASCII art, `├─`/`└─`/`│  ` style.
pub fn format_as_tree(path: &TracePath) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} ({} nodes, depth {})\n",
        path.query_symbol, path.total_nodes, path.max_depth_reached
    ));

    if let Some(root) = &path.root {
        format_node(root, "", true, true, &mut out);
    } else {
        out.push_str("  (no matching symbol found)\n");
    }

    if path.truncated {
        out.push_str(&format!(
            "\n(truncated at max depth {})\n",
            path.max_depth
        ));
    }

    out
}

fn format_node(node: &TraceNode, prefix: &str, is_root: bool, is_last: bool, out: &mut String) {
    let connector = if is_root {
        ""
    } else if is_last {
        "└─ "
    } else {
        "├─ "
    };

    let kind_label = node
        .relationship_kind
        .map(|k| format!("[{}]→ ", k.display_name()))
        .unwrap_or_default();

    out.push_str(&format!(
        "{prefix}{connector}{kind_label}{} ({}:{})\n",
        node.qualified_name, node.file_path, node.line
    ));

    let child_prefix = if is_root {
        String::new()
    } else if is_last {
        format!("{prefix}   ")
    } else {
        format!("{prefix}│  ")
    };

    for (i, child) in node.children.iter().enumerate() {
        let last = i == node.children.len() - 1;
        format_node(child, &child_prefix, false, last, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::{CodeRelation, Identifier, IdentifierId, Language, SymbolKind};
    use oc_storage::manager::StorageManager;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_symbol(name: &str, file: &str, byte_start: usize, byte_end: usize) -> CodeSymbol {
        CodeSymbol {
            id: SymbolId::generate("test-repo", file, name, byte_start, byte_end),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            language: Language::Python,
            file_path: PathBuf::from(file),
            byte_range: byte_start..byte_end,
            line_range: (byte_start as u32)..(byte_end as u32),
            signature: Some(format!("def {name}()")),
            body_hash: 1,
            ..Default::default()
        }
    }

    fn make_symbol_lang(name: &str, file: &str, language: Language) -> CodeSymbol {
        CodeSymbol {
            language,
            ..make_symbol(name, file, 0, 10)
        }
    }

    fn make_relation(source: &CodeSymbol, target: &CodeSymbol, kind: RelationKind) -> CodeRelation {
        CodeRelation {
            source_id: source.id,
            target_id: target.id,
            kind,
            file_path: source.file_path.clone(),
            line: 1,
            confidence: kind.default_confidence(),
            workspace_id: String::new(),
        }
    }

    fn setup_storage(tmp: &TempDir) -> StorageManager {
        StorageManager::open(tmp.path()).unwrap()
    }

    #[test]
    fn downstream_chain_follows_calls_edges() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let a = make_symbol("main", "src/a.py", 0, 10);
        let b = make_symbol("helper", "src/a.py", 10, 20);
        let c = make_symbol("leaf", "src/a.py", 20, 30);

        mgr.graph_mut()
            .insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000)
            .unwrap();
        mgr.graph_mut()
            .insert_relations(
                &[
                    make_relation(&a, &b, RelationKind::Calls),
                    make_relation(&b, &c, RelationKind::Calls),
                ],
                1000,
            )
            .unwrap();

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Downstream);
        let path = engine.trace_call_path("main", &options).unwrap();

        assert!(path.error.is_none());
        let root = path.root.unwrap();
        assert_eq!(root.name, "main");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "helper");
        assert_eq!(root.children[0].children[0].name, "leaf");
        assert_eq!(path.total_nodes, 3);
    }

    #[test]
    fn upstream_walks_incoming_calls_edges() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let caller = make_symbol("caller", "src/a.py", 0, 10);
        let target = make_symbol("target", "src/a.py", 10, 20);

        mgr.graph_mut()
            .insert_symbols(&[caller.clone(), target.clone()], 1000)
            .unwrap();
        mgr.graph_mut()
            .insert_relations(&[make_relation(&caller, &target, RelationKind::Calls)], 1000)
            .unwrap();

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Upstream);
        let path = engine.trace_call_path("target", &options).unwrap();

        let root = path.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "caller");
        assert_eq!(root.children[0].match_type.as_str(), "exact");
    }

    #[test]
    fn upstream_fallback_via_unresolved_identifier() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let target = make_symbol("helper", "src/a.py", 0, 10);
        let caller = make_symbol("caller_fn", "src/a.py", 10, 20);
        mgr.graph_mut()
            .insert_symbols(&[target.clone(), caller.clone()], 1000)
            .unwrap();
        // No relation rows: the call wasn't resolved, only recorded as an identifier.
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
        mgr.graph_mut().insert_identifiers(&[ident], 1000).unwrap();

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Upstream);
        let path = engine.trace_call_path("helper", &options).unwrap();

        let root = path.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "caller_fn");
        assert_eq!(root.children[0].relationship_kind, Some(RelationKind::Calls));
    }

    #[test]
    fn cycle_is_detected_and_not_re_walked() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let a = make_symbol("a_fn", "src/a.py", 0, 10);
        let b = make_symbol("b_fn", "src/a.py", 10, 20);

        mgr.graph_mut()
            .insert_symbols(&[a.clone(), b.clone()], 1000)
            .unwrap();
        mgr.graph_mut()
            .insert_relations(
                &[
                    make_relation(&a, &b, RelationKind::Calls),
                    make_relation(&b, &a, RelationKind::Calls),
                ],
                1000,
            )
            .unwrap();

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Downstream);
        let path = engine.trace_call_path("a_fn", &options).unwrap();

        assert!(path.cycles_detected >= 1);
        // a -> b -> (a, already visited, cut)
        let root = path.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn max_depth_limits_recursion_and_reports_truncation() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let a = make_symbol("n0", "src/a.py", 0, 10);
        let b = make_symbol("n1", "src/a.py", 10, 20);
        let c = make_symbol("n2", "src/a.py", 20, 30);

        mgr.graph_mut()
            .insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000)
            .unwrap();
        mgr.graph_mut()
            .insert_relations(
                &[
                    make_relation(&a, &b, RelationKind::Calls),
                    make_relation(&b, &c, RelationKind::Calls),
                ],
                1000,
            )
            .unwrap();

        let engine = TraceEngine::new(&mgr);
        let mut options = TraceOptions::new(TraceDirection::Downstream);
        options.max_depth = 1;
        let path = engine.trace_call_path("n0", &options).unwrap();

        let root = path.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].children.is_empty());
        assert!(path.truncated);
        assert_eq!(path.max_depth_reached, 1);
    }

    #[test]
    fn diamond_pattern_walks_both_arms() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let top = make_symbol("top", "src/a.py", 0, 10);
        let left = make_symbol("left", "src/a.py", 10, 20);
        let right = make_symbol("right", "src/a.py", 20, 30);
        let bottom = make_symbol("bottom", "src/a.py", 30, 40);

        mgr.graph_mut()
            .insert_symbols(&[top.clone(), left.clone(), right.clone(), bottom.clone()], 1000)
            .unwrap();
        mgr.graph_mut()
            .insert_relations(
                &[
                    make_relation(&top, &left, RelationKind::Calls),
                    make_relation(&top, &right, RelationKind::Calls),
                    make_relation(&left, &bottom, RelationKind::Calls),
                    make_relation(&right, &bottom, RelationKind::Calls),
                ],
                1000,
            )
            .unwrap();

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Downstream);
        let path = engine.trace_call_path("top", &options).unwrap();

        let root = path.root.unwrap();
        assert_eq!(root.children.len(), 2);
        // bottom should appear once under each arm, not be cut as "already visited"
        for child in &root.children {
            assert_eq!(child.children.len(), 1);
            assert_eq!(child.children[0].name, "bottom");
        }
    }

    #[test]
    fn variant_match_found_by_name_similarity() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let a = make_symbol("user_service", "src/a.py", 0, 10);
        let b = make_symbol("UserService", "src/b.ts", 0, 10);
        mgr.graph_mut()
            .insert_symbols(&[a.clone(), b.clone()], 1000)
            .unwrap();
        // No relations at all — this is purely a naming-variant match.

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Both);
        let path = engine.trace_call_path("user_service", &options).unwrap();

        let root = path.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "UserService");
        assert_eq!(root.children[0].match_type.as_str(), "variant");
    }

    #[test]
    fn semantic_match_requires_query_vector_and_other_language() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();

        let py_fn = make_symbol_lang("compute_total", "src/a.py", Language::Python);
        let rs_fn = make_symbol_lang("compute_total", "src/a.rs", Language::Rust);
        mgr.graph_mut()
            .insert_symbols(&[py_fn.clone(), rs_fn.clone()], 1000)
            .unwrap();
        mgr.vector_mut().add_vector(rs_fn.id, &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let engine = TraceEngine::new(&mgr);
        let mut options = TraceOptions::new(TraceDirection::Both);
        options.query_vector = Some(vec![1.0, 0.0, 0.0, 0.0]);
        let path = engine.trace_call_path("compute_total", &options).unwrap();

        let root = path.root.unwrap();
        // rs_fn should surface as a semantic match since it's the same name but different language.
        let semantic_child = root.children.iter().find(|c| c.name == "compute_total" && c.file_path.ends_with(".rs"));
        assert!(semantic_child.is_some());
        assert_eq!(semantic_child.unwrap().match_type.as_str(), "semantic");
    }

    #[test]
    fn unknown_symbol_reports_error_not_panic() {
        let tmp = TempDir::new().unwrap();
        let mgr = setup_storage(&tmp);

        let engine = TraceEngine::new(&mgr);
        let options = TraceOptions::new(TraceDirection::Both);
        let path = engine.trace_call_path("does_not_exist", &options).unwrap();

        assert!(path.root.is_none());
        assert!(path.error.is_some());
        assert_eq!(path.total_nodes, 0);
    }

    #[test]
    fn context_file_narrows_ambiguous_starting_symbol() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let a = make_symbol("run", "src/a.py", 0, 10);
        let b = make_symbol("run", "src/b.py", 0, 10);
        mgr.graph_mut().insert_symbols(&[a.clone(), b.clone()], 1000).unwrap();

        let engine = TraceEngine::new(&mgr);
        let mut options = TraceOptions::new(TraceDirection::Both);
        options.context_file = Some("src/b.py".to_string());
        let path = engine.trace_call_path("run", &options).unwrap();

        assert_eq!(path.total_matches, 2);
        assert_eq!(path.root.unwrap().file_path, "src/b.py");
    }

    #[test]
    fn tree_format_includes_relationship_kind_and_truncation_notice() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = setup_storage(&tmp);

        let a = make_symbol("outer", "src/a.py", 0, 10);
        let b = make_symbol("inner", "src/a.py", 10, 20);
        let c = make_symbol("deepest", "src/a.py", 20, 30);
        mgr.graph_mut()
            .insert_symbols(&[a.clone(), b.clone(), c.clone()], 1000)
            .unwrap();
        mgr.graph_mut()
            .insert_relations(
                &[
                    make_relation(&a, &b, RelationKind::Calls),
                    make_relation(&b, &c, RelationKind::Calls),
                ],
                1000,
            )
            .unwrap();

        let engine = TraceEngine::new(&mgr);
        let mut options = TraceOptions::new(TraceDirection::Downstream);
        options.max_depth = 1;
        let path = engine.trace_call_path("outer", &options).unwrap();

        let rendered = format_as_tree(&path);
        assert!(rendered.contains("[Call]→"));
        assert!(rendered.contains("truncated"));
    }
}
