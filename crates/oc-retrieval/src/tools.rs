//! Query Tools: thin, single-purpose operations layered over the graph and
//! vector stores — batch symbol resolution, reference finding, live-file
//! symbol listing, type/similarity exploration, and rename preview/apply.
//!
//! Unlike [`crate::engine::RetrievalEngine`] and [`crate::trace::TraceEngine`],
//! these don't fuse multiple signals into one ranked list; each tool answers
//! one narrow question as directly as the stores allow.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use oc_core::{CodeSymbol, Language, RelationKind, SymbolId, SymbolKind};
use oc_indexer::naming::generate_variants;
use oc_storage::manager::StorageManager;
use serde::Serialize;

use crate::error::RetrievalError;

/// Threshold for `OutputFormat::Auto`: at or above this many rows, render
/// tabular instead of text. Mirrors the Search Pipeline's own auto-format
/// switch but tuned lower — tool results are typically shorter lists.
const AUTO_TABULAR_THRESHOLD: usize = 10;

/// Shared rendering mode for every tool's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Tabular,
    /// Text below the row threshold, tabular at or above it.
    Auto,
}

impl OutputFormat {
    fn resolve(self, row_count: usize) -> ResolvedFormat {
        match self {
            Self::Text => ResolvedFormat::Text,
            Self::Json => ResolvedFormat::Json,
            Self::Tabular => ResolvedFormat::Tabular,
            Self::Auto if row_count >= AUTO_TABULAR_THRESHOLD => ResolvedFormat::Tabular,
            Self::Auto => ResolvedFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedFormat {
    Text,
    Json,
    Tabular,
}

/// Render `rows` as a compact pipe-delimited table: one header row of
/// `columns`, then one row per item via `row`. Used for every tool's
/// `Tabular` output — deliberately plain, meant for a human skimming many
/// results rather than for machine parsing (that's what `Json` is for).
fn render_tabular<T>(columns: &[&str], rows: &[T], row: impl Fn(&T) -> Vec<String>) -> String {
    let mut out = String::new();
    out.push_str(&columns.join(" | "));
    out.push('\n');
    for item in rows {
        out.push_str(&row(item).join(" | "));
        out.push('\n');
    }
    out
}

// ===================== fast_lookup =====================

/// Kinds the fuzzy/semantic fallback will consider a match for — narrowed
/// to things that actually define something, so a lookup for `User` doesn't
/// resolve to a stray `import User` reference.
const DEFINITION_KINDS: &[SymbolKind] = &[
    SymbolKind::Class,
    SymbolKind::Function,
    SymbolKind::Method,
    SymbolKind::TypeAlias,
    SymbolKind::Interface,
    SymbolKind::Struct,
    SymbolKind::Enum,
    SymbolKind::Trait,
    SymbolKind::Module,
    SymbolKind::Constant,
];

/// Fuzzy strategies only fire on queries at least this long — below it,
/// edit-distance similarity is too noisy to be useful.
const FUZZY_MIN_QUERY_LEN: usize = 4;
const FUZZY_SUBSTRING_SCORE_CAP: f32 = 0.95;
const FUZZY_CASE_INSENSITIVE_SCORE: f32 = 0.97;
const FUZZY_LEVENSHTEIN_THRESHOLD: f32 = 0.75;
const FUZZY_WORD_PART_THRESHOLD: f32 = 0.5;
/// Minimum cosine similarity for `fast_lookup`'s vector-store fallback.
const SEMANTIC_LOOKUP_THRESHOLD: f32 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LookupMatchKind {
    Exact,
    Semantic,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolStructure {
    pub methods: Vec<String>,
    pub properties: Vec<String>,
    pub base_classes: Vec<String>,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LookupHit {
    pub query: String,
    pub symbol: CodeSymbol,
    pub match_kind: LookupMatchKind,
    pub score: f32,
    pub import_statement: String,
    pub structure: Option<SymbolStructure>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    pub hits: Vec<LookupHit>,
    pub not_found: Vec<String>,
}

impl LookupResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.hits.len()) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            ResolvedFormat::Tabular => self.render_tabular(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        for hit in &self.hits {
            match hit.match_kind {
                LookupMatchKind::Exact => {
                    out.push_str(&format!("\u{2713} {}\n", hit.symbol.qualified_name));
                }
                LookupMatchKind::Semantic => {
                    out.push_str(&format!(
                        "{} \u{2717} \u{2192} {} (semantic match, {:.2})\n",
                        hit.query, hit.symbol.qualified_name, hit.score
                    ));
                }
            }
            out.push_str(&format!(
                "  {}:{}\n",
                hit.symbol.file_path.display(),
                hit.symbol.line_range.start + 1
            ));
            out.push_str(&format!("  import: {}\n", hit.import_statement));
            if let Some(structure) = &hit.structure {
                render_truncated_list(&mut out, "  methods", &structure.methods, 5);
                render_truncated_list(&mut out, "  properties", &structure.properties, 5);
                if !structure.base_classes.is_empty() {
                    out.push_str(&format!("  extends: {}\n", structure.base_classes.join(", ")));
                }
                if !structure.interfaces.is_empty() {
                    out.push_str(&format!("  implements: {}\n", structure.interfaces.join(", ")));
                }
            }
            if let Some(body) = &hit.body {
                let lines: Vec<&str> = body.lines().take(15).collect();
                out.push_str("  body:\n");
                for line in lines {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        for query in &self.not_found {
            out.push_str(&format!("{query}: not found\n"));
        }
        out
    }

    fn render_json(&self) -> String {
        let hits: Vec<_> = self
            .hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "query": h.query,
                    "name": h.symbol.name,
                    "qualified_name": h.symbol.qualified_name,
                    "kind": h.symbol.kind,
                    "file_path": h.symbol.file_path,
                    "line": h.symbol.line_range.start,
                    "match_type": h.match_kind,
                    "score": h.score,
                    "import_statement": h.import_statement,
                    "structure": h.structure,
                    "body": h.body,
                })
            })
            .collect();
        serde_json::json!({ "hits": hits, "not_found": self.not_found }).to_string()
    }

    fn render_tabular(&self) -> String {
        render_tabular(
            &["query", "match", "name", "file", "line", "score"],
            &self.hits,
            |h| {
                vec![
                    h.query.clone(),
                    format!("{:?}", h.match_kind),
                    h.symbol.qualified_name.clone(),
                    h.symbol.file_path.display().to_string(),
                    (h.symbol.line_range.start + 1).to_string(),
                    format!("{:.2}", h.score),
                ]
            },
        )
    }
}

fn render_truncated_list(out: &mut String, label: &str, items: &[String], cap: usize) {
    if items.is_empty() {
        return;
    }
    let shown: Vec<&String> = items.iter().take(cap).collect();
    let shown_str = shown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
    if items.len() > cap {
        out.push_str(&format!("{label}: {shown_str}, ... ({} total)\n", items.len()));
    } else {
        out.push_str(&format!("{label}: {shown_str}\n"));
    }
}

#[derive(Debug, Clone, Default)]
pub struct LookupRequest {
    pub symbol_names: Vec<String>,
    /// Narrow an ambiguous name to the symbol declared in this file.
    pub context_file: Option<String>,
    pub include_body: bool,
    /// `0` skips structure extraction; `>= 1` includes it.
    pub max_depth: u32,
    /// Precomputed embedding per query name, consulted only after the exact
    /// and fuzzy strategies miss. A name absent here simply skips the
    /// semantic fallback rather than erroring.
    pub query_vectors: HashMap<String, Vec<f32>>,
}

impl LookupRequest {
    pub fn new(symbol_names: Vec<String>) -> Self {
        Self {
            symbol_names,
            context_file: None,
            include_body: false,
            max_depth: 1,
            query_vectors: HashMap::new(),
        }
    }
}

// ===================== fast_refs =====================

#[derive(Debug, Clone)]
pub struct RefsRequest {
    pub symbol_name: String,
    pub kind_filter: Option<Vec<RelationKind>>,
    pub include_context: bool,
    pub context_file: Option<String>,
    pub limit: usize,
}

impl RefsRequest {
    pub fn new(symbol_name: impl Into<String>) -> Self {
        Self {
            symbol_name: symbol_name.into(),
            kind_filter: None,
            include_context: false,
            context_file: None,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceHit {
    pub file_path: String,
    pub line: u32,
    pub kind: RelationKind,
    pub code_context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileReferences {
    pub path: String,
    pub references: Vec<ReferenceHit>,
}

#[derive(Debug, Clone)]
pub struct RefsResult {
    pub symbol: CodeSymbol,
    pub total_references: usize,
    pub truncated: bool,
    pub files: Vec<FileReferences>,
}

impl RefsResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.total_references) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            ResolvedFormat::Tabular => self.render_tabular(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = format!("{} references to \"{}\":\n", self.total_references, self.symbol.name);
        if self.truncated {
            let shown: usize = self.files.iter().map(|f| f.references.len()).sum();
            out.push_str(&format!("(truncated \u{2014} showing {shown} of {})\n", self.total_references));
        }
        for file in &self.files {
            out.push_str(&format!("\n{}:\n", file.path));
            for r in &file.references {
                out.push_str(&format!("  {}: {}\n", r.line + 1, r.kind.display_name()));
                if let Some(ctx) = &r.code_context {
                    out.push_str(&format!("    {}\n", ctx.trim_end()));
                }
            }
        }
        out
    }

    fn render_json(&self) -> String {
        serde_json::json!({
            "symbol": self.symbol.name,
            "total_references": self.total_references,
            "truncated": self.truncated,
            "files": self.files.iter().map(|f| {
                serde_json::json!({
                    "path": f.path,
                    "references": f.references.iter().map(|r| serde_json::json!({
                        "line": r.line,
                        "kind": r.kind.display_name(),
                        "code_context": r.code_context,
                    })).collect::<Vec<_>>(),
                })
            }).collect::<Vec<_>>(),
        })
        .to_string()
    }

    fn render_tabular(&self) -> String {
        let rows: Vec<(&str, &ReferenceHit)> = self
            .files
            .iter()
            .flat_map(|f| f.references.iter().map(move |r| (f.path.as_str(), r)))
            .collect();
        render_tabular(&["file", "line", "kind"], &rows, |(path, r)| {
            vec![path.to_string(), (r.line + 1).to_string(), r.kind.display_name().to_string()]
        })
    }
}

// ===================== get_symbols =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBodyMode {
    Structure,
    Minimal,
    Full,
}

#[derive(Debug, Clone)]
pub struct SymbolsRequest {
    pub file_path: String,
    pub mode: SymbolBodyMode,
    /// `0` means "no depth limit".
    pub max_depth: u32,
    pub target: Option<String>,
    pub limit: Option<usize>,
}

impl SymbolsRequest {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            mode: SymbolBodyMode::Structure,
            max_depth: 0,
            target: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UsageFrequency {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocQuality {
    None,
    Poor,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportanceTier {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolEnrichment {
    pub reference_count: u32,
    pub usage_frequency: Option<UsageFrequency>,
    pub doc_quality: Option<DocQuality>,
    pub cross_language_hints: HashMap<Language, Vec<String>>,
    pub importance_score: Option<f32>,
    pub importance_tier: Option<ImportanceTier>,
    pub entry_point: bool,
}

#[derive(Debug, Clone)]
pub struct SymbolSummary {
    pub symbol: CodeSymbol,
    pub body: Option<String>,
    pub enrichment: SymbolEnrichment,
}

#[derive(Debug, Clone)]
pub struct SymbolsResult {
    pub file_path: String,
    pub symbols: Vec<SymbolSummary>,
    pub was_truncated: bool,
}

impl SymbolsResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.symbols.len()) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            ResolvedFormat::Tabular => self.render_tabular(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = format!("{} ({} symbols)\n", self.file_path, self.symbols.len());
        if self.was_truncated {
            out.push_str("(truncated)\n");
        }
        for s in &self.symbols {
            out.push_str(&format!(
                "\n{:?} {} [{}:{}]\n",
                s.symbol.kind,
                s.symbol.qualified_name,
                s.symbol.line_range.start + 1,
                s.symbol.line_range.end
            ));
            if s.enrichment.reference_count > 0 {
                out.push_str(&format!("  refs: {}\n", s.enrichment.reference_count));
            }
            if s.enrichment.entry_point {
                out.push_str("  entry point\n");
            }
            if !s.enrichment.cross_language_hints.is_empty() {
                for (lang, names) in &s.enrichment.cross_language_hints {
                    out.push_str(&format!("  {lang:?}: {}\n", names.join(", ")));
                }
            }
            if let Some(body) = &s.body {
                out.push_str("  body:\n");
                for line in body.lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out
    }

    fn render_json(&self) -> String {
        let symbols: Vec<_> = self
            .symbols
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.symbol.name,
                    "qualified_name": s.symbol.qualified_name,
                    "kind": s.symbol.kind,
                    "line_start": s.symbol.line_range.start,
                    "line_end": s.symbol.line_range.end,
                    "body": s.body,
                    "reference_count": s.enrichment.reference_count,
                    "usage_frequency": s.enrichment.usage_frequency,
                    "doc_quality": s.enrichment.doc_quality,
                    "importance_score": s.enrichment.importance_score,
                    "importance_tier": s.enrichment.importance_tier,
                    "entry_point": s.enrichment.entry_point,
                })
            })
            .collect();
        serde_json::json!({
            "file_path": self.file_path,
            "was_truncated": self.was_truncated,
            "symbols": symbols,
        })
        .to_string()
    }

    fn render_tabular(&self) -> String {
        render_tabular(&["kind", "name", "line", "refs", "importance"], &self.symbols, |s| {
            vec![
                format!("{:?}", s.symbol.kind),
                s.symbol.qualified_name.clone(),
                (s.symbol.line_range.start + 1).to_string(),
                s.enrichment.reference_count.to_string(),
                s.enrichment
                    .importance_tier
                    .map(|t| format!("{t:?}"))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
    }
}

// ===================== fast_search =====================

#[derive(Debug, Clone)]
pub struct FastSearchRequest {
    pub text: String,
    pub limit: usize,
    pub method: crate::engine::SearchMethod,
    pub language_filter: Option<Language>,
    /// Precomputed query embedding, required for `semantic`/`hybrid` and for
    /// the text-search-weak fallback to kick in.
    pub query_vector: Option<Vec<f32>>,
}

impl FastSearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 10,
            method: crate::engine::SearchMethod::Auto,
            language_filter: None,
            query_vector: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FastSearchResult {
    pub query: String,
    pub hits: Vec<crate::engine::SearchResult>,
}

impl FastSearchResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.hits.len()) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            ResolvedFormat::Tabular => self.render_tabular(),
        }
    }

    fn render_text(&self) -> String {
        if self.hits.is_empty() {
            return format!("no results for '{}'\n", self.query);
        }
        let mut out = String::new();
        for hit in &self.hits {
            out.push_str(&format!(
                "{} [{}] score={:.3} signals={}\n",
                hit.qualified_name,
                hit.file_path,
                hit.score,
                hit.match_signals.join(",")
            ));
        }
        out
    }

    fn render_json(&self) -> String {
        let hits: Vec<_> = self
            .hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "name": h.qualified_name,
                    "file": h.file_path,
                    "score": h.score,
                    "signals": h.match_signals,
                })
            })
            .collect();
        serde_json::json!({ "query": self.query, "hits": hits }).to_string()
    }

    fn render_tabular(&self) -> String {
        render_tabular(&["name", "file", "score", "signals"], &self.hits, |h| {
            vec![
                h.qualified_name.clone(),
                h.file_path.clone(),
                format!("{:.3}", h.score),
                h.match_signals.join(","),
            ]
        })
    }
}

// ===================== fast_explore =====================

#[derive(Debug, Clone)]
pub enum ExploreRequest {
    Types {
        type_name: String,
        limit: usize,
    },
    Similar {
        symbol_name: String,
        /// Precomputed embedding for the query symbol; without one, no
        /// similarity search can run and an empty match list is returned.
        query_vector: Option<Vec<f32>>,
        limit: usize,
        min_score: f32,
    },
}

#[derive(Debug, Clone, Default)]
pub struct TypeExploreResult {
    pub type_name: String,
    pub target: Option<CodeSymbol>,
    pub implementations: Vec<CodeSymbol>,
    pub parents: Vec<CodeSymbol>,
    pub children: Vec<CodeSymbol>,
    pub returns: Vec<CodeSymbol>,
    pub parameters: Vec<CodeSymbol>,
}

#[derive(Debug, Clone)]
pub struct SimilarHit {
    pub symbol: CodeSymbol,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarExploreResult {
    pub query_symbol: Option<CodeSymbol>,
    pub matches: Vec<SimilarHit>,
}

#[derive(Debug, Clone)]
pub enum ExploreResult {
    Types(TypeExploreResult),
    Similar(SimilarExploreResult),
}

impl ExploreResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match self {
            Self::Types(t) => t.render(format),
            Self::Similar(s) => s.render(format),
        }
    }
}

impl TypeExploreResult {
    fn row_count(&self) -> usize {
        self.implementations.len() + self.parents.len() + self.children.len() + self.returns.len() + self.parameters.len()
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.row_count()) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            ResolvedFormat::Tabular => self.render_tabular(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = format!("type: {}\n", self.type_name);
        if self.target.is_none() {
            out.push_str("(not found)\n");
            return out;
        }
        render_symbol_group(&mut out, "implementations", &self.implementations);
        render_symbol_group(&mut out, "extends (parents)", &self.parents);
        render_symbol_group(&mut out, "extended by (children)", &self.children);
        render_symbol_group(&mut out, "returned by", &self.returns);
        render_symbol_group(&mut out, "used as parameter by", &self.parameters);
        out
    }

    fn render_json(&self) -> String {
        serde_json::json!({
            "type_name": self.type_name,
            "found": self.target.is_some(),
            "implementations": names(&self.implementations),
            "parents": names(&self.parents),
            "children": names(&self.children),
            "returns": names(&self.returns),
            "parameters": names(&self.parameters),
        })
        .to_string()
    }

    fn render_tabular(&self) -> String {
        let mut rows: Vec<(&str, &CodeSymbol)> = Vec::new();
        rows.extend(self.implementations.iter().map(|s| ("implements", s)));
        rows.extend(self.parents.iter().map(|s| ("extends", s)));
        rows.extend(self.children.iter().map(|s| ("extended_by", s)));
        rows.extend(self.returns.iter().map(|s| ("returned_by", s)));
        rows.extend(self.parameters.iter().map(|s| ("parameter_of", s)));
        render_tabular(&["relation", "name", "file"], &rows, |(rel, s)| {
            vec![rel.to_string(), s.qualified_name.clone(), s.file_path.display().to_string()]
        })
    }
}

fn render_symbol_group(out: &mut String, label: &str, symbols: &[CodeSymbol]) {
    if symbols.is_empty() {
        return;
    }
    out.push_str(&format!("{label}:\n"));
    for s in symbols {
        out.push_str(&format!("  {} [{}]\n", s.qualified_name, s.file_path.display()));
    }
}

fn names(symbols: &[CodeSymbol]) -> Vec<&str> {
    symbols.iter().map(|s| s.qualified_name.as_str()).collect()
}

impl SimilarExploreResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.matches.len()) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            ResolvedFormat::Tabular => self.render_tabular(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        match &self.query_symbol {
            Some(s) => out.push_str(&format!("similar to {}:\n", s.qualified_name)),
            None => out.push_str("similar to (unresolved query symbol):\n"),
        }
        for m in &self.matches {
            out.push_str(&format!(
                "  {:.2} {} [{}]\n",
                m.score,
                m.symbol.qualified_name,
                m.symbol.file_path.display()
            ));
        }
        out
    }

    fn render_json(&self) -> String {
        serde_json::json!({
            "query_symbol": self.query_symbol.as_ref().map(|s| s.qualified_name.as_str()),
            "matches": self.matches.iter().map(|m| serde_json::json!({
                "name": m.symbol.qualified_name,
                "file_path": m.symbol.file_path,
                "score": m.score,
            })).collect::<Vec<_>>(),
        })
        .to_string()
    }

    fn render_tabular(&self) -> String {
        render_tabular(&["score", "name", "file"], &self.matches, |m| {
            vec![format!("{:.2}", m.score), m.symbol.qualified_name.clone(), m.symbol.file_path.display().to_string()]
        })
    }
}

// ===================== rename_symbol =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameScope {
    Workspace,
    /// Narrow the rename to a single file. Not yet implemented; rejected
    /// with `QueryFailed` until a caller needs it.
    File,
}

#[derive(Debug, Clone)]
pub struct RenameRequest {
    pub old_name: String,
    pub new_name: String,
    pub scope: RenameScope,
    pub dry_run: bool,
    pub update_imports: bool,
}

impl RenameRequest {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
            scope: RenameScope::Workspace,
            dry_run: true,
            update_imports: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenameEdit {
    pub file_path: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone)]
pub struct RenameResult {
    pub old_name: String,
    pub new_name: String,
    pub dry_run: bool,
    pub edits: Vec<RenameEdit>,
    pub total_occurrences: usize,
    /// Whether `new_name` already resolves to an existing symbol.
    pub collision: bool,
}

impl RenameResult {
    pub fn render(&self, format: OutputFormat) -> String {
        match format.resolve(self.edits.len()) {
            ResolvedFormat::Text => self.render_text(),
            ResolvedFormat::Json => self.render_json(),
            _ => self.render_json(),
        }
    }

    fn render_text(&self) -> String {
        let mode = if self.dry_run { "preview" } else { "applied" };
        let mut out = format!(
            "rename {} -> {} ({mode}): {} occurrences across {} files\n",
            self.old_name,
            self.new_name,
            self.total_occurrences,
            self.edits.len()
        );
        if self.collision {
            out.push_str(&format!("warning: '{}' already exists in scope\n", self.new_name));
        }
        for edit in &self.edits {
            out.push_str(&format!("  {}: {}\n", edit.file_path, edit.occurrences));
        }
        out
    }

    fn render_json(&self) -> String {
        serde_json::json!({
            "old_name": self.old_name,
            "new_name": self.new_name,
            "dry_run": self.dry_run,
            "collision": self.collision,
            "total_occurrences": self.total_occurrences,
            "edits": self.edits.iter().map(|e| serde_json::json!({
                "file_path": e.file_path,
                "occurrences": e.occurrences,
            })).collect::<Vec<_>>(),
        })
        .to_string()
    }
}

// ===================== QueryTools =====================

/// Entry point for the five thin query operations. Read-mostly: only
/// `rename_symbol`'s non-dry-run path touches the filesystem, and it writes
/// source files directly rather than the stores — re-indexing the touched
/// files afterward is left to the caller, which already owns the `&mut
/// StorageManager` the incremental pipeline needs.
pub struct QueryTools<'a> {
    storage: &'a StorageManager,
}

impl<'a> QueryTools<'a> {
    pub fn new(storage: &'a StorageManager) -> Self {
        Self { storage }
    }

    fn project_root(&self) -> Result<PathBuf, RetrievalError> {
        self.storage
            .root()
            .parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| RetrievalError::QueryFailed {
                reason: "storage root has no parent directory".to_string(),
            })
    }

    /// Narrow `candidates` to `context_file` when that narrows to a
    /// non-empty set, then prefer definitions over imports/references.
    /// Mirrors `TraceEngine::trace_call_path`'s context-file disambiguation.
    fn pick_best(&self, mut candidates: Vec<CodeSymbol>, context_file: Option<&str>) -> Option<CodeSymbol> {
        if let Some(file) = context_file {
            let narrowed: Vec<CodeSymbol> = candidates
                .iter()
                .filter(|s| s.file_path.to_string_lossy() == *file)
                .cloned()
                .collect();
            if !narrowed.is_empty() {
                candidates = narrowed;
            }
        }
        candidates.sort_by_key(|s| s.kind.definition_priority());
        candidates.into_iter().next()
    }

    // ---------- fast_lookup ----------

    #[tracing::instrument(skip(self, request), fields(symbol_count))]
    pub fn fast_lookup(&self, request: &LookupRequest) -> Result<LookupResult, RetrievalError> {
        tracing::Span::current().record("symbol_count", request.symbol_names.len());
        let mut result = LookupResult::default();
        for query in &request.symbol_names {
            match self.lookup_single(query, request)? {
                Some(hit) => result.hits.push(hit),
                None => result.not_found.push(query.clone()),
            }
        }
        Ok(result)
    }

    fn lookup_single(&self, query: &str, request: &LookupRequest) -> Result<Option<LookupHit>, RetrievalError> {
        if let Some(symbol) = self.exact_lookup(query, request.context_file.as_deref())? {
            return Ok(Some(self.build_hit(query, symbol, LookupMatchKind::Exact, 1.0, request)?));
        }
        if let Some((symbol, score)) = self.fuzzy_lookup(query)? {
            return Ok(Some(self.build_hit(query, symbol, LookupMatchKind::Semantic, score, request)?));
        }
        if let Some(vector) = request.query_vectors.get(query) {
            if let Some((symbol, score)) = self.semantic_lookup(vector)? {
                return Ok(Some(self.build_hit(query, symbol, LookupMatchKind::Semantic, score, request)?));
            }
        }
        Ok(None)
    }

    fn exact_lookup(&self, query: &str, context_file: Option<&str>) -> Result<Option<CodeSymbol>, RetrievalError> {
        let candidates = if let Some((parent_name, child_name)) = query.rsplit_once('.') {
            let parents = self.storage.graph().get_symbols_by_name(parent_name)?;
            let parent_ids: HashSet<SymbolId> = parents.iter().map(|s| s.id).collect();
            let mut children = self.storage.graph().get_symbols_by_name(child_name)?;
            children.retain(|c| c.parent_id.map(|p| parent_ids.contains(&p)).unwrap_or(false));
            if children.is_empty() {
                self.storage.graph().get_symbols_by_name(query)?
            } else {
                children
            }
        } else {
            self.storage.graph().get_symbols_by_name(query)?
        };
        Ok(self.pick_best(candidates, context_file))
    }

    fn fuzzy_lookup(&self, query: &str) -> Result<Option<(CodeSymbol, f32)>, RetrievalError> {
        if let Some(hit) = self.fuzzy_case_insensitive(query)? {
            return Ok(Some(hit));
        }
        if let Some(hit) = self.fuzzy_substring(query)? {
            return Ok(Some(hit));
        }
        if query.len() >= FUZZY_MIN_QUERY_LEN {
            if let Some(hit) = self.fuzzy_levenshtein(query)? {
                return Ok(Some(hit));
            }
        }
        self.fuzzy_word_parts(query)
    }

    fn fuzzy_case_insensitive(&self, query: &str) -> Result<Option<(CodeSymbol, f32)>, RetrievalError> {
        let candidates = self
            .storage
            .graph()
            .find_symbols_case_insensitive(query, Some(DEFINITION_KINDS))?;
        Ok(self.pick_best(candidates, None).map(|s| (s, FUZZY_CASE_INSENSITIVE_SCORE)))
    }

    fn fuzzy_substring(&self, query: &str) -> Result<Option<(CodeSymbol, f32)>, RetrievalError> {
        let candidates = self
            .storage
            .graph()
            .find_symbols_by_substring(query, Some(DEFINITION_KINDS), 25)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut scored: Vec<(CodeSymbol, f32)> = candidates
            .into_iter()
            .map(|s| {
                let score = (query.len() as f32 / s.name.len().max(1) as f32).min(FUZZY_SUBSTRING_SCORE_CAP);
                (s, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().next())
    }

    fn fuzzy_levenshtein(&self, query: &str) -> Result<Option<(CodeSymbol, f32)>, RetrievalError> {
        let qlen = query.chars().count();
        let min_len = qlen.saturating_sub(3).max(1);
        let max_len = qlen + 3;
        let candidates = self.storage.graph().find_symbols_by_name_length_range(
            min_len,
            max_len,
            Some(DEFINITION_KINDS),
        )?;
        let mut best: Option<(CodeSymbol, f32)> = None;
        for symbol in candidates {
            let dist = levenshtein_distance(query, &symbol.name) as f32;
            let max_possible = qlen.max(symbol.name.chars().count()).max(1) as f32;
            let similarity = 1.0 - dist / max_possible;
            if similarity >= FUZZY_LEVENSHTEIN_THRESHOLD {
                if best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true) {
                    best = Some((symbol, similarity));
                }
            }
        }
        Ok(best)
    }

    fn fuzzy_word_parts(&self, query: &str) -> Result<Option<(CodeSymbol, f32)>, RetrievalError> {
        let query_variants = generate_variants(query);
        let query_words: HashSet<String> = query_variants
            .values()
            .flat_map(|v| v.split(['_', '-', ' ']).map(|w| w.to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();
        if query_words.is_empty() {
            return Ok(None);
        }
        let qlen = query.chars().count().max(1);
        let candidates = self.storage.graph().find_symbols_by_name_length_range(
            1,
            qlen + 20,
            Some(DEFINITION_KINDS),
        )?;
        let mut best: Option<(CodeSymbol, f32)> = None;
        for symbol in candidates {
            let name_variants = generate_variants(&symbol.name);
            let name_words: HashSet<String> = name_variants
                .values()
                .flat_map(|v| v.split(['_', '-', ' ']).map(|w| w.to_lowercase()))
                .filter(|w| !w.is_empty())
                .collect();
            let matched: usize = query_words.intersection(&name_words).map(|w| w.len()).sum();
            if matched == 0 {
                continue;
            }
            let max_len = qlen.max(symbol.name.chars().count()) as f32;
            let score = (matched as f32 / max_len + 0.2).min(0.85);
            if score >= FUZZY_WORD_PART_THRESHOLD
                && best.as_ref().map(|(_, s)| score > *s).unwrap_or(true)
            {
                best = Some((symbol, score));
            }
        }
        Ok(best)
    }

    /// Vector-store fallback. `usearch`'s cosine metric reports distance as
    /// `1 - cosine_similarity`, so similarity is recovered as `1 - distance`.
    fn semantic_lookup(&self, vector: &[f32]) -> Result<Option<(CodeSymbol, f32)>, RetrievalError> {
        let hits = self.storage.vector().search_knn(vector, 5)?;
        for hit in hits {
            let score = 1.0 - hit.distance;
            if score < SEMANTIC_LOOKUP_THRESHOLD {
                continue;
            }
            if let Some(symbol) = self.storage.graph().get_symbol(hit.symbol_id)? {
                if DEFINITION_KINDS.contains(&symbol.kind) {
                    return Ok(Some((symbol, score)));
                }
            }
        }
        Ok(None)
    }

    fn build_hit(
        &self,
        query: &str,
        symbol: CodeSymbol,
        match_kind: LookupMatchKind,
        score: f32,
        request: &LookupRequest,
    ) -> Result<LookupHit, RetrievalError> {
        let import_statement = generate_import_path(&symbol.file_path);
        let structure = if request.max_depth >= 1 {
            Some(self.symbol_structure(&symbol)?)
        } else {
            None
        };
        let body = if request.include_body {
            symbol.body_text.clone()
        } else {
            None
        };
        Ok(LookupHit {
            query: query.to_string(),
            symbol,
            match_kind,
            score,
            import_statement,
            structure,
            body,
        })
    }

    fn symbol_structure(&self, symbol: &CodeSymbol) -> Result<SymbolStructure, RetrievalError> {
        let siblings = self.storage.graph().get_symbols_by_file(&symbol.file_path.to_string_lossy())?;
        let mut methods = Vec::new();
        let mut properties = Vec::new();
        for child in siblings.iter().filter(|c| c.parent_id == Some(symbol.id)) {
            match child.kind {
                SymbolKind::Method | SymbolKind::Function => methods.push(child.name.clone()),
                SymbolKind::Field | SymbolKind::Variable | SymbolKind::Constant => {
                    properties.push(child.name.clone())
                }
                _ => {}
            }
        }
        methods.sort();
        properties.sort();

        let mut base_classes = Vec::new();
        let mut interfaces = Vec::new();
        let rels = self.storage.graph().get_relations_from(
            symbol.id,
            Some(&[RelationKind::Extends, RelationKind::Implements]),
            50,
        )?;
        for rel in rels {
            if let Some(target) = self.storage.graph().get_symbol(rel.target_id)? {
                match rel.kind {
                    RelationKind::Extends => base_classes.push(target.name),
                    RelationKind::Implements => interfaces.push(target.name),
                    _ => {}
                }
            }
        }
        if base_classes.is_empty() {
            if let Some(sig) = &symbol.signature {
                if let Some(name) = extract_base_class_from_signature(sig) {
                    base_classes.push(name);
                }
            }
        }

        Ok(SymbolStructure { methods, properties, base_classes, interfaces })
    }

    // ---------- fast_refs ----------

    #[tracing::instrument(skip(self, request), fields(symbol_name = %request.symbol_name))]
    pub fn fast_refs(&self, request: &RefsRequest) -> Result<Option<RefsResult>, RetrievalError> {
        let candidates = self.storage.graph().get_symbols_by_name(&request.symbol_name)?;
        let symbol = match self.pick_best(candidates, request.context_file.as_deref()) {
            Some(s) => s,
            None => return Ok(None),
        };

        let fetch_limit = request.limit.max(1).saturating_mul(4).max(200);
        let relations = self
            .storage
            .graph()
            .get_relations_to(symbol.id, request.kind_filter.as_deref(), fetch_limit)?;
        let mut hits: Vec<ReferenceHit> = relations
            .into_iter()
            .map(|r| ReferenceHit {
                file_path: r.file_path.to_string_lossy().to_string(),
                line: r.line,
                kind: r.kind,
                code_context: None,
            })
            .collect();

        if request.kind_filter.as_ref().map(|ks| ks.contains(&RelationKind::References)).unwrap_or(true) {
            let identifiers = self.storage.graph().get_identifiers_referencing(&symbol.name, symbol.id)?;
            for ident in identifiers {
                hits.push(ReferenceHit {
                    file_path: ident.file_path.to_string_lossy().to_string(),
                    line: ident.line,
                    kind: RelationKind::References,
                    code_context: if request.include_context { ident.code_context.clone() } else { None },
                });
            }
        }

        let mut seen = HashSet::new();
        hits.retain(|h| seen.insert((h.file_path.clone(), h.line, h.kind)));
        hits.sort_by(|a, b| a.file_path.cmp(&b.file_path).then(a.line.cmp(&b.line)));

        let total_references = hits.len();
        let truncated = total_references > request.limit;
        hits.truncate(request.limit);

        if request.include_context {
            for hit in &mut hits {
                if hit.code_context.is_none() {
                    hit.code_context = self.read_line_context(&hit.file_path, hit.line);
                }
            }
        }

        let mut by_file: HashMap<String, Vec<ReferenceHit>> = HashMap::new();
        for hit in hits {
            by_file.entry(hit.file_path.clone()).or_default().push(hit);
        }
        let mut files: Vec<FileReferences> =
            by_file.into_iter().map(|(path, references)| FileReferences { path, references }).collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Some(RefsResult { symbol, total_references, truncated, files }))
    }

    fn read_line_context(&self, file_path: &str, line: u32) -> Option<String> {
        let root = self.project_root().ok()?;
        let content = std::fs::read_to_string(root.join(file_path)).ok()?;
        content.lines().nth(line as usize).map(|s| s.to_string())
    }

    // ---------- get_symbols ----------

    #[tracing::instrument(skip(self, request), fields(file_path = %request.file_path))]
    pub fn get_symbols(&self, request: &SymbolsRequest) -> Result<SymbolsResult, RetrievalError> {
        let project_root = self.project_root()?;
        let abs_path = project_root.join(&request.file_path);
        let content = std::fs::read(&abs_path).map_err(|e| RetrievalError::QueryFailed {
            reason: format!("failed to read {}: {e}", request.file_path),
        })?;
        let file_size = content.len() as u64;

        let indexed = self.storage.graph().get_symbols_by_file(&request.file_path)?;
        let workspace_id = indexed.first().map(|s| s.workspace_id.clone()).unwrap_or_else(|| "default".to_string());

        let parsed = oc_parser::parse_file(&workspace_id, &request.file_path, &content, file_size)
            .map_err(|e| RetrievalError::QueryFailed { reason: format!("parse failed: {e}") })?;

        let mut symbols = parsed.symbols;
        if request.max_depth > 0 {
            apply_max_depth_filter(&mut symbols, request.max_depth);
        }
        if let Some(target) = &request.target {
            apply_target_filter(&mut symbols, target);
        }

        let mut was_truncated = false;
        if let Some(limit) = request.limit {
            if symbols.len() > limit {
                symbols.truncate(limit);
                was_truncated = true;
            }
        }

        let indexed_by_id: HashMap<SymbolId, &CodeSymbol> = indexed.iter().map(|s| (s.id, s)).collect();

        let mut summaries = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let body = extract_body(&symbol, request.mode);
            let stored = indexed_by_id.get(&symbol.id).copied();
            let enrichment = self.enrich_symbol(&symbol, stored)?;
            summaries.push(SymbolSummary { symbol, body, enrichment });
        }

        Ok(SymbolsResult { file_path: request.file_path.clone(), symbols: summaries, was_truncated })
    }

    /// Enrichments that need the stored index: a freshly re-parsed symbol
    /// that doesn't appear in `stored` (new code not yet indexed) gets
    /// default/empty enrichment rather than an error.
    fn enrich_symbol(
        &self,
        symbol: &CodeSymbol,
        stored: Option<&CodeSymbol>,
    ) -> Result<SymbolEnrichment, RetrievalError> {
        let stored = match stored {
            Some(s) => s,
            None => return Ok(SymbolEnrichment::default()),
        };

        let reference_count = stored.reference_count;
        let usage_frequency = Some(usage_frequency_tier(reference_count));
        let doc_quality = Some(doc_quality_tier(symbol.doc_comment.as_deref()));

        let mut cross_language_hints: HashMap<Language, Vec<String>> = HashMap::new();
        let variant_names: HashSet<String> = generate_variants(&symbol.name).into_values().collect();
        if !variant_names.is_empty() {
            let names: Vec<String> = variant_names.into_iter().collect();
            let matches = self.storage.graph().get_symbols_by_names(&names)?;
            for m in matches {
                if m.language != stored.language && m.id != stored.id {
                    cross_language_hints.entry(m.language).or_default().push(m.qualified_name);
                }
            }
        }

        let outgoing_calls = self
            .storage
            .graph()
            .get_relations_from(stored.id, Some(&[RelationKind::Calls]), 200)?
            .len();
        let importance_score = normalized_importance(reference_count);
        let entry_point =
            reference_count as usize >= ENTRY_POINT_MIN_INCOMING && outgoing_calls <= ENTRY_POINT_MAX_OUTGOING;

        Ok(SymbolEnrichment {
            reference_count,
            usage_frequency,
            doc_quality,
            cross_language_hints,
            importance_score: Some(importance_score),
            importance_tier: Some(importance_tier(importance_score)),
            entry_point,
        })
    }

    // ---------- fast_explore ----------

    #[tracing::instrument(skip(self, request))]
    pub fn fast_explore(&self, request: &ExploreRequest) -> Result<ExploreResult, RetrievalError> {
        match request {
            ExploreRequest::Types { type_name, limit } => {
                self.explore_types(type_name, *limit).map(ExploreResult::Types)
            }
            ExploreRequest::Similar { symbol_name, query_vector, limit, min_score } => self
                .explore_similar(symbol_name, query_vector.as_deref(), *limit, *min_score)
                .map(ExploreResult::Similar),
        }
    }

    fn explore_types(&self, type_name: &str, limit: usize) -> Result<TypeExploreResult, RetrievalError> {
        let candidates = self.storage.graph().get_symbols_by_name(type_name)?;
        let target = self.pick_best(candidates, None);

        let mut result = TypeExploreResult { type_name: type_name.to_string(), target: target.clone(), ..Default::default() };
        if let Some(t) = &target {
            result.implementations = self.hydrate_relation_sources(t.id, RelationKind::Implements, limit)?;
            result.parents = self.hydrate_relation_targets(t.id, RelationKind::Extends, limit)?;
            result.children = self.hydrate_relation_sources(t.id, RelationKind::Extends, limit)?;
            result.returns = self.hydrate_relation_sources(t.id, RelationKind::Returns, limit)?;
            result.parameters = self.hydrate_relation_sources(t.id, RelationKind::Parameter, limit)?;
        }
        Ok(result)
    }

    fn hydrate_relation_sources(
        &self,
        target: SymbolId,
        kind: RelationKind,
        limit: usize,
    ) -> Result<Vec<CodeSymbol>, RetrievalError> {
        let rels = self.storage.graph().get_relations_to(target, Some(&[kind]), limit)?;
        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            if let Some(sym) = self.storage.graph().get_symbol(rel.source_id)? {
                out.push(sym);
            }
        }
        Ok(out)
    }

    fn hydrate_relation_targets(
        &self,
        source: SymbolId,
        kind: RelationKind,
        limit: usize,
    ) -> Result<Vec<CodeSymbol>, RetrievalError> {
        let rels = self.storage.graph().get_relations_from(source, Some(&[kind]), limit)?;
        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            if let Some(sym) = self.storage.graph().get_symbol(rel.target_id)? {
                out.push(sym);
            }
        }
        Ok(out)
    }

    fn explore_similar(
        &self,
        symbol_name: &str,
        query_vector: Option<&[f32]>,
        limit: usize,
        min_score: f32,
    ) -> Result<SimilarExploreResult, RetrievalError> {
        let candidates = self.storage.graph().get_symbols_by_name(symbol_name)?;
        let query_symbol = self.pick_best(candidates, None);

        let vector = match query_vector {
            Some(v) => v,
            None => return Ok(SimilarExploreResult { query_symbol, matches: Vec::new() }),
        };

        let hits = self.storage.vector().search_knn(vector, limit.max(1) * 3)?;
        let mut matches = Vec::new();
        for hit in hits {
            if Some(hit.symbol_id) == query_symbol.as_ref().map(|s| s.id) {
                continue;
            }
            let score = 1.0 - hit.distance;
            if score < min_score {
                continue;
            }
            if let Some(sym) = self.storage.graph().get_symbol(hit.symbol_id)? {
                // The point of `similar` is cross-language duplicate/pattern
                // detection, so same-language neighbors (which `fast_search`
                // already surfaces) are skipped here.
                if let Some(q) = &query_symbol {
                    if sym.language == q.language {
                        continue;
                    }
                }
                matches.push(SimilarHit { symbol: sym, score });
            }
        }
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(SimilarExploreResult { query_symbol, matches })
    }

    // ---------- fast_search ----------

    /// Run the fused Search Pipeline and render it as a tool result. Thin
    /// wrapper over [`crate::engine::RetrievalEngine::search`] — unlike the
    /// other tools here, this one does fuse multiple signals, but callers
    /// reach it the same way (a request struct in, a render-able result out).
    #[tracing::instrument(skip(self, request), fields(text = %request.text))]
    pub fn fast_search(&self, request: &FastSearchRequest) -> Result<FastSearchResult, RetrievalError> {
        let mut query = crate::engine::SearchQuery::new(request.text.clone());
        query.method = request.method;
        query.limit = request.limit;
        query.language_filter = request.language_filter;
        query.query_vector = request.query_vector.clone();
        let engine = crate::engine::RetrievalEngine::new(self.storage);
        let hits = engine.search(&query)?;
        Ok(FastSearchResult { query: request.text.clone(), hits })
    }

    // ---------- rename_symbol ----------

    #[tracing::instrument(skip(self, request), fields(old = %request.old_name, new = %request.new_name))]
    pub fn rename_symbol(&self, request: &RenameRequest) -> Result<RenameResult, RetrievalError> {
        if request.scope == RenameScope::File {
            return Err(RetrievalError::QueryFailed {
                reason: "file-scoped rename is not yet supported".to_string(),
            });
        }
        if !is_valid_identifier(&request.new_name) {
            return Err(RetrievalError::QueryFailed {
                reason: format!("'{}' is not a valid identifier", request.new_name),
            });
        }

        let collision = !self.storage.graph().get_symbols_by_name(&request.new_name)?.is_empty();

        let definition_candidates = self.storage.graph().get_symbols_by_name(&request.old_name)?;
        let definition = self.pick_best(definition_candidates, None).ok_or_else(|| RetrievalError::QueryFailed {
            reason: format!("no symbol named '{}' found", request.old_name),
        })?;

        let refs = self.fast_refs(&RefsRequest::new(request.old_name.clone()))?;

        let mut files: HashSet<String> = HashSet::new();
        files.insert(definition.file_path.to_string_lossy().to_string());
        if let Some(refs) = &refs {
            for file in &refs.files {
                files.insert(file.path.clone());
            }
        }

        let project_root = self.project_root()?;
        let mut edits = Vec::new();
        let mut total_occurrences = 0usize;
        let mut sorted_files: Vec<String> = files.into_iter().collect();
        sorted_files.sort();

        for file_path in &sorted_files {
            let abs = project_root.join(file_path);
            let content = match std::fs::read_to_string(&abs) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let skip_imports = !request.update_imports;
            let occurrences = count_word_boundary_matches(&content, &request.old_name, skip_imports);
            if occurrences == 0 {
                continue;
            }
            total_occurrences += occurrences;
            edits.push(RenameEdit { file_path: file_path.clone(), occurrences });

            if !request.dry_run {
                let replaced = replace_word_boundary(&content, &request.old_name, &request.new_name, skip_imports);
                write_atomic(&abs, &replaced)?;
            }
        }

        Ok(RenameResult {
            old_name: request.old_name.clone(),
            new_name: request.new_name.clone(),
            dry_run: request.dry_run,
            edits,
            total_occurrences,
            collision,
        })
    }
}

// ===================== free functions =====================

fn generate_import_path(file_path: &Path) -> String {
    let mut s = file_path.to_string_lossy().replace('\\', "/");
    for suffix in [".py", ".ts", ".tsx", ".js", ".jsx", ".rs", ".go", ".java"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
            break;
        }
    }
    for prefix in ["src/", "lib/"] {
        if let Some(stripped) = s.strip_prefix(prefix) {
            s = stripped.to_string();
            break;
        }
    }
    s.replace('/', ".")
}

/// Fallback for `base_classes` when no `Extends` relation was extracted:
/// pull the first parenthesized name out of a `class Foo(Bar):`-shaped
/// signature.
fn extract_base_class_from_signature(signature: &str) -> Option<String> {
    let open = signature.find('(')?;
    let close = signature[open..].find(')').map(|i| i + open)?;
    let inner = signature[open + 1..close].trim();
    inner.split(',').next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Classic single-row DP edit distance, grounded on the same algorithm the
/// fuzzy cascade above approximates in its other strategies.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Depth-filter a flat symbol list by walking each symbol's `parent_id`
/// chain within the set. `max_depth = 1` keeps only top-level symbols.
fn apply_max_depth_filter(symbols: &mut Vec<CodeSymbol>, max_depth: u32) {
    let parent_of: HashMap<SymbolId, SymbolId> =
        symbols.iter().filter_map(|s| s.parent_id.map(|p| (s.id, p))).collect();
    let depth_of = |id: SymbolId| -> u32 {
        let mut depth = 0;
        let mut current = id;
        for _ in 0..64 {
            match parent_of.get(&current) {
                Some(&parent) => {
                    depth += 1;
                    current = parent;
                }
                None => break,
            }
        }
        depth
    };
    symbols.retain(|s| depth_of(s.id) < max_depth);
}

/// Case-insensitive substring match on `target`, including any descendant
/// (by `parent_id`) of a matched symbol so a class survives alongside its
/// members.
fn apply_target_filter(symbols: &mut Vec<CodeSymbol>, target: &str) {
    let needle = target.to_lowercase();
    let mut keep: HashSet<SymbolId> = symbols
        .iter()
        .filter(|s| s.name.to_lowercase().contains(&needle))
        .map(|s| s.id)
        .collect();
    let mut changed = true;
    while changed {
        changed = false;
        for s in symbols.iter() {
            if let Some(parent) = s.parent_id {
                if keep.contains(&parent) && keep.insert(s.id) {
                    changed = true;
                }
            }
        }
    }
    symbols.retain(|s| keep.contains(&s.id));
}

fn extract_body(symbol: &CodeSymbol, mode: SymbolBodyMode) -> Option<String> {
    match mode {
        SymbolBodyMode::Structure => None,
        SymbolBodyMode::Minimal if symbol.parent_id.is_some() => None,
        SymbolBodyMode::Minimal | SymbolBodyMode::Full => symbol.body_text.clone(),
    }
}

const IMPORTANCE_NORMALIZATION_CAP: f32 = 50.0;
const ENTRY_POINT_MIN_INCOMING: usize = 5;
const ENTRY_POINT_MAX_OUTGOING: usize = 1;

fn usage_frequency_tier(count: u32) -> UsageFrequency {
    match count {
        0 => UsageFrequency::None,
        1..=5 => UsageFrequency::Low,
        6..=20 => UsageFrequency::Medium,
        21..=50 => UsageFrequency::High,
        _ => UsageFrequency::VeryHigh,
    }
}

fn doc_quality_tier(doc: Option<&str>) -> DocQuality {
    match doc {
        None => DocQuality::None,
        Some(d) if d.len() < 50 => DocQuality::Poor,
        Some(d) if d.len() <= 200 => DocQuality::Good,
        Some(_) => DocQuality::Excellent,
    }
}

/// Simplified importance signal: normalized inbound reference count. A true
/// PageRank pass over the call graph (damping 0.85, capped at 100
/// iterations) needs a graph library this crate doesn't carry; reference
/// count already approximates "how much of the graph points at this symbol"
/// well enough to rank by.
fn normalized_importance(reference_count: u32) -> f32 {
    (reference_count as f32 / IMPORTANCE_NORMALIZATION_CAP).min(1.0)
}

fn importance_tier(score: f32) -> ImportanceTier {
    if score <= 0.25 {
        ImportanceTier::Low
    } else if score <= 0.5 {
        ImportanceTier::Medium
    } else if score <= 0.75 {
        ImportanceTier::High
    } else {
        ImportanceTier::Critical
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_import_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("import ")
        || trimmed.starts_with("from ")
        || trimmed.starts_with("use ")
        || trimmed.contains("require(")
}

/// Byte offsets in `line` where `word` appears with no adjacent identifier
/// character on either side — `get` matches in `x = get(y)` but not in
/// `get_user(y)` or `forget(y)`.
fn find_word_boundary_matches(line: &str, word: &str) -> Vec<usize> {
    let mut result = Vec::new();
    if word.is_empty() {
        return result;
    }
    let bytes = line.as_bytes();
    let wlen = word.len();
    let mut start = 0;
    while start <= line.len() {
        let Some(pos) = line[start..].find(word) else { break };
        let idx = start + pos;
        let before_ok = idx == 0 || !is_ident_byte(bytes[idx - 1]);
        let after_idx = idx + wlen;
        let after_ok = after_idx >= bytes.len() || !is_ident_byte(bytes[after_idx]);
        if before_ok && after_ok {
            result.push(idx);
        }
        start = idx + wlen.max(1);
    }
    result
}

fn count_word_boundary_matches(content: &str, word: &str, skip_import_lines: bool) -> usize {
    content
        .lines()
        .filter(|l| !(skip_import_lines && is_import_line(l)))
        .map(|l| find_word_boundary_matches(l, word).len())
        .sum()
}

fn replace_word_boundary_line(line: &str, old: &str, new: &str) -> String {
    let matches = find_word_boundary_matches(line, old);
    if matches.is_empty() {
        return line.to_string();
    }
    let mut result = String::with_capacity(line.len());
    let mut last = 0;
    for idx in matches {
        result.push_str(&line[last..idx]);
        result.push_str(new);
        last = idx + old.len();
    }
    result.push_str(&line[last..]);
    result
}

fn replace_word_boundary(content: &str, old: &str, new: &str, skip_import_lines: bool) -> String {
    let had_trailing_newline = content.ends_with('\n');
    let mut out = content
        .lines()
        .map(|line| {
            if skip_import_lines && is_import_line(line) {
                line.to_string()
            } else {
                replace_word_boundary_line(line, old, new)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    if had_trailing_newline {
        out.push('\n');
    }
    out
}

fn write_atomic(path: &Path, content: &str) -> Result<(), RetrievalError> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, content).map_err(|e| RetrievalError::QueryFailed {
        reason: format!("failed to write {}: {e}", tmp_path.display()),
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| RetrievalError::QueryFailed {
        reason: format!("failed to rename {} into place: {e}", path.display()),
    })?;
    Ok(())
}
