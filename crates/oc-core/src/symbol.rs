use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

use crate::language::Language;

/// Deterministic symbol identifier, computed as XXH3-128 of
/// `repo_id|relative_path|qualified_name|byte_start|byte_end`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u128);

impl SymbolId {
    /// Generate a deterministic symbol ID from its identifying fields.
    pub fn generate(
        repo_id: &str,
        relative_path: &str,
        qualified_name: &str,
        byte_start: usize,
        byte_end: usize,
    ) -> Self {
        let input = format!(
            "{}|{}|{}|{}|{}",
            repo_id, relative_path, qualified_name, byte_start, byte_end
        );
        Self(xxh3_128(input.as_bytes()))
    }

    /// Generate the id a file-level synthetic symbol would have for `relative_path`.
    ///
    /// Used by File-Level Indexing (§4.11) and by the scanner to address the
    /// single synthetic symbol that stands in for an unparseable file.
    pub fn generate_file_level(repo_id: &str, relative_path: &str) -> Self {
        Self::generate(repo_id, relative_path, "__file__", 0, 0)
    }

    pub fn as_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({:032x})", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Kinds of code symbols that can be extracted from source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SymbolKind {
    Function = 0,
    Method = 1,
    Class = 2,
    Struct = 3,
    Interface = 4,
    Trait = 5,
    Module = 6,
    Package = 7,
    Variable = 8,
    Constant = 9,
    Enum = 10,
    TypeAlias = 11,
    Field = 12,
    Parameter = 13,
    Import = 14,
    Reference = 15,
    /// Synthetic whole-file symbol produced by File-Level Indexing (§4.11).
    File = 16,
}

impl SymbolKind {
    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Function),
            1 => Some(Self::Method),
            2 => Some(Self::Class),
            3 => Some(Self::Struct),
            4 => Some(Self::Interface),
            5 => Some(Self::Trait),
            6 => Some(Self::Module),
            7 => Some(Self::Package),
            8 => Some(Self::Variable),
            9 => Some(Self::Constant),
            10 => Some(Self::Enum),
            11 => Some(Self::TypeAlias),
            12 => Some(Self::Field),
            13 => Some(Self::Parameter),
            14 => Some(Self::Import),
            15 => Some(Self::Reference),
            16 => Some(Self::File),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Ordering used when two symbols tie on name: structural definitions
    /// before uses. Lower sorts first.
    pub fn definition_priority(self) -> u8 {
        match self {
            Self::Import | Self::Reference | Self::Parameter => 1,
            _ => 0,
        }
    }
}

/// A code symbol extracted from a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSymbol {
    pub id: SymbolId,
    pub workspace_id: String,
    pub name: String,
    /// Dot-separated canonical qualified name (e.g., "module.Class.method").
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub language: Language,
    /// Relative to project root, forward-slash normalized.
    pub file_path: PathBuf,
    pub byte_range: Range<usize>,
    /// 0-indexed, end-exclusive.
    pub line_range: Range<u32>,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub visibility: Option<String>,
    /// Self-referential parent symbol (nested scopes). None means top-level.
    pub parent_id: Option<SymbolId>,
    /// Grep-style window of source around the definition.
    pub code_context: Option<String>,
    /// Cross-language grouping key, e.g. shared naming-variant cluster.
    pub semantic_group: Option<String>,
    pub confidence: f32,
    pub content_type: Option<String>,
    /// Materialized inbound-relationship count; maintained by
    /// `update_reference_counts`, not computed on read.
    pub reference_count: u32,
    /// XXH3-128 lower 64 bits of the symbol body bytes.
    pub body_hash: u64,
    /// Optional source text of the symbol body (truncated to 10 KB).
    pub body_text: Option<String>,
}

impl Default for CodeSymbol {
    /// Placeholder symbol used only as a base for `..Default::default()` in
    /// struct-update syntax; callers always override `id`, `name`,
    /// `qualified_name`, `kind`, `language`, `file_path`, `byte_range`,
    /// `line_range`, and `body_hash` explicitly.
    fn default() -> Self {
        Self {
            id: SymbolId(0),
            workspace_id: String::new(),
            name: String::new(),
            qualified_name: String::new(),
            kind: SymbolKind::Module,
            language: Language::Text,
            file_path: PathBuf::new(),
            byte_range: 0..0,
            line_range: 0..0,
            signature: None,
            doc_comment: None,
            visibility: None,
            parent_id: None,
            code_context: None,
            semantic_group: None,
            confidence: 1.0,
            content_type: None,
            reference_count: 0,
            body_hash: 0,
            body_text: None,
        }
    }
}
