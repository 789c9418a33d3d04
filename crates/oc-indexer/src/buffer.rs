//! Indexing Buffer: accumulates parsed results across files so the
//! embedding pass and the relational-store write amortize over many files
//! instead of running once per file. Used by [`crate::pipeline::index`]'s
//! batch loop; flushed whenever [`IndexingBuffer::should_flush`] trips or
//! at the end of a run, whichever comes first.

use oc_core::{CodeRelation, CodeSymbol, Identifier, Language};

/// Symbol-count flush threshold, tuned for amortizing one embedding pass
/// over a useful batch size.
pub const DEFAULT_MAX_SYMBOLS: usize = 512;
/// Secondary file-count flush threshold, so a handful of files with an
/// unusually large symbol count don't block a flush indefinitely.
pub const DEFAULT_MAX_FILES: usize = 50;

/// Identifiers matching any of these (case-insensitive) are dropped by
/// the noise filter — control-flow keywords and common short binding
/// names add volume to cross-reference search without adding recall.
const IDENTIFIER_KEYWORD_BLOCKLIST: &[&str] = &[
    "if", "else", "elif", "for", "while", "return", "true", "false", "none", "null", "nil",
    "self", "this", "const", "let", "var", "def", "fn", "class", "struct", "enum", "impl",
    "trait", "import", "from", "as", "in", "is", "not", "and", "or", "break", "continue", "pass",
    "try", "except", "finally", "with", "yield", "async", "await", "pub", "mut", "use", "match",
    "switch", "case", "default", "do", "goto", "new", "delete", "void", "static", "final",
];

/// Whether a file entering the buffer is brand new or replacing a
/// previously-indexed version (the latter must be cleaned up first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Indexed,
    Updated,
}

/// File metadata tuple as it flows through the buffer, ahead of being
/// turned into a `FileMetadata` row at flush time.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub language: Language,
    pub content_hash: u64,
    pub size_bytes: u64,
}

/// Returns false for identifiers the noise filter should drop: too short,
/// pure digits, or a case-insensitive keyword match.
pub fn is_useful_identifier(name: &str) -> bool {
    if name.chars().count() < 2 {
        return false;
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    !IDENTIFIER_KEYWORD_BLOCKLIST.contains(&lower.as_str())
}

/// Accumulates symbols, filtered identifiers, relations, and file
/// metadata across multiple files until a flush threshold is reached.
#[derive(Debug)]
pub struct IndexingBuffer {
    max_symbols: usize,
    max_files: usize,
    pub symbols: Vec<CodeSymbol>,
    pub identifiers: Vec<Identifier>,
    pub relations: Vec<CodeRelation>,
    pub files: Vec<FileRecord>,
    pub files_to_clean: Vec<String>,
}

impl Default for IndexingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexingBuffer {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SYMBOLS, DEFAULT_MAX_FILES)
    }

    pub fn with_limits(max_symbols: usize, max_files: usize) -> Self {
        Self {
            max_symbols,
            max_files,
            symbols: Vec::new(),
            identifiers: Vec::new(),
            relations: Vec::new(),
            files: Vec::new(),
            files_to_clean: Vec::new(),
        }
    }

    /// Add one file's extraction results. `identifiers` is filtered through
    /// [`is_useful_identifier`] before being appended.
    pub fn add_result(
        &mut self,
        action: FileAction,
        file: FileRecord,
        symbols: Vec<CodeSymbol>,
        identifiers: Vec<Identifier>,
        relations: Vec<CodeRelation>,
    ) {
        if action == FileAction::Updated {
            self.files_to_clean.push(file.path.clone());
        }
        self.files.push(file);
        self.symbols.extend(symbols);
        self.identifiers.extend(identifiers.into_iter().filter(|id| is_useful_identifier(&id.name)));
        self.relations.extend(relations);
    }

    pub fn should_flush(&self) -> bool {
        self.symbols.len() >= self.max_symbols || self.files.len() >= self.max_files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.identifiers.clear();
        self.relations.clear();
        self.files.clear();
        self.files_to_clean.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_symbol(name: &str) -> CodeSymbol {
        CodeSymbol {
            id: oc_core::SymbolId::generate("r", "a.py", name, 0, 1),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: oc_core::SymbolKind::Function,
            language: Language::Python,
            file_path: PathBuf::from("a.py"),
            byte_range: 0..1,
            line_range: 0..1,
            ..Default::default()
        }
    }

    fn make_file(path: &str) -> FileRecord {
        FileRecord { path: path.to_string(), language: Language::Python, content_hash: 1, size_bytes: 10 }
    }

    #[test]
    fn noise_filter_drops_short_names() {
        assert!(!is_useful_identifier("x"));
        assert!(is_useful_identifier("xx"));
    }

    #[test]
    fn noise_filter_drops_pure_digits() {
        assert!(!is_useful_identifier("123"));
        assert!(is_useful_identifier("v2"));
    }

    #[test]
    fn noise_filter_drops_keywords_case_insensitively() {
        assert!(!is_useful_identifier("self"));
        assert!(!is_useful_identifier("Self"));
        assert!(!is_useful_identifier("RETURN"));
        assert!(is_useful_identifier("return_value"));
    }

    #[test]
    fn add_result_tracks_files_to_clean_only_for_updated() {
        let mut buf = IndexingBuffer::new();
        buf.add_result(FileAction::Indexed, make_file("a.py"), vec![], vec![], vec![]);
        buf.add_result(FileAction::Updated, make_file("b.py"), vec![], vec![], vec![]);
        assert_eq!(buf.files_to_clean, vec!["b.py".to_string()]);
        assert_eq!(buf.files.len(), 2);
    }

    #[test]
    fn add_result_filters_noisy_identifiers() {
        let mut buf = IndexingBuffer::new();
        let useful = Identifier {
            id: oc_core::IdentifierId(1),
            workspace_id: "r".to_string(),
            name: "user_name".to_string(),
            kind: oc_core::SymbolKind::Reference,
            language: Language::Python,
            file_path: PathBuf::from("a.py"),
            byte_start: 0,
            byte_end: 1,
            line: 1,
            containing_symbol_id: None,
            target_symbol_id: None,
            confidence: 1.0,
            code_context: None,
        };
        let mut noisy = useful.clone();
        noisy.name = "if".to_string();
        buf.add_result(FileAction::Indexed, make_file("a.py"), vec![], vec![useful, noisy], vec![]);
        assert_eq!(buf.identifiers.len(), 1);
        assert_eq!(buf.identifiers[0].name, "user_name");
    }

    #[test]
    fn should_flush_on_symbol_threshold() {
        let mut buf = IndexingBuffer::with_limits(2, 100);
        buf.add_result(FileAction::Indexed, make_file("a.py"), vec![make_symbol("a"), make_symbol("b")], vec![], vec![]);
        assert!(buf.should_flush());
    }

    #[test]
    fn should_flush_on_file_threshold() {
        let mut buf = IndexingBuffer::with_limits(10_000, 2);
        buf.add_result(FileAction::Indexed, make_file("a.py"), vec![], vec![], vec![]);
        buf.add_result(FileAction::Indexed, make_file("b.py"), vec![], vec![], vec![]);
        assert!(buf.should_flush());
    }

    #[test]
    fn clear_resets_all_state() {
        let mut buf = IndexingBuffer::new();
        buf.add_result(FileAction::Updated, make_file("a.py"), vec![make_symbol("a")], vec![], vec![]);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.files_to_clean.is_empty());
    }
}
