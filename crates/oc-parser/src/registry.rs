use oc_core::Language;
use tree_sitter::Language as TSLanguage;

/// Maps file extensions to tree-sitter grammars and Language enums.
pub struct ParserRegistry;

impl ParserRegistry {
    /// Get the tree-sitter grammar for a given Language and file extension,
    /// if one is wired up. The extension is needed because TypeScript/
    /// JavaScript have both regular and TSX grammars. Returns `None` for
    /// languages with no visitor (`Language::has_visitor() == false`); the
    /// caller falls through to file-level indexing (§4.11).
    pub fn grammar_for_extension(lang: Language, ext: &str) -> Option<TSLanguage> {
        let grammar = match lang {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::TypeScript => {
                if ext == "tsx" {
                    tree_sitter_typescript::LANGUAGE_TSX.into()
                } else {
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
                }
            }
            Language::JavaScript => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            _ => return None,
        };
        Some(grammar)
    }

    /// Resolve a file extension to a Language.
    /// Delegates to `Language::from_extension`.
    pub fn language_for_extension(ext: &str) -> Option<Language> {
        Language::from_extension(ext)
    }
}
