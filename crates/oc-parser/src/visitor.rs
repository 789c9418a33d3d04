use std::path::Path;

use oc_core::{truncate_utf8_bytes, CodeRelation, CodeSymbol, Language};

use crate::body_hash::compute_body_hash;
use crate::error::ParserError;
use crate::file_check::{check_file_size, is_binary};
use crate::file_level::file_level_output;
use crate::registry::ParserRegistry;

mod go_lang;
mod java;
mod python;
mod rust_lang;
mod typescript;

/// Cap on how much of a symbol's body is retained in `body_text`.
const SYMBOL_BODY_TEXT_CAP: usize = 10 * 1024;

/// Output of parsing a single file: every symbol and relation it contains.
#[derive(Debug)]
pub struct ParseOutput {
    pub symbols: Vec<CodeSymbol>,
    pub relations: Vec<CodeRelation>,
}

/// Output from parsing a file that also retains the tree-sitter AST tree.
///
/// Used when both symbol extraction and a downstream AST consumer need the
/// same parse tree, avoiding a redundant re-parse.
pub struct ParseOutputWithTree {
    pub output: ParseOutput,
    /// The source code as a UTF-8 string.
    pub source: String,
    pub tree: Option<tree_sitter::Tree>,
    pub language: Language,
}

/// Parse a single source file, returning symbols, relations, and (when the
/// language has a tree-sitter visitor) the AST tree.
///
/// For languages with no wired visitor (`Language::has_visitor() == false`,
/// including unrecognized extensions routed to `Language::Text`), this
/// falls back to File-Level Indexing (§4.11) rather than erroring: the
/// workspace as a whole must still be searchable even when most of its
/// files are in languages the parser doesn't understand structurally.
#[tracing::instrument(skip(content), fields(language, symbol_count))]
pub fn parse_file_with_tree(
    workspace_id: &str,
    file_path: &str,
    content: &[u8],
    file_size: u64,
) -> Result<ParseOutputWithTree, ParserError> {
    check_file_size(file_path, file_size)?;
    check_file_size(file_path, content.len() as u64)?;

    if is_binary(content) {
        tracing::warn!(path = %file_path, reason = "binary", "file skipped");
        return Err(ParserError::InvalidEncoding {
            path: file_path.to_string(),
        });
    }

    let source = std::str::from_utf8(content).map_err(|_| ParserError::InvalidEncoding {
        path: file_path.to_string(),
    })?;

    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let language = ParserRegistry::language_for_extension(ext).unwrap_or(Language::Text);

    if !language.has_visitor() {
        let output = file_level_output(workspace_id, file_path, source, language);
        let span = tracing::Span::current();
        span.record("language", tracing::field::debug(&language));
        span.record("symbol_count", output.symbols.len());
        return Ok(ParseOutputWithTree {
            output,
            source: source.to_string(),
            tree: None,
            language,
        });
    }

    let grammar = ParserRegistry::grammar_for_extension(language, ext).ok_or_else(|| {
        ParserError::UnsupportedLanguage {
            path: file_path.to_string(),
        }
    })?;
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| ParserError::ParseFailed {
            path: file_path.to_string(),
            reason: format!("failed to set language: {e}"),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParserError::ParseFailed {
            path: file_path.to_string(),
            reason: "tree-sitter returned no tree".to_string(),
        })?;

    let ctx = VisitorContext {
        repo_id: workspace_id,
        file_path,
        source,
        language,
    };

    let mut output = match language {
        Language::Python => python::extract(&ctx, &tree),
        Language::TypeScript | Language::JavaScript => typescript::extract(&ctx, &tree),
        Language::Rust => rust_lang::extract(&ctx, &tree),
        Language::Go => go_lang::extract(&ctx, &tree),
        Language::Java => java::extract(&ctx, &tree),
        _ => unreachable!("has_visitor() guards this branch"),
    }?;

    for symbol in &mut output.symbols {
        symbol.workspace_id = workspace_id.to_string();
        if symbol.body_text.is_none() {
            let start = symbol.byte_range.start.min(source.len());
            let end = symbol.byte_range.end.min(source.len()).max(start);
            symbol.body_text = Some(truncate_utf8_bytes(&source[start..end], SYMBOL_BODY_TEXT_CAP).to_string());
        }
    }
    for relation in &mut output.relations {
        relation.workspace_id = workspace_id.to_string();
    }

    let span = tracing::Span::current();
    span.record("language", tracing::field::debug(&language));
    span.record("symbol_count", output.symbols.len());

    Ok(ParseOutputWithTree {
        output,
        source: source.to_string(),
        tree: Some(tree),
        language,
    })
}

/// Parse a single source file, returning extracted symbols and relations.
#[tracing::instrument(skip(content), fields(language, symbol_count))]
pub fn parse_file(
    workspace_id: &str,
    file_path: &str,
    content: &[u8],
    file_size: u64,
) -> Result<ParseOutput, ParserError> {
    parse_file_with_tree(workspace_id, file_path, content, file_size).map(|r| r.output)
}

/// Context shared by every per-language visitor.
pub(crate) struct VisitorContext<'a> {
    /// Workspace identifier, used to generate globally unique symbol ids.
    pub repo_id: &'a str,
    /// File path relative to the workspace root.
    pub file_path: &'a str,
    pub source: &'a str,
    pub language: Language,
}

impl<'a> VisitorContext<'a> {
    /// Extract the source text covered by a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Hash of the source bytes covered by a tree-sitter node, used for
    /// incremental change detection.
    pub fn body_hash(&self, node: tree_sitter::Node<'_>) -> u64 {
        let start = node.start_byte();
        let end = node.end_byte();
        compute_body_hash(&self.source.as_bytes()[start..end])
    }
}
