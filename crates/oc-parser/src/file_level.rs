use std::path::{Path, PathBuf};

use oc_core::{truncate_utf8_bytes, CodeSymbol, Language, SymbolId, SymbolKind};

use crate::visitor::ParseOutput;

/// Cap on how much of a file's content is kept for embedding/FTS on the
/// synthetic file-level symbol (§4.11).
const FILE_LEVEL_CONTENT_CAP: usize = 10 * 1024;

/// Build the single synthetic symbol that stands in for a file with no
/// tree-sitter visitor (unknown extension, or a recognized but
/// visitor-less language such as HTML/CSS/JSON).
///
/// Id is derived from a hash of the path, name is the basename, kind is
/// File, the line range spans the whole file, and content is truncated
/// to 10 KiB for embedding and full-text indexing.
pub fn file_level_output(
    workspace_id: &str,
    relative_path: &str,
    content: &str,
    language: Language,
) -> ParseOutput {
    let id = SymbolId::generate_file_level(workspace_id, relative_path);
    let name = Path::new(relative_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(relative_path)
        .to_string();
    let line_count = content.lines().count().max(1) as u32;
    let truncated = truncate_utf8_bytes(content, FILE_LEVEL_CONTENT_CAP);
    let body_hash = crate::body_hash::compute_body_hash(truncated.as_bytes());

    let symbol = CodeSymbol {
        id,
        workspace_id: workspace_id.to_string(),
        name: name.clone(),
        qualified_name: name,
        kind: SymbolKind::File,
        language,
        file_path: PathBuf::from(relative_path),
        byte_range: 0..content.len(),
        line_range: 0..line_count,
        body_hash,
        body_text: Some(truncated.to_string()),
        ..Default::default()
    };

    ParseOutput {
        symbols: vec![symbol],
        relations: Vec::new(),
    }
}
