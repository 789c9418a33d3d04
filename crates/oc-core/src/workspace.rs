use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Whether a workspace is the primary indexed project or a read-only
/// reference workspace pulled in for cross-workspace lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkspaceType {
    Primary,
    Reference,
}

impl WorkspaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Reference => "reference",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Derive a stable `workspace_id`: a slug of the root directory's basename
/// plus an 8-hex-char content-derived suffix (XXH3-64 of the absolute path,
/// lower 32 bits), so two checkouts named the same thing never collide.
pub fn derive_workspace_id(root_basename: &str, absolute_path: &str) -> String {
    let slug = slugify(root_basename);
    let hash = xxh3_64(absolute_path.as_bytes());
    format!("{slug}-{:08x}", (hash & 0xFFFF_FFFF) as u32)
}

fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_dash = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("workspace");
    }
    out
}

/// Build a qualified path `"{workspace_id}:{relative_unix_path}"`.
///
/// `relative_path` is normalized to forward slashes regardless of host OS,
/// per spec §3's invariant that all persisted paths use `/` separators.
pub fn qualify_path(workspace_id: &str, relative_path: &str) -> String {
    let normalized = relative_path.replace('\\', "/");
    format!("{workspace_id}:{normalized}")
}

/// Split a qualified path back into `(workspace_id, relative_path)`.
///
/// Returns `None` if there is no `:` separator.
pub fn split_qualified_path(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once(':')
}
