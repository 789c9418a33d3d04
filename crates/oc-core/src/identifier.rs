use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

use crate::language::Language;
use crate::symbol::SymbolId;

/// Deterministic identifier id, computed as XXH3-128 of
/// `workspace_id|relative_path|name|byte_start|byte_end|identifier`.
///
/// The literal `identifier` in the hash input keeps this id space disjoint
/// from `SymbolId` even when spans coincide.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentifierId(pub u128);

impl IdentifierId {
    pub fn generate(
        workspace_id: &str,
        relative_path: &str,
        name: &str,
        byte_start: usize,
        byte_end: usize,
    ) -> Self {
        let input = format!(
            "{}|{}|{}|{}|{}|identifier",
            workspace_id, relative_path, name, byte_start, byte_end
        );
        Self(xxh3_128(input.as_bytes()))
    }

    pub fn as_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }
}

impl fmt::Debug for IdentifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentifierId({:032x})", self.0)
    }
}

impl fmt::Display for IdentifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A use-site of a symbol: may or may not be resolved to a target.
///
/// See spec §3 "Identifier". `target_symbol_id` is `None` for references
/// that could not be resolved within the current batch (cross-file or
/// cross-workspace references filled in later by the resolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub id: IdentifierId,
    pub workspace_id: String,
    pub name: String,
    pub kind: crate::symbol::SymbolKind,
    pub language: Language,
    pub file_path: PathBuf,
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: u32,
    /// The symbol scope in which this identifier appears. `None` for
    /// file-scope identifiers.
    pub containing_symbol_id: Option<SymbolId>,
    /// The resolved definition, if known.
    pub target_symbol_id: Option<SymbolId>,
    pub confidence: f32,
    pub code_context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_id_deterministic() {
        let a = IdentifierId::generate("ws1", "src/a.py", "foo", 10, 13);
        let b = IdentifierId::generate("ws1", "src/a.py", "foo", 10, 13);
        assert_eq!(a, b);
    }

    #[test]
    fn identifier_id_disjoint_from_symbol_id() {
        let ident = IdentifierId::generate("ws1", "src/a.py", "foo", 10, 13);
        let sym = SymbolId::generate("ws1", "src/a.py", "foo", 10, 13);
        assert_ne!(ident.0, sym.0);
    }
}
