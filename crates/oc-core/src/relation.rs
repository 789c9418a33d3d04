use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// Kinds of relationships between code symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RelationKind {
    Calls = 0,
    Imports = 1,
    Extends = 2,
    Implements = 3,
    References = 4,
    Contains = 5,
    Returns = 6,
    Parameter = 7,
}

impl RelationKind {
    /// Fixed confidence score for tree-sitter extracted relations.
    pub fn default_confidence(self) -> f32 {
        match self {
            Self::Calls => 0.8,
            Self::Imports => 0.9,
            Self::Extends => 0.85,
            Self::Implements => 0.85,
            Self::References => 0.7,
            Self::Contains => 0.95,
            Self::Returns => 0.75,
            Self::Parameter => 0.75,
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Calls),
            1 => Some(Self::Imports),
            2 => Some(Self::Extends),
            3 => Some(Self::Implements),
            4 => Some(Self::References),
            5 => Some(Self::Contains),
            6 => Some(Self::Returns),
            7 => Some(Self::Parameter),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Singular, Title-case display name, per the Trace Engine's
    /// relationship-kind-capitalization normalization (§4.9).
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Calls => "Call",
            Self::Imports => "Import",
            Self::Extends => "Extends",
            Self::Implements => "Implements",
            Self::References => "Reference",
            Self::Contains => "Contains",
            Self::Returns => "Returns",
            Self::Parameter => "Parameter",
        }
    }
}

/// A relationship between two code symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRelation {
    pub source_id: SymbolId,
    pub target_id: SymbolId,
    pub kind: RelationKind,
    /// File where the relation was observed.
    pub file_path: PathBuf,
    /// 0-indexed line number.
    pub line: u32,
    pub confidence: f32,
    /// Relationships may cross workspaces; this is the workspace of the
    /// relation's source symbol.
    pub workspace_id: String,
}
