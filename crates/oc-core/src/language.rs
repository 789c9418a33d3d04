use serde::{Deserialize, Serialize};

/// Supported programming languages.
///
/// The first six variants have a tree-sitter grammar wired in `oc-parser`
/// and produce real symbols/relations. The rest are recognized by
/// extension for routing, metadata, and cross-language naming-variant
/// matching, but have no visitor: files in those languages are indexed
/// at file level (see `oc_indexer`'s file-level indexing path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Language {
    Python = 0,
    TypeScript = 1,
    JavaScript = 2,
    Rust = 3,
    Go = 4,
    Java = 5,
    C = 6,
    Cpp = 7,
    CSharp = 8,
    Ruby = 9,
    Php = 10,
    Bash = 11,
    Html = 12,
    Css = 13,
    Json = 14,
    Yaml = 15,
    Toml = 16,
    Sql = 17,
    Markdown = 18,
    Text = 19,
}

impl Language {
    /// Whether `oc-parser` has a tree-sitter visitor for this language.
    pub fn has_visitor(self) -> bool {
        matches!(
            self,
            Self::Python
                | Self::TypeScript
                | Self::JavaScript
                | Self::Rust
                | Self::Go
                | Self::Java
        )
    }

    /// Map a file extension to a Language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Self::Python),
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            "c" | "h" => Some(Self::C),
            "cc" | "cpp" | "cxx" | "hpp" | "hxx" => Some(Self::Cpp),
            "cs" => Some(Self::CSharp),
            "rb" => Some(Self::Ruby),
            "php" => Some(Self::Php),
            "sh" | "bash" => Some(Self::Bash),
            "html" | "htm" => Some(Self::Html),
            "css" | "scss" | "sass" => Some(Self::Css),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "sql" => Some(Self::Sql),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// The separator used in qualified names for this language.
    pub fn native_separator(self) -> &'static str {
        match self {
            Self::Rust | Self::Cpp | Self::CSharp => "::",
            Self::Go | Self::Php => ".",
            _ => ".",
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Python),
            1 => Some(Self::TypeScript),
            2 => Some(Self::JavaScript),
            3 => Some(Self::Rust),
            4 => Some(Self::Go),
            5 => Some(Self::Java),
            6 => Some(Self::C),
            7 => Some(Self::Cpp),
            8 => Some(Self::CSharp),
            9 => Some(Self::Ruby),
            10 => Some(Self::Php),
            11 => Some(Self::Bash),
            12 => Some(Self::Html),
            13 => Some(Self::Css),
            14 => Some(Self::Json),
            15 => Some(Self::Yaml),
            16 => Some(Self::Toml),
            17 => Some(Self::Sql),
            18 => Some(Self::Markdown),
            19 => Some(Self::Text),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Bash => "bash",
            Self::Html => "html",
            Self::Css => "css",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Sql => "sql",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}
