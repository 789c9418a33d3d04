/// Parser errors.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("unsupported language for file: {path}")]
    UnsupportedLanguage { path: String },

    #[error("file too large ({size} bytes, max {max}): {path}")]
    FileTooLarge { path: String, size: u64, max: u64 },

    #[error("invalid encoding (non-UTF-8): {path}")]
    InvalidEncoding { path: String },

    #[error("parse failed for {path}: {reason}")]
    ParseFailed { path: String, reason: String },
}

impl ParserError {
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn error_kind(&self) -> oc_core::ErrorKind {
        match self {
            Self::UnsupportedLanguage { .. } | Self::FileTooLarge { .. } | Self::InvalidEncoding { .. } => {
                oc_core::ErrorKind::Transient
            }
            Self::ParseFailed { .. } => oc_core::ErrorKind::Transient,
        }
    }
}
