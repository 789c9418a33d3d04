use std::path::PathBuf;

/// Errors from oc-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("hash computation failed for {path}: {reason}")]
    HashFailed { path: PathBuf, reason: String },

    #[error("invalid ordinal {ordinal} for {type_name}")]
    InvalidOrdinal {
        type_name: &'static str,
        ordinal: u8,
    },

    #[error("type conversion failed: {reason}")]
    ConversionFailed { reason: String },
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::Contract
    }
}

/// The four error-handling policy kinds from the engine's error design:
/// each crate's top-level error type classifies into one of these via an
/// `error_kind()` method, driving how the caller reacts (log-and-skip,
/// structured response, rollback, or fail-fast).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File read errors, DB busy-timeouts, embedder OOM: log, skip, continue.
    Transient,
    /// Invalid tool input: return a structured error, never panic.
    Contract,
    /// FK violation, hash mismatch, schema drift: roll back, log, keep serving.
    Integrity,
    /// Cannot open stores / enable WAL at startup: fail fast.
    Fatal,
}
