/// Retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("storage error: {0}")]
    Storage(#[from] oc_storage::error::StorageError),

    #[error("query error: {reason}")]
    QueryFailed { reason: String },

    #[error("fusion error: {reason}")]
    FusionFailed { reason: String },

    #[error("graph expansion failed: {reason}")]
    ExpansionFailed { reason: String },

    #[error("indexer error: {0}")]
    Indexer(#[from] oc_indexer::error::IndexerError),

    #[error("lifecycle error: {reason}")]
    LifecycleFailed { reason: String },
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Indexer(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn error_kind(&self) -> oc_core::ErrorKind {
        match self {
            Self::Storage(e) => e.error_kind(),
            Self::QueryFailed { .. } => oc_core::ErrorKind::Contract,
            Self::FusionFailed { .. } => oc_core::ErrorKind::Fatal,
            Self::ExpansionFailed { .. } => oc_core::ErrorKind::Transient,
            Self::Indexer(e) => e.error_kind(),
            Self::LifecycleFailed { .. } => oc_core::ErrorKind::Fatal,
        }
    }
}
