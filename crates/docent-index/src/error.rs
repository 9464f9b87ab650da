//! Error types for docent-index.

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The project id is unknown to the store.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// The document id is unknown to the store.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The store could not be reached.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// A read did not finish within the configured timeout.
    #[error("timed out reading {0}")]
    Timeout(String),

    /// IO error reading documents from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same read could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Io(_))
    }
}

/// Errors that can occur while building, loading, or querying indexes.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error on persisted index artifacts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Embedding provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] docent_llm::LlmError),

    /// BM25 engine error.
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Document store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Lexical search requested on an index marked unavailable.
    #[error("lexical index unavailable: {0}")]
    LexicalUnavailable(String),

    /// Embedding call exceeded its timeout.
    #[error("embedding timed out after {0}s")]
    Timeout(u64),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
