use thiserror::Error;

use crate::quota::QuotaResource;

/// All errors surfaced by the pipeline.
///
/// `QuotaExceeded` is an expected, user-visible outcome: a denial is
/// raised before any provider budget is spent, and the orchestrator
/// surfaces it through the response's error message.
#[derive(Error, Debug, Clone)]
pub enum ShortstackError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("embedding dimension mismatch: provider declares {expected}, got {got}")]
    EmbeddingDimension { expected: usize, got: usize },

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("index dimension mismatch: expected {expected}, got {got}")]
    IndexDimensionMismatch { expected: usize, got: usize },

    #[error("generation provider error: {0}")]
    GenerationProvider(String),

    #[error("quota exceeded for {resource}: limit {limit} per period")]
    QuotaExceeded { resource: QuotaResource, limit: u32 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("index error: {0}")]
    Index(String),
}

pub type Result<T> = std::result::Result<T, ShortstackError>;

impl From<std::io::Error> for ShortstackError {
    fn from(e: std::io::Error) -> Self {
        ShortstackError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ShortstackError {
    fn from(e: serde_json::Error) -> Self {
        ShortstackError::Storage(e.to_string())
    }
}

impl ShortstackError {
    /// Whether a bounded local retry may help. Dimension mismatches and
    /// config errors are deterministic and never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShortstackError::EmbeddingProvider(_)
                | ShortstackError::GenerationProvider(_)
                | ShortstackError::Storage(_)
        )
    }
}
