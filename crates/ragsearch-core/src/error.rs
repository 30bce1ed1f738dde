use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Transient failure of an external collaborator.
///
/// A timeout is treated exactly like a connection failure by every fallback
/// path; the variants only exist so logs can tell them apart.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed backend payload: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn malformed(err: impl std::fmt::Display) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors surfaced by the search orchestrator to its caller.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("no retrieval backend could serve the request (vector: {vector}; lexical: {lexical})")]
    RetrievalUnavailable { vector: String, lexical: String },

    #[error("search cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// Run a backend call under a deadline, folding the elapsed deadline into
/// [`BackendError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> std::result::Result<T, BackendError>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}
