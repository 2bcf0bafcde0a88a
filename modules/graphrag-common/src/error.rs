use std::time::Duration;

use thiserror::Error;

/// Failures the retrieval pipeline distinguishes between.
///
/// "No evidence" is not an error: it is an empty fact set and an
/// `I don't know.` answer.
#[derive(Error, Debug, Clone)]
pub enum RagError {
    /// Graph, embedding, or generation endpoint unreachable or timed out.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Generated query failed the read-only safety grammar. Never retried.
    #[error("Generated query rejected: {0}")]
    ValidationRejected(String),

    /// Generated query passed validation but the executor returned an error.
    #[error("Generated query failed: {0}")]
    ExecutionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors surfaced by a [`crate::GraphReader`].
#[derive(Error, Debug, Clone)]
pub enum GraphReadError {
    #[error("Graph unavailable: {0}")]
    Unavailable(String),

    #[error("Graph query error: {0}")]
    Query(String),

    #[error("Graph read timed out after {0:?}")]
    Timeout(Duration),
}

impl From<GraphReadError> for RagError {
    fn from(e: GraphReadError) -> Self {
        RagError::UpstreamUnavailable(e.to_string())
    }
}

impl From<ai_client::AiError> for RagError {
    fn from(e: ai_client::AiError) -> Self {
        match e {
            ai_client::AiError::Config(msg) => RagError::Config(msg),
            other => RagError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl RagError {
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, RagError::UpstreamUnavailable(_))
    }
}
