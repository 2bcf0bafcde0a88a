use async_trait::async_trait;

use ai_client::Message;

use crate::error::{GraphReadError, RagError};
use crate::types::Row;

/// Read-only access to the property graph.
///
/// Callers guarantee that no mutating clause reaches this interface; generated
/// queries must pass [`crate::validate_read_only`] first.
#[async_trait]
pub trait GraphReader: Send + Sync {
    async fn read(&self, cypher: &str, params: Row) -> Result<Vec<Row>, GraphReadError>;
}

/// Text → fixed-dimension vector.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Text → text completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, RagError>;

    /// Deterministic completion whose reply is a single JSON object.
    /// Backends without a JSON mode fall back to a plain completion.
    async fn complete_json(&self, system: &str, messages: &[Message]) -> Result<String, RagError> {
        self.complete(system, messages, 0.0).await
    }
}
