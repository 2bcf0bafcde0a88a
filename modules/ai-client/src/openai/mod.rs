mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::{ChatAgent, EmbedAgent, Message};

use client::OpenAiClient;
use types::{ChatRequest, WireMessage};

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    embedding_model: String,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: None,
            timeout: None,
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Per-request HTTP timeout applied to every call made by this agent.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the embedding model name.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub(crate) fn client(&self) -> Result<OpenAiClient, AiError> {
        let client = OpenAiClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    fn request(&self, system: &str, messages: &[Message], temperature: f32) -> ChatRequest {
        ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .messages(messages.iter().map(WireMessage::from))
            .sampling(temperature, DEFAULT_MAX_OUTPUT_TOKENS)
    }

    /// Chat completion constrained to a single JSON object, at temperature
    /// 0. Returns the object's text with any code fence removed; a reply
    /// that does not parse is an [`AiError::Parse`].
    pub async fn chat_json(&self, system: &str, messages: &[Message]) -> Result<String, AiError> {
        let request = self.request(system, messages, 0.0).json_object();
        let text = self.client()?.chat(&request).await?;
        let body = crate::util::strip_code_blocks(&text);
        serde_json::from_str::<serde_json::Value>(body)?;
        Ok(body.to_string())
    }
}

// =============================================================================
// ChatAgent Implementation
// =============================================================================

#[async_trait]
impl ChatAgent for OpenAi {
    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, AiError> {
        let request = self.request(system, messages, temperature);
        self.client()?.chat(&request).await
    }
}

// =============================================================================
// EmbedAgent Implementation
// =============================================================================

#[async_trait]
impl EmbedAgent for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        self.client()?.embed(&self.embedding_model, text).await
    }
}
