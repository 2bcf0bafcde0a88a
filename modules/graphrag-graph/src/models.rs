use std::time::Duration;

use async_trait::async_trait;

use ai_client::{ChatAgent, EmbedAgent, Message, OpenAi};
use graphrag_common::{Config, RagError, TextEmbedder, TextGenerator};

/// Binds the OpenAI-compatible client to the pipeline's embedding and
/// generation seams, each call bounded by its own timeout.
#[derive(Clone)]
pub struct ModelGateway {
    ai: OpenAi,
    embed_timeout: Duration,
    generation_timeout: Duration,
}

impl ModelGateway {
    pub fn new(ai: OpenAi, embed_timeout: Duration, generation_timeout: Duration) -> Self {
        Self {
            ai,
            embed_timeout,
            generation_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut ai = OpenAi::new(&config.openai_api_key, &config.chat_model)
            .with_embedding_model(&config.embedding_model);
        if let Some(url) = &config.openai_base_url {
            ai = ai.with_base_url(url);
        }
        Self::new(ai, config.embed_timeout, config.generation_timeout)
    }

    pub fn chat_model(&self) -> &str {
        self.ai.model()
    }

    pub fn embedding_model(&self) -> &str {
        self.ai.embedding_model()
    }
}

#[async_trait]
impl TextEmbedder for ModelGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let vector = tokio::time::timeout(self.embed_timeout, self.ai.embed(text))
            .await
            .map_err(|_| timed_out("embedding", self.embed_timeout))??;
        Ok(vector)
    }
}

#[async_trait]
impl TextGenerator for ModelGateway {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, RagError> {
        let text = tokio::time::timeout(
            self.generation_timeout,
            self.ai.chat(system, messages, temperature),
        )
        .await
        .map_err(|_| timed_out("generation", self.generation_timeout))??;
        Ok(text)
    }

    async fn complete_json(&self, system: &str, messages: &[Message]) -> Result<String, RagError> {
        let text = tokio::time::timeout(self.generation_timeout, self.ai.chat_json(system, messages))
            .await
            .map_err(|_| timed_out("generation", self.generation_timeout))??;
        Ok(text)
    }
}

fn timed_out(what: &str, after: Duration) -> RagError {
    RagError::UpstreamUnavailable(format!("{what} timed out after {after:?}"))
}
