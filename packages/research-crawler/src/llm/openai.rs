//! OpenAI implementation of [`CompletionBackend`].

use async_trait::async_trait;
use openai_client::{normalize_schema, OpenAIClient, StructuredRequest};
use tracing::debug;

use crate::completion::{CompletionBackend, CompletionError, CompletionRequest, RawCompletion};

pub struct OpenAiBackend {
    client: OpenAIClient,
    model: String,
}

impl OpenAiBackend {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Client from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, CompletionError> {
        let client = OpenAIClient::from_env().map_err(CompletionError::transport)?;
        Ok(Self::new(client, model))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_json(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<RawCompletion, CompletionError> {
        let schema = normalize_schema(request.schema.clone());
        let structured = StructuredRequest::new(
            &self.model,
            request.instruction,
            request.content,
            schema,
        )
        .with_schema_name(request.schema_name);

        let response = self
            .client
            .structured_output(structured)
            .await
            .map_err(|e| {
                debug!(transient = e.is_transient(), error = %e, "OpenAI structured output failed");
                CompletionError::transport(e)
            })?;

        if response.content.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        let content = serde_json::from_str(&response.content)
            .map_err(|e| CompletionError::transport(format!("model returned malformed JSON: {e}")))?;

        Ok(RawCompletion {
            content,
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
        })
    }
}
