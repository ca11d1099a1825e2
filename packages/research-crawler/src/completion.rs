//! Structured completion: typed LLM output with retry and validation.
//!
//! The backend is a black box that takes an instruction, a body and a JSON
//! schema and returns a JSON payload with token counts. This module owns the
//! retry discipline and turns the payload into a typed value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::values::{LlmResponseMetadata, ReviewStatus};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The backend call failed (network, API, refusal)
    #[error("completion request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The payload does not match the requested type
    #[error("model output is not a valid {type_name}: {source}")]
    Validation {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model returned an empty response")]
    EmptyResponse,
}

impl CompletionError {
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transport(err.into())
    }
}

/// One structured request as seen by a backend.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Short identifier for the schema, e.g. `page_extraction`.
    pub schema_name: &'a str,
    /// Instruction text. This is what gets stored as the prompt.
    pub instruction: &'a str,
    /// The material to work on (page markdown, page summaries).
    pub content: &'a str,
    /// JSON schema generated from the target type.
    pub schema: &'a Value,
}

/// Raw backend output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub content: Value,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model(&self) -> &str;

    async fn complete_json(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<RawCompletion, CompletionError>;
}

/// Retry settings for backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// A typed value plus the metadata stored alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    pub value: T,
    pub metadata: LlmResponseMetadata,
}

#[derive(Clone)]
pub struct StructuredCompletion {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
}

impl StructuredCompletion {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Ask the backend for a `T`.
    ///
    /// Backend errors are retried up to the policy's attempt count with a
    /// fixed sleep in between; the last error is returned as is. The stored
    /// prompt is the instruction alone.
    pub async fn complete<T>(
        &self,
        schema_name: &str,
        instruction: &str,
        content: &str,
    ) -> Result<Completion<T>, CompletionError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
        let request = CompletionRequest {
            schema_name,
            instruction,
            content,
            schema: &schema,
        };

        let raw = self.request_with_retry(request).await?;
        let value = validate::<T>(raw.content)?;

        Ok(Completion {
            value,
            metadata: LlmResponseMetadata {
                input_tokens: raw.input_tokens,
                output_tokens: raw.output_tokens,
                prompt: instruction.to_string(),
                model: self.backend.model().to_string(),
                review_status: ReviewStatus::Unreviewed,
            },
        })
    }

    async fn request_with_retry(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<RawCompletion, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.backend.complete_json(request).await {
                Ok(raw) => return Ok(raw),
                Err(err) if attempt < self.retry.max_attempts => {
                    warn!(
                        schema = request.schema_name,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        backoff_secs = self.retry.backoff.as_secs(),
                        error = %err,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Deserialize the payload, unwrapping a single-key envelope once if the
/// payload itself does not fit.
fn validate<T: DeserializeOwned>(content: Value) -> Result<T, CompletionError> {
    if content.is_null() {
        return Err(CompletionError::EmptyResponse);
    }

    let err = match serde_json::from_value::<T>(content.clone()) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if let Value::Object(map) = &content {
        if map.len() == 1 {
            if let Some((key, inner)) = map.iter().next() {
                if let Ok(value) = serde_json::from_value::<T>(inner.clone()) {
                    debug!(envelope = %key, "Unwrapped single-key completion payload");
                    return Ok(value);
                }
            }
        }
    }

    Err(CompletionError::Validation {
        type_name: std::any::type_name::<T>().to_string(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Notes {
        summary: String,
        score: u32,
    }

    fn completion(backend: &ScriptedBackend) -> StructuredCompletion {
        StructuredCompletion::new(Arc::new(backend.clone()))
            .with_retry(RetryPolicy::new().with_backoff(Duration::ZERO))
    }

    #[tokio::test]
    async fn returns_value_and_metadata() {
        let backend = ScriptedBackend::new()
            .with_response(json!({ "summary": "ok", "score": 3 }), 120, 15);

        let result = completion(&backend)
            .complete::<Notes>("notes", "Summarize", "page body")
            .await
            .unwrap();

        assert_eq!(result.value, Notes { summary: "ok".into(), score: 3 });
        assert_eq!(result.metadata.input_tokens, 120);
        assert_eq!(result.metadata.output_tokens, 15);
        assert_eq!(result.metadata.prompt, "Summarize");
        assert_eq!(result.metadata.model, "scripted-model");
        assert_eq!(result.metadata.review_status, ReviewStatus::Unreviewed);

        let requests = backend.requests();
        assert_eq!(requests[0].content, "page body");
        assert!(requests[0].schema.get("properties").is_some());
    }

    #[tokio::test]
    async fn retries_transport_errors() {
        let backend = ScriptedBackend::new()
            .with_error("rate limited")
            .with_error("rate limited")
            .with_response(json!({ "summary": "third time", "score": 1 }), 1, 1);

        let result = completion(&backend)
            .complete::<Notes>("notes", "Summarize", "body")
            .await
            .unwrap();

        assert_eq!(result.value.summary, "third time");
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_with_last_error() {
        let backend = ScriptedBackend::new()
            .with_error("first")
            .with_error("second")
            .with_error("third")
            .with_response(json!({ "summary": "never", "score": 0 }), 1, 1);

        let err = completion(&backend)
            .complete::<Notes>("notes", "Summarize", "body")
            .await
            .unwrap_err();

        assert!(matches!(&err, CompletionError::Transport(inner) if inner.to_string() == "third"));
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn unwraps_single_key_envelope() {
        let backend = ScriptedBackend::new().with_response(
            json!({ "$ref": { "summary": "wrapped", "score": 2 } }),
            1,
            1,
        );

        let result = completion(&backend)
            .complete::<Notes>("notes", "Summarize", "body")
            .await
            .unwrap();

        assert_eq!(result.value.summary, "wrapped");
    }

    #[tokio::test]
    async fn rejects_invalid_payload_without_retrying() {
        let backend = ScriptedBackend::new()
            .with_response(json!({ "summary": "missing score" }), 1, 1)
            .with_response(json!({ "summary": "unused", "score": 1 }), 1, 1);

        let err = completion(&backend)
            .complete::<Notes>("notes", "Summarize", "body")
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Validation { .. }));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn null_payload_is_empty_response() {
        let backend = ScriptedBackend::new().with_response(Value::Null, 1, 0);

        let err = completion(&backend)
            .complete::<Notes>("notes", "Summarize", "body")
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::EmptyResponse));
    }

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(120));
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts, 1);
    }
}
