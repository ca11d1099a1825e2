//! Minimal OpenAI REST client.
//!
//! Covers what the research crawler needs from chat completions: strict
//! `json_schema` structured output (JSON text plus token usage), and a
//! tool-calling [`Agent`] for answering questions over crawled data.
//!
//! # Example
//!
//! ```rust,ignore
//! use openai_client::{OpenAIClient, StructuredRequest, StructuredOutput};
//!
//! let client = OpenAIClient::from_env()?;
//! let schema = PageNotes::openai_schema();
//! let response = client
//!     .structured_output(StructuredRequest::new("gpt-4o", system, user, schema))
//!     .await?;
//! println!("{} ({} prompt tokens)", response.content, response.usage.prompt_tokens);
//! ```

pub mod agent;
pub mod error;
pub mod schema;
pub mod tool;
pub mod types;

pub use agent::{Agent, AgentBuilder, AgentReply};
pub use error::{OpenAIError, Result};
pub use schema::{normalize_schema, StructuredOutput};
pub use tool::{ErasedTool, FunctionCall, Tool, ToolCall, ToolDefinition, ToolError};
pub use types::*;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};
use types::{ChatResponseRaw, ToolRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| OpenAIError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start building a tool-calling agent on this client.
    pub fn agent(&self, model: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(self.clone(), model)
    }

    /// Structured output with a strict JSON schema.
    ///
    /// Returns the raw JSON text the model produced together with token usage.
    /// Usage is zeroed when the API omits it.
    pub async fn structured_output(&self, request: StructuredRequest) -> Result<StructuredResponse> {
        let start = std::time::Instant::now();
        let raw = self.post_chat(&request).await?;
        let (message, usage) = first_message(raw)?;
        let content = message
            .content
            .ok_or_else(|| OpenAIError::Api("Model returned no content".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            "OpenAI structured output"
        );

        Ok(StructuredResponse {
            content: strip_code_blocks(&content).to_string(),
            usage: usage.unwrap_or_default(),
        })
    }

    /// One model turn of a tool-calling conversation.
    pub(crate) async fn chat_turn(&self, request: &ToolRequest<'_>) -> Result<Message> {
        let raw = self.post_chat(request).await?;
        let (message, usage) = first_message(raw)?;
        debug!(
            model = request.model,
            tool_calls = message.tool_calls.len(),
            prompt_tokens = usage.map(|u| u.prompt_tokens),
            "OpenAI chat turn"
        );
        Ok(message)
    }

    async fn post_chat<B: Serialize>(&self, body: &B) -> Result<ChatResponseRaw> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                OpenAIError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(OpenAIError::Api(format!("{}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))
    }
}

fn first_message(raw: ChatResponseRaw) -> Result<(Message, Option<Usage>)> {
    let message = raw
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| OpenAIError::Api("No response from OpenAI".into()))?;
    Ok((message, raw.usage))
}
