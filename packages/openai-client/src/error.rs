//! Error types for the OpenAI client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpenAIError>;

#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Missing API key or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response, or a response with no usable choice
    #[error("API error: {0}")]
    Api(String),

    /// Response body was not the expected JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// An agent used up its model round trips without a final answer
    #[error("No answer after {0} tool-calling iterations")]
    IterationLimit(usize),
}

impl OpenAIError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_transient() {
        assert!(!OpenAIError::Config("OPENAI_API_KEY not set".into()).is_transient());
        assert!(OpenAIError::Network("timeout".into()).is_transient());
    }
}
