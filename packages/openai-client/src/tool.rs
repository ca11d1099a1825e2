//! Function calling: typed tools the model can invoke during a conversation.
//!
//! A [`Tool`] declares its argument type; the JSON schema sent to the API is
//! derived from it, and the model's argument string is parsed back into it.
//! [`ErasedTool`] lets an [`crate::Agent`] hold tools of different types.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::schema::StructuredOutput;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name the model calls this tool by.
    const NAME: &'static str;

    type Args: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Tells the model when to reach for this tool.
    fn description(&self) -> &str;

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: self.description().to_string(),
            parameters: Self::Args::openai_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Strict-mode schema of the arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Entry for the request's `tools` array.
    pub fn to_openai_format(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// A call the model asked for, as it appears in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON object text. Some models send an empty string for no arguments.
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn parse_args<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let arguments = self.function.arguments.trim();
        serde_json::from_str(if arguments.is_empty() { "{}" } else { arguments })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    Arguments(String),

    #[error("tool failed: {0}")]
    Execution(String),

    #[error("output is not serializable: {0}")]
    Output(String),
}

/// Object-safe view of a [`Tool`]: JSON text in, JSON text out.
#[async_trait]
pub trait ErasedTool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn call_json(&self, call: &ToolCall) -> Result<String, ToolError>;
}

#[async_trait]
impl<T: Tool> ErasedTool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_json(&self, call: &ToolCall) -> Result<String, ToolError> {
        let args: T::Args = call
            .parse_args()
            .map_err(|e| ToolError::Arguments(e.to_string()))?;

        let output = self
            .call(args)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        serde_json::to_string(&output).map_err(|e| ToolError::Output(e.to_string()))
    }
}
