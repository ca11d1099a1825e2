//! Conversation loop that runs the model's tool calls until it answers.
//!
//! ```rust,ignore
//! let reply = client
//!     .agent("gpt-4o")
//!     .system("You answer questions about crawled research sources")
//!     .tool(ListCrawledSources::new(knowledge))
//!     .max_iterations(5)
//!     .build()
//!     .chat("Which sources cover river pollution?")
//!     .await?;
//! ```

use tracing::{debug, info, warn};

use crate::tool::{ErasedTool, Tool, ToolCall};
use crate::types::{Message, Role, ToolRequest};
use crate::{OpenAIClient, OpenAIError, Result};

const DEFAULT_MAX_ITERATIONS: usize = 10;

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub(crate) fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            agent: Agent {
                client,
                model: model.into(),
                system_prompt: None,
                tools: Vec::new(),
                max_iterations: DEFAULT_MAX_ITERATIONS,
                temperature: None,
            },
        }
    }

    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.agent.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.agent.tools.push(Box::new(tool));
        self
    }

    /// Model round trips allowed per chat. Reaching the limit while the model
    /// still asks for tools fails with [`OpenAIError::IterationLimit`].
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.agent.max_iterations = max;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.agent.temperature = Some(temperature);
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

pub struct Agent {
    client: OpenAIClient,
    model: String,
    system_prompt: Option<String>,
    tools: Vec<Box<dyn ErasedTool>>,
    max_iterations: usize,
    temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct AgentReply {
    pub content: String,
    /// Tool names in the order the model called them.
    pub tools_called: Vec<String>,
    /// Model round trips, the final answer included.
    pub iterations: usize,
}

impl Agent {
    pub async fn chat(&self, user_message: impl Into<String>) -> Result<AgentReply> {
        self.chat_with_history(vec![Message::user(user_message)])
            .await
    }

    /// Continue an earlier conversation. The system prompt goes first unless
    /// the history already opens with a system message.
    pub async fn chat_with_history(&self, messages: Vec<Message>) -> Result<AgentReply> {
        let mut messages = self.with_system_prompt(messages);
        let definitions: Vec<serde_json::Value> = self
            .tools
            .iter()
            .map(|t| t.definition().to_openai_format())
            .collect();
        let mut tools_called = Vec::new();

        for iteration in 1..=self.max_iterations {
            let request = ToolRequest {
                model: &self.model,
                messages: &messages,
                tools: definitions.clone(),
                tool_choice: (!definitions.is_empty()).then_some("auto"),
                temperature: self.temperature,
            };
            let reply = self.client.chat_turn(&request).await?;

            if reply.tool_calls.is_empty() {
                info!(
                    iterations = iteration,
                    tool_calls = tools_called.len(),
                    "Agent answered"
                );
                return Ok(AgentReply {
                    content: reply.content.unwrap_or_default(),
                    tools_called,
                    iterations: iteration,
                });
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in &calls {
                debug!(tool = %call.function.name, arguments = %call.function.arguments, "Running tool");
                tools_called.push(call.function.name.clone());
                let output = self.run_tool(call).await;
                messages.push(Message::tool_result(&call.id, output));
            }
        }

        warn!(max_iterations = self.max_iterations, "Agent still calling tools at the limit");
        Err(OpenAIError::IterationLimit(self.max_iterations))
    }

    fn with_system_prompt(&self, mut messages: Vec<Message>) -> Vec<Message> {
        if let Some(system) = &self.system_prompt {
            let has_system = messages.first().is_some_and(|m| m.role == Role::System);
            if !has_system {
                messages.insert(0, Message::system(system.as_str()));
            }
        }
        messages
    }

    /// Tool output, or an error text the model can read and recover from.
    async fn run_tool(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.function.name) else {
            warn!(tool = %call.function.name, "Model called an unknown tool");
            return format!("Error: unknown tool '{}'", call.function.name);
        };

        match tool.call_json(call).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.function.name, error = %e, "Tool failed");
                format!("Error: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FunctionCall;
    use async_trait::async_trait;
    use mockito::Matcher;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct LookupArgs {
        topic: String,
    }

    struct Lookup;

    #[async_trait]
    impl Tool for Lookup {
        const NAME: &'static str = "lookup";
        type Args = LookupArgs;
        type Output = Vec<String>;
        type Error = std::convert::Infallible;

        fn description(&self) -> &str {
            "Look up notes on a topic"
        }

        async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
            Ok(vec![format!("{} levels rose in 2021", args.topic)])
        }
    }

    fn tool_call_body(name: &str, arguments: &str) -> String {
        serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": name, "arguments": arguments }
                    }]
                }
            }]
        })
        .to_string()
    }

    fn answer_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_runs_tools_then_answers() {
        let mut server = mockito::Server::new_async().await;
        // The question is still the last message only on the first turn
        let first = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(r#""content":"How are rivers doing\?"\}\]"#.into()))
            .with_header("content-type", "application/json")
            .with_body(tool_call_body("lookup", r#"{"topic":"river"}"#))
            .create_async()
            .await;
        let second = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""role":"tool""#.into()),
                Matcher::Regex("river levels rose in 2021".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(answer_body("River levels rose in 2021."))
            .create_async()
            .await;

        let client = OpenAIClient::new("sk-test").with_base_url(server.url());
        let reply = client
            .agent("gpt-4o")
            .system("Answer from your notes")
            .tool(Lookup)
            .build()
            .chat("How are rivers doing?")
            .await
            .unwrap();

        assert_eq!(reply.content, "River levels rose in 2021.");
        assert_eq!(reply.tools_called, vec!["lookup"]);
        assert_eq!(reply.iterations, 2);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_stops_at_iteration_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_header("content-type", "application/json")
            .with_body(tool_call_body("lookup", r#"{"topic":"lake"}"#))
            .expect(2)
            .create_async()
            .await;

        let client = OpenAIClient::new("sk-test").with_base_url(server.url());
        let result = client
            .agent("gpt-4o")
            .tool(Lookup)
            .max_iterations(2)
            .build()
            .chat("Keep looking")
            .await;

        assert!(matches!(result, Err(OpenAIError::IterationLimit(2))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_the_model() {
        let agent = OpenAIClient::new("sk-test").agent("gpt-4o").tool(Lookup).build();
        let call = ToolCall {
            id: "call_9".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "delete_everything".to_string(),
                arguments: "{}".to_string(),
            },
        };

        assert_eq!(
            agent.run_tool(&call).await,
            "Error: unknown tool 'delete_everything'"
        );
    }

    #[test]
    fn test_system_prompt_goes_first_once() {
        let agent = OpenAIClient::new("sk-test")
            .agent("gpt-4o")
            .system("Answer from your notes")
            .build();

        let fresh = agent.with_system_prompt(vec![Message::user("Hi")]);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].content.as_deref(), Some("Answer from your notes"));

        let resumed = agent.with_system_prompt(vec![
            Message::system("Earlier prompt"),
            Message::user("Hi"),
            Message::assistant("Hello"),
        ]);
        assert_eq!(resumed.len(), 3);
        assert_eq!(resumed[0].content.as_deref(), Some("Earlier prompt"));
    }
}
