//! Question answering over the crawled knowledge, with the model calling
//! [`KnowledgeService`] queries as tools.

use async_trait::async_trait;
use openai_client::{OpenAIClient, OpenAIError, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::completion::CompletionError;
use crate::error::{CrawlerError, Result};
use crate::knowledge::{CrawledSourceInfo, KnowledgeService, SourceDetails};
use crate::llm::prompts;

/// Model round trips per question. Listing then reading needs three.
pub const MAX_TOOL_ROUNDS: usize = 5;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadSourcesArgs {
    /// Source URLs exactly as listed by list_crawled_sources
    pub source_urls: Vec<String>,
}

pub struct ListCrawledSources {
    knowledge: KnowledgeService,
}

impl ListCrawledSources {
    pub fn new(knowledge: KnowledgeService) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for ListCrawledSources {
    const NAME: &'static str = "list_crawled_sources";
    type Args = NoArgs;
    type Output = Vec<CrawledSourceInfo>;
    type Error = CrawlerError;

    fn description(&self) -> &str {
        "Get a list of all crawled sources with their metadata. Use this to see what sources are \
         available before asking for detailed information."
    }

    async fn call(&self, _args: NoArgs) -> Result<Vec<CrawledSourceInfo>> {
        self.knowledge.list_crawled_sources().await
    }
}

pub struct ReadSources {
    knowledge: KnowledgeService,
}

impl ReadSources {
    pub fn new(knowledge: KnowledgeService) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for ReadSources {
    const NAME: &'static str = "read_sources";
    type Args = ReadSourcesArgs;
    type Output = Vec<SourceDetails>;
    type Error = CrawlerError;

    fn description(&self) -> &str {
        "Get detailed information (key facts, quotes, and figures) for specific sources. Use this \
         after getting the list of sources to retrieve detailed content."
    }

    async fn call(&self, args: ReadSourcesArgs) -> Result<Vec<SourceDetails>> {
        Ok(self.knowledge.read_sources(&args.source_urls).await)
    }
}

pub struct ResearchAssistant {
    client: OpenAIClient,
    model: String,
    knowledge: KnowledgeService,
}

impl ResearchAssistant {
    pub fn new(client: OpenAIClient, model: impl Into<String>, knowledge: KnowledgeService) -> Self {
        Self {
            client,
            model: model.into(),
            knowledge,
        }
    }

    /// Answer one question in plain text.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .system(prompts::RESEARCH_ASSISTANT)
            .tool(ListCrawledSources::new(self.knowledge.clone()))
            .tool(ReadSources::new(self.knowledge.clone()))
            .max_iterations(MAX_TOOL_ROUNDS)
            .build();

        match agent.chat(question).await {
            Ok(reply) => {
                info!(tools = ?reply.tools_called, "Answered question");
                Ok(reply.content)
            }
            Err(OpenAIError::IterationLimit(_)) => Ok(prompts::TOOL_LIMIT_REPLY.to_string()),
            Err(err) => Err(CompletionError::transport(err).into()),
        }
    }
}
