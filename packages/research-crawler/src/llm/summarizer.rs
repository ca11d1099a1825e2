use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use super::{format_candidates, prompts, rank_links};
use crate::completion::StructuredCompletion;
use crate::error::Result;
use crate::links::ClassifiedLinks;
use crate::traits::PageSummarizer;
use crate::url::NormalizedUrl;
use crate::values::{ExtractResult, Relevancy};

const MAX_RANKED_LINKS: usize = 10;

/// What the model is asked to return for one page.
#[derive(Debug, Deserialize, JsonSchema)]
struct PageExtraction {
    summary: String,
    key_facts: String,
    key_quotes: String,
    key_figures: String,
    trustworthiness: String,
    relevancy: Relevancy,
    relevant_internal_links: Vec<String>,
    relevant_external_links: Vec<String>,
    relevant_file_links: Vec<String>,
}

/// [`PageSummarizer`] over a structured completion client.
pub struct LlmPageSummarizer {
    completion: StructuredCompletion,
    default_instruction: String,
}

impl LlmPageSummarizer {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self {
            completion,
            default_instruction: prompts::PAGE_EXTRACTION.to_string(),
        }
    }

    /// Replace the instruction used when a call carries no override.
    pub fn with_default_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.default_instruction = instruction.into();
        self
    }

    fn page_content(url: &NormalizedUrl, markdown: &str, links: &ClassifiedLinks) -> String {
        format!(
            "Markdown content for URL {url}:\n{markdown}\n\n{}\n\n{}\n\n{}",
            format_candidates("Candidate internal links", &links.internal),
            format_candidates("Candidate external links", &links.external),
            format_candidates("Candidate file links", &links.file),
        )
    }
}

#[async_trait]
impl PageSummarizer for LlmPageSummarizer {
    async fn summarize(
        &self,
        url: &NormalizedUrl,
        markdown: &str,
        links: &ClassifiedLinks,
        custom_prompt: Option<&str>,
    ) -> Result<ExtractResult> {
        let instruction = custom_prompt.unwrap_or(self.default_instruction.as_str());
        let content = Self::page_content(url, markdown, links);

        let completion = self
            .completion
            .complete::<PageExtraction>("page_extraction", instruction, &content)
            .await?;
        let extraction = completion.value;

        let result = ExtractResult {
            summary: extraction.summary,
            key_facts: extraction.key_facts,
            key_quotes: extraction.key_quotes,
            key_figures: extraction.key_figures,
            trustworthiness: extraction.trustworthiness,
            relevancy: extraction.relevancy,
            relevant_internal_links: rank_links(
                &extraction.relevant_internal_links,
                &links.internal,
                MAX_RANKED_LINKS,
            ),
            relevant_external_links: rank_links(
                &extraction.relevant_external_links,
                &links.external,
                MAX_RANKED_LINKS,
            ),
            relevant_file_links: rank_links(
                &extraction.relevant_file_links,
                &links.file,
                MAX_RANKED_LINKS,
            ),
            metadata: completion.metadata,
        };

        debug!(
            url = %url,
            input_tokens = result.metadata.input_tokens,
            output_tokens = result.metadata.output_tokens,
            "Page extraction complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::RetryPolicy;
    use crate::error::CrawlerError;
    use crate::testing::ScriptedBackend;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn summarizer(backend: &ScriptedBackend) -> LlmPageSummarizer {
        let completion = StructuredCompletion::new(Arc::new(backend.clone()))
            .with_retry(RetryPolicy::new().with_backoff(Duration::ZERO));
        LlmPageSummarizer::new(completion)
    }

    fn links() -> ClassifiedLinks {
        ClassifiedLinks {
            internal: NormalizedUrl::from_strings(["https://example.com/a", "https://example.com/b"]),
            external: NormalizedUrl::from_strings(["https://other.org"]),
            file: vec![],
        }
    }

    fn payload() -> serde_json::Value {
        json!({
            "summary": "A study of runoff",
            "key_facts": "Nitrate levels rose",
            "key_quotes": "\"We saw a spike\"",
            "key_figures": "12 mg/L",
            "trustworthiness": "Peer reviewed",
            "relevancy": "Not Relevant",
            "relevant_internal_links": ["https://example.com/b", "https://example.com/invented", "https://example.com/a/"],
            "relevant_external_links": ["http://other.org"],
            "relevant_file_links": []
        })
    }

    #[tokio::test]
    async fn keeps_only_candidate_links() {
        let backend = ScriptedBackend::new().with_response(payload(), 900, 80);
        let url = NormalizedUrl::new("https://example.com").unwrap();

        let result = summarizer(&backend)
            .summarize(&url, "# Runoff", &links(), None)
            .await
            .unwrap();

        assert_eq!(result.relevancy, Relevancy::NotRelevant);
        assert_eq!(
            result.relevant_internal_links,
            NormalizedUrl::from_strings(["https://example.com/b", "https://example.com/a"])
        );
        assert!(result.relevant_external_links.is_empty());
        assert_eq!(result.metadata.input_tokens, 900);
    }

    #[tokio::test]
    async fn stores_instruction_without_page_body() {
        let backend = ScriptedBackend::new().with_response(payload(), 1, 1);
        let url = NormalizedUrl::new("https://example.com").unwrap();

        let result = summarizer(&backend)
            .summarize(&url, "# Secret body", &links(), Some("Only methods"))
            .await
            .unwrap();

        assert_eq!(result.metadata.prompt, "Only methods");
        let requests = backend.requests();
        let request = &requests[0];
        assert_eq!(request.instruction, "Only methods");
        assert!(request.content.contains("# Secret body"));
        assert!(request.content.contains("- https://example.com/a"));
    }

    #[tokio::test]
    async fn surfaces_completion_errors() {
        let backend = ScriptedBackend::new().with_response(json!({ "summary": "partial" }), 1, 1);
        let url = NormalizedUrl::new("https://example.com").unwrap();

        let err = summarizer(&backend)
            .summarize(&url, "# Page", &links(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlerError::Completion(_)));
    }
}
