use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use super::{format_candidates, prompts, rank_links};
use crate::completion::StructuredCompletion;
use crate::error::Result;
use crate::traits::SourceAnalyzer;
use crate::url::NormalizedUrl;
use crate::values::{DataOrigin, DatasetPresence, FocusArea, SourceFormat, SummarizeResult};

const MAX_RANKED_LINKS: usize = 5;

#[derive(Debug, Deserialize, JsonSchema)]
struct SourceAnalysis {
    summary: String,
    key_facts: String,
    key_quotes: String,
    key_figures: String,
    data_origin: DataOrigin,
    source_format: SourceFormat,
    focus_area: FocusArea,
    dataset_presence: DatasetPresence,
    relevant_external_links: Vec<String>,
}

/// [`SourceAnalyzer`] over a structured completion client.
pub struct LlmSourceAnalyzer {
    completion: StructuredCompletion,
    default_instruction: String,
}

impl LlmSourceAnalyzer {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self {
            completion,
            default_instruction: prompts::SOURCE_ANALYSIS.to_string(),
        }
    }

    pub fn with_default_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.default_instruction = instruction.into();
        self
    }
}

#[async_trait]
impl SourceAnalyzer for LlmSourceAnalyzer {
    async fn analyze(
        &self,
        content: &str,
        source_url: &NormalizedUrl,
        external_links: &[NormalizedUrl],
        custom_prompt: Option<&str>,
    ) -> Result<SummarizeResult> {
        let instruction = custom_prompt.unwrap_or(self.default_instruction.as_str());
        let body = format!(
            "Source URL: {source_url}\n\nCombined summaries of all pages:\n{content}\n\n{}",
            format_candidates("Candidate external links", external_links),
        );

        let completion = self
            .completion
            .complete::<SourceAnalysis>("source_analysis", instruction, &body)
            .await?;
        let analysis = completion.value;

        debug!(
            url = %source_url,
            data_origin = ?analysis.data_origin,
            source_format = ?analysis.source_format,
            "Source analysis complete"
        );

        Ok(SummarizeResult {
            summary: analysis.summary,
            key_facts: analysis.key_facts,
            key_quotes: analysis.key_quotes,
            key_figures: analysis.key_figures,
            data_origin: analysis.data_origin,
            source_format: analysis.source_format,
            focus_area: analysis.focus_area,
            dataset_presence: analysis.dataset_presence,
            relevant_external_links: rank_links(
                &analysis.relevant_external_links,
                external_links,
                MAX_RANKED_LINKS,
            ),
            metadata: completion.metadata,
        })
    }
}
