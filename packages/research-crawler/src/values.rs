//! Job result payloads and the enums the language model classifies into.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::render_error;
use crate::links::ClassifiedLinks;
use crate::url::NormalizedUrl;

// =============================================================================
// Classification enums
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ReviewStatus {
    #[default]
    Unreviewed,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Relevancy {
    High,
    Medium,
    Low,
    #[serde(rename = "Not Relevant")]
    NotRelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DataOrigin {
    Academic,
    Government,
    News,
    Blog,
    #[serde(rename = "Non-Profit")]
    NonProfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SourceFormat {
    #[serde(rename = "Research Paper")]
    ResearchPaper,
    Article,
    #[serde(rename = "Data Repository")]
    DataRepository,
    #[serde(rename = "Historical Info")]
    HistoricalInfo,
    Policy,
    Law,
    Narrative,
    #[serde(rename = "Data Visualization")]
    DataVisualization,
    Letter,
    #[serde(rename = "Government Source")]
    GovernmentSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FocusArea {
    #[serde(rename = "Non-Human Animals")]
    NonHumanAnimals,
    Humans,
    Environment,
    Community,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DatasetPresence {
    Present,
    Absent,
}

// =============================================================================
// Job results
// =============================================================================

/// A failed unit of work. `message` holds the rendered error chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(render_error(err))
    }
}

/// Token accounting and review state shared by every LLM-produced result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponseMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Instruction text sent to the model, without the page or source body.
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub markdown: String,
    pub internal_links: Vec<NormalizedUrl>,
    pub external_links: Vec<NormalizedUrl>,
    pub file_links: Vec<NormalizedUrl>,
}

impl ScrapeResult {
    pub fn new(markdown: impl Into<String>, links: ClassifiedLinks) -> Self {
        Self {
            markdown: markdown.into(),
            internal_links: links.internal,
            external_links: links.external,
            file_links: links.file,
        }
    }

    pub fn links(&self) -> ClassifiedLinks {
        ClassifiedLinks {
            internal: self.internal_links.clone(),
            external: self.external_links.clone(),
            file: self.file_links.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    pub summary: String,
    pub key_facts: String,
    pub key_quotes: String,
    pub key_figures: String,
    pub trustworthiness: String,
    pub relevancy: Relevancy,
    /// Ranked, most relevant first.
    pub relevant_internal_links: Vec<NormalizedUrl>,
    pub relevant_external_links: Vec<NormalizedUrl>,
    pub relevant_file_links: Vec<NormalizedUrl>,
    pub metadata: LlmResponseMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeResult {
    pub summary: String,
    pub key_facts: String,
    pub key_quotes: String,
    pub key_figures: String,
    pub data_origin: DataOrigin,
    pub source_format: SourceFormat,
    pub focus_area: FocusArea,
    pub dataset_presence: DatasetPresence,
    /// Ranked, most relevant first.
    pub relevant_external_links: Vec<NormalizedUrl>,
    pub metadata: LlmResponseMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub pages_crawled: u32,
    pub total_pages_found: u32,
    pub max_pages_limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_use_display_strings() {
        assert_eq!(
            serde_json::to_string(&Relevancy::NotRelevant).unwrap(),
            "\"Not Relevant\""
        );
        assert_eq!(
            serde_json::to_string(&DataOrigin::NonProfit).unwrap(),
            "\"Non-Profit\""
        );
        assert_eq!(
            serde_json::from_str::<SourceFormat>("\"Research Paper\"").unwrap(),
            SourceFormat::ResearchPaper
        );
        assert_eq!(
            serde_json::from_str::<FocusArea>("\"Non-Human Animals\"").unwrap(),
            FocusArea::NonHumanAnimals
        );
    }

    #[test]
    fn review_status_defaults_to_unreviewed() {
        let metadata: LlmResponseMetadata = serde_json::from_value(serde_json::json!({
            "input_tokens": 10,
            "output_tokens": 2,
            "prompt": "Summarize",
            "model": "gpt-4o"
        }))
        .unwrap();

        assert_eq!(metadata.review_status, ReviewStatus::Unreviewed);
    }

    #[test]
    fn job_error_renders_chain() {
        let err = crate::error::CrawlerError::invalid_url("ftp://x", "only https URLs are allowed");
        let job_error = JobError::from_error(&err);
        assert_eq!(
            job_error.message,
            "invalid url \"ftp://x\": only https URLs are allowed"
        );
    }
}
