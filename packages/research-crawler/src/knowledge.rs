//! Read-only queries over what has been crawled, shaped for a question
//! answering model: a catalogue of summarized sources, and the facts, quotes
//! and figures gathered for chosen sources.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entities::Source;
use crate::error::Result;
use crate::job::{PageJob, SourceJob};
use crate::traits::Repository;
use crate::url::NormalizedUrl;
use crate::values::{DataOrigin, DatasetPresence, FocusArea, SourceFormat};

/// Catalogue entry for a source with a finished summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CrawledSourceInfo {
    pub source_url: String,
    pub summary: String,
    pub data_origin: DataOrigin,
    pub source_format: SourceFormat,
    pub focus_area: FocusArea,
    pub dataset_presence: DatasetPresence,
}

/// Everything extracted for one source, each field a set of labelled blocks.
///
/// Unknown or unreadable sources still get an entry, with the problem in
/// every field, so one bad url does not hide the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceDetails {
    pub source_url: String,
    pub key_facts: String,
    pub key_quotes: String,
    pub key_figures: String,
}

impl SourceDetails {
    fn error(source_url: &str, message: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            key_facts: message.to_string(),
            key_quotes: message.to_string(),
            key_figures: message.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct KnowledgeService {
    repo: Arc<dyn Repository>,
}

impl KnowledgeService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Sources with a successful summarize job, described by the first one.
    pub async fn list_crawled_sources(&self) -> Result<Vec<CrawledSourceInfo>> {
        let sources = self.repo.list_sources().await?;

        Ok(sources
            .iter()
            .filter_map(|source| {
                source.jobs.iter().find_map(|job| match job {
                    SourceJob::Summarize(job) => job.result().map(|result| CrawledSourceInfo {
                        source_url: source.url.to_string(),
                        summary: result.summary.clone(),
                        data_origin: result.data_origin,
                        source_format: result.source_format,
                        focus_area: result.focus_area,
                        dataset_presence: result.dataset_presence,
                    }),
                    SourceJob::Crawl(_) => None,
                })
            })
            .collect())
    }

    /// Details for each requested url, in request order.
    pub async fn read_sources(&self, source_urls: &[String]) -> Vec<SourceDetails> {
        let mut details = Vec::with_capacity(source_urls.len());

        for raw in source_urls {
            let entry = match self.load(raw).await {
                Ok(Some(source)) => collect_details(raw, &source),
                Ok(None) => {
                    debug!(url = %raw, "Requested source does not exist");
                    SourceDetails::error(raw, "Error: Source not found")
                }
                Err(err) => {
                    warn!(url = %raw, error = %err, "Failed to read source");
                    SourceDetails::error(raw, &format!("Error retrieving source: {err}"))
                }
            };
            details.push(entry);
        }

        details
    }

    async fn load(&self, raw: &str) -> Result<Option<Source>> {
        let url = NormalizedUrl::new(raw)?;
        self.repo.get_source(&url).await
    }
}

#[derive(Default)]
struct Blocks(Vec<String>);

impl Blocks {
    fn push(&mut self, label: &str, text: &str) {
        if !text.trim().is_empty() {
            self.0.push(format!("{label}:\n{text}"));
        }
    }

    fn join_or(self, empty: &str) -> String {
        if self.0.is_empty() {
            empty.to_string()
        } else {
            self.0.join("\n\n")
        }
    }
}

/// Source summaries first, then page extractions in page order.
fn collect_details(raw: &str, source: &Source) -> SourceDetails {
    let mut facts = Blocks::default();
    let mut quotes = Blocks::default();
    let mut figures = Blocks::default();

    for result in source.jobs.iter().filter_map(|job| match job {
        SourceJob::Summarize(job) => job.result(),
        SourceJob::Crawl(_) => None,
    }) {
        facts.push("Source Summary", &result.key_facts);
        quotes.push("Source Summary", &result.key_quotes);
        figures.push("Source Summary", &result.key_figures);
    }

    for page in &source.pages {
        let label = format!("Page ({})", page.url);
        for result in page.jobs.iter().filter_map(|job| match job {
            PageJob::Extract(job) => job.result(),
            PageJob::Scrape(_) => None,
        }) {
            facts.push(&label, &result.key_facts);
            quotes.push(&label, &result.key_quotes);
            figures.push(&label, &result.key_figures);
        }
    }

    SourceDetails {
        source_url: raw.to_string(),
        key_facts: facts.join_or("No key facts found"),
        key_quotes: quotes.join_or("No key quotes found"),
        key_figures: figures.join_or("No key figures found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ExtractJob, JobUpdate, ScrapeJob, SummarizeJob};
    use crate::storage::MemoryStore;
    use crate::testing::{extract_result, summarize_result};
    use crate::values::JobError;

    fn url(raw: &str) -> NormalizedUrl {
        NormalizedUrl::new(raw).unwrap()
    }

    async fn record(store: &MemoryStore, update: JobUpdate) {
        store.record_job(&update).await.unwrap();
    }

    /// `https://rivers.org` summarized, with one extracted and one scraped
    /// page, next to a source nobody has worked on.
    async fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let rivers = url("https://rivers.org");
        store.add_source(&rivers).await.unwrap();
        store.add_source(&url("https://lakes.org")).await.unwrap();

        let mut failed = SummarizeJob::new();
        failed.fail(JobError::new("model unavailable")).unwrap();
        record(&store, JobUpdate::for_source(rivers.clone(), failed)).await;

        let mut summary = summarize_result("River health across the basin");
        summary.key_facts = "Nitrate levels doubled".to_string();
        summary.data_origin = DataOrigin::Government;
        let mut summarized = SummarizeJob::new();
        summarized.complete(summary).unwrap();
        record(&store, JobUpdate::for_source(rivers.clone(), summarized)).await;

        let mut page = extract_result("Sampling results");
        page.key_facts = "12 sites sampled".to_string();
        page.key_figures = "Figure 3: nitrate trend".to_string();
        let mut extracted = ExtractJob::new();
        extracted.complete(page).unwrap();
        record(
            &store,
            JobUpdate::for_page(rivers.clone(), url("https://rivers.org/sampling"), extracted),
        )
        .await;

        record(
            &store,
            JobUpdate::for_page(rivers.clone(), url("https://rivers.org/about"), ScrapeJob::new()),
        )
        .await;

        store
    }

    #[tokio::test]
    async fn lists_only_summarized_sources() {
        let knowledge = KnowledgeService::new(store().await);

        let sources = knowledge.list_crawled_sources().await.unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_url, "https://rivers.org");
        assert_eq!(sources[0].summary, "River health across the basin");
        assert_eq!(sources[0].data_origin, DataOrigin::Government);
        assert_eq!(sources[0].dataset_presence, DatasetPresence::Absent);
    }

    #[tokio::test]
    async fn reads_source_and_page_blocks() {
        let knowledge = KnowledgeService::new(store().await);

        let details = knowledge
            .read_sources(&["https://rivers.org".to_string()])
            .await;

        assert_eq!(
            details[0].key_facts,
            "Source Summary:\nNitrate levels doubled\n\n\
             Page (https://rivers.org/sampling):\n12 sites sampled"
        );
        assert_eq!(details[0].key_quotes, "No key quotes found");
        assert_eq!(
            details[0].key_figures,
            "Page (https://rivers.org/sampling):\nFigure 3: nitrate trend"
        );
    }

    #[tokio::test]
    async fn bad_urls_get_error_entries_in_order() {
        let knowledge = KnowledgeService::new(store().await);

        let details = knowledge
            .read_sources(&[
                "https://missing.org".to_string(),
                "http://rivers.org".to_string(),
                "https://lakes.org".to_string(),
            ])
            .await;

        assert_eq!(details.len(), 3);
        assert_eq!(details[0].key_facts, "Error: Source not found");
        assert!(details[1].key_quotes.starts_with("Error retrieving source"));
        assert_eq!(details[2].source_url, "https://lakes.org");
        assert_eq!(details[2].key_facts, "No key facts found");
    }
}
