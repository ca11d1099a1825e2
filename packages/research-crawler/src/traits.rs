use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Page, Source};
use crate::error::{CrawlerError, FetchError, Result};
use crate::job::{AnyJob, JobUpdate};
use crate::links::ClassifiedLinks;
use crate::read_models;
use crate::url::NormalizedUrl;
use crate::values::{ExtractResult, ReviewStatus, SummarizeResult};

// ============================================================================
// CONTENT: fetching and LLM processing
// ============================================================================

/// Page content as markdown, plus the raw markup when there was any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub markdown: String,
    /// Absent for documents without markup (PDF), which yields no links.
    pub html: Option<String>,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &NormalizedUrl) -> std::result::Result<FetchedPage, FetchError>;
}

/// Turns one page into summary, facts and ranked links.
#[async_trait]
pub trait PageSummarizer: Send + Sync {
    async fn summarize(
        &self,
        url: &NormalizedUrl,
        markdown: &str,
        links: &ClassifiedLinks,
        custom_prompt: Option<&str>,
    ) -> Result<ExtractResult>;
}

/// Classifies a whole source from its concatenated page summaries.
#[async_trait]
pub trait SourceAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        content: &str,
        source_url: &NormalizedUrl,
        external_links: &[NormalizedUrl],
        custom_prompt: Option<&str>,
    ) -> Result<SummarizeResult>;
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// Receives a snapshot at every yield point of an entity operation.
///
/// An error aborts the operation that emitted the update.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn record(&self, update: &JobUpdate) -> Result<()>;
}

// ============================================================================
// STORAGE
// ============================================================================

/// Where a job lives: its source, its page for page jobs, and the job itself.
pub type JobLocation = JobUpdate;

/// An edit a reviewer makes to a stored extract or summarize result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewChange {
    Approve,
    /// Replace the summary text. Callers trim and validate it first.
    Summary(String),
}

impl ReviewChange {
    /// `InvalidJobType` when the job has no reviewable result.
    pub fn apply(&self, job: &mut AnyJob) -> Result<()> {
        let job_id = job.id();
        let kind = job.outcome_name();
        let unsupported = || CrawlerError::InvalidJobType {
            job_id,
            kind: kind.to_string(),
        };

        match self {
            Self::Approve => {
                job.review_metadata_mut().ok_or_else(unsupported)?.review_status =
                    ReviewStatus::Approved;
            }
            Self::Summary(summary) => {
                *job.summary_mut().ok_or_else(unsupported)? = summary.clone();
            }
        }
        Ok(())
    }
}

/// A page together with the url of the source that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedPage {
    pub source_url: NormalizedUrl,
    pub page: Page,
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Fails with `SourceAlreadyExists` when the url is taken.
    async fn add_source(&self, url: &NormalizedUrl) -> Result<Source>;

    async fn find_or_create_source(&self, url: &NormalizedUrl) -> Result<Source>;

    async fn get_source(&self, url: &NormalizedUrl) -> Result<Option<Source>>;

    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Insert or replace a whole source with its pages and jobs.
    async fn save_source(&self, source: &Source) -> Result<()>;

    /// Removes the source with its pages and jobs. `SourceNotFound` if absent.
    async fn delete_source(&self, url: &NormalizedUrl) -> Result<()>;

    /// Fails with `SourceNotFound` or `PageAlreadyExists`.
    async fn add_page(&self, source_url: &NormalizedUrl, page_url: &NormalizedUrl) -> Result<Page>;

    /// First page with this url across all sources, with its owner.
    async fn get_page(&self, page_url: &NormalizedUrl) -> Result<Option<OwnedPage>>;

    /// Upsert a job by id under its owner. Page jobs create their page on
    /// first reference; the source must already exist.
    async fn record_job(&self, update: &JobUpdate) -> Result<()>;

    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobLocation>>;

    /// Load, change and store one job without letting another write in
    /// between. Fails with `JobNotFound` or `InvalidJobType`.
    async fn review_job(&self, job_id: Uuid, change: &ReviewChange) -> Result<JobLocation>;

    async fn unreviewed_sources(&self) -> Result<Vec<Source>> {
        Ok(read_models::unreviewed(&self.list_sources().await?))
    }

    async fn failed_sources(&self) -> Result<Vec<Source>> {
        Ok(read_models::failed(&self.list_sources().await?))
    }

    async fn crawled_sources(&self) -> Result<Vec<Source>> {
        Ok(read_models::crawled(&self.list_sources().await?))
    }

    async fn discovered_sources(&self) -> Result<Vec<Source>> {
        Ok(read_models::discovered(&self.list_sources().await?))
    }

    async fn in_progress_sources(&self) -> Result<Vec<Source>> {
        Ok(read_models::in_progress(&self.list_sources().await?))
    }
}

// ============================================================================
// BACKGROUND TASKS
// ============================================================================

/// Background work, serializable so it can sit in a durable queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Crawl {
        source_url: NormalizedUrl,
        max_pages: u32,
        extract_prompt: Option<String>,
        summarize_prompt: Option<String>,
    },
    AutoSummarize {
        source_url: NormalizedUrl,
    },
}

impl Task {
    pub fn source_url(&self) -> &NormalizedUrl {
        match self {
            Self::Crawl { source_url, .. } | Self::AutoSummarize { source_url } => source_url,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Crawl { .. } => "crawl",
            Self::AutoSummarize { .. } => "auto_summarize",
        }
    }
}

/// Fire-and-forget dispatch of background tasks.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn schedule(&self, task: Task) -> Result<()>;
}
