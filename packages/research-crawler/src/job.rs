//! Units of work and their one-shot outcomes.
//!
//! A [`Job`] is created pending, persisted, and later receives exactly one
//! [`Outcome`]. The four job kinds share one generic struct; the unions
//! [`PageJob`], [`SourceJob`] and [`AnyJob`] close over them for storage and
//! checkpoint messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CrawlerError, Result};
use crate::url::NormalizedUrl;
use crate::values::{
    CrawlResult, ExtractResult, JobError, LlmResponseMetadata, ReviewStatus, ScrapeResult,
    SummarizeResult,
};

// =============================================================================
// Results
// =============================================================================

/// Behaviour shared by every job result payload.
pub trait JobResult {
    /// Name used in error messages and logs.
    const NAME: &'static str;

    /// Review metadata, present only on LLM-produced results.
    fn review_metadata(&self) -> Option<&LlmResponseMetadata> {
        None
    }

    fn review_metadata_mut(&mut self) -> Option<&mut LlmResponseMetadata> {
        None
    }

    fn summary_mut(&mut self) -> Option<&mut String> {
        None
    }
}

impl JobResult for ScrapeResult {
    const NAME: &'static str = "ScrapeResult";
}

impl JobResult for CrawlResult {
    const NAME: &'static str = "CrawlResult";
}

impl JobResult for ExtractResult {
    const NAME: &'static str = "ExtractResult";

    fn review_metadata(&self) -> Option<&LlmResponseMetadata> {
        Some(&self.metadata)
    }

    fn review_metadata_mut(&mut self) -> Option<&mut LlmResponseMetadata> {
        Some(&mut self.metadata)
    }

    fn summary_mut(&mut self) -> Option<&mut String> {
        Some(&mut self.summary)
    }
}

impl JobResult for SummarizeResult {
    const NAME: &'static str = "SummarizeResult";

    fn review_metadata(&self) -> Option<&LlmResponseMetadata> {
        Some(&self.metadata)
    }

    fn review_metadata_mut(&mut self) -> Option<&mut LlmResponseMetadata> {
        Some(&mut self.metadata)
    }

    fn summary_mut(&mut self) -> Option<&mut String> {
        Some(&mut self.summary)
    }
}

// =============================================================================
// Job
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<R> {
    Error(JobError),
    Success(R),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<R> {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    outcome: Option<Outcome<R>>,
}

pub type ScrapeJob = Job<ScrapeResult>;
pub type ExtractJob = Job<ExtractResult>;
pub type SummarizeJob = Job<SummarizeResult>;
pub type CrawlJob = Job<CrawlResult>;

impl<R> Default for Job<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Job<R> {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            outcome: None,
        }
    }

    pub fn outcome(&self) -> Option<&Outcome<R>> {
        self.outcome.as_ref()
    }

    /// Set the outcome. Refused once an outcome is present.
    pub fn set_outcome(&mut self, outcome: Outcome<R>) -> Result<()> {
        if self.outcome.is_some() {
            return Err(CrawlerError::OutcomeAlreadySet { job_id: self.id });
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn complete(&mut self, result: R) -> Result<()> {
        self.set_outcome(Outcome::Success(result))
    }

    pub fn fail(&mut self, error: JobError) -> Result<()> {
        self.set_outcome(Outcome::Error(error))
    }

    pub fn result(&self) -> Option<&R> {
        match &self.outcome {
            Some(Outcome::Success(result)) => Some(result),
            _ => None,
        }
    }

    /// Mutable access to a successful result, for review edits.
    pub fn result_mut(&mut self) -> Option<&mut R> {
        match &mut self.outcome {
            Some(Outcome::Success(result)) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        match &self.outcome {
            Some(Outcome::Error(error)) => Some(error),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.error().is_some()
    }
}

impl<R: JobResult> Job<R> {
    pub fn outcome_name(&self) -> &'static str {
        match &self.outcome {
            None => "pending",
            Some(Outcome::Error(_)) => "JobError",
            Some(Outcome::Success(_)) => R::NAME,
        }
    }

    pub fn review_metadata(&self) -> Option<&LlmResponseMetadata> {
        self.result().and_then(R::review_metadata)
    }

    pub fn review_metadata_mut(&mut self) -> Option<&mut LlmResponseMetadata> {
        self.result_mut().and_then(R::review_metadata_mut)
    }

    pub fn summary_mut(&mut self) -> Option<&mut String> {
        self.result_mut().and_then(R::summary_mut)
    }

    pub fn is_approved(&self) -> bool {
        self.review_metadata()
            .is_some_and(|m| m.review_status == ReviewStatus::Approved)
    }

    pub fn is_unreviewed(&self) -> bool {
        self.review_metadata()
            .is_some_and(|m| m.review_status == ReviewStatus::Unreviewed)
    }
}

// =============================================================================
// Job unions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageJob {
    Scrape(ScrapeJob),
    Extract(ExtractJob),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceJob {
    Summarize(SummarizeJob),
    Crawl(CrawlJob),
}

/// Any of the four job kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnyJob {
    Scrape(ScrapeJob),
    Extract(ExtractJob),
    Summarize(SummarizeJob),
    Crawl(CrawlJob),
}

macro_rules! impl_job_union {
    ($Enum:ident { $($Variant:ident),+ }) => {
        impl $Enum {
            pub fn id(&self) -> Uuid {
                match self { $(Self::$Variant(job) => job.id,)+ }
            }

            pub fn created_at(&self) -> DateTime<Utc> {
                match self { $(Self::$Variant(job) => job.created_at,)+ }
            }

            pub fn is_pending(&self) -> bool {
                match self { $(Self::$Variant(job) => job.is_pending(),)+ }
            }

            pub fn is_failed(&self) -> bool {
                match self { $(Self::$Variant(job) => job.is_failed(),)+ }
            }

            pub fn is_unreviewed(&self) -> bool {
                match self { $(Self::$Variant(job) => job.is_unreviewed(),)+ }
            }

            pub fn outcome_name(&self) -> &'static str {
                match self { $(Self::$Variant(job) => job.outcome_name(),)+ }
            }

            pub fn review_metadata_mut(&mut self) -> Option<&mut LlmResponseMetadata> {
                match self { $(Self::$Variant(job) => job.review_metadata_mut(),)+ }
            }

            pub fn summary_mut(&mut self) -> Option<&mut String> {
                match self { $(Self::$Variant(job) => job.summary_mut(),)+ }
            }
        }
    };
}

impl_job_union!(PageJob { Scrape, Extract });
impl_job_union!(SourceJob { Summarize, Crawl });
impl_job_union!(AnyJob { Scrape, Extract, Summarize, Crawl });

impl SourceJob {
    pub fn is_crawl_result(&self) -> bool {
        matches!(self, Self::Crawl(job) if job.result().is_some())
    }
}

impl From<ScrapeJob> for PageJob {
    fn from(job: ScrapeJob) -> Self {
        Self::Scrape(job)
    }
}

impl From<ExtractJob> for PageJob {
    fn from(job: ExtractJob) -> Self {
        Self::Extract(job)
    }
}

impl From<SummarizeJob> for SourceJob {
    fn from(job: SummarizeJob) -> Self {
        Self::Summarize(job)
    }
}

impl From<CrawlJob> for SourceJob {
    fn from(job: CrawlJob) -> Self {
        Self::Crawl(job)
    }
}

impl From<PageJob> for AnyJob {
    fn from(job: PageJob) -> Self {
        match job {
            PageJob::Scrape(job) => Self::Scrape(job),
            PageJob::Extract(job) => Self::Extract(job),
        }
    }
}

impl From<SourceJob> for AnyJob {
    fn from(job: SourceJob) -> Self {
        match job {
            SourceJob::Summarize(job) => Self::Summarize(job),
            SourceJob::Crawl(job) => Self::Crawl(job),
        }
    }
}

impl AnyJob {
    /// Serialized tag of the job kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scrape(_) => "scrape",
            Self::Extract(_) => "extract",
            Self::Summarize(_) => "summarize",
            Self::Crawl(_) => "crawl",
        }
    }

    pub fn into_page_job(self) -> Option<PageJob> {
        match self {
            Self::Scrape(job) => Some(PageJob::Scrape(job)),
            Self::Extract(job) => Some(PageJob::Extract(job)),
            _ => None,
        }
    }

    pub fn into_source_job(self) -> Option<SourceJob> {
        match self {
            Self::Summarize(job) => Some(SourceJob::Summarize(job)),
            Self::Crawl(job) => Some(SourceJob::Crawl(job)),
            _ => None,
        }
    }
}

// =============================================================================
// Checkpoint messages
// =============================================================================

/// Snapshot of a job at a yield point, addressed to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub source_url: NormalizedUrl,
    /// Set for page jobs, absent for source jobs.
    pub page_url: Option<NormalizedUrl>,
    pub job: AnyJob,
}

impl JobUpdate {
    pub fn for_page(
        source_url: NormalizedUrl,
        page_url: NormalizedUrl,
        job: impl Into<PageJob>,
    ) -> Self {
        Self {
            source_url,
            page_url: Some(page_url),
            job: AnyJob::from(job.into()),
        }
    }

    pub fn for_source(source_url: NormalizedUrl, job: impl Into<SourceJob>) -> Self {
        Self {
            source_url,
            page_url: None,
            job: AnyJob::from(job.into()),
        }
    }
}
