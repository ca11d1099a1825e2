//! The Source / Page aggregate and its lifecycle operations.
//!
//! Every operation appends a pending job, emits it, does the work, records
//! the outcome on the job, and emits it again. Collaborator failures end up
//! as [`JobError`] outcomes; only checkpoint failures are returned as errors.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::job::{
    AnyJob, ExtractJob, JobUpdate, PageJob, ScrapeJob, SourceJob, SummarizeJob,
};
use crate::links::{ClassifiedLinks, LinkClassifier};
use crate::traits::{ContentFetcher, JobSink, PageSummarizer, SourceAnalyzer};
use crate::url::NormalizedUrl;
use crate::values::{ExtractResult, JobError, ScrapeResult};

/// Emits snapshots for jobs owned by one source.
#[derive(Clone, Copy)]
pub struct Checkpoint<'a> {
    source_url: &'a NormalizedUrl,
    sink: &'a dyn JobSink,
}

impl<'a> Checkpoint<'a> {
    pub fn new(source_url: &'a NormalizedUrl, sink: &'a dyn JobSink) -> Self {
        Self { source_url, sink }
    }

    pub async fn page(&self, page_url: &NormalizedUrl, job: impl Into<PageJob>) -> Result<()> {
        let update = JobUpdate::for_page(self.source_url.clone(), page_url.clone(), job);
        self.sink.record(&update).await
    }

    pub async fn source(&self, job: impl Into<SourceJob>) -> Result<()> {
        let update = JobUpdate::for_source(self.source_url.clone(), job);
        self.sink.record(&update).await
    }
}

// =============================================================================
// Page
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: NormalizedUrl,
    /// Append-only, oldest first.
    pub jobs: Vec<PageJob>,
}

impl Page {
    pub fn new(url: NormalizedUrl) -> Self {
        Self {
            url,
            jobs: Vec::new(),
        }
    }

    /// Replace the job with the same id, or append it.
    pub fn upsert_job(&mut self, job: PageJob) {
        match self.jobs.iter_mut().find(|j| j.id() == job.id()) {
            Some(existing) => *existing = job,
            None => self.jobs.push(job),
        }
    }

    pub fn find_job(&self, job_id: Uuid) -> Option<&PageJob> {
        self.jobs.iter().find(|j| j.id() == job_id)
    }

    pub fn extract_jobs(&self) -> impl Iterator<Item = &ExtractJob> {
        self.jobs.iter().filter_map(|job| match job {
            PageJob::Extract(job) => Some(job),
            PageJob::Scrape(_) => None,
        })
    }

    pub fn latest_scrape_result(&self) -> Option<&ScrapeResult> {
        self.jobs.iter().rev().find_map(|job| match job {
            PageJob::Scrape(job) => job.result(),
            PageJob::Extract(_) => None,
        })
    }

    /// Fetch the page and classify its links.
    pub async fn scrape(
        &mut self,
        fetcher: &dyn ContentFetcher,
        classifier: &dyn LinkClassifier,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<ScrapeJob> {
        let mut job = ScrapeJob::new();
        self.jobs.push(job.clone().into());
        checkpoint.page(&self.url, job.clone()).await?;

        match fetcher.fetch(&self.url).await {
            Ok(fetched) => {
                let links = fetched
                    .html
                    .as_deref()
                    .map(|html| classifier.classify(html, &self.url))
                    .unwrap_or_default();
                debug!(url = %self.url, links = links.len(), "Scraped page");
                job.complete(ScrapeResult::new(fetched.markdown, links))?;
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "Scrape failed");
                job.fail(JobError::from_error(&err))?;
            }
        }

        self.upsert_job(job.clone().into());
        checkpoint.page(&self.url, job.clone()).await?;
        Ok(job)
    }

    /// Summarize the page and rank the links found while scraping it.
    pub async fn extract(
        &mut self,
        markdown: &str,
        links: &ClassifiedLinks,
        custom_prompt: Option<&str>,
        summarizer: &dyn PageSummarizer,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<ExtractJob> {
        let mut job = ExtractJob::new();
        self.jobs.push(job.clone().into());
        checkpoint.page(&self.url, job.clone()).await?;

        match summarizer
            .summarize(&self.url, markdown, links, custom_prompt)
            .await
        {
            Ok(result) => {
                debug!(
                    url = %self.url,
                    internal = result.relevant_internal_links.len(),
                    external = result.relevant_external_links.len(),
                    "Extracted page"
                );
                job.complete(result)?;
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "Extraction failed");
                job.fail(JobError::from_error(&err))?;
            }
        }

        self.upsert_job(job.clone().into());
        checkpoint.page(&self.url, job.clone()).await?;
        Ok(job)
    }
}

// =============================================================================
// Source
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: NormalizedUrl,
    /// Unique by url.
    pub pages: Vec<Page>,
    /// Append-only, oldest first.
    pub jobs: Vec<SourceJob>,
}

impl Source {
    pub fn new(url: NormalizedUrl) -> Self {
        Self {
            url,
            pages: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn page(&self, url: &NormalizedUrl) -> Option<&Page> {
        self.pages.iter().find(|p| &p.url == url)
    }

    pub fn page_mut(&mut self, url: &NormalizedUrl) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| &p.url == url)
    }

    pub fn find_or_create_page(&mut self, url: &NormalizedUrl) -> &mut Page {
        let index = match self.pages.iter().position(|p| &p.url == url) {
            Some(index) => index,
            None => {
                self.pages.push(Page::new(url.clone()));
                self.pages.len() - 1
            }
        };
        &mut self.pages[index]
    }

    pub fn upsert_job(&mut self, job: SourceJob) {
        match self.jobs.iter_mut().find(|j| j.id() == job.id()) {
            Some(existing) => *existing = job,
            None => self.jobs.push(job),
        }
    }

    /// Look a job up by id among source jobs and page jobs.
    pub fn find_job(&self, job_id: Uuid) -> Option<(Option<&NormalizedUrl>, AnyJob)> {
        if let Some(job) = self.jobs.iter().find(|j| j.id() == job_id) {
            return Some((None, job.clone().into()));
        }
        self.pages.iter().find_map(|page| {
            page.find_job(job_id)
                .map(|job| (Some(&page.url), job.clone().into()))
        })
    }

    /// Whether this source or any of its pages has a job.
    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty() || self.pages.iter().any(|p| !p.jobs.is_empty())
    }

    fn extract_results(&self) -> impl Iterator<Item = &ExtractResult> {
        self.pages
            .iter()
            .flat_map(|page| page.extract_jobs())
            .filter_map(|job| job.result())
    }

    /// True iff at least one extract result exists and all are approved.
    pub fn all_extract_jobs_approved(&self) -> bool {
        let mut any = false;
        for job in self.pages.iter().flat_map(|page| page.extract_jobs()) {
            if job.result().is_none() {
                continue;
            }
            if !job.is_approved() {
                return false;
            }
            any = true;
        }
        any
    }

    /// Deduplicated union of external links picked by page extraction.
    pub fn relevant_external_links(&self) -> Vec<NormalizedUrl> {
        let mut links: Vec<NormalizedUrl> = Vec::new();
        for link in self
            .extract_results()
            .flat_map(|r| r.relevant_external_links.iter())
        {
            if !links.contains(link) {
                links.push(link.clone());
            }
        }
        links
    }

    /// Per page in source order, the summary of the first extract job that
    /// has a result (approved only, if asked), as `Content for <url>` blocks.
    pub fn page_digest(&self, approved_only: bool) -> String {
        self.pages
            .iter()
            .filter_map(|page| {
                page.extract_jobs()
                    .filter(|job| !approved_only || job.is_approved())
                    .find_map(|job| job.result())
                    .map(|result| format!("Content for {}:\n\n{}", page.url, result.summary))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Classify the whole source from concatenated page text.
    pub async fn summarize(
        &mut self,
        content: &str,
        custom_prompt: Option<&str>,
        analyzer: &dyn SourceAnalyzer,
        sink: &dyn JobSink,
    ) -> Result<SummarizeJob> {
        let source_url = self.url.clone();
        let checkpoint = Checkpoint::new(&source_url, sink);

        let mut job = SummarizeJob::new();
        self.jobs.push(job.clone().into());
        checkpoint.source(job.clone()).await?;

        let external_links = self.relevant_external_links();
        match analyzer
            .analyze(content, &source_url, &external_links, custom_prompt)
            .await
        {
            Ok(result) => job.complete(result)?,
            Err(err) => {
                warn!(url = %source_url, error = %err, "Source summary failed");
                job.fail(JobError::from_error(&err))?;
            }
        }

        self.upsert_job(job.clone().into());
        checkpoint.source(job.clone()).await?;
        Ok(job)
    }
}
