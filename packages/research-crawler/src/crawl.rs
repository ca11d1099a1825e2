//! Bounded breadth-first crawl of one source.

use std::collections::VecDeque;

use tracing::{debug, error, info};

use crate::deps::CrawlerDeps;
use crate::entities::{Checkpoint, Source};
use crate::error::Result;
use crate::job::CrawlJob;
use crate::traits::JobSink;
use crate::url::NormalizedUrl;
use crate::values::{CrawlResult, JobError};

/// Default page budget for a crawl.
pub const DEFAULT_MAX_PAGES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlParams {
    pub max_pages: u32,
    /// Overrides the page summarizer's instruction.
    pub extract_prompt: Option<String>,
}

impl Default for CrawlParams {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            extract_prompt: None,
        }
    }
}

impl CrawlParams {
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages,
            ..Default::default()
        }
    }

    pub fn with_extract_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.extract_prompt = Some(prompt.into());
        self
    }
}

impl Source {
    /// Crawl from the source url, scraping and extracting up to
    /// `max_pages` pages in FIFO order.
    ///
    /// Page-level failures are recorded on their jobs and the crawl moves on.
    /// A failing checkpoint aborts the traversal and the crawl job gets a
    /// `JobError`; only a failure to record that final state is returned.
    pub async fn crawl(
        &mut self,
        params: &CrawlParams,
        deps: &CrawlerDeps,
        sink: &dyn JobSink,
    ) -> Result<CrawlJob> {
        let source_url = self.url.clone();
        let checkpoint = Checkpoint::new(&source_url, sink);

        let mut job = CrawlJob::new();
        self.jobs.push(job.clone().into());
        checkpoint.source(job.clone()).await?;

        info!(url = %source_url, max_pages = params.max_pages, "Starting crawl");

        match self.traverse(params, deps, &checkpoint).await {
            Ok(result) => {
                info!(
                    url = %source_url,
                    pages_crawled = result.pages_crawled,
                    total_pages_found = result.total_pages_found,
                    "Crawl finished"
                );
                job.complete(result)?;
            }
            Err(err) => {
                error!(url = %source_url, error = %err, "Crawl aborted");
                job.fail(JobError::from_error(&err))?;
            }
        }

        self.upsert_job(job.clone().into());
        checkpoint.source(job.clone()).await?;
        Ok(job)
    }

    async fn traverse(
        &mut self,
        params: &CrawlParams,
        deps: &CrawlerDeps,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<CrawlResult> {
        let mut queue: VecDeque<NormalizedUrl> = VecDeque::from([self.url.clone()]);
        let mut pages_crawled: u32 = 0;
        let mut total_pages_found: u32 = 1;

        while pages_crawled < params.max_pages {
            let Some(page_url) = queue.pop_front() else {
                break;
            };
            let page = self.find_or_create_page(&page_url);
            debug!(url = %page_url, pages_crawled, queued = queue.len(), "Crawling page");

            let scrape = page
                .scrape(deps.fetcher.as_ref(), deps.classifier.as_ref(), checkpoint)
                .await?;

            if let Some(scraped) = scrape.result() {
                let extract = page
                    .extract(
                        &scraped.markdown,
                        &scraped.links(),
                        params.extract_prompt.as_deref(),
                        deps.summarizer.as_ref(),
                        checkpoint,
                    )
                    .await?;

                if let Some(extracted) = extract.result() {
                    for link in &extracted.relevant_internal_links {
                        if !queue.contains(link) {
                            queue.push_back(link.clone());
                            total_pages_found += 1;
                        }
                    }
                    debug!(url = %page_url, queued = queue.len(), total_pages_found, "Queue grew");
                }
            }

            pages_crawled += 1;
        }

        Ok(CrawlResult {
            pages_crawled,
            total_pages_found,
            max_pages_limit: params.max_pages,
        })
    }
}
