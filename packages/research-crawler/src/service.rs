//! Application service: validates input, loads entities, runs their
//! operations and persists every checkpoint through the repository.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::crawl::CrawlParams;
use crate::deps::CrawlerDeps;
use crate::entities::{Checkpoint, Page, Source};
use crate::error::{CrawlerError, Result};
use crate::job::{AnyJob, CrawlJob, ExtractJob, JobUpdate, ScrapeJob, SummarizeJob};
use crate::links::ClassifiedLinks;
use crate::traits::{JobSink, OwnedPage, Repository};
use crate::url::NormalizedUrl;

// ============================================================================
// RepositorySink
// ============================================================================

/// Persists each checkpoint, then registers the external links of a finished
/// source summary as new sources.
pub struct RepositorySink<'a> {
    repo: &'a dyn Repository,
}

impl<'a> RepositorySink<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo }
    }

    async fn register_sources(&self, links: &[NormalizedUrl]) -> Result<()> {
        for link in links {
            match self.repo.add_source(link).await {
                Ok(_) => info!(url = %link, "Registered discovered source"),
                Err(err @ CrawlerError::SourceAlreadyExists { .. })
                | Err(err @ CrawlerError::InvalidUrl { .. }) => {
                    debug!(url = %link, reason = %err, "Skipped discovered source");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobSink for RepositorySink<'_> {
    async fn record(&self, update: &JobUpdate) -> Result<()> {
        self.repo.record_job(update).await?;

        if let AnyJob::Summarize(job) = &update.job {
            if let Some(result) = job.result() {
                self.register_sources(&result.relevant_external_links).await?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// CrawlService
// ============================================================================

/// Entry point for managing sources and running work against them.
#[derive(Clone)]
pub struct CrawlService {
    repo: Arc<dyn Repository>,
    deps: CrawlerDeps,
}

impl CrawlService {
    pub fn new(repo: Arc<dyn Repository>, deps: CrawlerDeps) -> Self {
        Self { repo, deps }
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    pub fn deps(&self) -> &CrawlerDeps {
        &self.deps
    }

    fn sink(&self) -> RepositorySink<'_> {
        RepositorySink::new(self.repo.as_ref())
    }

    // ------------------------------------------------------------------------
    // Sources and pages
    // ------------------------------------------------------------------------

    /// Register a new source. Fails with `SourceAlreadyExists`.
    #[instrument(skip(self))]
    pub async fn add_source(&self, url: &str) -> Result<Source> {
        let url = NormalizedUrl::new(url)?;
        let source = self.repo.add_source(&url).await?;
        info!(url = %source.url, "Source added");
        Ok(source)
    }

    pub async fn get_source(&self, url: &str) -> Result<Source> {
        let url = NormalizedUrl::new(url)?;
        self.load_source(&url).await
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        self.repo.list_sources().await
    }

    /// Remove a source with all its pages and jobs.
    #[instrument(skip(self))]
    pub async fn delete_source(&self, url: &str) -> Result<()> {
        let url = NormalizedUrl::new(url)?;
        self.repo.delete_source(&url).await?;
        info!(url = %url, "Source deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn add_page_to_source(&self, source_url: &str, page_url: &str) -> Result<Page> {
        let source_url = NormalizedUrl::new(source_url)?;
        let page_url = NormalizedUrl::new(page_url)?;
        self.repo.add_page(&source_url, &page_url).await
    }

    pub async fn get_page(&self, url: &str) -> Result<OwnedPage> {
        let url = NormalizedUrl::new(url)?;
        self.load_page(&url).await
    }

    pub(crate) async fn load_source(&self, url: &NormalizedUrl) -> Result<Source> {
        self.repo
            .get_source(url)
            .await?
            .ok_or_else(|| CrawlerError::SourceNotFound {
                url: url.to_string(),
            })
    }

    async fn load_page(&self, url: &NormalizedUrl) -> Result<OwnedPage> {
        self.repo
            .get_page(url)
            .await?
            .ok_or_else(|| CrawlerError::PageNotFound {
                url: url.to_string(),
            })
    }

    // ------------------------------------------------------------------------
    // Work
    // ------------------------------------------------------------------------

    /// Scrape a registered page once.
    #[instrument(skip(self))]
    pub async fn scrape_page(&self, page_url: &str) -> Result<ScrapeJob> {
        let url = NormalizedUrl::new(page_url)?;
        let OwnedPage {
            source_url,
            mut page,
        } = self.load_page(&url).await?;

        let sink = self.sink();
        let checkpoint = Checkpoint::new(&source_url, &sink);
        page.scrape(
            self.deps.fetcher.as_ref(),
            self.deps.classifier.as_ref(),
            &checkpoint,
        )
        .await
    }

    /// Extract a registered page from the given markdown, offering the links
    /// of its latest successful scrape as candidates.
    #[instrument(skip(self, markdown))]
    pub async fn extract_page(
        &self,
        page_url: &str,
        markdown: &str,
        prompt: Option<&str>,
    ) -> Result<ExtractJob> {
        let url = NormalizedUrl::new(page_url)?;
        let OwnedPage {
            source_url,
            mut page,
        } = self.load_page(&url).await?;

        let links = page
            .latest_scrape_result()
            .map(|scraped| scraped.links())
            .unwrap_or_else(ClassifiedLinks::default);

        let sink = self.sink();
        let checkpoint = Checkpoint::new(&source_url, &sink);
        page.extract(
            markdown,
            &links,
            prompt,
            self.deps.summarizer.as_ref(),
            &checkpoint,
        )
        .await
    }

    /// Classify a source from the given text.
    #[instrument(skip(self, content))]
    pub async fn summarize_source(
        &self,
        source_url: &str,
        content: &str,
        prompt: Option<&str>,
    ) -> Result<SummarizeJob> {
        let url = NormalizedUrl::new(source_url)?;
        let mut source = self.load_source(&url).await?;
        self.summarize(&mut source, content, prompt).await
    }

    pub(crate) async fn summarize(
        &self,
        source: &mut Source,
        content: &str,
        prompt: Option<&str>,
    ) -> Result<SummarizeJob> {
        let sink = self.sink();
        source
            .summarize(content, prompt, self.deps.analyzer.as_ref(), &sink)
            .await
    }

    /// Crawl a source, creating it if needed.
    ///
    /// With a `summarize_prompt`, a successful crawl is followed by a source
    /// summary over every page's first extraction, reviewed or not.
    #[instrument(skip(self, params), fields(max_pages = params.max_pages))]
    pub async fn crawl_source(
        &self,
        source_url: &str,
        params: &CrawlParams,
        summarize_prompt: Option<&str>,
    ) -> Result<CrawlJob> {
        let url = NormalizedUrl::new(source_url)?;
        let mut source = self.repo.find_or_create_source(&url).await?;

        let sink = self.sink();
        let job = source.crawl(params, &self.deps, &sink).await?;

        if let (Some(prompt), Some(_)) = (summarize_prompt, job.result()) {
            let content = source.page_digest(false);
            if content.is_empty() {
                warn!(url = %url, "No extracted pages to summarize");
            } else {
                self.summarize(&mut source, &content, Some(prompt)).await?;
            }
        }

        Ok(job)
    }
}
