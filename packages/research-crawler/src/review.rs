//! Human review of LLM results and the summarize cascade it triggers.
//!
//! Approving the last unreviewed page extraction of a source schedules a
//! fresh source summary built from the approved pages only.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::Source;
use crate::error::{CrawlerError, Result};
use crate::job::{AnyJob, SummarizeJob};
use crate::service::CrawlService;
use crate::traits::{ReviewChange, Task, TaskScheduler};
use crate::url::NormalizedUrl;

#[derive(Clone)]
pub struct ReviewService {
    crawl: CrawlService,
    scheduler: Arc<dyn TaskScheduler>,
}

impl ReviewService {
    pub fn new(crawl: CrawlService, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self { crawl, scheduler }
    }

    pub fn crawl_service(&self) -> &CrawlService {
        &self.crawl
    }

    /// Mark an extract or summarize result as approved.
    ///
    /// When this completes the review of every extraction on the source, an
    /// auto-summarize task is scheduled.
    #[instrument(skip(self))]
    pub async fn approve(&self, job_id: Uuid) -> Result<AnyJob> {
        let location = self
            .crawl
            .repository()
            .review_job(job_id, &ReviewChange::Approve)
            .await?;
        info!(%job_id, kind = location.job.outcome_name(), "Approved");

        if let AnyJob::Extract(_) = location.job {
            let source = self.crawl.load_source(&location.source_url).await?;
            self.cascade(&source).await?;
        }

        Ok(location.job)
    }

    async fn cascade(&self, source: &Source) -> Result<()> {
        if !source.all_extract_jobs_approved() {
            return Ok(());
        }

        info!(url = %source.url, "All extractions approved, scheduling source summary");
        self.scheduler
            .schedule(Task::AutoSummarize {
                source_url: source.url.clone(),
            })
            .await
    }

    /// Summarize a source from its approved page extractions.
    #[instrument(skip(self))]
    pub async fn auto_summarize(&self, source_url: &NormalizedUrl) -> Result<SummarizeJob> {
        let mut source = self.crawl.load_source(source_url).await?;
        let content = source.page_digest(true);
        self.crawl.summarize(&mut source, &content, None).await
    }

    /// Replace the summary of an extract or summarize result.
    #[instrument(skip(self, summary))]
    pub async fn edit_summary(&self, job_id: Uuid, summary: &str) -> Result<AnyJob> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(CrawlerError::InvalidSummaryValue);
        }

        let location = self
            .crawl
            .repository()
            .review_job(job_id, &ReviewChange::Summary(summary.to_string()))
            .await?;
        info!(%job_id, kind = location.job.outcome_name(), "Summary edited");
        Ok(location.job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::CrawlerDeps;
    use crate::job::{CrawlJob, ExtractJob, JobUpdate, ScrapeJob};
    use crate::links::ClassifiedLinks;
    use crate::storage::MemoryStore;
    use crate::testing::{
        extract_result, MockAnalyzer, MockFetcher, MockSummarizer, RecordingScheduler,
    };
    use crate::traits::Repository;
    use crate::values::{CrawlResult, ScrapeResult};

    struct Fixture {
        store: Arc<MemoryStore>,
        scheduler: RecordingScheduler,
        analyzer: MockAnalyzer,
        review: ReviewService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let scheduler = RecordingScheduler::new();
        let analyzer = MockAnalyzer::new();
        let crawl = CrawlService::new(
            store.clone(),
            CrawlerDeps::new(
                Arc::new(MockFetcher::new()),
                Arc::new(MockSummarizer::new()),
                Arc::new(analyzer.clone()),
            ),
        );
        Fixture {
            store,
            scheduler: scheduler.clone(),
            analyzer,
            review: ReviewService::new(crawl, Arc::new(scheduler)),
        }
    }

    fn url(raw: &str) -> NormalizedUrl {
        NormalizedUrl::new(raw).unwrap()
    }

    async fn store_extract(store: &MemoryStore, page: &str, summary: &str) -> Uuid {
        let mut job = ExtractJob::new();
        job.complete(extract_result(summary)).unwrap();
        let id = job.id;
        store
            .record_job(&JobUpdate::for_page(url("https://example.com"), url(page), job))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn approving_the_last_extraction_schedules_one_summary() {
        let f = fixture();
        f.store.add_source(&url("https://example.com")).await.unwrap();
        let a = store_extract(&f.store, "https://example.com/a", "a").await;
        let b = store_extract(&f.store, "https://example.com/b", "b").await;

        f.review.approve(a).await.unwrap();
        assert!(f.scheduler.tasks().is_empty());

        let job = f.review.approve(b).await.unwrap();
        assert!(!job.is_unreviewed());
        assert_eq!(
            f.scheduler.tasks(),
            vec![Task::AutoSummarize {
                source_url: url("https://example.com")
            }]
        );
    }

    #[tokio::test]
    async fn approving_a_scrape_result_is_rejected() {
        let f = fixture();
        f.store.add_source(&url("https://example.com")).await.unwrap();
        let mut job = ScrapeJob::new();
        job.complete(ScrapeResult::new("md", ClassifiedLinks::default()))
            .unwrap();
        let id = job.id;
        f.store
            .record_job(&JobUpdate::for_page(
                url("https://example.com"),
                url("https://example.com"),
                job,
            ))
            .await
            .unwrap();

        let err = f.review.approve(id).await.unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidJobType { ref kind, .. } if kind == "ScrapeResult"));
    }

    #[tokio::test]
    async fn approving_a_crawl_result_is_rejected() {
        let f = fixture();
        f.store.add_source(&url("https://example.com")).await.unwrap();
        let mut job = CrawlJob::new();
        job.complete(CrawlResult {
            pages_crawled: 1,
            total_pages_found: 1,
            max_pages_limit: 3,
        })
        .unwrap();
        let id = job.id;
        f.store
            .record_job(&JobUpdate::for_source(url("https://example.com"), job))
            .await
            .unwrap();

        let err = f.review.approve(id).await.unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidJobType { .. }));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let f = fixture();
        let err = f.review.approve(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, CrawlerError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn blank_summary_is_rejected_before_lookup() {
        let f = fixture();
        // the job does not exist; validation must win
        let err = f
            .review
            .edit_summary(Uuid::now_v7(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidSummaryValue));
    }

    #[tokio::test]
    async fn edit_summary_stores_trimmed_text() {
        let f = fixture();
        f.store.add_source(&url("https://example.com")).await.unwrap();
        let id = store_extract(&f.store, "https://example.com/a", "draft").await;

        f.review.edit_summary(id, "  Final words \n").await.unwrap();

        let stored = f.store.find_job(id).await.unwrap().unwrap();
        match stored.job {
            AnyJob::Extract(job) => assert_eq!(job.result().unwrap().summary, "Final words"),
            other => panic!("unexpected job {other:?}"),
        }
    }

    #[tokio::test]
    async fn approve_and_edit_at_once_keep_both_changes() {
        let f = fixture();
        f.store.add_source(&url("https://example.com")).await.unwrap();
        let id = store_extract(&f.store, "https://example.com/a", "draft").await;

        let (approved, edited) = tokio::join!(
            f.review.approve(id),
            f.review.edit_summary(id, "Final words")
        );
        approved.unwrap();
        edited.unwrap();

        match f.store.find_job(id).await.unwrap().unwrap().job {
            AnyJob::Extract(job) => {
                assert!(job.is_approved());
                assert_eq!(job.result().unwrap().summary, "Final words");
            }
            other => panic!("unexpected job {other:?}"),
        }
        assert_eq!(f.scheduler.tasks().len(), 1);
    }

    #[tokio::test]
    async fn auto_summarize_uses_approved_pages_only() {
        let f = fixture();
        f.store.add_source(&url("https://example.com")).await.unwrap();
        let a = store_extract(&f.store, "https://example.com/a", "approved text").await;
        store_extract(&f.store, "https://example.com/b", "pending text").await;
        f.review.approve(a).await.unwrap();

        let job = f
            .review
            .auto_summarize(&url("https://example.com"))
            .await
            .unwrap();

        assert!(job.result().is_some());
        let calls = f.analyzer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].content,
            "Content for https://example.com/a:\n\napproved text"
        );
        assert_eq!(calls[0].custom_prompt, None);
        let source = f.store.get_source(&url("https://example.com")).await.unwrap().unwrap();
        assert_eq!(source.jobs.len(), 1);
    }
}
