//! In-memory repository for tests, the CLI and development.

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entities::{Page, Source};
use crate::error::{CrawlerError, Result};
use crate::job::JobUpdate;
use crate::traits::{JobLocation, OwnedPage, Repository, ReviewChange};
use crate::url::NormalizedUrl;

/// In-memory storage for sources with their pages and jobs.
///
/// Sources keep insertion order. Data is lost on drop; the CLI snapshots it
/// to a JSON file between runs.
#[derive(Default)]
pub struct MemoryStore {
    sources: RwLock<IndexMap<String, Source>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn add_source(&self, url: &NormalizedUrl) -> Result<Source> {
        let mut sources = self.sources.write().await;
        if sources.contains_key(url.as_str()) {
            return Err(CrawlerError::SourceAlreadyExists {
                url: url.to_string(),
            });
        }
        let source = Source::new(url.clone());
        sources.insert(url.to_string(), source.clone());
        Ok(source)
    }

    async fn find_or_create_source(&self, url: &NormalizedUrl) -> Result<Source> {
        let mut sources = self.sources.write().await;
        let source = sources
            .entry(url.to_string())
            .or_insert_with(|| Source::new(url.clone()));
        Ok(source.clone())
    }

    async fn get_source(&self, url: &NormalizedUrl) -> Result<Option<Source>> {
        Ok(self.sources.read().await.get(url.as_str()).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.read().await.values().cloned().collect())
    }

    async fn save_source(&self, source: &Source) -> Result<()> {
        self.sources
            .write()
            .await
            .insert(source.url.to_string(), source.clone());
        Ok(())
    }

    async fn delete_source(&self, url: &NormalizedUrl) -> Result<()> {
        match self.sources.write().await.shift_remove(url.as_str()) {
            Some(_) => Ok(()),
            None => Err(CrawlerError::SourceNotFound {
                url: url.to_string(),
            }),
        }
    }

    async fn add_page(&self, source_url: &NormalizedUrl, page_url: &NormalizedUrl) -> Result<Page> {
        let mut sources = self.sources.write().await;
        let source = sources
            .get_mut(source_url.as_str())
            .ok_or_else(|| CrawlerError::SourceNotFound {
                url: source_url.to_string(),
            })?;

        if source.page(page_url).is_some() {
            return Err(CrawlerError::PageAlreadyExists {
                url: page_url.to_string(),
            });
        }

        let page = Page::new(page_url.clone());
        source.pages.push(page.clone());
        Ok(page)
    }

    async fn get_page(&self, page_url: &NormalizedUrl) -> Result<Option<OwnedPage>> {
        let sources = self.sources.read().await;
        Ok(sources.values().find_map(|source| {
            source.page(page_url).map(|page| OwnedPage {
                source_url: source.url.clone(),
                page: page.clone(),
            })
        }))
    }

    async fn record_job(&self, update: &JobUpdate) -> Result<()> {
        upsert(&mut *self.sources.write().await, update)
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobLocation>> {
        Ok(locate(&*self.sources.read().await, job_id))
    }

    async fn review_job(&self, job_id: Uuid, change: &ReviewChange) -> Result<JobLocation> {
        let mut sources = self.sources.write().await;
        let mut location = locate(&sources, job_id).ok_or(CrawlerError::JobNotFound { job_id })?;
        change.apply(&mut location.job)?;
        upsert(&mut sources, &location)?;
        Ok(location)
    }
}

fn locate(sources: &IndexMap<String, Source>, job_id: Uuid) -> Option<JobLocation> {
    sources.values().find_map(|source| {
        source.find_job(job_id).map(|(page_url, job)| JobUpdate {
            source_url: source.url.clone(),
            page_url: page_url.cloned(),
            job,
        })
    })
}

fn upsert(sources: &mut IndexMap<String, Source>, update: &JobUpdate) -> Result<()> {
    let source = sources
        .get_mut(update.source_url.as_str())
        .ok_or_else(|| CrawlerError::SourceNotFound {
            url: update.source_url.to_string(),
        })?;

    let job_id = update.job.id();
    let kind = update.job.kind();
    let misaddressed = || CrawlerError::InvalidJobType {
        job_id,
        kind: kind.to_string(),
    };
    match &update.page_url {
        Some(page_url) => {
            let job = update.job.clone().into_page_job().ok_or_else(misaddressed)?;
            source.find_or_create_page(page_url).upsert_job(job);
        }
        None => {
            let job = update.job.clone().into_source_job().ok_or_else(misaddressed)?;
            source.upsert_job(job);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AnyJob, CrawlJob, ExtractJob, ScrapeJob};
    use crate::testing::extract_result;

    fn url(raw: &str) -> NormalizedUrl {
        NormalizedUrl::new(raw).unwrap()
    }

    #[tokio::test]
    async fn add_source_rejects_duplicates() {
        let store = MemoryStore::new();
        store.add_source(&url("https://example.com")).await.unwrap();

        let err = store
            .add_source(&url("https://example.com/"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::SourceAlreadyExists { .. }));
        assert_eq!(store.source_count().await, 1);
    }

    #[tokio::test]
    async fn find_or_create_source_is_stable() {
        let store = MemoryStore::new();
        let source = url("https://example.com");

        tokio_test::assert_ok!(store.find_or_create_source(&source).await);
        tokio_test::assert_ok!(store.find_or_create_source(&source).await);

        assert_eq!(store.source_count().await, 1);
    }

    #[tokio::test]
    async fn add_page_checks_owner_and_uniqueness() {
        let store = MemoryStore::new();
        let source = url("https://example.com");
        let page = url("https://example.com/a");

        let err = store.add_page(&source, &page).await.unwrap_err();
        assert!(matches!(err, CrawlerError::SourceNotFound { .. }));

        store.add_source(&source).await.unwrap();
        store.add_page(&source, &page).await.unwrap();
        let err = store.add_page(&source, &page).await.unwrap_err();
        assert!(matches!(err, CrawlerError::PageAlreadyExists { .. }));

        let owned = store.get_page(&page).await.unwrap().unwrap();
        assert_eq!(owned.source_url, source);
    }

    #[tokio::test]
    async fn record_job_creates_page_and_upserts_by_id() {
        let store = MemoryStore::new();
        let source = url("https://example.com");
        let page = url("https://example.com/a");
        store.add_source(&source).await.unwrap();

        let mut job = ExtractJob::new();
        store
            .record_job(&JobUpdate::for_page(source.clone(), page.clone(), job.clone()))
            .await
            .unwrap();
        job.complete(extract_result("done")).unwrap();
        store
            .record_job(&JobUpdate::for_page(source.clone(), page.clone(), job.clone()))
            .await
            .unwrap();

        let stored = store.get_page(&page).await.unwrap().unwrap().page;
        assert_eq!(stored.jobs.len(), 1);
        assert!(!stored.jobs[0].is_pending());

        let location = store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(location.page_url, Some(page));
        assert_eq!(location.source_url, source);
    }

    #[tokio::test]
    async fn record_job_requires_the_source() {
        let store = MemoryStore::new();
        let update = JobUpdate::for_source(url("https://example.com"), CrawlJob::new());

        let err = store.record_job(&update).await.unwrap_err();
        assert!(matches!(err, CrawlerError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn record_job_rejects_misaddressed_jobs() {
        let store = MemoryStore::new();
        let source = url("https://example.com");
        store.add_source(&source).await.unwrap();

        let update = JobUpdate {
            source_url: source.clone(),
            page_url: None,
            job: AnyJob::Scrape(ScrapeJob::new()),
        };
        let err = store.record_job(&update).await.unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidJobType { ref kind, .. } if kind == "scrape"));
    }

    #[tokio::test]
    async fn save_source_replaces_the_whole_tree() {
        let store = MemoryStore::new();
        let source_url = url("https://example.com");
        store.add_source(&source_url).await.unwrap();
        store.add_page(&source_url, &url("https://example.com/old")).await.unwrap();

        let mut source = Source::new(source_url.clone());
        source.find_or_create_page(&url("https://example.com/new"));
        source.upsert_job(CrawlJob::new().into());
        store.save_source(&source).await.unwrap();

        let stored = store.get_source(&source_url).await.unwrap().unwrap();
        assert_eq!(stored, source);
        assert_eq!(store.source_count().await, 1);
    }

    #[tokio::test]
    async fn review_job_changes_the_stored_result() {
        let store = MemoryStore::new();
        let source = url("https://example.com");
        store.add_source(&source).await.unwrap();
        let mut job = ExtractJob::new();
        job.complete(extract_result("draft")).unwrap();
        store
            .record_job(&JobUpdate::for_page(source.clone(), url("https://example.com/a"), job.clone()))
            .await
            .unwrap();

        store.review_job(job.id, &ReviewChange::Approve).await.unwrap();
        let location = store
            .review_job(job.id, &ReviewChange::Summary("Final".into()))
            .await
            .unwrap();
        assert_eq!(location.page_url, Some(url("https://example.com/a")));

        match store.find_job(job.id).await.unwrap().unwrap().job {
            AnyJob::Extract(stored) => {
                assert!(stored.is_approved());
                assert_eq!(stored.result().unwrap().summary, "Final");
            }
            other => panic!("unexpected job {other:?}"),
        }
    }

    #[tokio::test]
    async fn review_job_reports_missing_and_unreviewable_jobs() {
        let store = MemoryStore::new();
        let source = url("https://example.com");
        store.add_source(&source).await.unwrap();
        let crawl = CrawlJob::new();
        store
            .record_job(&JobUpdate::for_source(source.clone(), crawl.clone()))
            .await
            .unwrap();

        let err = store.review_job(crawl.id, &ReviewChange::Approve).await.unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidJobType { ref kind, .. } if kind == "pending"));

        let err = store
            .review_job(Uuid::now_v7(), &ReviewChange::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_source_cascades() {
        let store = MemoryStore::new();
        let source = url("https://example.com");
        let page = url("https://example.com/a");
        store.add_source(&source).await.unwrap();
        store.add_page(&source, &page).await.unwrap();

        store.delete_source(&source).await.unwrap();

        assert!(store.get_page(&page).await.unwrap().is_none());
        let err = store.delete_source(&source).await.unwrap_err();
        assert!(matches!(err, CrawlerError::SourceNotFound { .. }));
    }
}
