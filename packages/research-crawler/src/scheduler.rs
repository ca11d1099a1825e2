//! In-process task scheduler on a tokio channel.
//!
//! [`InProcessScheduler`] is the sending half handed to services;
//! [`SchedulerWorker`] drains the channel and runs every task on its own
//! tokio task. Scheduled work is lost if the process exits.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::crawl::CrawlParams;
use crate::error::{render_error, CrawlerError, Result};
use crate::review::ReviewService;
use crate::traits::{Task, TaskScheduler};

#[derive(Clone)]
pub struct InProcessScheduler {
    sender: mpsc::UnboundedSender<Task>,
}

impl InProcessScheduler {
    /// Create a scheduler and the receiving end for its worker.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TaskScheduler for InProcessScheduler {
    async fn schedule(&self, task: Task) -> Result<()> {
        info!(task = task.name(), url = %task.source_url(), "Scheduling task");
        self.sender
            .send(task)
            .map_err(|e| CrawlerError::Scheduler(format!("worker is gone: {}", e.0.name())))
    }
}

pub struct SchedulerWorker {
    receiver: mpsc::UnboundedReceiver<Task>,
    review: ReviewService,
    running: JoinSet<()>,
}

impl SchedulerWorker {
    pub fn new(receiver: mpsc::UnboundedReceiver<Task>, review: ReviewService) -> Self {
        Self {
            receiver,
            review,
            running: JoinSet::new(),
        }
    }

    /// Spawn every received task until `shutdown` resolves, then wait for
    /// the ones still running.
    ///
    /// The review service inside the worker holds a sender itself, so the
    /// channel never closes on its own.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        while self.turn(shutdown.as_mut()).await {}

        while let Some(joined) = self.running.join_next().await {
            reap(joined);
        }
        info!("Scheduler worker stopped");
    }

    /// Spawn one received task or reap one finished task. False once
    /// `shutdown` resolves.
    async fn turn<F: Future<Output = ()>>(&mut self, shutdown: Pin<&mut F>) -> bool {
        tokio::select! {
            biased;
            Some(task) = self.receiver.recv() => {
                let review = self.review.clone();
                self.running.spawn(async move {
                    run_logged(&review, task).await;
                });
                true
            }
            Some(joined) = self.running.join_next(), if !self.running.is_empty() => {
                reap(joined);
                true
            }
            _ = shutdown => false,
        }
    }

    /// Run queued tasks inline until the queue is empty, including tasks
    /// scheduled while draining.
    pub async fn drain(mut self) -> usize {
        let mut executed = 0;
        while let Ok(task) = self.receiver.try_recv() {
            run_logged(&self.review, task).await;
            executed += 1;
        }
        executed
    }
}

fn reap(joined: std::result::Result<(), JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "Task panicked");
    }
}

async fn run_logged(review: &ReviewService, task: Task) {
    let name = task.name();
    let url = task.source_url().clone();
    if let Err(err) = execute(review, task).await {
        error!(task = name, url = %url, error = %render_error(&err), "Task failed");
    }
}

/// Run one task to completion.
pub async fn execute(review: &ReviewService, task: Task) -> Result<()> {
    match task {
        Task::Crawl {
            source_url,
            max_pages,
            extract_prompt,
            summarize_prompt,
        } => {
            let params = CrawlParams {
                max_pages,
                extract_prompt,
            };
            review
                .crawl_service()
                .crawl_source(source_url.as_str(), &params, summarize_prompt.as_deref())
                .await?;
        }
        Task::AutoSummarize { source_url } => {
            review.auto_summarize(&source_url).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::CrawlerDeps;
    use crate::service::CrawlService;
    use crate::storage::MemoryStore;
    use crate::testing::{MockAnalyzer, MockFetcher, MockSummarizer};
    use crate::traits::Repository;
    use crate::url::NormalizedUrl;
    use std::sync::Arc;

    fn setup(store: Arc<MemoryStore>) -> (InProcessScheduler, SchedulerWorker) {
        let crawl = CrawlService::new(
            store,
            CrawlerDeps::new(
                Arc::new(MockFetcher::new().with_markdown("https://example.com", "home")),
                Arc::new(MockSummarizer::new()),
                Arc::new(MockAnalyzer::new()),
            ),
        );
        let (scheduler, receiver) = InProcessScheduler::channel();
        let review = ReviewService::new(crawl, Arc::new(scheduler.clone()));
        (scheduler, SchedulerWorker::new(receiver, review))
    }

    fn crawl_task(max_pages: u32) -> Task {
        Task::Crawl {
            source_url: NormalizedUrl::new("https://example.com").unwrap(),
            max_pages,
            extract_prompt: None,
            summarize_prompt: None,
        }
    }

    #[tokio::test]
    async fn worker_runs_scheduled_crawls_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let (scheduler, worker) = setup(store.clone());
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(worker.run(async {
            let _ = stopped.await;
        }));

        scheduler.schedule(crawl_task(1)).await.unwrap();
        tokio::task::yield_now().await;
        stop.send(()).unwrap();
        handle.await.unwrap();

        let crawled = store.crawled_sources().await.unwrap();
        assert_eq!(crawled.len(), 1);
    }

    #[tokio::test]
    async fn finished_tasks_are_reaped_while_running() {
        let store = Arc::new(MemoryStore::new());
        let (scheduler, mut worker) = setup(store.clone());
        let never = std::future::pending::<()>();
        tokio::pin!(never);

        scheduler.schedule(crawl_task(1)).await.unwrap();
        assert!(worker.turn(never.as_mut()).await);
        assert_eq!(worker.running.len(), 1);

        // nothing queued, so the next turn waits for the crawl to finish
        assert!(worker.turn(never.as_mut()).await);
        assert!(worker.running.is_empty());
        assert_eq!(store.crawled_sources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drain_runs_queued_tasks_inline() {
        let store = Arc::new(MemoryStore::new());
        let (scheduler, worker) = setup(store.clone());

        scheduler.schedule(crawl_task(1)).await.unwrap();
        scheduler.schedule(crawl_task(1)).await.unwrap();

        assert_eq!(worker.drain().await, 2);
        let source = store
            .get_source(&NormalizedUrl::new("https://example.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.jobs.len(), 2);
    }

    #[tokio::test]
    async fn schedule_fails_without_a_worker() {
        let (scheduler, receiver) = InProcessScheduler::channel();
        drop(receiver);

        let err = scheduler
            .schedule(Task::AutoSummarize {
                source_url: NormalizedUrl::new("https://example.com").unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::Scheduler(_)));
    }
}
