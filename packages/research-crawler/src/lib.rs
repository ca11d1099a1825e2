//! Research Crawler
//!
//! Crawls research websites breadth-first, turns every page into a summary
//! with facts and ranked links through an LLM, and classifies whole sources
//! once their pages have been reviewed.
//!
//! # Model
//!
//! A [`Source`] owns [`Page`]s; both own append-only lists of [`Job`]s. A job
//! starts pending and receives exactly one [`Outcome`]: a typed result or a
//! [`JobError`]. Entity operations emit a [`JobUpdate`] at every step so the
//! caller can persist progress as it happens.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use research_crawler::{CrawlParams, CrawlService, CrawlerDeps, MemoryStore};
//! use research_crawler::testing::{MockAnalyzer, MockFetcher, MockSummarizer};
//!
//! let deps = CrawlerDeps::new(
//!     Arc::new(MockFetcher::new()),
//!     Arc::new(MockSummarizer::new()),
//!     Arc::new(MockAnalyzer::new()),
//! );
//! let service = CrawlService::new(Arc::new(MemoryStore::new()), deps);
//!
//! let job = service
//!     .crawl_source("https://example.org", &CrawlParams::new(3), None)
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`entities`] - Source / Page aggregate and its operations
//! - [`crawl`] - Bounded breadth-first crawl of a source
//! - [`service`] - Application service persisting every checkpoint
//! - [`review`] - Approval workflow and the summarize cascade
//! - [`read_models`] - Unreviewed / failed / crawled / discovered / in-progress views
//! - [`knowledge`] - Source catalogue and fact lookup for question answering
//! - [`completion`] - Structured LLM output with retry and validation
//! - [`llm`] - LLM-backed summarizer, analyzer and research assistant
//! - [`storage`] - Repository implementations (MemoryStore, PostgresStore)
//! - [`scheduler`] - In-process background tasks
//! - [`testing`] - Mock implementations for testing

pub mod completion;
pub mod crawl;
pub mod deps;
pub mod entities;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod knowledge;
pub mod links;
pub mod llm;
pub mod read_models;
pub mod review;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod testing;
pub mod traits;
pub mod url;
pub mod values;

pub use completion::{
    Completion, CompletionBackend, CompletionError, CompletionRequest, RawCompletion,
    RetryPolicy, StructuredCompletion,
};
pub use crawl::{CrawlParams, DEFAULT_MAX_PAGES};
pub use deps::CrawlerDeps;
pub use entities::{Checkpoint, Page, Source};
pub use error::{render_error, CrawlerError, FetchError, Result};
pub use fetcher::HttpContentFetcher;
pub use job::{
    AnyJob, CrawlJob, ExtractJob, Job, JobResult, JobUpdate, Outcome, PageJob, ScrapeJob,
    SourceJob, SummarizeJob,
};
pub use knowledge::{CrawledSourceInfo, KnowledgeService, SourceDetails};
pub use links::{ClassifiedLinks, HtmlLinkClassifier, LinkClassifier};
pub use llm::{LlmPageSummarizer, LlmSourceAnalyzer};
pub use review::ReviewService;
pub use scheduler::{InProcessScheduler, SchedulerWorker};
pub use service::{CrawlService, RepositorySink};
pub use storage::MemoryStore;
pub use traits::{
    ContentFetcher, FetchedPage, JobLocation, JobSink, OwnedPage, PageSummarizer, Repository,
    ReviewChange, SourceAnalyzer, Task, TaskScheduler,
};
pub use crate::url::{NormalizedUrl, UrlType};
pub use values::{
    CrawlResult, DataOrigin, DatasetPresence, ExtractResult, FocusArea, JobError,
    LlmResponseMetadata, Relevancy, ReviewStatus, ScrapeResult, SourceFormat, SummarizeResult,
};

#[cfg(feature = "openai")]
pub use llm::{OpenAiBackend, ResearchAssistant};

#[cfg(feature = "postgres")]
pub use storage::PostgresStore;
