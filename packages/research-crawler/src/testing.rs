//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the crawler without
//! making real network or LLM calls. Every mock is cheap to clone and clones
//! share their state, so a test can keep a handle for assertions after moving
//! the mock into [`crate::CrawlerDeps`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::completion::{CompletionBackend, CompletionError, CompletionRequest, RawCompletion};
use crate::error::{CrawlerError, FetchError, Result};
use crate::job::JobUpdate;
use crate::links::ClassifiedLinks;
use crate::traits::{
    ContentFetcher, FetchedPage, JobSink, PageSummarizer, SourceAnalyzer, Task, TaskScheduler,
};
use crate::url::NormalizedUrl;
use crate::values::{
    DataOrigin, DatasetPresence, ExtractResult, FocusArea, LlmResponseMetadata, Relevancy,
    ReviewStatus, SourceFormat, SummarizeResult,
};

const MOCK_MODEL: &str = "mock-model";

fn metadata(prompt: &str) -> LlmResponseMetadata {
    LlmResponseMetadata {
        input_tokens: 100,
        output_tokens: 20,
        prompt: prompt.to_string(),
        model: MOCK_MODEL.to_string(),
        review_status: ReviewStatus::Unreviewed,
    }
}

/// An unreviewed extract result with the given summary and no links.
pub fn extract_result(summary: &str) -> ExtractResult {
    ExtractResult {
        summary: summary.to_string(),
        key_facts: String::new(),
        key_quotes: String::new(),
        key_figures: String::new(),
        trustworthiness: "Unknown".to_string(),
        relevancy: Relevancy::Medium,
        relevant_internal_links: Vec::new(),
        relevant_external_links: Vec::new(),
        relevant_file_links: Vec::new(),
        metadata: metadata("mock extraction"),
    }
}

/// An unreviewed summarize result with the given summary and no links.
pub fn summarize_result(summary: &str) -> SummarizeResult {
    SummarizeResult {
        summary: summary.to_string(),
        key_facts: String::new(),
        key_quotes: String::new(),
        key_figures: String::new(),
        data_origin: DataOrigin::Academic,
        source_format: SourceFormat::Article,
        focus_area: FocusArea::Environment,
        dataset_presence: DatasetPresence::Absent,
        relevant_external_links: Vec::new(),
        metadata: metadata("mock analysis"),
    }
}

fn urls(raw: &[&str]) -> Vec<NormalizedUrl> {
    NormalizedUrl::from_strings(raw.iter().copied())
}

// ============================================================================
// MockFetcher
// ============================================================================

/// A mock fetcher serving canned pages by url.
///
/// Unknown urls fail with HTTP 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, std::result::Result<FetchedPage, FetchError>>>>,
    fetched: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve markdown plus markup for link classification.
    pub fn with_page(self, url: &str, markdown: &str, html: &str) -> Self {
        self.insert(
            url,
            Ok(FetchedPage {
                markdown: markdown.to_string(),
                html: Some(html.to_string()),
            }),
        )
    }

    /// Serve markdown without markup, like a PDF.
    pub fn with_markdown(self, url: &str, markdown: &str) -> Self {
        self.insert(
            url,
            Ok(FetchedPage {
                markdown: markdown.to_string(),
                html: None,
            }),
        )
    }

    pub fn with_error(self, url: &str, error: FetchError) -> Self {
        self.insert(url, Err(error))
    }

    fn insert(self, url: &str, response: std::result::Result<FetchedPage, FetchError>) -> Self {
        self.pages
            .write()
            .unwrap()
            .insert(url.trim_end_matches('/').to_string(), response);
        self
    }

    /// Urls fetched so far, in call order.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(&self, url: &NormalizedUrl) -> std::result::Result<FetchedPage, FetchError> {
        self.fetched.write().unwrap().push(url.to_string());
        self.pages
            .read()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Http {
                    url: url.to_string(),
                    status: 404,
                })
            })
    }
}

// ============================================================================
// MockSummarizer
// ============================================================================

/// Record of a call made to the mock summarizer.
#[derive(Debug, Clone)]
pub struct SummarizeCall {
    pub url: NormalizedUrl,
    pub markdown: String,
    pub links: ClassifiedLinks,
    pub custom_prompt: Option<String>,
}

/// A mock page summarizer.
///
/// Returns `Summary of <url>` with whatever links were configured for that
/// url; urls marked as failing get a transport error.
#[derive(Clone, Default)]
pub struct MockSummarizer {
    internal_links: Arc<RwLock<HashMap<String, Vec<NormalizedUrl>>>>,
    external_links: Arc<RwLock<HashMap<String, Vec<NormalizedUrl>>>>,
    failing: Arc<RwLock<Vec<String>>>,
    calls: Arc<RwLock<Vec<SummarizeCall>>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_internal_links(self, url: &str, links: &[&str]) -> Self {
        self.internal_links
            .write()
            .unwrap()
            .insert(url.to_string(), urls(links));
        self
    }

    pub fn with_external_links(self, url: &str, links: &[&str]) -> Self {
        self.external_links
            .write()
            .unwrap()
            .insert(url.to_string(), urls(links));
        self
    }

    pub fn failing_for(self, url: &str) -> Self {
        self.failing.write().unwrap().push(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<SummarizeCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl PageSummarizer for MockSummarizer {
    async fn summarize(
        &self,
        url: &NormalizedUrl,
        markdown: &str,
        links: &ClassifiedLinks,
        custom_prompt: Option<&str>,
    ) -> Result<ExtractResult> {
        self.calls.write().unwrap().push(SummarizeCall {
            url: url.clone(),
            markdown: markdown.to_string(),
            links: links.clone(),
            custom_prompt: custom_prompt.map(str::to_string),
        });

        if self.failing.read().unwrap().iter().any(|u| u == url.as_str()) {
            return Err(CompletionError::transport("mock summarizer failure").into());
        }

        let mut result = extract_result(&format!("Summary of {url}"));
        if let Some(links) = self.internal_links.read().unwrap().get(url.as_str()) {
            result.relevant_internal_links = links.clone();
        }
        if let Some(links) = self.external_links.read().unwrap().get(url.as_str()) {
            result.relevant_external_links = links.clone();
        }
        if let Some(prompt) = custom_prompt {
            result.metadata.prompt = prompt.to_string();
        }
        Ok(result)
    }
}

// ============================================================================
// MockAnalyzer
// ============================================================================

/// Record of a call made to the mock analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzeCall {
    pub content: String,
    pub source_url: NormalizedUrl,
    pub external_links: Vec<NormalizedUrl>,
    pub custom_prompt: Option<String>,
}

/// A mock source analyzer returning a fixed result.
#[derive(Clone, Default)]
pub struct MockAnalyzer {
    result: Arc<RwLock<Option<SummarizeResult>>>,
    failing: Arc<RwLock<bool>>,
    calls: Arc<RwLock<Vec<AnalyzeCall>>>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, result: SummarizeResult) -> Self {
        *self.result.write().unwrap() = Some(result);
        self
    }

    pub fn failing(self) -> Self {
        *self.failing.write().unwrap() = true;
        self
    }

    pub fn calls(&self) -> Vec<AnalyzeCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl SourceAnalyzer for MockAnalyzer {
    async fn analyze(
        &self,
        content: &str,
        source_url: &NormalizedUrl,
        external_links: &[NormalizedUrl],
        custom_prompt: Option<&str>,
    ) -> Result<SummarizeResult> {
        self.calls.write().unwrap().push(AnalyzeCall {
            content: content.to_string(),
            source_url: source_url.clone(),
            external_links: external_links.to_vec(),
            custom_prompt: custom_prompt.map(str::to_string),
        });

        if *self.failing.read().unwrap() {
            return Err(CompletionError::EmptyResponse.into());
        }

        Ok(self
            .result
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| summarize_result(&format!("Summary of {source_url}"))))
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Never,
    From(usize),
    On(usize),
}

/// A checkpoint sink that keeps every update it accepts.
///
/// Failing calls are counted but not recorded.
#[derive(Clone)]
pub struct RecordingSink {
    updates: Arc<RwLock<Vec<JobUpdate>>>,
    calls: Arc<RwLock<usize>>,
    failure: FailureMode,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            updates: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(RwLock::new(0)),
            failure: FailureMode::Never,
        }
    }

    /// Fail every call from the zero-based call index `n` onwards.
    pub fn failing_after(n: usize) -> Self {
        Self {
            failure: FailureMode::From(n),
            ..Self::new()
        }
    }

    /// Fail only the call with zero-based index `n`.
    pub fn failing_on(n: usize) -> Self {
        Self {
            failure: FailureMode::On(n),
            ..Self::new()
        }
    }

    pub fn updates(&self) -> Vec<JobUpdate> {
        self.updates.read().unwrap().clone()
    }
}

#[async_trait]
impl JobSink for RecordingSink {
    async fn record(&self, update: &JobUpdate) -> Result<()> {
        let index = {
            let mut calls = self.calls.write().unwrap();
            *calls += 1;
            *calls - 1
        };

        let fail = match self.failure {
            FailureMode::Never => false,
            FailureMode::From(n) => index >= n,
            FailureMode::On(n) => index == n,
        };
        if fail {
            return Err(CrawlerError::storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "checkpoint rejected",
            )));
        }

        self.updates.write().unwrap().push(update.clone());
        Ok(())
    }
}

// ============================================================================
// RecordingScheduler
// ============================================================================

/// A scheduler that only remembers what it was asked to run.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    tasks: Arc<RwLock<Vec<Task>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.read().unwrap().clone()
    }
}

#[async_trait]
impl TaskScheduler for RecordingScheduler {
    async fn schedule(&self, task: Task) -> Result<()> {
        self.tasks.write().unwrap().push(task);
        Ok(())
    }
}

// ============================================================================
// ScriptedBackend
// ============================================================================

/// A completion request as captured by [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub schema_name: String,
    pub instruction: String,
    pub content: String,
    pub schema: Value,
}

/// A completion backend that replays scripted responses in order.
///
/// Runs out with a transport error once the script is exhausted.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<RwLock<VecDeque<std::result::Result<RawCompletion, String>>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, content: Value, input_tokens: u32, output_tokens: u32) -> Self {
        self.script.write().unwrap().push_back(Ok(RawCompletion {
            content,
            input_tokens,
            output_tokens,
        }));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.script
            .write()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete_json(
        &self,
        request: CompletionRequest<'_>,
    ) -> std::result::Result<RawCompletion, CompletionError> {
        self.requests.write().unwrap().push(RecordedRequest {
            schema_name: request.schema_name.to_string(),
            instruction: request.instruction.to_string(),
            content: request.content.to_string(),
            schema: request.schema.clone(),
        });

        match self.script.write().unwrap().pop_front() {
            Some(Ok(completion)) => Ok(completion),
            Some(Err(message)) => Err(CompletionError::transport(message)),
            None => Err(CompletionError::transport("script exhausted")),
        }
    }
}
