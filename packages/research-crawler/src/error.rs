//! Typed errors for the research crawler.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Failures of a single
//! unit of work are recorded on the job as [`crate::JobError`] values instead
//! of being returned; the errors here are the ones callers must handle.

use thiserror::Error;
use uuid::Uuid;

pub use crate::completion::CompletionError;

pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Errors surfaced by entities, services and repositories.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("summary must not be empty")]
    InvalidSummaryValue,

    #[error("source not found: {url}")]
    SourceNotFound { url: String },

    #[error("page not found: {url}")]
    PageNotFound { url: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: Uuid },

    #[error("source already exists: {url}")]
    SourceAlreadyExists { url: String },

    #[error("page already exists: {url}")]
    PageAlreadyExists { url: String },

    /// The job exists but its outcome does not support the operation.
    #[error("job {job_id} has unsupported type: {kind}")]
    InvalidJobType { job_id: Uuid, kind: String },

    #[error("outcome of job {job_id} is already set")]
    OutcomeAlreadySet { job_id: Uuid },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl CrawlerError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Errors raised while fetching page content.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    /// The body arrived but could not be turned into text.
    #[error("could not read {url}: {message}")]
    Unreadable { url: String, message: String },
}

/// Render an error and its `source()` chain on one line, `outer: inner: root`.
pub fn render_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // thiserror's `{0}` already embeds the cause in the outer message
        if !rendered.ends_with(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}
