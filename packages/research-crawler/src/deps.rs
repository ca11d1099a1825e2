//! Collaborators for entity operations, held behind traits for testability.

use std::sync::Arc;

use crate::links::{HtmlLinkClassifier, LinkClassifier};
use crate::traits::{ContentFetcher, PageSummarizer, SourceAnalyzer};

#[derive(Clone)]
pub struct CrawlerDeps {
    pub fetcher: Arc<dyn ContentFetcher>,
    pub classifier: Arc<dyn LinkClassifier>,
    pub summarizer: Arc<dyn PageSummarizer>,
    pub analyzer: Arc<dyn SourceAnalyzer>,
}

impl CrawlerDeps {
    /// Uses the anchor-based [`HtmlLinkClassifier`].
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        summarizer: Arc<dyn PageSummarizer>,
        analyzer: Arc<dyn SourceAnalyzer>,
    ) -> Self {
        Self {
            fetcher,
            classifier: Arc::new(HtmlLinkClassifier::new()),
            summarizer,
            analyzer,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn LinkClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}
