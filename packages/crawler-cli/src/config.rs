use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use research_crawler::DEFAULT_MAX_PAGES;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Only required by commands that call the model
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub max_pages: u32,
    pub retry_backoff: Duration,
    pub user_agent: Option<String>,
}

impl CrawlerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            max_pages: env::var("CRAWLER_MAX_PAGES")
                .unwrap_or_else(|_| DEFAULT_MAX_PAGES.to_string())
                .parse()
                .context("CRAWLER_MAX_PAGES must be a valid number")?,
            retry_backoff: Duration::from_secs(
                env::var("CRAWLER_RETRY_BACKOFF_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("CRAWLER_RETRY_BACKOFF_SECS must be a valid number")?,
            ),
            user_agent: env::var("CRAWLER_USER_AGENT").ok(),
        })
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .context("OPENAI_API_KEY must be set for this command")
    }
}
