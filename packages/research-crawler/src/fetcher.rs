//! HTTP content fetcher: reqwest for transport, scraper + htmd for markdown.
//!
//! No JavaScript rendering, so static HTML sites only. PDF documents are
//! reduced to their plain text with `pdf-extract`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::traits::{ContentFetcher, FetchedPage};
use crate::url::{NormalizedUrl, UrlType};

/// Browser-like User-Agent; many sites refuse obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".main",
    ".post-content",
    ".entry-content",
];

const BOILERPLATE_SELECTORS: &[&str] = &[
    "nav", "header", "footer", "aside", ".nav", ".navbar", ".sidebar", ".menu", "#nav",
    "#header", "#footer", "#sidebar", "script", "style", "noscript", "iframe",
];

pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl HttpContentFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }

    async fn get(&self, url: &NormalizedUrl) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<FetchedPage, FetchError> {
        debug!(url = %url, "Fetching page");
        let response = self.get(url).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        // Servers often label PDFs as octet-stream, so the extension counts too
        if content_type.starts_with("application/pdf") || url.url_type() == UrlType::Pdf {
            let bytes = response.bytes().await.map_err(|e| network_error(url, e))?;
            let markdown = pdf_text(url, bytes.to_vec()).await?;
            debug!(url = %url, chars = markdown.len(), "Extracted PDF text");

            return Ok(FetchedPage {
                markdown,
                html: None,
            });
        }

        let html = response.text().await.map_err(|e| network_error(url, e))?;
        let markdown = html_to_markdown(&main_content(&html));

        if markdown.trim().len() < 100 {
            warn!(url = %url, "Page has minimal content");
        }

        Ok(FetchedPage {
            markdown,
            html: Some(html),
        })
    }
}

fn network_error(url: &NormalizedUrl, err: reqwest::Error) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Plain text of every page of a PDF document.
///
/// Parsing is CPU-bound and the parser panics on some malformed files, so it
/// runs on the blocking pool where a panic surfaces as a join error.
async fn pdf_text(url: &NormalizedUrl, bytes: Vec<u8>) -> Result<String, FetchError> {
    let unreadable = |message: String| FetchError::Unreadable {
        url: url.to_string(),
        message,
    };

    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| unreadable(e.to_string()))?
        .map_err(|e| unreadable(e.to_string()))?;

    Ok(text.trim().to_string())
}

/// Main content area of the document, or the body with boilerplate removed.
fn main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in MAIN_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()) {
        if let Some(main) = document.select(&selector).next() {
            return main.html();
        }
    }

    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next().map(|b| b.html()))
        .unwrap_or_else(|| document.html());

    strip_boilerplate(&document, body)
}

fn strip_boilerplate(document: &Html, mut html: String) -> String {
    for selector in BOILERPLATE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
    {
        for element in document.select(&selector) {
            html = html.replace(&element.html(), "");
        }
    }
    html
}

fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| {
        let document = Html::parse_document(html);
        document.root_element().text().collect::<String>()
    })
}
