//! Validated, canonical URL value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CrawlerError, Result};

/// What kind of document a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlType {
    Html,
    Pdf,
}

/// An `https` URL with trailing slashes stripped.
///
/// Equality is plain string equality on the normalized form, so
/// `https://a.org/x/` and `https://a.org/x` are the same page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();

        if raw.is_empty() {
            return Err(CrawlerError::invalid_url(raw, "URL cannot be empty"));
        }
        if !raw.starts_with("https://") {
            return Err(CrawlerError::invalid_url(raw, "only https URLs are allowed"));
        }

        let normalized = raw.trim_end_matches('/');
        if normalized.matches("://").count() != 1 {
            return Err(CrawlerError::invalid_url(raw, "invalid URL format"));
        }

        Ok(Self(normalized.to_string()))
    }

    /// Like [`NormalizedUrl::new`] but discards the reason.
    pub fn try_new(raw: impl AsRef<str>) -> Option<Self> {
        Self::new(raw).ok()
    }

    /// Resolve `href` against `base` and normalize the result.
    pub fn join(base: &NormalizedUrl, href: &str) -> Result<Self> {
        let base_url = base.parse()?;
        let joined = base_url
            .join(href)
            .map_err(|e| CrawlerError::invalid_url(href, e.to_string()))?;
        Self::new(joined.as_str())
    }

    /// Convert raw strings, silently skipping the invalid ones.
    pub fn from_strings<I, S>(raw: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().filter_map(Self::try_new).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased host, if the URL parses.
    pub fn host(&self) -> Option<String> {
        self.parse()
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    pub fn url_type(&self) -> UrlType {
        if self.0.to_ascii_lowercase().ends_with(".pdf") {
            UrlType::Pdf
        } else {
            UrlType::Html
        }
    }

    fn parse(&self) -> Result<::url::Url> {
        ::url::Url::parse(&self.0).map_err(|e| CrawlerError::invalid_url(&self.0, e.to_string()))
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NormalizedUrl {
    type Error = CrawlerError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NormalizedUrl {
    type Error = CrawlerError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NormalizedUrl> for String {
    fn from(url: NormalizedUrl) -> Self {
        url.0
    }
}

impl PartialEq<str> for NormalizedUrl {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NormalizedUrl {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
