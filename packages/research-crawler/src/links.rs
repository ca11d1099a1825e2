//! Link discovery and classification.
//!
//! Anchors are pulled out of raw markup, noise links (auth pages, legal
//! boilerplate, social networks, non-web schemes) are dropped, and the rest
//! are sorted into internal, external and file links relative to the page.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::url::NormalizedUrl;

lazy_static! {
    static ref ANCHOR_SELECTOR: Selector = Selector::parse("a[href]").unwrap();

    static ref EXCLUDED_LINK: Regex = Regex::new(
        r"(?i)/(login|signin|register|signup|contact|privacy|terms|cookie|legal|disclaimer)|(facebook|twitter|linkedin|instagram|youtube)\.com|(mailto|tel|javascript):|#$"
    ).unwrap();

    static ref GITHUB_LINK: Regex = Regex::new(r"(?i)github\.com/").unwrap();

    static ref GITHUB_DOCUMENT: Regex = Regex::new(r"(?i)\.(pdf|doc|docx|zip)\b").unwrap();
}

/// Extensions that mark a link as a downloadable file rather than a page.
const FILE_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".tar", ".gz", ".rar",
    ".7z", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".bmp", ".webp", ".ico", ".csv", ".txt",
    ".rtf",
];

/// Second-level labels that sit under a country TLD as part of the suffix.
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "ac", "edu"];

/// Links found on a page, each list deduplicated in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLinks {
    pub internal: Vec<NormalizedUrl>,
    pub external: Vec<NormalizedUrl>,
    pub file: Vec<NormalizedUrl>,
}

impl ClassifiedLinks {
    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty() && self.file.is_empty()
    }

    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len() + self.file.len()
    }
}

/// Sorts the links of a page into internal / external / file.
pub trait LinkClassifier: Send + Sync {
    fn classify(&self, html: &str, base_url: &NormalizedUrl) -> ClassifiedLinks;
}

/// Anchor-based classifier over raw HTML.
#[derive(Debug, Clone, Default)]
pub struct HtmlLinkClassifier;

impl HtmlLinkClassifier {
    pub fn new() -> Self {
        Self
    }

    fn is_excluded(href: &str) -> bool {
        if EXCLUDED_LINK.is_match(href) {
            return true;
        }
        GITHUB_LINK.is_match(href) && !GITHUB_DOCUMENT.is_match(href)
    }

    fn is_file(url: &NormalizedUrl) -> bool {
        let path = match ::url::Url::parse(url.as_str()) {
            Ok(parsed) => parsed.path().to_ascii_lowercase(),
            Err(_) => url.as_str().to_ascii_lowercase(),
        };
        FILE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

impl LinkClassifier for HtmlLinkClassifier {
    fn classify(&self, html: &str, base_url: &NormalizedUrl) -> ClassifiedLinks {
        let document = Html::parse_document(html);
        let base_domain = base_url.host().map(|h| registrable_domain(&h));

        let mut links = ClassifiedLinks::default();
        let mut seen: HashSet<String> = HashSet::new();

        for href in document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
        {
            if href.is_empty() || href.starts_with('#') || Self::is_excluded(href) {
                continue;
            }

            let Ok(url) = NormalizedUrl::join(base_url, href) else {
                continue;
            };
            if !seen.insert(url.as_str().to_string()) {
                continue;
            }

            if Self::is_file(&url) {
                links.file.push(url);
            } else if url.host().map(|h| registrable_domain(&h)) == base_domain {
                links.internal.push(url);
            } else {
                links.external.push(url);
            }
        }

        debug!(
            url = %base_url,
            internal = links.internal.len(),
            external = links.external.len(),
            file = links.file.len(),
            "Classified page links"
        );

        links
    }
}

/// Registrable part of a host: `www.` stripped, then the last two labels, or
/// the last three for `<name>.co.uk`-style hosts.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let labels: Vec<&str> = host.split('.').collect();

    let keep = match labels.as_slice() {
        [.., second, tld]
            if labels.len() >= 3
                && tld.len() == 2
                && SECOND_LEVEL_SUFFIXES.contains(second) =>
        {
            3
        }
        _ => 2,
    };

    labels[labels.len().saturating_sub(keep)..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(url: &str) -> NormalizedUrl {
        NormalizedUrl::new(url).unwrap()
    }

    fn classify(html: &str, url: &str) -> ClassifiedLinks {
        HtmlLinkClassifier::new().classify(html, &base(url))
    }

    #[test]
    fn relative_pdf_is_a_file_link() {
        let links = classify(r#"<a href="report.pdf">Report</a>"#, "https://example.com/docs/");

        assert_eq!(links.file, vec![base("https://example.com/report.pdf")]);
        assert!(links.internal.is_empty());
        assert!(links.external.is_empty());
    }

    #[test]
    fn file_check_wins_over_domain() {
        let links = classify(
            r#"<a href="https://other.org/data.CSV">data</a><a href="/img/logo.png">logo</a>"#,
            "https://example.com",
        );

        assert_eq!(links.file.len(), 2);
        assert!(links.external.is_empty());
    }

    #[test]
    fn splits_internal_and_external() {
        let html = r#"
            <a href="/about">About</a>
            <a href="https://www.example.com/team">Team</a>
            <a href="https://blog.example.com/post">Blog</a>
            <a href="https://other.org/paper">Paper</a>
        "#;
        let links = classify(html, "https://example.com");

        assert_eq!(
            links.internal,
            vec![
                base("https://example.com/about"),
                base("https://www.example.com/team"),
                base("https://blog.example.com/post"),
            ]
        );
        assert_eq!(links.external, vec![base("https://other.org/paper")]);
    }

    #[test]
    fn drops_noise_links() {
        let html = r##"
            <a href="">empty</a>
            <a href="#top">fragment</a>
            <a href="/login">login</a>
            <a href="/Privacy-Policy">privacy</a>
            <a href="mailto:info@example.com">mail</a>
            <a href="tel:+123">call</a>
            <a href="javascript:void(0)">js</a>
            <a href="https://twitter.com/example">tweet</a>
            <a href="https://github.com/example/repo">repo</a>
            <a href="http://insecure.org/page">insecure</a>
            <a href="/research">research</a>
        "##;
        let links = classify(html, "https://example.com");

        assert_eq!(links.internal, vec![base("https://example.com/research")]);
        assert!(links.external.is_empty());
        assert!(links.file.is_empty());
    }

    #[test]
    fn keeps_github_documents() {
        let links = classify(
            r#"<a href="https://github.com/org/repo/raw/main/paper.pdf">paper</a>"#,
            "https://example.com",
        );
        assert_eq!(links.file.len(), 1);
    }

    #[test]
    fn github_documents_with_a_query_are_kept() {
        let links = classify(
            r#"
            <a href="https://github.com/org/repo/raw/main/paper.pdf?raw=true">paper</a>
            <a href="https://github.com/org/repo/blob/main/notes.docx#intro">notes</a>
            <a href="https://github.com/org/repo/tree/main/pdfs">folder</a>
            "#,
            "https://example.com",
        );
        assert_eq!(links.file.len(), 2);
        assert!(links.external.is_empty());
    }

    #[test]
    fn deduplicates_in_document_order() {
        let html = r#"
            <a href="/a">A</a><a href="/b">B</a><a href="/a/">A again</a><a href="https://example.com/a">A absolute</a>
        "#;
        let links = classify(html, "https://example.com");

        assert_eq!(
            links.internal,
            vec![base("https://example.com/a"), base("https://example.com/b")]
        );
    }

    #[test]
    fn registrable_domain_handles_country_suffixes() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("news.bbc.co.uk"), "bbc.co.uk");
        assert_eq!(registrable_domain("bbc.co.uk"), "bbc.co.uk");
        assert_eq!(registrable_domain("data.gov.au"), "data.gov.au");
        assert_eq!(registrable_domain("a.b.example.org"), "example.org");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }
}
