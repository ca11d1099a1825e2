//! LLM-backed page summarizer and source analyzer, plus the question
//! answering assistant when the OpenAI backend is enabled.

mod analyzer;
#[cfg(feature = "openai")]
pub mod assistant;
#[cfg(feature = "openai")]
mod openai;
pub mod prompts;
mod summarizer;

pub use analyzer::LlmSourceAnalyzer;
#[cfg(feature = "openai")]
pub use assistant::ResearchAssistant;
#[cfg(feature = "openai")]
pub use openai::OpenAiBackend;
pub use summarizer::LlmPageSummarizer;

use crate::url::NormalizedUrl;

/// Keep model-chosen links that are valid and among the candidates, in the
/// model's order, deduplicated, at most `limit`.
pub(crate) fn rank_links(
    chosen: &[String],
    candidates: &[NormalizedUrl],
    limit: usize,
) -> Vec<NormalizedUrl> {
    let mut ranked: Vec<NormalizedUrl> = Vec::new();
    for url in chosen.iter().filter_map(NormalizedUrl::try_new) {
        if ranked.len() == limit {
            break;
        }
        if candidates.contains(&url) && !ranked.contains(&url) {
            ranked.push(url);
        }
    }
    ranked
}

/// Render a candidate list for the prompt.
pub(crate) fn format_candidates(title: &str, links: &[NormalizedUrl]) -> String {
    if links.is_empty() {
        return format!("{title}: none");
    }
    let lines: Vec<String> = links.iter().map(|l| format!("- {l}")).collect();
    format!("{title}:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<NormalizedUrl> {
        NormalizedUrl::from_strings(raw)
    }

    #[test]
    fn rank_links_filters_to_candidates() {
        let candidates = urls(&["https://a.org/1", "https://a.org/2", "https://a.org/3"]);
        let chosen = vec![
            "https://a.org/3/".to_string(),
            "not a url".to_string(),
            "https://elsewhere.org".to_string(),
            "https://a.org/3".to_string(),
            "https://a.org/1".to_string(),
        ];

        assert_eq!(
            rank_links(&chosen, &candidates, 10),
            urls(&["https://a.org/3", "https://a.org/1"])
        );
    }

    #[test]
    fn rank_links_caps_length() {
        let candidates = urls(&["https://a.org/1", "https://a.org/2", "https://a.org/3"]);
        let chosen: Vec<String> = candidates.iter().map(|u| u.to_string()).collect();

        assert_eq!(rank_links(&chosen, &candidates, 2).len(), 2);
    }

    #[test]
    fn format_candidates_lists_links() {
        assert_eq!(format_candidates("Internal links", &[]), "Internal links: none");
        assert_eq!(
            format_candidates("Files", &urls(&["https://a.org/x.pdf"])),
            "Files:\n- https://a.org/x.pdf"
        );
    }
}
