//! Default instructions for the page summarizer and source analyzer.
//!
//! Callers override these per crawl; only the instruction is stored on the
//! result, never the page body.

pub const PAGE_EXTRACTION: &str = "\
You are assisting a literature review. Read the page below and fill in every field.

- summary: a concise summary of the page, leading with its conclusions and main findings.
- key_facts: factual statements and findings worth citing, with enough context to stand alone.
- key_quotes: direct quotes from researchers, officials or other named people, attributed.
- key_figures: statistics, measurements and other quantitative data points with their units.
- trustworthiness: a short judgement of how reliable the page is and why (authorship, sourcing, evidence).
- relevancy: how useful the page is for research on its topic.
- relevant_internal_links, relevant_external_links, relevant_file_links: pick from the candidate \
links listed under the page, most relevant first, at most 10 each. Prefer articles, reports, datasets \
and documentation. Copy URLs exactly as listed.

Write \"No relevant information found\" for any text field with nothing to report.";

pub const SOURCE_ANALYSIS: &str = "\
Below are summaries of pages from one website. Analyze the website as a whole and fill in every field.

- summary, key_facts, key_quotes, key_figures: consolidated across all pages, without repetition.
- data_origin: who publishes the site.
- source_format: the dominant kind of material on the site.
- focus_area: the main subject the material is about.
- dataset_presence: whether the site offers downloadable data.
- relevant_external_links: pick from the candidate external links listed, most relevant first, at most 5. \
Copy URLs exactly as listed.";

pub const RESEARCH_ASSISTANT: &str = "\
You help users explore research sources collected by a web crawler. You have two tools:

1. list_crawled_sources: every summarized source with its summary, data origin, format, focus area and \
whether it offers datasets.
2. read_sources: key facts, quotes and figures for the source URLs you pass in.

List the sources first, then read the ones that matter for the question. Combine what several sources \
say when that helps, and name the source URL behind every claim.

Answer in plain text. Do not use markdown headings, bold or other markup.";

/// Reply when the model keeps calling tools without answering.
pub const TOOL_LIMIT_REPLY: &str =
    "I've reached the maximum number of function calls. Please try a simpler request.";
