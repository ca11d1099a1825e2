//! Named views over sources, each a pruned copy of the matching sources.
//!
//! A view keeps only the jobs that put a source into it, and only the pages
//! still holding such a job. Inputs are never modified.

use crate::entities::{Page, Source};
use crate::job::{PageJob, SourceJob};

/// Keep the jobs matching the predicates. `None` when nothing matched.
fn prune(
    source: &Source,
    keep_source_job: impl Fn(&SourceJob) -> bool,
    keep_page_job: impl Fn(&PageJob) -> bool,
) -> Option<Source> {
    let jobs: Vec<SourceJob> = source
        .jobs
        .iter()
        .filter(|&job| keep_source_job(job))
        .cloned()
        .collect();

    let pages: Vec<Page> = source
        .pages
        .iter()
        .filter_map(|page| {
            let jobs: Vec<PageJob> = page
                .jobs
                .iter()
                .filter(|&job| keep_page_job(job))
                .cloned()
                .collect();
            (!jobs.is_empty()).then(|| Page {
                url: page.url.clone(),
                jobs,
            })
        })
        .collect();

    if jobs.is_empty() && pages.is_empty() {
        return None;
    }

    Some(Source {
        url: source.url.clone(),
        pages,
        jobs,
    })
}

/// Sources with LLM results still awaiting review.
pub fn unreviewed(sources: &[Source]) -> Vec<Source> {
    sources
        .iter()
        .filter_map(|s| prune(s, SourceJob::is_unreviewed, PageJob::is_unreviewed))
        .collect()
}

/// Sources with at least one failed job.
pub fn failed(sources: &[Source]) -> Vec<Source> {
    sources
        .iter()
        .filter_map(|s| prune(s, SourceJob::is_failed, PageJob::is_failed))
        .collect()
}

/// Sources with a finished crawl. Pages are dropped.
pub fn crawled(sources: &[Source]) -> Vec<Source> {
    sources
        .iter()
        .filter_map(|s| prune(s, SourceJob::is_crawl_result, |_| false))
        .collect()
}

/// Sources nobody has worked on yet.
pub fn discovered(sources: &[Source]) -> Vec<Source> {
    sources.iter().filter(|s| !s.has_jobs()).cloned().collect()
}

/// Sources with jobs that have no outcome yet.
pub fn in_progress(sources: &[Source]) -> Vec<Source> {
    sources
        .iter()
        .filter_map(|s| prune(s, SourceJob::is_pending, PageJob::is_pending))
        .collect()
}
