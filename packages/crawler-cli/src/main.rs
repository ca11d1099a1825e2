//! Command-line front end for the research crawler.
//!
//! State lives in a JSON snapshot (see `--state`) that is loaded before each
//! command and written back afterwards. Background tasks scheduled by a
//! command, such as the summary that follows the last approval, run before
//! the process exits. `sources`, `read` and `ask` query what has been crawled
//! so far.

mod config;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use openai_client::OpenAIClient;
use research_crawler::{
    CrawlParams, CrawlService, CrawlerDeps, HttpContentFetcher, InProcessScheduler,
    KnowledgeService, LlmPageSummarizer, LlmSourceAnalyzer, OpenAiBackend, Repository,
    ResearchAssistant, RetryPolicy, ReviewService, SchedulerWorker, StructuredCompletion,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::CrawlerConfig;

#[derive(Parser)]
#[command(name = "crawler")]
#[command(about = "Crawl research sources and review their summaries")]
struct Cli {
    /// JSON snapshot holding sources, pages and jobs
    #[arg(long, global = true, default_value = "crawler-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new source
    AddSource { url: String },

    /// Register a page under an existing source
    AddPage { source_url: String, page_url: String },

    /// Show a source with its pages and jobs
    Show { url: String },

    /// Show a single page and its jobs
    Page { url: String },

    /// List sources, optionally through a review view
    List {
        #[arg(long, value_enum)]
        view: Option<View>,
    },

    /// Delete a source with its pages and jobs
    Delete { url: String },

    /// Scrape a registered page
    Scrape { url: String },

    /// Extract a page from its latest successful scrape
    Extract {
        url: String,
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Summarize a source from its extracted pages
    Summarize {
        url: String,
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Crawl a source, creating it if needed
    Crawl {
        url: String,
        #[arg(long)]
        max_pages: Option<u32>,
        #[arg(long)]
        extract_prompt: Option<String>,
        #[arg(long)]
        summarize_prompt: Option<String>,
    },

    /// Approve an extraction or summary
    Approve { job_id: Uuid },

    /// Replace the summary text of an extraction or summary
    EditSummary { job_id: Uuid, summary: String },

    /// List summarized sources with their classification
    Sources,

    /// Show key facts, quotes and figures gathered for sources
    Read {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Ask a question answered from the crawled sources
    Ask { question: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum View {
    Unreviewed,
    Failed,
    Crawled,
    Discovered,
    InProgress,
}

impl Commands {
    fn calls_model(&self) -> bool {
        matches!(
            self,
            Commands::Extract { .. }
                | Commands::Summarize { .. }
                | Commands::Crawl { .. }
                | Commands::Approve { .. }
                | Commands::Ask { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,research_crawler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = CrawlerConfig::from_env().context("Failed to load configuration")?;
    if cli.command.calls_model() {
        config.require_api_key()?;
    }

    let store = Arc::new(state::load(&cli.state).await?);
    let client = openai_client(&config);
    let deps = build_deps(&config, &client)?;
    let crawl = CrawlService::new(store.clone(), deps);
    let (scheduler, receiver) = InProcessScheduler::channel();
    let review = ReviewService::new(crawl, Arc::new(scheduler));
    let worker = SchedulerWorker::new(receiver, review.clone());
    let knowledge = KnowledgeService::new(store.clone());
    let assistant = ResearchAssistant::new(client, &config.openai_model, knowledge.clone());

    let app = App {
        config: &config,
        review: &review,
        knowledge: &knowledge,
        assistant: &assistant,
    };
    let outcome = app.run(cli.command).await;

    let background = worker.drain().await;
    if background > 0 {
        tracing::info!(tasks = background, "Ran background tasks");
    }
    // Persist whatever was recorded, even when the command failed midway
    state::save(&cli.state, &store).await?;

    outcome
}

// ============================================================================
// Wiring
// ============================================================================

fn openai_client(config: &CrawlerConfig) -> OpenAIClient {
    let client = OpenAIClient::new(config.openai_api_key.clone().unwrap_or_default());
    match &config.openai_base_url {
        Some(base_url) => client.with_base_url(base_url),
        None => client,
    }
}

fn build_deps(config: &CrawlerConfig, client: &OpenAIClient) -> Result<CrawlerDeps> {
    let fetcher = match &config.user_agent {
        Some(agent) => HttpContentFetcher::with_user_agent(agent),
        None => HttpContentFetcher::new(),
    }
    .context("Failed to build HTTP client")?;

    let backend = OpenAiBackend::new(client.clone(), &config.openai_model);
    let completion = StructuredCompletion::new(Arc::new(backend))
        .with_retry(RetryPolicy::new().with_backoff(config.retry_backoff));

    Ok(CrawlerDeps::new(
        Arc::new(fetcher),
        Arc::new(LlmPageSummarizer::new(completion.clone())),
        Arc::new(LlmSourceAnalyzer::new(completion)),
    ))
}

// ============================================================================
// Commands
// ============================================================================

struct App<'a> {
    config: &'a CrawlerConfig,
    review: &'a ReviewService,
    knowledge: &'a KnowledgeService,
    assistant: &'a ResearchAssistant,
}

impl App<'_> {
    async fn run(&self, command: Commands) -> Result<()> {
        let crawl = self.review.crawl_service();

        match command {
            Commands::AddSource { url } => {
                let source = crawl.add_source(&url).await?;
                print_json("Source added", &source)
            }
            Commands::AddPage {
                source_url,
                page_url,
            } => {
                let page = crawl.add_page_to_source(&source_url, &page_url).await?;
                print_json("Page added", &page)
            }
            Commands::Show { url } => {
                let source = crawl.get_source(&url).await?;
                print_json("Source", &source)
            }
            Commands::Page { url } => {
                let page = crawl.get_page(&url).await?;
                print_json("Page", &page)
            }
            Commands::List { view } => {
                let repo = crawl.repository();
                let sources = match view {
                    None => repo.list_sources().await?,
                    Some(View::Unreviewed) => repo.unreviewed_sources().await?,
                    Some(View::Failed) => repo.failed_sources().await?,
                    Some(View::Crawled) => repo.crawled_sources().await?,
                    Some(View::Discovered) => repo.discovered_sources().await?,
                    Some(View::InProgress) => repo.in_progress_sources().await?,
                };
                print_json(&format!("{} source(s)", sources.len()), &sources)
            }
            Commands::Delete { url } => {
                crawl.delete_source(&url).await?;
                println!("{} {}", "Deleted".bright_red().bold(), url);
                Ok(())
            }
            Commands::Scrape { url } => {
                let job = crawl.scrape_page(&url).await?;
                print_json("Scrape job", &job)
            }
            Commands::Extract { url, prompt } => {
                let owned = crawl.get_page(&url).await?;
                let Some(scraped) = owned.page.latest_scrape_result() else {
                    bail!("{url} has no successful scrape yet; run `crawler scrape {url}` first");
                };
                let markdown = scraped.markdown.clone();
                let job = crawl
                    .extract_page(&url, &markdown, prompt.as_deref())
                    .await?;
                print_json("Extract job", &job)
            }
            Commands::Summarize { url, prompt } => {
                let source = crawl.get_source(&url).await?;
                let content = source.page_digest(false);
                if content.is_empty() {
                    bail!("{url} has no extracted pages to summarize");
                }
                let job = crawl
                    .summarize_source(&url, &content, prompt.as_deref())
                    .await?;
                print_json("Summarize job", &job)
            }
            Commands::Crawl {
                url,
                max_pages,
                extract_prompt,
                summarize_prompt,
            } => {
                let mut params = CrawlParams::new(max_pages.unwrap_or(self.config.max_pages));
                if let Some(prompt) = extract_prompt {
                    params = params.with_extract_prompt(prompt);
                }
                let job = crawl
                    .crawl_source(&url, &params, summarize_prompt.as_deref())
                    .await?;
                print_json("Crawl job", &job)
            }
            Commands::Approve { job_id } => {
                let job = self.review.approve(job_id).await?;
                print_json("Approved", &job)
            }
            Commands::EditSummary { job_id, summary } => {
                let job = self.review.edit_summary(job_id, &summary).await?;
                print_json("Summary updated", &job)
            }
            Commands::Sources => {
                let sources = self.knowledge.list_crawled_sources().await?;
                print_json(&format!("{} summarized source(s)", sources.len()), &sources)
            }
            Commands::Read { urls } => {
                let details = self.knowledge.read_sources(&urls).await;
                print_json("Source details", &details)
            }
            Commands::Ask { question } => {
                let answer = self.assistant.ask(&question).await?;
                println!("{}", "Answer".bright_green().bold());
                println!("{answer}");
                Ok(())
            }
        }
    }
}

fn print_json<T: Serialize>(heading: &str, value: &T) -> Result<()> {
    println!("{}", heading.bright_green().bold());
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
