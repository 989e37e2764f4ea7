//! CLI parsing and orchestration. Loads site rules, runs one pipeline and
//! prints its result as JSON on stdout. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::model::{DetailSeed, SearchResult};
use crate::rule::{download_rule, RuleRegistry, SiteRule};
use crate::scraper::{
    ChapterStyle, PoliteClient, ScrapeOptions, Scraper, ScraperError, DEFAULT_MAX_PAGES,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_RULES_DIR: &str = "rules";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Output(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(_) => 2,
            CliRunError::Output(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "yireader")]
#[command(about = "Search and read serialized fiction through declarative site rules")]
#[command(
    after_help = "Config file keys (rules_dir, user_agent, timeout_secs, request_delay_secs, max_chapter_pages, max_catalog_pages, chapter_style) are read from ./yireader.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Directory of site rule JSON files (overrides config; default ./rules).
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default none).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Delay between requests in seconds (overrides config; default 0).
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Debug logging and the full error chain.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List loaded site rules.
    Rules,

    /// Search every searchable rule, or only --rule.
    Search {
        key: String,
        #[arg(long)]
        rule: Option<String>,
    },

    /// Book details from a detail page URL.
    Detail {
        url: String,
        #[arg(long)]
        rule: Option<String>,
        /// Known title; skips extracting it from the page.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        cover: Option<String>,
        #[arg(long)]
        summary: Option<String>,
    },

    /// Table of contents from a catalog URL.
    Catalog {
        url: String,
        #[arg(long)]
        rule: Option<String>,
    },

    /// Chapter text from a chapter URL.
    Chapter {
        url: String,
        #[arg(long)]
        rule: Option<String>,
        /// Render paragraphs as <p> elements.
        #[arg(long)]
        html: bool,
    },

    /// Details and table of contents from a detail page URL.
    Book {
        url: String,
        #[arg(long)]
        rule: Option<String>,
    },

    /// Download a site rule document and print it or save it.
    FetchRule {
        download_url: String,
        /// Write the rule here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct RuleSummary<'a> {
    name: &'a str,
    url: &'a str,
    version: u32,
    searchable: bool,
}

fn parse_chapter_style(s: &str) -> Result<ChapterStyle, String> {
    match s.trim().to_lowercase().as_str() {
        "text" | "txt" => Ok(ChapterStyle::Text),
        "html" => Ok(ChapterStyle::Html),
        _ => Err(format!(
            "Invalid chapter_style value: '{}'. Use text or html.",
            s
        )),
    }
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<PoliteClient, CliRunError> {
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(0);
    let timeout_secs = args.timeout.or_else(|| config.and_then(|c| c.timeout_secs));
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()));

    let mut builder = PoliteClient::builder().delay_secs(delay_secs);
    if let Some(secs) = timeout_secs {
        builder = builder.timeout_secs(secs);
    }
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn scrape_options(config: Option<&Config>, html: bool) -> Result<ScrapeOptions, CliRunError> {
    let chapter_style = match config.and_then(|c| c.chapter_style.as_deref()) {
        _ if html => ChapterStyle::Html,
        Some(s) => parse_chapter_style(s).map_err(CliRunError::InvalidInput)?,
        None => ChapterStyle::Text,
    };
    Ok(ScrapeOptions {
        max_chapter_pages: config
            .and_then(|c| c.max_chapter_pages)
            .unwrap_or(DEFAULT_MAX_PAGES)
            .max(1),
        max_catalog_pages: config
            .and_then(|c| c.max_catalog_pages)
            .unwrap_or(DEFAULT_MAX_PAGES)
            .max(1),
        chapter_style,
    })
}

fn load_rules(args: &Args, config: Option<&Config>) -> Result<RuleRegistry, CliRunError> {
    let dir = args
        .rules
        .clone()
        .or_else(|| config.and_then(|c| c.rules_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_DIR));
    let registry = RuleRegistry::from_dir(&dir).map_err(|e| CliRunError::InvalidInput(e.to_string()))?;
    if registry.is_empty() {
        return Err(CliRunError::InvalidInput(format!(
            "No site rules found in {}. Use --rules DIR or fetch-rule to add one.",
            dir.display()
        )));
    }
    tracing::debug!(dir = %dir.display(), rules = registry.len(), "site rules loaded");
    Ok(registry)
}

/// Rule for a URL-based command: the named override, else the URL's host.
fn resolve_rule(registry: &RuleRegistry, url: &str, rule: Option<&str>) -> Result<Arc<SiteRule>, CliRunError> {
    registry.resolve(url, rule).map_err(|e| match &e {
        ScraperError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected an absolute URL, e.g. https://www.example.com/book/1/. Invalid: {}: {}",
            input, reason
        )),
        ScraperError::UnrecognizedHost { host } => CliRunError::InvalidInput(format!(
            "No site rule serves {}. Use --rule NAME to pick one.",
            host
        )),
        ScraperError::UnknownRule { name } => {
            CliRunError::InvalidInput(format!("No site rule named '{}'. See `yireader rules`.", name))
        }
        _ => CliRunError::Scraper(e),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliRunError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliRunError::Output(format!("Failed to encode JSON: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliRunError> {
    let json = to_json(value)?;
    writeln!(std::io::stdout().lock(), "{}", json)
        .map_err(|e| CliRunError::Output(format!("Failed to write output: {}", e)))
}

/// Search one named rule, or fan out over every searchable rule. Only the
/// fan-out skips failing sites; a named rule's error is returned.
async fn search_rows(
    scraper: &Scraper,
    registry: &RuleRegistry,
    key: &str,
    rule: Option<&str>,
) -> Result<Vec<SearchResult>, CliRunError> {
    match rule {
        Some(name) => {
            let rule = resolve_rule(registry, "", Some(name))?;
            Ok(scraper.search(&rule, key).await?)
        }
        None => Ok(scraper.search_all(&registry.searchable(), key).await),
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub async fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();
    let client = build_client(args, config)?;

    if let Command::FetchRule {
        download_url,
        output,
    } = &args.command
    {
        let rule = download_rule(&client, download_url).await?;
        return match output {
            Some(path) => {
                validate_output_path(path)?;
                std::fs::write(path, to_json(&rule)?).map_err(|e| {
                    CliRunError::Output(format!("Cannot write {}: {}", path.display(), e))
                })?;
                eprintln!("Wrote {} ({})", path.display(), rule.name);
                Ok(())
            }
            None => print_json(&rule),
        };
    }

    let registry = load_rules(args, config)?;
    let html = matches!(args.command, Command::Chapter { html: true, .. });
    let scraper = Scraper::new(client, scrape_options(config, html)?);

    match &args.command {
        Command::Rules => {
            let searchable = registry.searchable();
            let summaries: Vec<RuleSummary<'_>> = registry
                .all()
                .iter()
                .map(|r| RuleSummary {
                    name: &r.name,
                    url: &r.url,
                    version: r.version,
                    searchable: searchable.iter().any(|s| s.name == r.name),
                })
                .collect();
            print_json(&summaries)
        }
        Command::Search { key, rule } => {
            print_json(&search_rows(&scraper, &registry, key, rule.as_deref()).await?)
        }
        Command::Detail {
            url,
            rule,
            name,
            author,
            cover,
            summary,
        } => {
            let rule = resolve_rule(&registry, url, rule.as_deref())?;
            let seed = DetailSeed {
                name: name.clone(),
                author: author.clone(),
                cover: cover.clone(),
                summary: summary.clone(),
                detail: url.clone(),
            };
            print_json(&scraper.detail(&rule, &seed).await?)
        }
        Command::Catalog { url, rule } => {
            let rule = resolve_rule(&registry, url, rule.as_deref())?;
            print_json(&scraper.catalog(&rule, url).await?)
        }
        Command::Chapter { url, rule, .. } => {
            let rule = resolve_rule(&registry, url, rule.as_deref())?;
            print_json(&scraper.chapter(&rule, url).await?)
        }
        Command::Book { url, rule } => {
            let rule = resolve_rule(&registry, url, rule.as_deref())?;
            print_json(&scraper.book(&rule, &DetailSeed::new(url.clone())).await?)
        }
        Command::FetchRule { .. } => Ok(()),
    }
}
