//! Request layer and rule-driven extraction pipelines.
//!
//! Every pipeline fetches, roots a [Page] at the decoded body and walks it
//! with the rule's expressions. Parsing happens in synchronous helpers so no
//! parse tree is ever held across an `.await`.

mod client;
mod decode;
mod error;
mod request;

pub mod catalog;
pub mod chapter;
pub mod detail;
pub mod search;

pub use catalog::trim_mirrored_tail;
pub use client::{Fetched, PoliteClient, PoliteClientBuilder};
pub use decode::{charset_from_content_type, decode_body, resolve_encoding, sniff_meta_charset};
pub use error::ScraperError;
pub use request::{encode_key, RuleRequest};

use crate::block::{ContentBlock, Page, ValueKind};
use crate::model::{BookResult, DetailSeed};
use crate::rule::SiteRule;

/// Default bound on pages followed through a `page` link.
pub const DEFAULT_MAX_PAGES: usize = 32;

/// How chapter paragraphs are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChapterStyle {
    /// Paragraphs joined with `\n`.
    #[default]
    Text,
    /// Each paragraph escaped and wrapped in `<p>...</p>`.
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// Upper bound on chapter pages fetched per chapter, first page included.
    pub max_chapter_pages: usize,
    /// Upper bound on catalog pages fetched per catalog, first page included.
    pub max_catalog_pages: usize,
    pub chapter_style: ChapterStyle,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            max_chapter_pages: DEFAULT_MAX_PAGES,
            max_catalog_pages: DEFAULT_MAX_PAGES,
            chapter_style: ChapterStyle::Text,
        }
    }
}

/// Runs the search, detail, catalog, chapter and book pipelines over one client.
#[derive(Debug)]
pub struct Scraper {
    client: PoliteClient,
    options: ScrapeOptions,
}

impl Scraper {
    pub fn new(client: PoliteClient, options: ScrapeOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &PoliteClient {
        &self.client
    }

    pub fn options(&self) -> &ScrapeOptions {
        &self.options
    }

    /// Detail page, then the catalog it points at.
    pub async fn book(&self, rule: &SiteRule, seed: &DetailSeed) -> Result<BookResult, ScraperError> {
        let detail = self.detail(rule, seed).await?;
        let catalog_entries = self.catalog(rule, &detail.catalog).await?;
        Ok(BookResult {
            detail,
            catalog_entries,
        })
    }
}

/// Root a page at a fetched body; an empty or unparseable body is an error.
fn page_of(fetched: Fetched) -> Result<Page, ScraperError> {
    let url = fetched.url.to_string();
    Page::new(Some(fetched.url), fetched.body).ok_or(ScraperError::EmptyDocument { url })
}

/// Next-page link declared by a rule's `page` expression, if any.
fn next_link(root: &ContentBlock<'_>, expr: Option<&str>) -> Option<String> {
    let expr = expr.filter(|e| !e.trim().is_empty())?;
    let link = root.value(expr, ValueKind::Href);
    (!link.is_empty()).then_some(link)
}
