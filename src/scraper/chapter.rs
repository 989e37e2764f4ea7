//! Chapter pipeline: paragraphs from the content container, purified and
//! joined, following `chapter.page` links for chapters split across pages.

use super::{next_link, page_of, ChapterStyle, Fetched, RuleRequest, Scraper, ScraperError};
use crate::block::ContentBlock;
use crate::model::ChapterResult;
use crate::rule::SiteRule;
use regex::Regex;
use std::collections::HashSet;

impl Scraper {
    pub async fn chapter(&self, rule: &SiteRule, url: &str) -> Result<ChapterResult, ScraperError> {
        let url = url.trim();
        let fetched = self.client.fetch(&RuleRequest::get(url)).await?;
        let Some(content) = rule.chapter.content.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(ChapterResult {
                content: fetched.body.into_text(),
            });
        };

        let purifier = Purifier::new(&rule.chapter.purify);
        let first = chapter_page(rule, content, fetched)?;
        let mut paragraphs = match first.paragraphs {
            Some(p) => purifier.apply(p),
            None => {
                return Err(ScraperError::MissingContent {
                    url: url.to_string(),
                })
            }
        };

        let mut visited = HashSet::from([url.to_string()]);
        let mut next = first.next;
        while let Some(page_url) = next.take() {
            if visited.len() >= self.options.max_chapter_pages {
                tracing::warn!(url, pages = visited.len(), "chapter page limit reached");
                break;
            }
            if !visited.insert(page_url.clone()) {
                tracing::debug!(url = page_url.as_str(), "chapter page already visited");
                break;
            }
            let fetched = self.client.fetch(&RuleRequest::get(page_url.as_str())).await?;
            let page = chapter_page(rule, content, fetched)?;
            match page.paragraphs {
                Some(p) => paragraphs.extend(purifier.apply(p)),
                None => {
                    tracing::warn!(url = page_url.as_str(), "chapter continuation has no content, stopping");
                    break;
                }
            }
            next = page.next;
        }

        Ok(ChapterResult {
            content: render(&paragraphs, self.options.chapter_style),
        })
    }
}

struct ChapterPage {
    /// None when the content container matched nothing.
    paragraphs: Option<Vec<String>>,
    next: Option<String>,
}

fn chapter_page(rule: &SiteRule, content: &str, fetched: Fetched) -> Result<ChapterPage, ScraperError> {
    let page = page_of(fetched)?;
    let root = page.root();
    Ok(ChapterPage {
        paragraphs: extract_paragraphs(&root, content),
        next: next_link(&root, rule.chapter.page.as_deref()),
    })
}

/// Non-empty trimmed lines of every block the content expression matches.
pub fn extract_paragraphs(root: &ContentBlock<'_>, content: &str) -> Option<Vec<String>> {
    let blocks = root.query(content);
    if blocks.is_empty() {
        return None;
    }
    Some(
        blocks
            .iter()
            .flat_map(|b| {
                b.text()
                    .split('\n')
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .collect(),
    )
}

/// Drops paragraphs that fully match one of the rule's purify patterns.
pub struct Purifier {
    patterns: Vec<Regex>,
}

impl Purifier {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|p| match Regex::new(&format!("^(?:{})$", p)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = p.as_str(), error = %e, "skipping invalid purify pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn apply(&self, paragraphs: Vec<String>) -> Vec<String> {
        paragraphs
            .into_iter()
            .filter(|p| !self.patterns.iter().any(|re| re.is_match(p)))
            .collect()
    }
}

fn render(paragraphs: &[String], style: ChapterStyle) -> String {
    match style {
        ChapterStyle::Text => paragraphs.join("\n"),
        ChapterStyle::Html => paragraphs
            .iter()
            .map(|p| format!("<p>{}</p>", html_escape_inner(p)))
            .collect(),
    }
}

fn html_escape_inner(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
