//! Catalog pipeline: flat or volume-grouped chapter lists, optionally spread
//! over several pages.

use super::{next_link, page_of, Fetched, RuleRequest, Scraper, ScraperError};
use crate::block::{ContentBlock, ValueKind};
use crate::model::CatalogEntry;
use crate::rule::SiteRule;
use std::collections::HashSet;

impl Scraper {
    /// Fetch the catalog at `url`, following `catalog.page` links up to the
    /// configured page bound, and drop a mirrored "latest chapters" tail.
    pub async fn catalog(&self, rule: &SiteRule, url: &str) -> Result<Vec<CatalogEntry>, ScraperError> {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(url.trim().to_string());

        while let Some(page_url) = next.take() {
            if visited.len() >= self.options.max_catalog_pages {
                tracing::warn!(
                    rule = rule.name.as_str(),
                    pages = visited.len(),
                    "catalog page limit reached"
                );
                break;
            }
            if !visited.insert(page_url.clone()) {
                tracing::debug!(url = page_url.as_str(), "catalog page already visited");
                break;
            }
            let fetched = self.client.fetch(&RuleRequest::get(page_url.as_str())).await?;
            let (page_entries, following) = catalog_page(rule, fetched)?;
            tracing::debug!(url = page_url.as_str(), entries = page_entries.len(), "catalog page");
            entries.extend(page_entries);
            next = following;
        }

        Ok(trim_mirrored_tail(entries))
    }
}

fn catalog_page(rule: &SiteRule, fetched: Fetched) -> Result<(Vec<CatalogEntry>, Option<String>), ScraperError> {
    let page = page_of(fetched)?;
    let root = page.root();
    Ok((
        extract_catalog(rule, &root),
        next_link(&root, rule.catalog.page.as_deref()),
    ))
}

/// Catalog entries on one page, in document order. With a booklet rule each
/// `list` row becomes a heading entry (empty url) followed by its chapters at
/// level `true`. Chapters whose url comes out empty are dropped.
pub fn extract_catalog(rule: &SiteRule, root: &ContentBlock<'_>) -> Vec<CatalogEntry> {
    let catalog = &rule.catalog;
    let chapter = |block: &ContentBlock<'_>, level: bool| -> Option<CatalogEntry> {
        let url = block.value(&catalog.chapter, ValueKind::Href);
        if url.is_empty() {
            return None;
        }
        Some(CatalogEntry {
            name: block.value(&catalog.name, ValueKind::Text),
            url,
            level,
        })
    };

    let mut entries = Vec::new();
    for row in root.query(&catalog.list) {
        match &catalog.booklet {
            Some(booklet) => {
                entries.push(CatalogEntry {
                    name: row.value(&booklet.name, ValueKind::Text),
                    url: String::new(),
                    level: false,
                });
                entries.extend(row.query(&booklet.list).iter().filter_map(|c| chapter(c, true)));
            }
            None => entries.extend(chapter(&row, false)),
        }
    }
    entries
}

/// Many sites list the newest chapters above the full catalog. Walking in
/// from both ends, the head of the list mirrors its tail for as long as names
/// match pairwise; everything up to the last mirrored head index is dropped.
///
/// `[A, B, C, B, A]` becomes `[B, A]`; a list with no mirrored head is kept.
pub fn trim_mirrored_tail(mut entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let len = entries.len();
    let mut mirror: Option<usize> = None;
    let mut i = 0;
    while i < len {
        let j = len - 1 - i;
        if i > j || entries[i].name != entries[j].name {
            break;
        }
        if i == j && mirror.is_none() {
            break;
        }
        mirror = Some(i);
        i += 1;
    }
    if let Some(k) = mirror {
        tracing::debug!(dropped = k + 1, "trimmed mirrored catalog head");
        entries.drain(..=k);
    }
    entries
}
