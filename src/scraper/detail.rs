//! Detail pipeline. Caller-supplied seed fields win over page extraction.

use super::search::optional_value;
use super::{page_of, Fetched, RuleRequest, Scraper, ScraperError};
use crate::block::{ContentBlock, ValueKind};
use crate::model::{DetailResult, DetailSeed};
use crate::rule::SiteRule;

impl Scraper {
    /// Fetch the seed's detail page and fill a [DetailResult].
    pub async fn detail(&self, rule: &SiteRule, seed: &DetailSeed) -> Result<DetailResult, ScraperError> {
        let url = seed.detail.trim();
        if url.is_empty() {
            return Err(ScraperError::MissingDetailUrl);
        }
        let fetched = self.client.fetch(&RuleRequest::get(url)).await?;
        detail_from(rule, seed, fetched)
    }
}

fn detail_from(rule: &SiteRule, seed: &DetailSeed, fetched: Fetched) -> Result<DetailResult, ScraperError> {
    let page = page_of(fetched)?;
    Ok(extract_detail(rule, seed, &page.root()))
}

/// Fill detail fields: a non-empty seed value, else the rule's extraction,
/// else "". The catalog URL falls back to the detail URL when the rule
/// declares no catalog link or the link comes out empty.
pub fn extract_detail(rule: &SiteRule, seed: &DetailSeed, root: &ContentBlock<'_>) -> DetailResult {
    let d = &rule.detail;
    let pick = |seeded: &Option<String>, expr: &Option<String>, kind: ValueKind| -> String {
        match seeded.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => optional_value(root, expr.as_deref(), kind),
        }
    };
    let catalog = optional_value(root, d.catalog.as_deref(), ValueKind::Href);
    DetailResult {
        name: pick(&seed.name, &d.name, ValueKind::Text),
        author: pick(&seed.author, &d.author, ValueKind::Text),
        cover: pick(&seed.cover, &d.cover, ValueKind::Src),
        summary: pick(&seed.summary, &d.summary, ValueKind::Text),
        status: optional_value(root, d.status.as_deref(), ValueKind::Text),
        update: optional_value(root, d.update.as_deref(), ValueKind::Text),
        last_chapter: optional_value(root, d.last_chapter.as_deref(), ValueKind::Text),
        catalog: if catalog.is_empty() {
            seed.detail.trim().to_string()
        } else {
            catalog
        },
    }
}
