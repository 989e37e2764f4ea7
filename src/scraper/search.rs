//! Search pipeline: one request per rule, one row per `search.list` match.

use super::{Fetched, RuleRequest, Scraper, ScraperError};
use crate::block::{ContentBlock, Page, ValueKind};
use crate::model::SearchResult;
use crate::rule::SiteRule;
use futures::future::join_all;
use std::sync::Arc;

impl Scraper {
    /// Search one site. An empty or unparseable response yields no rows.
    pub async fn search(&self, rule: &SiteRule, key: &str) -> Result<Vec<SearchResult>, ScraperError> {
        let request = RuleRequest::build(&rule.search.url, Some(key), rule.search.charset.as_deref());
        let fetched = self.client.fetch(&request).await?;
        Ok(rows_from(rule, fetched))
    }

    /// Search every given rule concurrently. A failing rule is logged and
    /// contributes no rows; results keep rule order.
    pub async fn search_all(&self, rules: &[Arc<SiteRule>], key: &str) -> Vec<SearchResult> {
        let searches = rules.iter().map(|rule| async move { (rule, self.search(rule, key).await) });
        let mut results = Vec::new();
        for (rule, outcome) in join_all(searches).await {
            match outcome {
                Ok(rows) => {
                    tracing::debug!(rule = rule.name.as_str(), rows = rows.len(), "search finished");
                    results.extend(rows);
                }
                Err(e) => tracing::warn!(rule = rule.name.as_str(), error = %e, "search failed"),
            }
        }
        results
    }
}

fn rows_from(rule: &SiteRule, fetched: Fetched) -> Vec<SearchResult> {
    let url = fetched.url.to_string();
    match Page::new(Some(fetched.url), fetched.body) {
        Some(page) => extract_search(rule, &page.root()),
        None => {
            tracing::debug!(rule = rule.name.as_str(), url = url.as_str(), "empty search response");
            Vec::new()
        }
    }
}

/// Extract search rows from a parsed result page. Rows whose detail URL comes
/// out empty are dropped.
pub fn extract_search(rule: &SiteRule, root: &ContentBlock<'_>) -> Vec<SearchResult> {
    let search = &rule.search;
    root.query(&search.list)
        .iter()
        .filter_map(|row| {
            let detail = row.value(&search.detail, ValueKind::Href);
            if detail.is_empty() {
                tracing::debug!(rule = rule.name.as_str(), "search row without detail url skipped");
                return None;
            }
            Some(SearchResult {
                name: row.value(&search.name, ValueKind::Text),
                author: optional_value(row, search.author.as_deref(), ValueKind::Text),
                summary: optional_value(row, search.summary.as_deref(), ValueKind::Text),
                cover: optional_value(row, search.cover.as_deref(), ValueKind::Src),
                detail,
                source: rule.name.clone(),
            })
        })
        .collect()
}

/// Value of an expression the rule may leave undeclared; "" when it does.
pub(super) fn optional_value(block: &ContentBlock<'_>, expr: Option<&str>, kind: ValueKind) -> String {
    expr.map(|e| block.value(e, kind)).unwrap_or_default()
}
