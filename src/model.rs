//! Result records produced by the extraction pipelines.
//!
//! Field names serialize in camelCase, the shape API consumers already read.

use serde::{Deserialize, Serialize};

/// One search result row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub name: String,
    pub author: String,
    pub summary: String,
    pub cover: String,
    /// Absolute detail page URL. Rows without one are never produced.
    pub detail: String,
    /// Name of the site rule that produced the row.
    pub source: String,
}

/// Caller-supplied input to the detail pipeline, usually a search row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailSeed {
    pub name: Option<String>,
    pub author: Option<String>,
    pub cover: Option<String>,
    pub summary: Option<String>,
    pub detail: String,
}

impl DetailSeed {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Default::default()
        }
    }
}

impl From<&SearchResult> for DetailSeed {
    fn from(row: &SearchResult) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            name: non_empty(&row.name),
            author: non_empty(&row.author),
            cover: non_empty(&row.cover),
            summary: non_empty(&row.summary),
            detail: row.detail.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailResult {
    pub name: String,
    pub author: String,
    pub cover: String,
    pub summary: String,
    pub status: String,
    pub update: String,
    pub last_chapter: String,
    /// Catalog URL; the detail URL when the site lists chapters on the detail page.
    pub catalog: String,
}

/// One table-of-contents entry. Volume headings have an empty `url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub url: String,
    /// True for chapters nested inside a volume.
    pub level: bool,
}

impl CatalogEntry {
    pub fn is_heading(&self) -> bool {
        self.url.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterResult {
    pub content: String,
}

/// Detail plus catalog in one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResult {
    #[serde(flatten)]
    pub detail: DetailResult,
    pub catalog_entries: Vec<CatalogEntry>,
}
