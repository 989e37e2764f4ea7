//! Site rules: the per-site JSON documents that drive every pipeline, and the
//! registry they are loaded into at startup.
//!
//! Unknown fields are ignored so that older builds keep reading newer rule
//! documents.

use crate::scraper::{PoliteClient, RuleRequest, ScraperError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRule {
    pub name: String,
    /// Host matcher: a rule applies to any URL whose host contains this string.
    pub url: String,
    #[serde(default)]
    pub version: u32,
    pub search: SearchRule,
    #[serde(default)]
    pub detail: DetailRule,
    pub catalog: CatalogRule,
    #[serde(default)]
    pub chapter: ChapterRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRule {
    /// Search URL expression; `${key}` is the search term.
    pub url: String,
    /// Charset used to percent-encode the search term. UTF-8 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    pub list: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chapter: Option<String>,
    /// Catalog link on the detail page. The detail URL itself when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookletRule {
    pub name: String,
    pub list: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRule {
    pub list: String,
    /// When present every `list` row is a volume containing `booklet.list` chapters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booklet: Option<BookletRule>,
    pub name: String,
    pub chapter: String,
    /// Next catalog page link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterRule {
    /// Text container. When absent the whole body is the chapter text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Regexes; a paragraph that fully matches one of them is dropped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub purify: Vec<String>,
    /// Next chapter page link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

impl SiteRule {
    pub fn from_json(s: &str) -> Result<Self, ScraperError> {
        serde_json::from_str(s).map_err(|e| ScraperError::InvalidRule {
            reason: e.to_string(),
        })
    }

    /// True when this rule serves the given host.
    pub fn matches_host(&self, host: &str) -> bool {
        !self.url.is_empty() && host.contains(self.url.as_str())
    }
}

/// Site rules loaded once at startup and shared read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    rules: Vec<Arc<SiteRule>>,
    search_disabled: HashSet<String>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in `dir`, in file-name order. Files that do not
    /// parse as a site rule are logged and skipped.
    pub fn from_dir(dir: &Path) -> Result<Self, ScraperError> {
        let entries = std::fs::read_dir(dir).map_err(|e| ScraperError::InvalidRule {
            reason: format!("cannot read rules directory {}: {}", dir.display(), e),
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| SiteRule::from_json(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(rule) => {
                    tracing::debug!(rule = rule.name.as_str(), path = %path.display(), "loaded site rule");
                    registry.add(rule);
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "skipping invalid site rule")
                }
            }
        }
        Ok(registry)
    }

    /// Add a rule, replacing any rule with the same name.
    pub fn add(&mut self, rule: SiteRule) {
        let rule = Arc::new(rule);
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn set_search_enabled(&mut self, name: &str, enabled: bool) {
        if enabled {
            self.search_disabled.remove(name);
        } else {
            self.search_disabled.insert(name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn all(&self) -> &[Arc<SiteRule>] {
        &self.rules
    }

    /// Rules taking part in search fan-out, in registry order.
    pub fn searchable(&self) -> Vec<Arc<SiteRule>> {
        self.rules
            .iter()
            .filter(|r| !self.search_disabled.contains(&r.name))
            .cloned()
            .collect()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<SiteRule>> {
        self.rules.iter().find(|r| r.name == name).cloned()
    }

    pub fn by_host(&self, host: &str) -> Option<Arc<SiteRule>> {
        self.rules.iter().find(|r| r.matches_host(host)).cloned()
    }

    /// Resolve the rule for a book/chapter URL, or use the named override.
    pub fn resolve(&self, url_input: &str, override_name: Option<&str>) -> Result<Arc<SiteRule>, ScraperError> {
        if let Some(name) = override_name {
            return self.by_name(name).ok_or_else(|| ScraperError::UnknownRule {
                name: name.to_string(),
            });
        }
        let url = Url::parse(url_input).map_err(|e| ScraperError::InvalidUrl {
            input: url_input.to_string(),
            reason: e.to_string(),
        })?;
        let host = url.host_str().ok_or_else(|| ScraperError::InvalidUrl {
            input: url_input.to_string(),
            reason: "URL has no host".to_string(),
        })?;
        self.by_host(host).ok_or_else(|| ScraperError::UnrecognizedHost {
            host: host.to_string(),
        })
    }
}

/// jsDelivr mirror for a raw.githubusercontent.com file URL
/// (`/{owner}/{repo}/{ref}/{path...}` becomes `/gh/{owner}/{repo}/{path...}`).
pub fn cdn_mirror(download_url: &str) -> Option<String> {
    let url = Url::parse(download_url).ok()?;
    if url.host_str() != Some("raw.githubusercontent.com") {
        return None;
    }
    let parts: Vec<&str> = url.path().trim_start_matches('/').split('/').collect();
    if parts.len() < 4 || parts.iter().take(3).any(|p| p.is_empty()) {
        return None;
    }
    Some(format!(
        "https://cdn.jsdelivr.net/gh/{}/{}/{}",
        parts[0],
        parts[1],
        parts[3..].join("/")
    ))
}

/// Download a site rule document, trying the CDN mirror first when there is one.
pub async fn download_rule(client: &PoliteClient, download_url: &str) -> Result<SiteRule, ScraperError> {
    if let Some(mirror) = cdn_mirror(download_url) {
        match fetch_rule(client, &mirror).await {
            Ok(rule) => return Ok(rule),
            Err(e) => tracing::warn!(mirror = mirror.as_str(), error = %e, "cdn mirror failed, using original url"),
        }
    }
    fetch_rule(client, download_url).await
}

async fn fetch_rule(client: &PoliteClient, url: &str) -> Result<SiteRule, ScraperError> {
    let fetched = client.fetch(&RuleRequest::get(url)).await?;
    match fetched.body {
        crate::block::Body::Json(value @ serde_json::Value::Object(_)) => {
            serde_json::from_value(value).map_err(|e| ScraperError::InvalidRule {
                reason: e.to_string(),
            })
        }
        _ => Err(ScraperError::InvalidRule {
            reason: format!("{} did not return a JSON object", url),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_RULE: &str = r##"{
        "name": "example",
        "url": "example.com",
        "version": 3,
        "search": {
            "url": "https://www.example.com/search?q=${key}",
            "charset": "gbk",
            "list": "ul.result li",
            "name": "a.title",
            "author": "span.author",
            "detail": "a.title",
            "futureField": true
        },
        "detail": {"status": "p.status", "lastChapter": "p.last a"},
        "catalog": {"list": "dl dd", "name": "a", "chapter": "a"},
        "chapter": {"content": "#content", "purify": ["本章未完.*"]}
    }"##;

    #[test]
    fn parse_rule_with_unknown_fields() -> Result<(), ScraperError> {
        let rule = SiteRule::from_json(SAMPLE_RULE)?;
        assert_eq!(rule.name, "example");
        assert_eq!(rule.version, 3);
        assert_eq!(rule.search.charset.as_deref(), Some("gbk"));
        assert_eq!(rule.search.cover, None);
        assert_eq!(rule.detail.last_chapter.as_deref(), Some("p.last a"));
        assert_eq!(rule.detail.catalog, None);
        assert!(rule.catalog.booklet.is_none());
        assert_eq!(rule.chapter.purify, vec!["本章未完.*".to_string()]);
        assert_eq!(rule.chapter.page, None);
        Ok(())
    }

    #[test]
    fn invalid_rule_is_an_error() {
        assert!(matches!(
            SiteRule::from_json(r#"{"name": "x"}"#),
            Err(ScraperError::InvalidRule { .. })
        ));
    }

    fn registry() -> Result<RuleRegistry, ScraperError> {
        let mut reg = RuleRegistry::new();
        reg.add(SiteRule::from_json(SAMPLE_RULE)?);
        let mut other = SiteRule::from_json(SAMPLE_RULE)?;
        other.name = "other".into();
        other.url = "other.org".into();
        reg.add(other);
        Ok(reg)
    }

    #[test]
    fn resolve_by_host() -> Result<(), ScraperError> {
        let reg = registry()?;
        let rule = reg.resolve("https://www.example.com/book/1", None)?;
        assert_eq!(rule.name, "example");
        let rule = reg.resolve("https://m.other.org/book/1", None)?;
        assert_eq!(rule.name, "other");
        Ok(())
    }

    #[test]
    fn resolve_override_ignores_url_host() -> Result<(), ScraperError> {
        let reg = registry()?;
        let rule = reg.resolve("https://unknown.net/x", Some("other"))?;
        assert_eq!(rule.name, "other");
        Ok(())
    }

    #[test]
    fn resolve_errors() -> Result<(), String> {
        let reg = registry().map_err(|e| e.to_string())?;
        match reg.resolve("https://unknown.net/x", None) {
            Err(ScraperError::UnrecognizedHost { host }) if host == "unknown.net" => {}
            other => return Err(format!("expected UnrecognizedHost, got {:?}", other)),
        }
        match reg.resolve("not-a-url", None) {
            Err(ScraperError::InvalidUrl { input, .. }) if input == "not-a-url" => {}
            other => return Err(format!("expected InvalidUrl, got {:?}", other)),
        }
        match reg.resolve("https://example.com", Some("nope")) {
            Err(ScraperError::UnknownRule { name }) if name == "nope" => Ok(()),
            other => Err(format!("expected UnknownRule, got {:?}", other)),
        }
    }

    #[test]
    fn add_replaces_same_name_and_searchable_filters() -> Result<(), ScraperError> {
        let mut reg = registry()?;
        let mut updated = SiteRule::from_json(SAMPLE_RULE)?;
        updated.version = 4;
        reg.add(updated);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.by_name("example").map(|r| r.version), Some(4));

        reg.set_search_enabled("example", false);
        let names: Vec<String> = reg.searchable().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["other".to_string()]);
        reg.set_search_enabled("example", true);
        assert_eq!(reg.searchable().len(), 2);
        Ok(())
    }

    #[test]
    fn from_dir_skips_invalid_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.json"), SAMPLE_RULE)?;
        std::fs::write(dir.path().join("b.json"), "{ not json")?;
        std::fs::write(dir.path().join("c.txt"), SAMPLE_RULE)?;
        let reg = RuleRegistry::from_dir(dir.path())?;
        assert_eq!(reg.len(), 1);
        assert!(reg.by_host("www.example.com").is_some());
        Ok(())
    }

    #[test]
    fn cdn_mirror_for_raw_github() {
        assert_eq!(
            cdn_mirror("https://raw.githubusercontent.com/me/rules/master/sites/a.json").as_deref(),
            Some("https://cdn.jsdelivr.net/gh/me/rules/sites/a.json")
        );
        assert_eq!(cdn_mirror("https://example.com/me/rules/master/a.json"), None);
        assert_eq!(cdn_mirror("https://raw.githubusercontent.com/me/rules"), None);
    }
}
