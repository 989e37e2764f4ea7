//! JSON side of a content block: JSONPath queries over a parsed value.

use super::{absolutize, ValueKind};
use crate::expr::Expression;
use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::borrow::Cow;
use std::sync::OnceLock;
use url::Url;

const PARAMS_PREFIX: &str = "$params.";

/// JSON value view.
#[derive(Debug, Clone, Copy)]
pub struct JsonBlock<'a> {
    value: &'a Value,
    base: Option<&'a Url>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\S+?\}").expect("static regex is valid"))
}

/// Rule authors sometimes drop the leading `$.`; accept `data.list` as `$.data.list`.
fn compile_path(selector: &str) -> Option<JsonPath> {
    let selector = selector.trim();
    let full: Cow<'_, str> = if selector.starts_with('$') {
        Cow::Borrowed(selector)
    } else {
        Cow::Owned(format!("$.{}", selector))
    };
    match JsonPath::parse(&full) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::debug!(selector = %full, error = %e, "invalid json path");
            None
        }
    }
}

fn is_direct_path(selector: &str) -> bool {
    selector == "$" || selector.starts_with("$.") || selector.starts_with("$[")
}

/// Render a JSON value as the string a rule field expects.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

impl<'a> JsonBlock<'a> {
    pub(super) fn new(value: &'a Value, base: Option<&'a Url>) -> Self {
        Self { value, base }
    }

    fn first(&self, selector: &str) -> Option<&'a Value> {
        compile_path(selector)?.query(self.value).first()
    }

    pub fn query(&self, raw: &str) -> Vec<JsonBlock<'a>> {
        let expr = Expression::parse(raw);
        let Some(path) = compile_path(&expr.selector) else {
            return Vec::new();
        };
        path.query(self.value)
            .all()
            .into_iter()
            .map(|v| JsonBlock::new(v, self.base))
            .collect()
    }

    /// A `$.`-rooted selector is evaluated directly; anything else is a
    /// template whose `${...}` placeholders are filled from the request URL's
    /// query string (`${$params.NAME}`) or from JSON paths on this value.
    pub fn value(&self, raw: &str, kind: ValueKind) -> String {
        let expr = Expression::parse(raw);
        let v = if is_direct_path(expr.selector.trim()) {
            let found = self.first(&expr.selector).map(stringify).unwrap_or_default();
            expr.transform(&found)
        } else {
            self.fill_template(raw)
        };
        match kind {
            ValueKind::Href | ValueKind::Src => absolutize(self.base, v, true),
            ValueKind::Text => v,
        }
    }

    fn fill_template(&self, template: &str) -> String {
        let mut out = template.to_string();
        let mut seen: Vec<&str> = Vec::new();
        for m in placeholder_re().find_iter(template) {
            let placeholder = m.as_str();
            if seen.contains(&placeholder) {
                continue;
            }
            seen.push(placeholder);
            let name = &placeholder[2..placeholder.len() - 1];
            let replacement = match name.strip_prefix(PARAMS_PREFIX) {
                Some(param) => self.request_param(param).unwrap_or_default(),
                None => self.first(name).map(stringify).unwrap_or_default(),
            };
            out = out.replace(placeholder, &replacement);
        }
        out
    }

    fn request_param(&self, name: &str) -> Option<String> {
        self.base?
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn text(&self) -> String {
        stringify(self.value)
    }
}

#[cfg(test)]
mod tests {
    use crate::block::{Body, Page, ValueKind};
    use serde_json::json;
    use url::Url;

    fn page(base: &str, v: serde_json::Value) -> Page {
        Page::new(Url::parse(base).ok(), Body::Json(v)).expect("structured json")
    }

    fn sample() -> serde_json::Value {
        json!({
            "code": 0,
            "data": {
                "list": [
                    {"id": 11, "title": "Book A", "author": "Ann", "cover": "/img/a.jpg?w=100", "done": true},
                    {"id": 12, "title": "Book B", "author": null, "cover": "https://cdn.x/b.jpg"}
                ]
            }
        })
    }

    #[test]
    fn query_yields_child_blocks() {
        let page = page("https://api.x/search?kw=abc&page=2", sample());
        let rows = page.root().query("$.data.list[*]");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("$.title", ValueKind::Text), "Book A");
        assert_eq!(rows[1].value("$.author", ValueKind::Text), "");
        assert_eq!(rows[0].value("$.id", ValueKind::Text), "11");
        assert_eq!(rows[0].value("$.done", ValueKind::Text), "true");
    }

    #[test]
    fn query_accepts_selector_without_root() {
        let page = page("https://api.x/", sample());
        assert_eq!(page.root().query("data.list[*]").len(), 2);
        assert!(page.root().query("$[[[").is_empty());
    }

    #[test]
    fn template_fills_every_placeholder_occurrence() {
        let page = page("https://api.x/search?kw=abc&page=2", sample());
        let rows = page.root().query("$.data.list[*]");
        assert_eq!(
            rows[0].value("/book/${$.id}/${$.id}.html?kw=${$params.kw}", ValueKind::Text),
            "/book/11/11.html?kw=abc"
        );
        assert_eq!(rows[0].value("${$params.missing}x", ValueKind::Text), "x");
    }

    #[test]
    fn template_href_keeps_query_string() {
        let page = page("https://api.x/search?kw=abc", sample());
        let rows = page.root().query("$.data.list[*]");
        assert_eq!(
            rows[0].value("/book/${$.id}?src=${$params.kw}", ValueKind::Href),
            "https://api.x/book/11?src=abc"
        );
        assert_eq!(rows[0].value("$.cover", ValueKind::Src), "https://api.x/img/a.jpg?w=100");
        assert_eq!(rows[1].value("$.cover", ValueKind::Src), "https://cdn.x/b.jpg");
    }

    #[test]
    fn documented_href_resolution() {
        let page = page("https://a.b/p/q", json!({"u": "/x/y"}));
        assert_eq!(page.root().value("$.u", ValueKind::Href), "https://a.b/x/y");
    }

    #[test]
    fn operators_apply_to_direct_paths() {
        let page = page("https://api.x/", json!({"s": "状态：连载中"}));
        assert_eq!(page.root().value("$.s@replace->状态：->", ValueKind::Text), "连载中");
    }

    #[test]
    fn text_of_scalar_and_object() {
        let page = page("https://api.x/", json!({"c": "line1\nline2", "o": {"k": 1}}));
        let c = page.root().query("$.c");
        assert_eq!(c[0].text(), "line1\nline2");
        let o = page.root().query("$.o");
        assert_eq!(o[0].text(), r#"{"k":1}"#);
    }
}
