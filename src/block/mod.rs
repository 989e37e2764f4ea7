//! Document abstraction. One parsed response ([Page]) and read-only views into
//! it ([ContentBlock]) that answer rule expressions the same way whether the
//! response was HTML or JSON.

mod html;
mod json;

pub use html::HtmlBlock;
pub use json::JsonBlock;

use scraper::Html;
use serde_json::Value;
use url::Url;

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Json(Value),
}

impl Body {
    /// Body as a string: text verbatim, JSON re-serialized.
    pub fn into_text(self) -> String {
        match self {
            Body::Text(s) => s,
            Body::Json(Value::String(s)) => s,
            Body::Json(v) => v.to_string(),
        }
    }
}

/// What a `value` lookup extracts when the expression declares no `attr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Href,
    Src,
}

impl ValueKind {
    fn attr_name(self) -> Option<&'static str> {
        match self {
            ValueKind::Text => None,
            ValueKind::Href => Some("href"),
            ValueKind::Src => Some("src"),
        }
    }
}

enum Tree {
    Html(Html),
    Json(Value),
}

/// A parsed response together with the URL it was requested from.
pub struct Page {
    base: Option<Url>,
    tree: Tree,
}

impl Page {
    /// Root a page at a decoded body. JSON objects and arrays become a JSON
    /// page; text becomes an HTML page. Empty bodies and bare JSON scalars
    /// yield no page.
    pub fn new(base: Option<Url>, body: Body) -> Option<Self> {
        let tree = match body {
            Body::Json(v @ (Value::Object(_) | Value::Array(_))) => Tree::Json(v),
            Body::Json(Value::String(s)) | Body::Text(s) => {
                if s.trim().is_empty() {
                    return None;
                }
                Tree::Html(Html::parse_document(&s))
            }
            Body::Json(_) => return None,
        };
        Some(Page { base, tree })
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn is_json(&self) -> bool {
        matches!(self.tree, Tree::Json(_))
    }

    pub fn root(&self) -> ContentBlock<'_> {
        match &self.tree {
            Tree::Html(doc) => ContentBlock::Html(HtmlBlock::new(doc.root_element(), self.base())),
            Tree::Json(v) => ContentBlock::Json(JsonBlock::new(v, self.base())),
        }
    }
}

/// Read-only view over an HTML element or a JSON value inside a [Page].
///
/// Child blocks borrow the same parse tree and base URL as their parent.
#[derive(Debug, Clone, Copy)]
pub enum ContentBlock<'a> {
    Html(HtmlBlock<'a>),
    Json(JsonBlock<'a>),
}

impl<'a> ContentBlock<'a> {
    /// Child blocks matched by the expression's selector, in document order.
    pub fn query(&self, expr: &str) -> Vec<ContentBlock<'a>> {
        match self {
            ContentBlock::Html(b) => b.query(expr).into_iter().map(ContentBlock::Html).collect(),
            ContentBlock::Json(b) => b.query(expr).into_iter().map(ContentBlock::Json).collect(),
        }
    }

    /// Extract one string. Href/src results that are relative links are
    /// resolved against the page URL.
    pub fn value(&self, expr: &str, kind: ValueKind) -> String {
        match self {
            ContentBlock::Html(b) => b.value(expr, kind),
            ContentBlock::Json(b) => b.value(expr, kind),
        }
    }

    /// Text of the whole block. HTML line breaks become `\n`.
    pub fn text(&self) -> String {
        match self {
            ContentBlock::Html(b) => b.text(),
            ContentBlock::Json(b) => b.text(),
        }
    }
}

fn is_relative_link(link: &str) -> bool {
    !link.is_empty() && matches!(Url::parse(link), Err(url::ParseError::RelativeUrlWithoutBase))
}

/// Resolve a relative link against `base`, dropping query and fragment unless
/// `keep_query` is set, in which case the link's own query string is kept.
/// Absolute links and links that fail to resolve are returned unchanged.
fn absolutize(base: Option<&Url>, link: String, keep_query: bool) -> String {
    let Some(base) = base else {
        return link;
    };
    if !is_relative_link(&link) {
        return link;
    }
    let (path, query) = match link.split_once('?') {
        Some((p, q)) if keep_query => (p, Some(q)),
        _ => (link.as_str(), None),
    };
    match base.join(path) {
        Ok(mut resolved) => {
            resolved.set_query(None);
            resolved.set_fragment(None);
            match query {
                Some(q) if !q.is_empty() => format!("{}?{}", resolved, q),
                _ => resolved.to_string(),
            }
        }
        Err(e) => {
            tracing::debug!(link = link.as_str(), error = %e, "could not resolve link");
            link
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Option<Url> {
        Url::parse("https://a.b/p/q").ok()
    }

    #[test]
    fn empty_body_has_no_page() {
        assert!(Page::new(base(), Body::Text(String::new())).is_none());
        assert!(Page::new(base(), Body::Text("  \n ".into())).is_none());
        assert!(Page::new(base(), Body::Json(json!(3))).is_none());
    }

    #[test]
    fn variant_follows_body() {
        let page = Page::new(base(), Body::Json(json!({"a": 1}))).unwrap();
        assert!(page.is_json());
        assert!(matches!(page.root(), ContentBlock::Json(_)));
        let page = Page::new(base(), Body::Text("<p>x</p>".into())).unwrap();
        assert!(!page.is_json());
        assert!(matches!(page.root(), ContentBlock::Html(_)));
    }

    #[test]
    fn absolutize_strips_or_keeps_query() {
        let b = base();
        assert_eq!(absolutize(b.as_ref(), "/x/y?z=1#f".into(), false), "https://a.b/x/y");
        assert_eq!(absolutize(b.as_ref(), "/x/y?z=1".into(), true), "https://a.b/x/y?z=1");
        assert_eq!(absolutize(b.as_ref(), "./r".into(), false), "https://a.b/p/r");
        assert_eq!(
            absolutize(b.as_ref(), "https://c.d/e?f=1".into(), false),
            "https://c.d/e?f=1"
        );
        assert_eq!(absolutize(None, "/x".into(), false), "/x");
        assert_eq!(absolutize(b.as_ref(), String::new(), false), "");
    }

    #[test]
    fn body_into_text() {
        assert_eq!(Body::Text("abc".into()).into_text(), "abc");
        assert_eq!(Body::Json(json!({"a": 1})).into_text(), r#"{"a":1}"#);
    }
}
