//! HTML side of a content block: CSS selectors over a parsed document.

use super::{absolutize, ValueKind};
use crate::expr::{normalize_css, Expression};
use ego_tree::NodeRef;
use regex::Regex;
use scraper::{ElementRef, Node, Selector};
use std::sync::OnceLock;
use url::Url;

/// HTML element view.
#[derive(Debug, Clone, Copy)]
pub struct HtmlBlock<'a> {
    element: ElementRef<'a>,
    base: Option<&'a Url>,
}

fn gt_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*):gt\((\d+)\)\w*$").expect("static regex is valid"))
}

/// Split a trailing `:gt(N)` off a selector. Returns the plain selector and
/// how many leading matches to skip (N + 1).
fn split_gt(selector: &str) -> (&str, usize) {
    match gt_suffix_re().captures(selector) {
        Some(caps) => {
            let head = caps.get(1).map_or(selector, |m| m.as_str());
            let n = caps[2].parse::<usize>().unwrap_or(usize::MAX);
            (head, n.saturating_add(1))
        }
        None => (selector, 0),
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::debug!(selector, error = %e, "invalid css selector");
            None
        }
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Render text the way a reader sees paragraphs: `<br>` is a newline,
/// script/style/comment content is skipped.
fn render_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(t) => out.push_str(t),
        Node::Comment(_) => {}
        Node::Element(e) if e.name() == "br" => out.push('\n'),
        Node::Element(e) if e.name() == "script" || e.name() == "style" => {}
        _ => {
            for child in node.children() {
                render_text(child, out);
            }
        }
    }
}

impl<'a> HtmlBlock<'a> {
    pub(super) fn new(element: ElementRef<'a>, base: Option<&'a Url>) -> Self {
        Self { element, base }
    }

    fn select(&self, selector: &str) -> Vec<ElementRef<'a>> {
        if selector.trim().is_empty() {
            return vec![self.element];
        }
        match parse_selector(selector) {
            Some(sel) => self.element.select(&sel).collect(),
            None => Vec::new(),
        }
    }

    pub fn query(&self, raw: &str) -> Vec<HtmlBlock<'a>> {
        let expr = Expression::parse(&normalize_css(raw));
        let (selector, skip) = split_gt(&expr.selector);
        let Some(sel) = parse_selector(selector) else {
            return Vec::new();
        };
        self.element
            .select(&sel)
            .skip(skip)
            .filter(|el| expr.text_selector_accepts(&element_text(*el)))
            .map(|el| HtmlBlock::new(el, self.base))
            .collect()
    }

    pub fn value(&self, raw: &str, kind: ValueKind) -> String {
        let expr = Expression::parse(&normalize_css(raw));
        let mut matched = self.select(&expr.selector);
        if expr.text_selector.is_some() {
            matched.retain(|el| expr.text_selector_accepts(&element_text(*el)));
            if matched.is_empty() {
                return String::new();
            }
        }
        let first_attr = |name: &str| {
            matched
                .first()
                .and_then(|el| el.value().attr(name))
                .unwrap_or_default()
                .to_string()
        };
        let extracted = match (&expr.attr, kind.attr_name()) {
            (Some(attr), _) => first_attr(attr.as_str()),
            (None, Some(attr)) => first_attr(attr),
            (None, None) => matched.iter().map(|el| element_text(*el)).collect(),
        };
        let v = expr.transform(&extracted);
        match kind {
            ValueKind::Href | ValueKind::Src => absolutize(self.base, v, false),
            ValueKind::Text => v,
        }
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        render_text(*self.element, &mut out);
        out
    }
}
