//! Rule expression mini-language: `selector@op->arg[->arg2]@...`.
//!
//! Parsing is total. Unknown operators and operators with the wrong number of
//! arguments are dropped, so a malformed rule field still yields a usable
//! (possibly selector-only) expression.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

const OPERATOR_SEPARATOR: char = '@';
const ARGUMENT_SEPARATOR: &str = "->";

/// Literal substring replacement applied to the extracted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old: String,
    pub new: String,
}

/// Parsed rule expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expression {
    /// Everything before the first `@`. CSS in HTML mode, JSONPath in JSON mode.
    pub selector: String,
    pub replace: Option<Replace>,
    pub attr: Option<String>,
    /// Regex; only the first match of the extracted string is kept.
    pub match_pattern: Option<String>,
    /// Regex the node text must match before anything is extracted.
    pub text_selector: Option<String>,
    /// POST body template. When present the selector is the POST URL.
    pub post: Option<String>,
    /// Custom request headers in declaration order, one entry per name.
    pub headers: Vec<(String, String)>,
}

impl Expression {
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split(OPERATOR_SEPARATOR);
        let mut expr = Expression {
            selector: segments.next().unwrap_or_default().to_string(),
            ..Default::default()
        };
        for segment in segments {
            if segment.is_empty() {
                continue;
            }
            let parts: Vec<&str> = segment.split(ARGUMENT_SEPARATOR).collect();
            match (parts[0], parts.len()) {
                ("replace", 3) => {
                    expr.replace = Some(Replace {
                        old: parts[1].to_string(),
                        new: parts[2].to_string(),
                    })
                }
                ("attr", 2) => expr.attr = Some(parts[1].to_string()),
                ("match", 2) => expr.match_pattern = Some(parts[1].to_string()),
                ("textSelector", 2) => expr.text_selector = Some(parts[1].to_string()),
                ("post", 2) => expr.post = Some(parts[1].to_string()),
                ("header", 2) => {
                    if let Some((name, value)) = parts[1].split_once(':') {
                        let name = name.trim();
                        if !name.is_empty() {
                            expr.set_header(name, value.trim());
                        }
                    }
                }
                (op, _) => tracing::debug!(operator = op, raw, "ignoring rule operator"),
            }
        }
        expr
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Apply `replace` then `match` to an extracted string and trim the result.
    ///
    /// `replace` swaps the first occurrence only. A `match` pattern that fails
    /// to match (or fails to compile) yields an empty string.
    pub fn transform(&self, extracted: &str) -> String {
        let mut value: Cow<'_, str> = Cow::Borrowed(extracted);
        if let Some(r) = &self.replace {
            if !r.old.is_empty() {
                value = Cow::Owned(value.replacen(r.old.as_str(), &r.new, 1));
            }
        }
        if let Some(pattern) = &self.match_pattern {
            value = match compile_dotall(pattern) {
                Some(re) => match re.find(&value) {
                    Some(m) => Cow::Owned(m.as_str().to_string()),
                    None => Cow::Borrowed(""),
                },
                None => Cow::Borrowed(""),
            };
        }
        value.trim().to_string()
    }

    /// True when no `textSelector` is declared or `text` matches it.
    pub fn text_selector_accepts(&self, text: &str) -> bool {
        match &self.text_selector {
            None => true,
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => re.is_match(text),
                Err(e) => {
                    tracing::debug!(pattern = pattern.as_str(), error = %e, "invalid textSelector");
                    false
                }
            },
        }
    }
}

fn compile_dotall(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?s){}", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::debug!(pattern, error = %e, "invalid match pattern");
            None
        }
    }
}

fn unquoted_attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\[\s*([^"' ]+?)\s*=\s*([^"' ]+?)\s*\]"#).expect("static regex is valid")
    })
}

fn trailing_matches_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":matches\((.+)\)$").expect("static regex is valid"))
}

/// Rewrite rule-author CSS into something a strict selector parser accepts:
/// unquoted attribute values get quoted, and a trailing `:matches(re)` pseudo
/// class becomes the `@textSelector->re` operator.
pub fn normalize_css(raw: &str) -> Cow<'_, str> {
    let quoted = unquoted_attribute_re().replace_all(raw, "[$1='$2']");
    if !trailing_matches_re().is_match(&quoted) {
        return quoted;
    }
    Cow::Owned(
        trailing_matches_re()
            .replace(&quoted, "@textSelector->$1")
            .into_owned(),
    )
}
