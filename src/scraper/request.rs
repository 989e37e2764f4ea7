//! Turns a rule URL expression (plus optional search key) into a concrete request.

use crate::expr::Expression;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;

const KEY_PLACEHOLDER: &str = "${key}";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Characters left alone by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Method, URL, body and headers for one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RuleRequest {
    /// Plain GET with no extra headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Build a request from a rule URL expression.
    ///
    /// With `@post->body` the selector is the POST URL and `${key}` is filled
    /// into the body verbatim; otherwise `${key}` is percent-encoded in
    /// `charset` (UTF-8 by default) and filled into the URL.
    pub fn build(url_expr: &str, key: Option<&str>, charset: Option<&str>) -> Self {
        let expr = Expression::parse(url_expr);
        let mut headers = expr.headers;
        match expr.post {
            Some(template) => {
                let body = match key {
                    Some(k) => template.replace(KEY_PLACEHOLDER, k),
                    None => template,
                };
                if !headers
                    .iter()
                    .any(|(n, _)| n.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
                }
                Self {
                    method: Method::POST,
                    url: expr.selector,
                    body: Some(body),
                    headers,
                }
            }
            None => {
                let url = match key {
                    Some(k) => expr.selector.replace(KEY_PLACEHOLDER, &encode_key(k, charset)),
                    None => expr.selector,
                };
                Self {
                    method: Method::GET,
                    url,
                    body: None,
                    headers,
                }
            }
        }
    }
}

/// Percent-encode a search key after converting it to `charset`.
pub fn encode_key(key: &str, charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|c| encoding_rs::Encoding::for_label(c.trim().as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);
    let (bytes, _, _) = encoding.encode(key);
    percent_encode(&bytes, URI_COMPONENT).to_string()
}
