//! Charset resolution and HTML/JSON classification of response bodies.
//!
//! Decoding never fails: unknown charsets fall back to UTF-8 and JSON that does
//! not parse is kept as text.

use crate::block::Body;
use encoding_rs::Encoding;
use regex::Regex;
use std::sync::OnceLock;

/// How much of the body is searched for a `<meta>` charset declaration.
const SNIFF_LIMIT: usize = 1024;

fn meta_charset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([A-Za-z0-9_:.\-]+)"#)
            .expect("static regex is valid")
    })
}

/// `charset=` parameter of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then_some(value)
    })
}

/// Charset declared by `<meta charset=...>` or an `http-equiv` Content-Type
/// meta within the first bytes of the body. The prefix is read as Latin-1 so
/// the ASCII declaration is found regardless of the real encoding.
pub fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head: String = bytes[..bytes.len().min(SNIFF_LIMIT)]
        .iter()
        .map(|&b| b as char)
        .collect();
    meta_charset_re()
        .captures(&head)
        .map(|caps| caps[1].to_string())
}

/// Header charset, then sniffed meta charset, then UTF-8.
pub fn resolve_encoding(content_type: Option<&str>, bytes: &[u8]) -> &'static Encoding {
    let from_header = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    if let Some(encoding) = from_header {
        return encoding;
    }
    sniff_meta_charset(bytes)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8)
}

/// Decode a response body and classify it as JSON or text.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Body {
    let encoding = resolve_encoding(content_type, bytes);
    let (text, _, malformed) = encoding.decode(bytes);
    if malformed {
        tracing::debug!(encoding = encoding.name(), "body had malformed sequences");
    }
    let is_json_type = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    if is_json_type || text.starts_with('{') {
        match serde_json::from_str(&text) {
            Ok(value) => return Body::Json(value),
            Err(e) => tracing::debug!(error = %e, "json-looking body did not parse, keeping text"),
        }
    }
    Body::Text(text.into_owned())
}
