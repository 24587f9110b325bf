//! Payload Extractor
//!
//! Instrument pages embed their state as a Nuxt payload: either a tagged
//! `<script>` block or a `window.__NUXT__` assignment. Neither is guaranteed
//! to be strict JSON (JavaScript literals like `undefined` and date
//! constructors leak in), so parsing is attempted strictly first and retried
//! after a textual repair pass. The contract is deliberately narrow: only
//! content fixable by the listed substitutions parses, anything else is an
//! extraction failure.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::errors::QuoteError;

/// Script block id the Nuxt renderer tags its payload with
const SCRIPT_BLOCK_ID: &str = "__NUXT_DATA__";

/// Variable-assignment marker used by older renderings of the same pages
const STATE_MARKER: &str = "window.__NUXT__";

lazy_static! {
    static ref SCRIPT_BLOCK_RE: Regex = Regex::new(
        r#"(?is)<script[^>]*\bid\s*=\s*["']__NUXT_DATA__["'][^>]*>(.*?)</script>"#
    )
    .expect("script block pattern is valid");
    static ref JS_TOKEN_RE: Regex =
        Regex::new(r"\bundefined\b|\bNaN\b|-?\bInfinity\b").expect("token pattern is valid");
    static ref DATE_CALL_RE: Regex =
        Regex::new(r#"new\s+Date\(\s*("[^"]*"|\d+)\s*\)"#).expect("date pattern is valid");
}

/// Parse a fetched document into a generic tree: strict JSON first, then the
/// embedded state payload.
pub fn parse_document(text: &str) -> Result<Value, QuoteError> {
    serde_json::from_str(text).or_else(|_| extract_state_payload(text))
}

/// Locate and parse the embedded state blob of a rendered instrument page.
pub fn extract_state_payload(document: &str) -> Result<Value, QuoteError> {
    if let Some(value) = tagged_script_payload(document) {
        return Ok(value);
    }
    marker_assignment_payload(document)
}

/// Strategy A: the tagged script block.
fn tagged_script_payload(document: &str) -> Option<Value> {
    if !document.contains(SCRIPT_BLOCK_ID) {
        return None;
    }
    let captured = SCRIPT_BLOCK_RE.captures(document)?;
    let body = unescape_entities(captured.get(1)?.as_str());
    parse_with_repair(body.trim())
}

/// Strategy B: balanced-bracket scan after the assignment marker.
fn marker_assignment_payload(document: &str) -> Result<Value, QuoteError> {
    let marker = document
        .find(STATE_MARKER)
        .ok_or_else(|| QuoteError::Extraction("no state payload marker in document".to_string()))?;
    let tail = &document[marker + STATE_MARKER.len()..];
    let start = tail
        .find(['{', '['])
        .ok_or_else(|| QuoteError::Extraction("no payload after state marker".to_string()))?;
    let blob = balanced_slice(&tail[start..]).ok_or_else(|| {
        QuoteError::Extraction("unbalanced payload after state marker".to_string())
    })?;
    parse_with_repair(blob)
        .ok_or_else(|| QuoteError::Extraction("state payload is not repairable".to_string()))
}

fn parse_with_repair(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    serde_json::from_str(&repair_tokens(text)).ok()
}

/// Replace the known non-JSON tokens the upstream leaks into its payloads.
/// Only unquoted occurrences are rewritten; the same tokens inside string
/// literals are data and stay untouched.
fn repair_tokens(text: &str) -> String {
    let repaired = replace_outside_strings(text, &DATE_CALL_RE, |caps| caps[1].to_string());
    replace_outside_strings(&repaired, &JS_TOKEN_RE, |_| "null".to_string())
}

/// Apply a regex replacement to every match that starts outside a string
/// literal, walking the text with the same in-string/escape state as
/// `balanced_slice`.
fn replace_outside_strings(
    text: &str,
    re: &Regex,
    replacement: impl Fn(&regex::Captures) -> String,
) -> String {
    let spans = string_literal_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(matched) = caps.get(0) else {
            continue;
        };
        let start = matched.start();
        if start < last || spans.iter().any(|&(open, close)| start > open && start < close) {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(&replacement(&caps));
        last = matched.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Byte spans of the string literals in `text`, opening quote to closing
/// quote. An unterminated literal at the end contributes no span.
fn string_literal_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut escaped = false;
    for (index, byte) in text.bytes().enumerate() {
        match open {
            Some(start) => {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    spans.push((start, index));
                    open = None;
                }
            }
            None => {
                if byte == b'"' {
                    open = Some(index);
                }
            }
        }
    }
    spans
}

/// Extract exactly one balanced `{...}`/`[...]` region from the start of
/// `text`, honoring nested depth and skipping over string literals.
fn balanced_slice(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ => {}
        }
    }
    None
}

fn unescape_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Extract the escaped JSON object serialized for a named block (e.g.
/// `QuoteBlock`) inside the Nuxt payload.
pub fn extract_block_json(document: &str, block_name: &str) -> Option<Value> {
    let pattern = format!(
        r#"(?is)"{}"\s*,\s*"[0-9a-f\-]+"\s*,\s*"(\{{.*?\}})""#,
        regex::escape(block_name)
    );
    let re = Regex::new(&pattern).ok()?;
    let raw = re.captures(document)?.get(1)?.as_str();

    // The capture is the body of a JSON string literal; decode it as one to
    // resolve \" and \uXXXX escapes, then parse the decoded text.
    let decoded: String = serde_json::from_str(&format!("\"{}\"", raw)).ok()?;
    let value: Value = serde_json::from_str(&decoded).ok()?;
    value.is_object().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_script_block() {
        let document = r#"<html><head>
            <script id="__NUXT_DATA__" type="application/json">{"candles":[1,2]}</script>
            </head></html>"#;

        let value = extract_state_payload(document).unwrap();
        assert_eq!(value, json!({"candles": [1, 2]}));
    }

    #[test]
    fn repairs_javascript_tokens_in_script_block() {
        let document = concat!(
            r#"<script id="__NUXT_DATA__">"#,
            r#"{"price": NaN, "volume": undefined, "max": Infinity, "min": -Infinity, "#,
            r#""at": new Date("2024-01-02T10:00:00Z")}"#,
            "</script>"
        );

        let value = extract_state_payload(document).unwrap();
        assert_eq!(value["price"], Value::Null);
        assert_eq!(value["volume"], Value::Null);
        assert_eq!(value["max"], Value::Null);
        assert_eq!(value["min"], Value::Null);
        assert_eq!(value["at"], json!("2024-01-02T10:00:00Z"));
    }

    #[test]
    fn repair_leaves_quoted_tokens_untouched() {
        let document = concat!(
            r#"window.__NUXT__ = {"note": "price is NaN today", "#,
            r#""id": "undefined-42", "escaped": "say \"NaN\"", "x": NaN}"#
        );

        let value = extract_state_payload(document).unwrap();
        assert_eq!(value["note"], json!("price is NaN today"));
        assert_eq!(value["id"], json!("undefined-42"));
        assert_eq!(value["escaped"], json!("say \"NaN\""));
        assert_eq!(value["x"], Value::Null);
    }

    #[test]
    fn unescapes_html_entities_in_script_block() {
        let document = r#"<script id="__NUXT_DATA__">{&quot;name&quot;:&quot;A &amp; B&quot;}</script>"#;

        let value = extract_state_payload(document).unwrap();
        assert_eq!(value, json!({"name": "A & B"}));
    }

    #[test]
    fn falls_back_to_marker_assignment() {
        let document = r#"<script>window.__NUXT__ = {"data":{"values":[{"a":"{nested"}]}};</script>"#;

        let value = extract_state_payload(document).unwrap();
        assert_eq!(value["data"]["values"][0]["a"], json!("{nested"));
    }

    #[test]
    fn balanced_scan_honors_nested_depth() {
        let blob = balanced_slice(r#"{"a": {"b": [1, {"c": 2}]}} trailing"#).unwrap();
        assert_eq!(blob, r#"{"a": {"b": [1, {"c": 2}]}}"#);
    }

    #[test]
    fn missing_marker_is_an_extraction_error() {
        let err = extract_state_payload("<html>nothing here</html>").unwrap_err();
        assert!(matches!(err, QuoteError::Extraction(_)));
    }

    #[test]
    fn unrepairable_payload_is_an_extraction_error() {
        let document = "window.__NUXT__ = {broken: [}";
        let err = extract_state_payload(document).unwrap_err();
        assert!(matches!(err, QuoteError::Extraction(_)));
    }

    #[test]
    fn parse_document_prefers_plain_json() {
        let value = parse_document(r#"{"data": []}"#).unwrap();
        assert_eq!(value, json!({"data": []}));
    }

    #[test]
    fn extracts_named_block_from_escaped_payload() {
        let document = concat!(
            r#"stuff "QuoteBlock","3f2a0b1c-4d5e-6f70-8191-a2b3c4d5e6f7","#,
            r#""{\"price\": 42.5, \"quoteDateTime\": \"2024-01-02T10:00:00Z\"}" more"#
        );

        let block = extract_block_json(document, "QuoteBlock").unwrap();
        assert_eq!(block["price"], json!(42.5));
        assert_eq!(block["quoteDateTime"], json!("2024-01-02T10:00:00Z"));
    }

    #[test]
    fn named_block_absent_returns_none() {
        assert!(extract_block_json("<html></html>", "QuoteBlock").is_none());
    }
}
