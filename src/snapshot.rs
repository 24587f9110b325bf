//! Snapshot Fallback Parser
//!
//! Outside trading hours the upstream serves no candles; instrument pages
//! still carry the last quote, either inside the QuoteBlock of the embedded
//! payload or as a labeled German-locale text table (LETZTER PREIS,
//! KURSZEIT, TAGESVOLUMEN). This parser extracts that quote and synthesizes
//! a degenerate one-row candle table from it. A page layout it does not
//! recognize yields `None`, never an error; the orchestrator moves on.

use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use crate::models::{Candle, QuoteSnapshot};
use crate::normalize::{normalize_records, parse_timestamp_value};
use crate::payload::extract_block_json;

const QUOTE_BLOCK_NAME: &str = "QuoteBlock";

lazy_static! {
    static ref LAST_PRICE_RE: Regex =
        Regex::new(r"(?i)LETZTER\s+PREIS\s+([0-9.,]+)").expect("price pattern is valid");
    static ref QUOTE_TIME_RE: Regex = Regex::new(
        r"(?i)KURSZEIT\s+([0-9]{2}\.[0-9]{2}\.[0-9]{4})\s*/\s*([0-9]{2}:[0-9]{2}:[0-9]{2})"
    )
    .expect("time pattern is valid");
    static ref DAY_VOLUME_RE: Regex =
        Regex::new(r"(?i)TAGESVOLUMEN.*?([0-9.,]+)").expect("volume pattern is valid");
}

/// Build a one-row candle table for the last known quote, or `None` when
/// the document carries no recognizable quote.
pub fn parse_quote_snapshot(document: &str) -> Option<Vec<Candle>> {
    let snapshot = structured_snapshot(document).or_else(|| labeled_text_snapshot(document))?;

    let record = json!([{
        "price": snapshot.price,
        "quoteDateTime": snapshot.quote_time.to_rfc3339(),
    }]);
    let mut candles = normalize_records(&record).ok()?;
    if candles.is_empty() {
        return None;
    }

    // volume defaults to zero when the page states none at all
    let volume = snapshot.volume.unwrap_or(0.0);
    for candle in &mut candles {
        if candle.volume.is_none() {
            candle.volume = Some(volume);
        }
    }
    Some(candles)
}

/// Preferred source: the QuoteBlock of the embedded payload.
fn structured_snapshot(document: &str) -> Option<QuoteSnapshot> {
    let block = extract_block_json(document, QUOTE_BLOCK_NAME)?;
    let price = number_field(&block, "price")?;
    let quote_time = parse_timestamp_value(block.get("quoteDateTime")?)?;
    let volume = number_field(&block, "latestTradingVolume");
    Some(QuoteSnapshot {
        price,
        quote_time,
        volume,
    })
}

/// Fallback source: the labeled quote table of the rendered page text.
fn labeled_text_snapshot(document: &str) -> Option<QuoteSnapshot> {
    let price = LAST_PRICE_RE
        .captures(document)
        .and_then(|c| parse_german_number(c.get(1)?.as_str()))?;

    let time_captures = QUOTE_TIME_RE.captures(document)?;
    let quote_time = NaiveDateTime::parse_from_str(
        &format!(
            "{} {}",
            time_captures.get(1)?.as_str(),
            time_captures.get(2)?.as_str()
        ),
        "%d.%m.%Y %H:%M:%S",
    )
    .ok()?
    .and_utc();

    let volume = DAY_VOLUME_RE
        .captures(document)
        .and_then(|c| parse_german_number(c.get(1)?.as_str()));

    Some(QuoteSnapshot {
        price,
        quote_time,
        volume,
    })
}

fn number_field(block: &serde_json::Value, name: &str) -> Option<f64> {
    match block.get(name)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse a German-formatted number: dots and non-breaking spaces are
/// thousands separators, the comma is the decimal mark.
fn parse_german_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '.' && *c != '\u{a0}' && *c != ' ')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_german_numbers() {
        assert_eq!(parse_german_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_german_number("17,85"), Some(17.85));
        assert_eq!(parse_german_number("2.500"), Some(2500.0));
        assert_eq!(parse_german_number("keine Zahl"), None);
    }

    #[test]
    fn builds_flat_candle_from_structured_block() {
        let document = concat!(
            r#""QuoteBlock","3f2a0b1c-4d5e-6f70-8191-a2b3c4d5e6f7","#,
            r#""{\"price\": 17.85, \"quoteDateTime\": \"2025-10-17T21:59:01Z\", "#,
            r#"\"latestTradingVolume\": 1250}""#
        );

        let candles = parse_quote_snapshot(document).unwrap();

        assert_eq!(candles.len(), 1);
        let candle = &candles[0];
        assert_eq!(candle.open, 17.85);
        assert_eq!(candle.high, 17.85);
        assert_eq!(candle.low, 17.85);
        assert_eq!(candle.close, 17.85);
        assert_eq!(candle.volume, Some(1250.0));
        assert_eq!(
            candle.timestamp,
            Utc.with_ymd_and_hms(2025, 10, 17, 21, 59, 1).unwrap()
        );
    }

    #[test]
    fn scans_labeled_german_text() {
        let document = "Kursdaten\nLETZTER PREIS 1.234,56 EUR\nKURSZEIT 17.10.2025 / 21:59:01 Uhr\nTAGESVOLUMEN Stück 2.500";

        let candles = parse_quote_snapshot(document).unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 1234.56);
        assert_eq!(candles[0].volume, Some(2500.0));
        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2025, 10, 17, 21, 59, 1).unwrap()
        );
    }

    #[test]
    fn volume_defaults_to_zero_when_absent() {
        let document = "LETZTER PREIS 17,85\nKURSZEIT 17.10.2025 / 21:59:01";

        let candles = parse_quote_snapshot(document).unwrap();
        assert_eq!(candles[0].volume, Some(0.0));
    }

    #[test]
    fn missing_price_or_time_degrades_silently() {
        assert!(parse_quote_snapshot("LETZTER PREIS 17,85").is_none());
        assert!(parse_quote_snapshot("KURSZEIT 17.10.2025 / 21:59:01").is_none());
        assert!(parse_quote_snapshot("<html>anderes Layout</html>").is_none());
    }
}
