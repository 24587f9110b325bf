//! Record Normalizer
//!
//! Converts an arbitrary nested JSON structure believed to contain price
//! records into the canonical candle table. The upstream serves the same
//! concept under many shapes (short/long field names, tuple rows, epoch or
//! string timestamps), so every synonym is handled through fixed, ordered
//! rule tables rather than scattered conditionals.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::errors::QuoteError;
use crate::models::Candle;

/// Keys under which a mapping payload may nest its actual record collection
const RECORD_CONTAINER_KEYS: [&str; 6] =
    ["candles", "data", "records", "results", "chart", "values"];

/// Synonym field -> canonical field. An alias never overwrites a canonical
/// field that is already present on the record.
const FIELD_ALIASES: [(&str, &str); 11] = [
    ("o", "open"),
    ("h", "high"),
    ("l", "low"),
    ("c", "close"),
    ("v", "volume"),
    ("value", "close"),
    ("price", "close"),
    ("date", "timestamp"),
    ("time", "timestamp"),
    ("t", "timestamp"),
    ("quoteDateTime", "timestamp"),
];

/// Column names for tuple-shaped records, truncated to the tuple arity
const POSITIONAL_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Timestamp-bearing column candidates, in priority order
const TIMESTAMP_CANDIDATES: [&str; 5] = ["timestamp", "datetime", "time", "date", "quoteDateTime"];

const STRING_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d.%m.%Y / %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

/// Normalize an arbitrary structure into a canonical candle table.
///
/// Empty input yields an empty table, as does input whose timestamps are all
/// unparseable; callers treat an empty table as "no usable data", not as a
/// hard failure. Missing price fields (after flat-candle synthesis) and a
/// missing timestamp column fail with `QuoteError::Schema`.
pub fn normalize_records(payload: &Value) -> Result<Vec<Candle>, QuoteError> {
    if is_empty_payload(payload) {
        return Ok(Vec::new());
    }

    let records = record_set(payload);
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let rows = records
        .iter()
        .map(record_fields)
        .collect::<Result<Vec<_>, _>>()?;

    let has_column = |name: &str| rows.iter().any(|row| row.contains_key(name));

    let close_present = has_column("close");
    let synthesize_ohl =
        close_present && !(has_column("open") && has_column("high") && has_column("low"));

    let missing: Vec<&str> = ["open", "high", "low", "close"]
        .into_iter()
        .filter(|col| !has_column(col) && !(synthesize_ohl && *col != "close"))
        .collect();
    if !missing.is_empty() {
        return Err(QuoteError::Schema(format!(
            "price fields missing from response: {}",
            missing.join(", ")
        )));
    }

    let timestamp_column = TIMESTAMP_CANDIDATES
        .into_iter()
        .find(|name| has_column(name))
        .ok_or_else(|| QuoteError::Schema("no timestamp field in response".to_string()))?;

    let raw_timestamps: Vec<Option<&Value>> =
        rows.iter().map(|row| row.get(timestamp_column)).collect();
    let timestamps = parse_timestamp_column(&raw_timestamps);

    let mut candles = Vec::with_capacity(rows.len());
    for (row, timestamp) in rows.iter().zip(timestamps) {
        let Some(timestamp) = timestamp else {
            continue;
        };
        let Some(close) = field_f64(row, "close") else {
            continue;
        };
        let (open, high, low) = if synthesize_ohl {
            (close, close, close)
        } else {
            (
                field_f64(row, "open").unwrap_or(close),
                field_f64(row, "high").unwrap_or(close),
                field_f64(row, "low").unwrap_or(close),
            )
        };
        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume: field_f64(row, "volume"),
        });
    }

    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    Ok(candles)
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Locate the record collection inside the payload. A mapping without a
/// known container key is treated as a single record.
fn record_set(payload: &Value) -> Vec<Value> {
    match payload {
        Value::Object(map) => {
            for key in RECORD_CONTAINER_KEYS {
                if let Some(inner) = map.get(key) {
                    return match inner {
                        Value::Array(items) => items.clone(),
                        Value::Object(inner_map) => inner_map.values().cloned().collect(),
                        other => vec![other.clone()],
                    };
                }
            }
            vec![payload.clone()]
        }
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Flatten one record into named fields, applying the alias table. Tuple
/// records get positional names truncated to their arity.
fn record_fields(record: &Value) -> Result<BTreeMap<String, Value>, QuoteError> {
    match record {
        Value::Object(map) => {
            let mut fields = BTreeMap::new();
            for (key, value) in map {
                let canonical = FIELD_ALIASES
                    .iter()
                    .find(|(alias, _)| alias == key)
                    .map(|(_, canonical)| *canonical);
                match canonical {
                    Some(canonical) if !map.contains_key(canonical) => {
                        fields
                            .entry(canonical.to_string())
                            .or_insert_with(|| value.clone());
                    }
                    _ => {
                        fields.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(fields)
        }
        Value::Array(items) => Ok(POSITIONAL_COLUMNS
            .iter()
            .zip(items)
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()),
        other => Err(QuoteError::Schema(format!(
            "record is neither a mapping nor a tuple: {}",
            other
        ))),
    }
}

/// Parse the timestamp column trying string formats, then epoch millis,
/// then epoch seconds. The first strategy that parses at least one value
/// wins for the whole column; values it cannot parse stay unparsed and
/// their rows are dropped by the caller.
fn parse_timestamp_column(raw: &[Option<&Value>]) -> Vec<Option<DateTime<Utc>>> {
    let strategies: [fn(&Value) -> Option<DateTime<Utc>>; 3] =
        [parse_string_timestamp, parse_millis_timestamp, parse_seconds_timestamp];

    for strategy in strategies {
        let attempt: Vec<Option<DateTime<Utc>>> = raw
            .iter()
            .map(|value| value.and_then(strategy))
            .collect();
        if attempt.iter().any(Option::is_some) {
            return attempt;
        }
    }
    vec![None; raw.len()]
}

/// Parse a single timestamp value with the same strategy order as the
/// column-level pass. Used for standalone values such as a snapshot's
/// quote instant.
pub(crate) fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    parse_string_timestamp(value)
        .or_else(|| parse_millis_timestamp(value))
        .or_else(|| parse_seconds_timestamp(value))
}

fn parse_string_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in STRING_TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_millis_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value_as_i64(value)?;
    // epochs up to ten digits are seconds, not milliseconds
    if raw <= 10_000_000_000 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(raw)
}

fn parse_seconds_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value_as_i64(value)?, 0)
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn field_f64(row: &BTreeMap<String, Value>, name: &str) -> Option<f64> {
    match row.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
