//! Candidate Frame Collector and Frame Selector
//!
//! Embedded payloads bury the actual record list at an unpredictable depth,
//! so every container node of the parsed tree is probed through the Record
//! Normalizer and the successes are scored afterwards. Probing failures are
//! the common case and carry no signal; they are discarded silently.

use serde_json::Value;

use crate::models::Candle;
use crate::normalize::normalize_records;

/// Walk the tree depth-first and collect every sub-structure that
/// normalizes into a non-empty candle table, in traversal order.
///
/// A node that normalizes successfully claims its whole subtree: its
/// descendants are the rows of the collected table and are not probed
/// again as independent candidates.
pub fn collect_candidate_series(payload: &Value) -> Vec<Vec<Candle>> {
    let mut candidates = Vec::new();
    walk(payload, &mut candidates);
    candidates
}

fn walk(node: &Value, candidates: &mut Vec<Vec<Candle>>) {
    if !matches!(node, Value::Object(_) | Value::Array(_)) {
        return;
    }

    if let Ok(candles) = normalize_records(node) {
        if !candles.is_empty() {
            candidates.push(candles);
            return;
        }
    }

    match node {
        Value::Object(map) => {
            for child in map.values() {
                walk(child, candidates);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk(child, candidates);
            }
        }
        _ => {}
    }
}

/// Pick the best candidate: most rows first, then the smallest median
/// inter-row gap (denser, longer series win). A single-row candidate has no
/// gap and sorts last among same-length ties; remaining ties go to the
/// first candidate in traversal order.
pub fn select_best_series(candidates: Vec<Vec<Candle>>) -> Option<Vec<Candle>> {
    candidates
        .into_iter()
        .enumerate()
        .min_by(|(left_index, left), (right_index, right)| {
            right
                .len()
                .cmp(&left.len())
                .then_with(|| {
                    median_gap_millis(left)
                        .unwrap_or(i64::MAX)
                        .cmp(&median_gap_millis(right).unwrap_or(i64::MAX))
                })
                .then(left_index.cmp(right_index))
        })
        .map(|(_, candles)| candles)
}

fn median_gap_millis(candles: &[Candle]) -> Option<i64> {
    if candles.len() < 2 {
        return None;
    }
    let mut gaps: Vec<i64> = candles
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds())
        .collect();
    gaps.sort_unstable();
    let middle = gaps.len() / 2;
    if gaps.len() % 2 == 1 {
        Some(gaps[middle])
    } else {
        Some((gaps[middle - 1] + gaps[middle]) / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn series(step_secs: i64, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle {
                timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000 + i as i64 * step_secs, 0)
                    .unwrap(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: None,
            })
            .collect()
    }

    #[test]
    fn collects_single_record_list_buried_two_levels_deep() {
        let payload = json!({
            "meta": {"page": 1, "lang": "de"},
            "header": {"title": "Kursdaten", "badges": ["a", "b"]},
            "footer": {"links": {"impressum": "/impressum"}},
            "wrapper": {
                "inner": [
                    {"timestamp": 1700000000, "open": 1, "high": 2, "low": 0.5, "close": 1.5},
                    {"timestamp": 1700000060, "open": 1.5, "high": 2.5, "low": 1.0, "close": 2.0}
                ]
            }
        });

        let candidates = collect_candidate_series(&payload);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].len(), 2);
    }

    #[test]
    fn empty_tree_collects_nothing() {
        assert!(collect_candidate_series(&json!({"a": {"b": [1, 2, 3]}})).is_empty());
    }

    #[test]
    fn selector_prefers_longer_series() {
        let chosen = select_best_series(vec![series(60, 3), series(60, 10)]).unwrap();
        assert_eq!(chosen.len(), 10);
    }

    #[test]
    fn selector_prefers_denser_series_among_equal_lengths() {
        let sparse = series(3600, 5);
        let dense = series(60, 5);
        let chosen = select_best_series(vec![sparse, dense.clone()]).unwrap();
        assert_eq!(chosen, dense);
    }

    #[test]
    fn single_row_candidate_sorts_last_among_same_length_ties() {
        let one_row = series(60, 1);
        let also_one_row = series(60, 1);
        // both have an undefined gap; traversal order decides
        let chosen = select_best_series(vec![one_row.clone(), also_one_row]).unwrap();
        assert_eq!(chosen, one_row);

        let two_rows = series(60, 2);
        let chosen = select_best_series(vec![series(60, 1), two_rows.clone()]).unwrap();
        assert_eq!(chosen, two_rows);
    }

    #[test]
    fn selection_is_deterministic() {
        let candidates = vec![series(60, 5), series(30, 5), series(90, 5)];
        let first = select_best_series(candidates.clone()).unwrap();
        for _ in 0..10 {
            assert_eq!(select_best_series(candidates.clone()).unwrap(), first);
        }
    }

    #[test]
    fn empty_candidate_set_selects_nothing() {
        assert!(select_best_series(Vec::new()).is_none());
    }
}
