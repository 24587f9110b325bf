//! Range windows and the Range Filter
//!
//! Each configured window name carries both the query parameters the
//! upstream price-history endpoints expect and the lookback window used to
//! trim the normalized table. Day windows are fixed durations; month and
//! year windows are calendar offsets so that "1 Monat" lands on the same
//! day of the previous month (clamped for short months).

use std::collections::HashMap;

use chrono::{Duration, Months};
use lazy_static::lazy_static;

use crate::models::Candle;

/// Which upstream price-history endpoint serves a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Intraday,
    History,
}

/// Lookback window behind the latest row of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeWindow {
    Fixed(Duration),
    Calendar(Months),
}

/// Upstream parameters and lookback window for one configured range key
#[derive(Debug, Clone, Copy)]
pub struct RangeOption {
    pub range: &'static str,
    pub interval: &'static str,
    pub endpoint: Endpoint,
    pub window: RangeWindow,
}

lazy_static! {
    pub static ref RANGE_OPTIONS: HashMap<&'static str, RangeOption> = {
        let mut map = HashMap::new();
        map.insert(
            "1 Tag",
            RangeOption {
                range: "1d",
                interval: "1m",
                endpoint: Endpoint::Intraday,
                window: RangeWindow::Fixed(Duration::days(1)),
            },
        );
        map.insert(
            "5 Tage",
            RangeOption {
                range: "5d",
                interval: "5m",
                endpoint: Endpoint::Intraday,
                window: RangeWindow::Fixed(Duration::days(5)),
            },
        );
        map.insert(
            "1 Monat",
            RangeOption {
                range: "1mo",
                interval: "30m",
                endpoint: Endpoint::Intraday,
                window: RangeWindow::Calendar(Months::new(1)),
            },
        );
        map.insert(
            "3 Monate",
            RangeOption {
                range: "3mo",
                interval: "1h",
                endpoint: Endpoint::Intraday,
                window: RangeWindow::Calendar(Months::new(3)),
            },
        );
        map.insert(
            "6 Monate",
            RangeOption {
                range: "6mo",
                interval: "2h",
                endpoint: Endpoint::History,
                window: RangeWindow::Calendar(Months::new(6)),
            },
        );
        map.insert(
            "1 Jahr",
            RangeOption {
                range: "1y",
                interval: "1d",
                endpoint: Endpoint::History,
                window: RangeWindow::Calendar(Months::new(12)),
            },
        );
        map.insert(
            "3 Jahre",
            RangeOption {
                range: "3y",
                interval: "1d",
                endpoint: Endpoint::History,
                window: RangeWindow::Calendar(Months::new(36)),
            },
        );
        map.insert(
            "5 Jahre",
            RangeOption {
                range: "5y",
                interval: "1d",
                endpoint: Endpoint::History,
                window: RangeWindow::Calendar(Months::new(60)),
            },
        );
        map
    };
}

/// Look up a configured range key.
pub fn range_option(range_key: &str) -> Option<&'static RangeOption> {
    RANGE_OPTIONS.get(range_key)
}

/// Trim a table to the requested lookback window behind its latest row.
///
/// Unknown keys and empty tables pass through unchanged; an unknown key
/// means "no trimming requested", not an error.
pub fn filter_range(candles: Vec<Candle>, range_key: &str) -> Vec<Candle> {
    let Some(option) = range_option(range_key) else {
        return candles;
    };
    let Some(latest) = candles.last().map(|c| c.timestamp) else {
        return candles;
    };
    let cutoff = match option.window {
        RangeWindow::Fixed(duration) => latest - duration,
        RangeWindow::Calendar(months) => match latest.checked_sub_months(months) {
            Some(cutoff) => cutoff,
            None => return candles,
        },
    };
    candles
        .into_iter()
        .filter(|candle| candle.timestamp >= cutoff)
        .collect()
}
