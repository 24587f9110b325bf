//! Domain models for instruments, candles and resolved matches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV time bucket. `volume: None` marks "unknown", which is distinct
/// from a traded volume of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// Where a history result came from. Snapshot-sourced results are degenerate
/// one-row tables synthesized from the last known quote, so consumers can
/// surface a staleness hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    Series,
    Snapshot,
}

/// A normalized candle table tagged with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub candles: Vec<Candle>,
    pub provenance: Provenance,
    /// Quote instant of the underlying snapshot; only set for
    /// `Provenance::Snapshot`.
    pub quote_time: Option<DateTime<Utc>>,
}

impl History {
    pub fn is_snapshot(&self) -> bool {
        self.provenance == Provenance::Snapshot
    }
}

/// Concrete location the price history can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchLocation {
    /// A direct address, fetched verbatim
    Url(String),
    /// The price-history endpoints, parameterized by ISIN
    PriceHistory { isin: String },
}

/// A resolved instrument, produced once per resolution call
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentMatch {
    pub name: String,
    pub location: FetchLocation,
    pub isin: Option<String>,
    pub wkn: Option<String>,
}

/// One hit from the live instrument search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub name: String,
    pub isin: Option<String>,
    pub wkn: Option<String>,
    pub market: Option<String>,
}

/// Entry of the curated watchlist the embedding application passes in.
/// Read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub name: String,
    pub identifier: String,
    pub market: Option<String>,
}

/// Last-quote payload extracted from an instrument page, the precursor of a
/// one-row snapshot table
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub price: f64,
    pub quote_time: DateTime<Utc>,
    pub volume: Option<f64>,
}
