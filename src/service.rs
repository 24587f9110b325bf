//! History Orchestrator
//!
//! Drives the acquisition chain for one identifier and range: resolve the
//! instrument, fetch and normalize the primary price history, and fall back
//! to a snapshot synthesized from the instrument page when the primary path
//! produces no rows. Failures along the way are logged and the chain moves
//! on; only when every strategy is exhausted does a single `NoData` error
//! surface, carrying the most specific reason observed.

use log::{debug, warn};

use crate::client::{BoerseClient, QuoteSource};
use crate::collect::{collect_candidate_series, select_best_series};
use crate::errors::{NoDataReason, QuoteError};
use crate::models::{FetchLocation, History, InstrumentMatch, Provenance, WatchlistEntry};
use crate::payload::parse_document;
use crate::range::{filter_range, range_option};
use crate::resolve::{
    derive_wkn_from_isin, instrument_match_from, pick_search_result, watchlist_match,
};
use crate::snapshot::parse_quote_snapshot;

const SEARCH_LIMIT: usize = 15;

/// Acquisition pipeline over a quote source and a curated watchlist
pub struct HistoryService<S: QuoteSource> {
    source: S,
    watchlist: Vec<WatchlistEntry>,
}

impl HistoryService<BoerseClient> {
    pub fn new(watchlist: Vec<WatchlistEntry>) -> Self {
        Self::with_source(BoerseClient::new(), watchlist)
    }
}

impl<S: QuoteSource> HistoryService<S> {
    pub fn with_source(source: S, watchlist: Vec<WatchlistEntry>) -> Self {
        Self { source, watchlist }
    }

    /// Map a free-form identifier to a concrete instrument.
    ///
    /// Direct addresses pass through untouched. Everything else goes to the
    /// live search, with the query enriched by the watchlist name when the
    /// identifier is a known entry.
    pub async fn resolve(&self, identifier: &str) -> Result<InstrumentMatch, QuoteError> {
        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            return Ok(InstrumentMatch {
                name: identifier.to_string(),
                location: FetchLocation::Url(identifier.to_string()),
                isin: None,
                wkn: None,
            });
        }

        let query = match watchlist_match(&self.watchlist, identifier) {
            Some(entry) => format!("{} {}", identifier, entry.name),
            None => identifier.to_string(),
        };

        let results = self.source.search(&query, SEARCH_LIMIT).await?;
        let chosen = pick_search_result(&results, identifier).ok_or_else(|| {
            QuoteError::Resolution(format!("no search results for '{}'", identifier))
        })?;
        instrument_match_from(chosen)
    }

    /// Fetch the price history for an identifier and range key.
    ///
    /// Tries the primary series first, then the snapshot fallback over every
    /// WKN it can derive. Returns `NoData` only after both paths failed.
    pub async fn fetch_history(
        &self,
        identifier: &str,
        range_key: &str,
    ) -> Result<History, QuoteError> {
        let mut source_unreachable = false;

        let instrument = match self.resolve(identifier).await {
            Ok(instrument) => Some(instrument),
            Err(err) => {
                if matches!(err, QuoteError::Fetch(_)) {
                    source_unreachable = true;
                }
                warn!("resolution of '{}' failed: {}", identifier, err);
                None
            }
        };

        if let Some(instrument) = &instrument {
            match self.primary_history(instrument, range_key).await {
                Ok(Some(history)) => return Ok(history),
                Ok(None) => debug!("primary history for '{}' holds no rows", identifier),
                Err(err) => {
                    if matches!(err, QuoteError::Fetch(_)) {
                        source_unreachable = true;
                    }
                    warn!("primary history for '{}' failed: {}", identifier, err);
                }
            }
        }

        let wkn = instrument
            .as_ref()
            .and_then(|m| m.wkn.clone())
            .or_else(|| {
                instrument
                    .as_ref()
                    .and_then(|m| m.isin.as_deref())
                    .and_then(derive_wkn_from_isin)
            })
            .or_else(|| derive_wkn_from_isin(identifier));

        if let Some(wkn) = &wkn {
            match self.snapshot_history(wkn).await {
                Ok(Some(history)) => return Ok(history),
                Ok(None) => debug!("instrument page for WKN {} carries no quote", wkn),
                Err(err) => {
                    if matches!(err, QuoteError::Fetch(_)) {
                        source_unreachable = true;
                    }
                    warn!("snapshot fallback for WKN {} failed: {}", wkn, err);
                }
            }
        }

        let reason = if instrument.is_none() && wkn.is_none() && !source_unreachable {
            NoDataReason::UnknownIdentifier
        } else if source_unreachable {
            NoDataReason::SourceUnreachable
        } else {
            NoDataReason::EmptyWindow
        };
        Err(QuoteError::NoData(reason))
    }

    /// Primary path: fetch, extract, normalize and trim the series.
    async fn primary_history(
        &self,
        instrument: &InstrumentMatch,
        range_key: &str,
    ) -> Result<Option<History>, QuoteError> {
        let Some(option) = range_option(range_key) else {
            warn!("unknown range key '{}', skipping primary fetch", range_key);
            return Ok(None);
        };

        let body = self
            .source
            .fetch_price_history(&instrument.location, option)
            .await?;
        let payload = parse_document(&body)?;

        let candidates = collect_candidate_series(&payload);
        let Some(candles) = select_best_series(candidates) else {
            return Ok(None);
        };

        let candles = filter_range(candles, range_key);
        if candles.is_empty() {
            return Ok(None);
        }
        Ok(Some(History {
            candles,
            provenance: Provenance::Series,
            quote_time: None,
        }))
    }

    /// Fallback path: synthesize a one-row table from the instrument page.
    async fn snapshot_history(&self, wkn: &str) -> Result<Option<History>, QuoteError> {
        let page = self.source.fetch_instrument_page(wkn).await?;
        let Some(candles) = parse_quote_snapshot(&page) else {
            return Ok(None);
        };
        let quote_time = candles.last().map(|candle| candle.timestamp);
        Ok(Some(History {
            candles,
            provenance: Provenance::Snapshot,
            quote_time,
        }))
    }
}
