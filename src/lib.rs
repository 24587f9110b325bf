//! Data acquisition core for Börse Stuttgart price charts.
//!
//! The pipeline turns a free-form instrument identifier and a range key into
//! a normalized OHLCV candle table: identifiers are resolved through a
//! curated watchlist and the live instrument search, price histories are
//! fetched from the JSON endpoints or scraped out of embedded page payloads,
//! and outside trading hours a one-row snapshot is synthesized from the last
//! known quote. [`service::HistoryService`] is the entry point.

pub mod client;
pub mod collect;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod payload;
pub mod range;
pub mod resolve;
pub mod service;
pub mod snapshot;

pub use client::{BoerseClient, QuoteSource};
pub use errors::{NoDataReason, QuoteError};
pub use models::{
    Candle, FetchLocation, History, InstrumentMatch, Provenance, SearchResult, WatchlistEntry,
};
pub use range::{filter_range, range_option, RangeOption};
pub use service::HistoryService;
