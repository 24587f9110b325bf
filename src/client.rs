//! HTTP boundary for the Börse Stuttgart endpoints and the read-only relay
//!
//! All outbound traffic of the pipeline goes through the `QuoteSource`
//! trait so the orchestrator can be exercised against stubs. `BoerseClient`
//! is the reqwest implementation; every fetch kind carries its own bounded
//! timeout and exceeding it is a recoverable `Fetch` error, not a crash.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

use crate::errors::QuoteError;
use crate::models::{FetchLocation, SearchResult};
use crate::range::{Endpoint, RangeOption};

const SEARCH_ENDPOINT: &str = "https://www.boerse-stuttgart.de/api/data/instruments/search";
const INTRADAY_ENDPOINT: &str = "https://www.boerse-stuttgart.de/api/data/pricehistory/intraday";
const HISTORY_ENDPOINT: &str = "https://www.boerse-stuttgart.de/api/data/pricehistory/history";

/// Read-only relay that serves instrument pages past the bot protection
const RELAY_PREFIX: &str = "https://r.jina.ai/";
const INSTRUMENT_PAGE_PREFIX: &str =
    "https://www.boerse-stuttgart.de/en/products/equities/stuttgart/";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; StockChartingBot/1.0)";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const PRICE_HISTORY_TIMEOUT: Duration = Duration::from_secs(15);
const RELAY_TIMEOUT: Duration = Duration::from_secs(20);

/// Keys under which the search response may nest its result list
const SEARCH_CONTAINER_KEYS: [&str; 4] = ["data", "results", "items", "instruments"];

lazy_static! {
    /// Markers that distinguish an instrument page from an error page
    static ref QUOTE_PAGE_MARKER_RE: Regex =
        Regex::new(r"(?i)QuoteBlock|Kursdaten|LETZTER\s+PREIS").expect("marker pattern is valid");
}

/// Outbound fetch capability consumed by the orchestrator
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Live instrument search.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, QuoteError>;

    /// Fetch the raw price-history document for a location; the body may be
    /// JSON or a rendered page with an embedded payload.
    async fn fetch_price_history(
        &self,
        location: &FetchLocation,
        option: &RangeOption,
    ) -> Result<String, QuoteError>;

    /// Fetch the instrument page for a WKN through the relay.
    async fn fetch_instrument_page(&self, wkn: &str) -> Result<String, QuoteError>;
}

/// Reqwest client for the Börse Stuttgart endpoints
pub struct BoerseClient {
    client: Client,
}

impl BoerseClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .default_headers(boerse_headers())
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for BoerseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for BoerseClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, QuoteError> {
        debug!("searching instruments for '{}'", query);
        let limit = limit.to_string();
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[("query", query), ("limit", limit.as_str())])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        Ok(search_candidates(payload)
            .into_iter()
            .filter_map(parse_search_candidate)
            .collect())
    }

    async fn fetch_price_history(
        &self,
        location: &FetchLocation,
        option: &RangeOption,
    ) -> Result<String, QuoteError> {
        let request = match location {
            FetchLocation::Url(url) => self.client.get(url),
            FetchLocation::PriceHistory { isin } => {
                let endpoint = match option.endpoint {
                    Endpoint::Intraday => INTRADAY_ENDPOINT,
                    Endpoint::History => HISTORY_ENDPOINT,
                };
                self.client.get(endpoint).query(&[
                    ("isin", isin.as_str()),
                    ("range", option.range),
                    ("interval", option.interval),
                ])
            }
        };

        let body = request
            .timeout(PRICE_HISTORY_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn fetch_instrument_page(&self, wkn: &str) -> Result<String, QuoteError> {
        let url = format!("{}{}{}", RELAY_PREFIX, INSTRUMENT_PAGE_PREFIX, wkn);
        debug!("fetching instrument page via relay for WKN {}", wkn);

        let body = self
            .client
            .get(&url)
            .timeout(RELAY_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if !QUOTE_PAGE_MARKER_RE.is_match(&body) {
            return Err(QuoteError::Extraction(format!(
                "relay page for WKN {} carries no quote block",
                wkn
            )));
        }
        Ok(body)
    }
}

fn boerse_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers
}

/// Locate the result list inside a search response.
fn search_candidates(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in SEARCH_CONTAINER_KEYS {
                if let Some(inner) = map.remove(key) {
                    return search_candidates(inner);
                }
            }
            vec![Value::Object(map)]
        }
        other => vec![other],
    }
}

/// Parse one search candidate; mapping-shaped and positional-pair results
/// are both served by the upstream.
fn parse_search_candidate(value: Value) -> Option<SearchResult> {
    match value {
        Value::Object(map) => {
            let name = map
                .get("name")
                .or_else(|| map.get("symbol"))?
                .as_str()?
                .to_string();
            let isin = map
                .get("isin")
                .or_else(|| map.get("identifier"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let wkn = map.get("wkn").and_then(|v| v.as_str()).map(str::to_string);
            if isin.is_none() && wkn.is_none() {
                return None;
            }
            let market = map
                .get("market")
                .or_else(|| map.get("segment"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            Some(SearchResult {
                name,
                isin,
                wkn,
                market,
            })
        }
        Value::Array(items) if items.len() >= 2 => {
            let name = items.first()?.as_str()?.to_string();
            let isin = items.get(1)?.as_str()?.to_string();
            Some(SearchResult {
                name,
                isin: Some(isin),
                wkn: None,
                market: None,
            })
        }
        _ => None,
    }
}
