//! Identifier resolution helpers
//!
//! A free-form identifier can be a direct address, an ISIN, a WKN or a name
//! fragment. The pure matching rules live here; the orchestrator wires them
//! to the live search.

use crate::errors::QuoteError;
use crate::models::{FetchLocation, InstrumentMatch, SearchResult, WatchlistEntry};

/// Derive the WKN for German ISINs. Many German ISINs follow
/// `DE000` + WKN + check digit, e.g. `DE0007030009` -> `703000`.
pub fn derive_wkn_from_isin(isin: &str) -> Option<String> {
    let isin = isin.trim().to_uppercase();
    if isin.len() == 12 && isin.starts_with("DE000") && isin.is_ascii() {
        Some(isin[5..11].to_string())
    } else {
        None
    }
}

/// Exact case-insensitive identifier match against the curated watchlist.
pub fn watchlist_match<'a>(
    watchlist: &'a [WatchlistEntry],
    identifier: &str,
) -> Option<&'a WatchlistEntry> {
    watchlist
        .iter()
        .find(|entry| entry.identifier.eq_ignore_ascii_case(identifier))
}

/// Prefer an exact case-insensitive match on either code field, otherwise
/// take the first result. `None` only for an empty slice.
pub fn pick_search_result<'a>(
    results: &'a [SearchResult],
    identifier: &str,
) -> Option<&'a SearchResult> {
    results
        .iter()
        .find(|result| {
            result
                .isin
                .as_deref()
                .is_some_and(|isin| isin.eq_ignore_ascii_case(identifier))
                || result
                    .wkn
                    .as_deref()
                    .is_some_and(|wkn| wkn.eq_ignore_ascii_case(identifier))
        })
        .or_else(|| results.first())
}

/// Build an instrument match from a chosen search result. A result without
/// an ISIN carries no fetch location and cannot be used.
pub fn instrument_match_from(result: &SearchResult) -> Result<InstrumentMatch, QuoteError> {
    let isin = result.isin.clone().ok_or_else(|| {
        QuoteError::Resolution(format!("search result '{}' has no fetch location", result.name))
    })?;
    Ok(InstrumentMatch {
        name: result.name.clone(),
        location: FetchLocation::PriceHistory { isin: isin.clone() },
        isin: Some(isin),
        wkn: result.wkn.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, isin: Option<&str>, wkn: Option<&str>) -> SearchResult {
        SearchResult {
            name: name.to_string(),
            isin: isin.map(str::to_string),
            wkn: wkn.map(str::to_string),
            market: None,
        }
    }

    #[test]
    fn derives_wkn_from_german_isin() {
        assert_eq!(derive_wkn_from_isin("DE0007030009"), Some("703000".to_string()));
        // deterministic on repeated calls
        assert_eq!(derive_wkn_from_isin("DE0007030009"), Some("703000".to_string()));
        assert_eq!(derive_wkn_from_isin(" de0007030009 "), Some("703000".to_string()));
    }

    #[test]
    fn rejects_non_german_or_malformed_isins() {
        assert_eq!(derive_wkn_from_isin("US0378331005"), None);
        assert_eq!(derive_wkn_from_isin("DE000703000"), None);
        assert_eq!(derive_wkn_from_isin(""), None);
    }

    #[test]
    fn watchlist_match_is_case_insensitive() {
        let watchlist = vec![WatchlistEntry {
            name: "Deutsche Telekom".to_string(),
            identifier: "DE0005557508".to_string(),
            market: Some("XSTU".to_string()),
        }];

        assert!(watchlist_match(&watchlist, "de0005557508").is_some());
        assert!(watchlist_match(&watchlist, "DE0007030009").is_none());
    }

    #[test]
    fn prefers_exact_code_match_over_first_result() {
        let results = vec![
            result("Other AG", Some("DE0001111111"), None),
            result("Wanted SE", Some("DE0007030009"), Some("703000")),
        ];

        let chosen = pick_search_result(&results, "703000").unwrap();
        assert_eq!(chosen.name, "Wanted SE");

        let chosen = pick_search_result(&results, "de0007030009").unwrap();
        assert_eq!(chosen.name, "Wanted SE");
    }

    #[test]
    fn falls_back_to_first_result_without_exact_match() {
        let results = vec![
            result("First AG", Some("DE0001111111"), None),
            result("Second SE", Some("DE0002222222"), None),
        ];

        let chosen = pick_search_result(&results, "Telekom").unwrap();
        assert_eq!(chosen.name, "First AG");
    }

    #[test]
    fn result_without_location_is_a_resolution_error() {
        let err = instrument_match_from(&result("Nameless", None, Some("703000"))).unwrap_err();
        assert!(matches!(err, QuoteError::Resolution(_)));
    }
}
