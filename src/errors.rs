//! Error types for the quote acquisition pipeline

use std::fmt;

use thiserror::Error;

/// Why no usable data could be produced, in user-facing terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDataReason {
    /// The source answered but the requested window holds no rows
    /// (typically outside trading hours).
    EmptyWindow,
    /// The source could not be reached or answered with an error.
    SourceUnreachable,
    /// The identifier could not be mapped to any instrument.
    UnknownIdentifier,
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            NoDataReason::EmptyWindow => {
                "no price data in the requested window (possibly outside trading hours)"
            }
            NoDataReason::SourceUnreachable => "the data source is unreachable",
            NoDataReason::UnknownIdentifier => "no instrument found for that identifier",
        };
        write!(f, "{}", message)
    }
}

/// Errors that can occur while acquiring and normalizing price history
#[derive(Error, Debug)]
pub enum QuoteError {
    /// A structure cannot be normalized into a candle table. Expected and
    /// frequent during candidate probing; never escapes the collector.
    #[error("structure cannot be normalized: {0}")]
    Schema(String),

    /// No parseable state payload was found in a document
    #[error("no parseable payload in document: {0}")]
    Extraction(String),

    /// An identifier could not be mapped to a fetch location
    #[error("identifier could not be resolved: {0}")]
    Resolution(String),

    /// Network failure, timeout or non-success status
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Terminal: every strategy exhausted
    #[error("no price data available: {0}")]
    NoData(NoDataReason),
}

impl From<reqwest::Error> for QuoteError {
    fn from(err: reqwest::Error) -> Self {
        QuoteError::Fetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_messages_are_distinct() {
        let messages = [
            NoDataReason::EmptyWindow.to_string(),
            NoDataReason::SourceUnreachable.to_string(),
            NoDataReason::UnknownIdentifier.to_string(),
        ];
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert_ne!(messages[0], messages[2]);
    }
}
