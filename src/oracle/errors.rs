//! Provider error types

use thiserror::Error;

/// Errors a single provider adapter can fail with.
///
/// The fallback aggregator recovers from all of these by moving on to the
/// next provider in the chain.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered with a non-success status
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },

    /// API answered 200 but reported an error in the body
    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Failed to decode {provider} response: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Neither the primary nor the alternative field was present
    #[error("{provider} response is missing field '{field}'")]
    MissingField {
        provider: &'static str,
        field: String,
    },

    /// Field present but not a finite number
    #[error("{provider} field '{field}' is not a finite number: {value}")]
    InvalidNumber {
        provider: &'static str,
        field: String,
        value: String,
    },

    /// Provider requires an API key that is not configured
    #[error("{0} API key is not configured")]
    MissingCredentials(&'static str),

    /// Provider cannot quote this symbol
    #[error("{provider} does not support symbol {symbol}")]
    UnsupportedSymbol {
        provider: &'static str,
        symbol: String,
    },

    /// Provider returned no data for the symbol
    #[error("{provider} returned no data for {symbol}")]
    Empty {
        provider: &'static str,
        symbol: String,
    },

    /// Fetch did not complete within the configured bound
    #[error("{provider} did not respond within {timeout_ms}ms")]
    Timeout {
        provider: &'static str,
        timeout_ms: u64,
    },
}
