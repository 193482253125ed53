//! Oracle module - Multi-provider quote aggregation
//!
//! Fetches quotes from Coinbase, Binance, Bybit, CoinGecko and Alpha Vantage,
//! walks them as an ordered fallback chain and produces one enriched
//! [`NormalizedSnapshot`](crate::types::NormalizedSnapshot) per symbol.

mod aggregator;
pub mod cache;
mod errors;
pub mod sources;

pub use aggregator::{FallbackAggregator, ProviderHealth};
pub use cache::RequestCache;
pub use errors::ProviderError;

use crate::types::DataSource;

/// Partial snapshot produced by a single provider adapter.
///
/// Bid/ask are derived from the provider's reference price; sizes are a
/// synthetic fraction of volume.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFragment {
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub volume_24h: f64,
    pub market_cap: Option<f64>,
    pub source: DataSource,
}

impl SnapshotFragment {
    /// Zeroed fragment tagged `error`
    pub fn placeholder() -> Self {
        Self {
            bid_price: 0.0,
            ask_price: 0.0,
            bid_size: 0.0,
            ask_size: 0.0,
            volume_24h: 0.0,
            market_cap: None,
            source: DataSource::Error,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == DataSource::Error
    }
}
