//! Core types used throughout the liquidity monitor
//!
//! Defines symbols, source tags, normalized snapshots, depth levels and trades.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency-pair symbol in `BASE/QUOTE` form (e.g. `BTC/USD`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Parse from string.
    ///
    /// Accepts `BTC/USD`, `BTC-USD` and `BTC_USD` in any case. Both legs must be
    /// non-empty alphanumeric.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let mut parts = raw.split(|c| c == '/' || c == '-' || c == '_');
        let base = parts.next()?.trim();
        let quote = parts.next()?.trim();
        if parts.next().is_some() {
            return None;
        }

        let valid = |leg: &str| !leg.is_empty() && leg.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(base) || !valid(quote) {
            return None;
        }

        Some(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Concatenated form (e.g. "BTCUSD")
    pub fn compact(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Dash-separated form (e.g. "BTC-USD")
    pub fn dashed(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value).ok_or_else(|| format!("invalid symbol: {}", value))
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}

/// Which provider (or fallback path) produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Coinbase,
    Binance,
    Bybit,
    #[serde(rename = "coingecko")]
    CoinGecko,
    AlphaVantageDaily,
    /// Every provider failed, or a provider returned a placeholder
    Error,
}

impl DataSource {
    /// Configuration name of the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Coinbase => "coinbase",
            DataSource::Binance => "binance",
            DataSource::Bybit => "bybit",
            DataSource::CoinGecko => "coingecko",
            DataSource::AlphaVantageDaily => "alpha_vantage_daily",
            DataSource::Error => "error",
        }
    }

    /// Parse from configuration name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "coinbase" => Some(DataSource::Coinbase),
            "binance" => Some(DataSource::Binance),
            "bybit" => Some(DataSource::Bybit),
            "coingecko" => Some(DataSource::CoinGecko),
            "alpha_vantage_daily" => Some(DataSource::AlphaVantageDaily),
            "error" => Some(DataSource::Error),
            _ => None,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synthetic order-book level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
    /// Running size total from the top of book
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl DepthLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self {
            price,
            size,
            total: None,
        }
    }
}

/// Synthetic depth on both sides of the book.
///
/// Bids descend from just below the bid price, asks ascend from just above the
/// ask price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDepth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl OrderBookDepth {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Estimated slippage (%) for small/medium/large orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlippageImpact {
    pub small: f64,
    pub medium: f64,
    pub large: f64,
}

/// Latest normalized two-sided quote plus derived metrics for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSnapshot {
    pub symbol: Symbol,
    /// Construction time in epoch milliseconds
    pub timestamp: i64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(rename = "depthLevels", skip_serializing_if = "Option::is_none")]
    pub depth: Option<OrderBookDepth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_depth_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_to_mcap_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage_impact: Option<SlippageImpact>,
}

impl NormalizedSnapshot {
    /// Zeroed snapshot used when no provider could produce data
    pub fn error(symbol: Symbol, timestamp: i64) -> Self {
        Self {
            symbol,
            timestamp,
            bid_price: 0.0,
            ask_price: 0.0,
            bid_size: 0.0,
            ask_size: 0.0,
            volume_24h: 0.0,
            source: DataSource::Error,
            market_cap: None,
            depth: None,
            liquidity_score: Some(0),
            market_depth_ratio: Some(1.0),
            volume_to_mcap_ratio: None,
            spread_percentage: Some(0.0),
            slippage_impact: Some(SlippageImpact::default()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.source == DataSource::Error
    }

    /// Mid price between bid and ask
    pub fn mid_price(&self) -> f64 {
        (self.bid_price + self.ask_price) / 2.0
    }
}

/// A single (simulated) trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub symbol: Symbol,
    pub timestamp: i64,
    pub price: f64,
    pub size: f64,
    /// True when the resting (maker) side was the buyer
    pub is_buyer_maker: bool,
}
