//! Configuration section types

use serde::Deserialize;

use crate::types::DataSource;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Symbols to poll, `BASE/QUOTE`
    pub symbols: Vec<String>,
    /// Delay between poll cycles in seconds
    pub poll_interval_secs: u64,
    /// Upper bound for a single provider fetch in milliseconds
    pub fetch_timeout_ms: u64,
    /// Trades retained per symbol
    pub max_trades: usize,
    /// Trades returned when the caller gives no limit
    pub default_trades_limit: usize,
    /// Buffered messages per subscriber before it starts lagging
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub base_url: String,
    /// Request cache TTL in milliseconds
    pub ttl_ms: u64,
    /// Half-spread applied around the reference price
    pub spread_factor: f64,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Fallback order, first entry is tried first
    pub order: Vec<String>,
    pub coinbase: ProviderSettings,
    pub binance: ProviderSettings,
    pub bybit: ProviderSettings,
    pub coingecko: ProviderSettings,
    pub alpha_vantage_daily: ProviderSettings,
}

impl ProvidersConfig {
    pub fn settings_for(&self, source: DataSource) -> &ProviderSettings {
        match source {
            DataSource::Coinbase => &self.coinbase,
            DataSource::Binance => &self.binance,
            DataSource::Bybit => &self.bybit,
            DataSource::CoinGecko => &self.coingecko,
            // `error` never reaches the chain builder; any block will do
            DataSource::AlphaVantageDaily | DataSource::Error => &self.alpha_vantage_daily,
        }
    }

    /// Names of enabled providers in fallback order
    pub fn enabled_chain(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| {
                DataSource::from_str(name)
                    .map(|source| source != DataSource::Error && self.settings_for(source).enabled)
                    .unwrap_or(false)
            })
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of the compact format
    pub json: bool,
}
