//! Configuration management for the liquidity monitor
//!
//! Loads defaults, optional `config/default.*` and `config/local.*` files, then
//! `LIQMON__*` environment variables (after reading `.env`).

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::types::{DataSource, Symbol};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub providers: ProvidersConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults()
            .context("Failed to set configuration defaults")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (LIQMON__*)
            .add_source(
                Environment::with_prefix("LIQMON")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("monitor.symbols")
                    .with_list_parse_key("providers.order")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    /// Built-in defaults, before files and environment
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Monitor defaults
            .set_default("monitor.symbols", vec!["BTC/USD", "ETH/USD", "SOL/USD", "XRP/USD"])?
            .set_default("monitor.poll_interval_secs", 5)?
            .set_default("monitor.fetch_timeout_ms", 10_000)?
            .set_default("monitor.max_trades", 100)?
            .set_default("monitor.default_trades_limit", 50)?
            .set_default("monitor.broadcast_capacity", 256)?
            // Provider chain
            .set_default(
                "providers.order",
                vec!["coinbase", "binance", "bybit", "coingecko", "alpha_vantage_daily"],
            )?
            .set_default("providers.coinbase.enabled", true)?
            .set_default("providers.coinbase.base_url", "https://api.exchange.coinbase.com")?
            .set_default("providers.coinbase.ttl_ms", 5_000)?
            .set_default("providers.coinbase.spread_factor", 0.0001)?
            .set_default("providers.binance.enabled", true)?
            .set_default("providers.binance.base_url", "https://api.binance.com")?
            .set_default("providers.binance.ttl_ms", 5_000)?
            .set_default("providers.binance.spread_factor", 0.0002)?
            .set_default("providers.bybit.enabled", true)?
            .set_default("providers.bybit.base_url", "https://api.bybit.com")?
            .set_default("providers.bybit.ttl_ms", 10_000)?
            .set_default("providers.bybit.spread_factor", 0.0005)?
            .set_default("providers.coingecko.enabled", true)?
            .set_default("providers.coingecko.base_url", "https://api.coingecko.com")?
            .set_default("providers.coingecko.ttl_ms", 60_000)?
            .set_default("providers.coingecko.spread_factor", 0.001)?
            .set_default("providers.alpha_vantage_daily.enabled", true)?
            .set_default("providers.alpha_vantage_daily.base_url", "https://www.alphavantage.co")?
            .set_default("providers.alpha_vantage_daily.ttl_ms", 300_000)?
            .set_default("providers.alpha_vantage_daily.spread_factor", 0.001)?
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)
    }

    /// Deserialize, fill credentials from plain env vars and validate
    pub fn from_config(config: Config) -> Result<Self> {
        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.apply_env_credentials();
        app_config.validate()?;

        Ok(app_config)
    }

    /// `COINGECKO_API_KEY` / `ALPHA_VANTAGE_API_KEY` when not configured explicitly
    fn apply_env_credentials(&mut self) {
        let slots = [
            (&mut self.providers.coingecko.api_key, "COINGECKO_API_KEY"),
            (
                &mut self.providers.alpha_vantage_daily.api_key,
                "ALPHA_VANTAGE_API_KEY",
            ),
        ];

        for (slot, var) in slots {
            if slot.as_deref().map_or(true, str::is_empty) {
                if let Ok(value) = std::env::var(var) {
                    if !value.is_empty() {
                        *slot = Some(value);
                    }
                }
            }
        }
    }

    /// Check invariants the rest of the service relies on
    pub fn validate(&self) -> Result<()> {
        if self.monitor.symbols.is_empty() {
            bail!("monitor.symbols must list at least one symbol");
        }
        for raw in &self.monitor.symbols {
            if Symbol::parse(raw).is_none() {
                bail!("Invalid symbol '{}', expected BASE/QUOTE", raw);
            }
        }

        for name in &self.providers.order {
            match DataSource::from_str(name) {
                Some(DataSource::Error) | None => bail!("Unknown provider '{}' in providers.order", name),
                Some(_) => {}
            }
        }
        if self.providers.enabled_chain().is_empty() {
            bail!("providers.order has no enabled provider");
        }
        for source in [
            DataSource::Coinbase,
            DataSource::Binance,
            DataSource::Bybit,
            DataSource::CoinGecko,
            DataSource::AlphaVantageDaily,
        ] {
            let spread = self.providers.settings_for(source).spread_factor;
            // bid = price * (1 - spread) must stay positive
            if !(0.0..1.0).contains(&spread) {
                bail!(
                    "providers.{}.spread_factor must be in [0, 1), got {}",
                    source,
                    spread
                );
            }
        }

        if self.monitor.poll_interval_secs == 0 {
            bail!("monitor.poll_interval_secs must be greater than 0");
        }
        if self.monitor.fetch_timeout_ms == 0 {
            bail!("monitor.fetch_timeout_ms must be greater than 0");
        }
        if self.monitor.max_trades == 0 {
            bail!("monitor.max_trades must be greater than 0");
        }
        if self.monitor.default_trades_limit > self.monitor.max_trades {
            bail!(
                "monitor.default_trades_limit ({}) exceeds monitor.max_trades ({})",
                self.monitor.default_trades_limit,
                self.monitor.max_trades
            );
        }
        if self.monitor.broadcast_capacity == 0 {
            bail!("monitor.broadcast_capacity must be greater than 0");
        }

        Ok(())
    }

    /// Configured symbols, parsed
    pub fn symbols(&self) -> Vec<Symbol> {
        self.monitor
            .symbols
            .iter()
            .filter_map(|raw| Symbol::parse(raw))
            .collect()
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "symbols={:?} interval={}s timeout={}ms chain={:?} server={}:{}",
            self.monitor.symbols,
            self.monitor.poll_interval_secs,
            self.monitor.fetch_timeout_ms,
            self.providers.enabled_chain(),
            self.server.host,
            self.server.port
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
