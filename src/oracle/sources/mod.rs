//! Provider adapter implementations (Coinbase, Binance, Bybit, CoinGecko, Alpha Vantage)

mod alpha_vantage;
mod binance;
mod bybit;
mod coinbase;
mod coingecko;

pub use alpha_vantage::AlphaVantageDailyClient;
pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use coinbase::CoinbaseClient;
pub use coingecko::CoinGeckoClient;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderSettings, ProvidersConfig};
use crate::oracle::{ProviderError, RequestCache, SnapshotFragment};
use crate::random::RandomSource;
use crate::types::{DataSource, Symbol};

/// Synthetic top-of-book sizes are drawn from this fraction-of-volume range
const MIN_SIZE_FRACTION: f64 = 0.0001;
const MAX_SIZE_FRACTION: f64 = 0.0006;

/// Trait for quote providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Tag stamped on snapshots this provider produces
    fn source(&self) -> DataSource;

    /// Fetch one symbol and map it into a partial snapshot
    async fn fetch(&self, symbol: &Symbol) -> Result<SnapshotFragment, ProviderError>;
}

/// Numeric field as providers send it: a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    pub(crate) fn as_finite(&self) -> Option<f64> {
        let value = match self {
            RawNumber::Number(n) => *n,
            RawNumber::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    fn raw(&self) -> String {
        match self {
            RawNumber::Number(n) => n.to_string(),
            RawNumber::Text(s) => s.clone(),
        }
    }
}

/// Resolve a numeric field, trying the alternative field name once when the
/// primary is missing or not a finite number.
pub(crate) fn resolve_number(
    provider: &'static str,
    primary: (&str, Option<&RawNumber>),
    alternative: Option<(&str, Option<&RawNumber>)>,
) -> Result<f64, ProviderError> {
    if let Some(value) = primary.1.and_then(RawNumber::as_finite) {
        return Ok(value);
    }

    if let Some((_, Some(alt))) = alternative {
        if let Some(value) = alt.as_finite() {
            return Ok(value);
        }
    }

    let invalid = primary
        .1
        .map(|raw| (primary.0, raw))
        .or_else(|| alternative.and_then(|(name, raw)| raw.map(|raw| (name, raw))));

    match invalid {
        Some((field, raw)) => Err(ProviderError::InvalidNumber {
            provider,
            field: field.to_string(),
            value: raw.raw(),
        }),
        None => Err(ProviderError::MissingField {
            provider,
            field: primary.0.to_string(),
        }),
    }
}

/// Reject non-positive reference prices
pub(crate) fn require_positive(
    provider: &'static str,
    field: &str,
    value: f64,
) -> Result<f64, ProviderError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ProviderError::InvalidNumber {
            provider,
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// Reject negative volumes
pub(crate) fn require_non_negative(
    provider: &'static str,
    field: &str,
    value: f64,
) -> Result<f64, ProviderError> {
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ProviderError::InvalidNumber {
            provider,
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    provider: &'static str,
    payload: serde_json::Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(payload).map_err(|source| ProviderError::Decode { provider, source })
}

/// Build a two-sided quote around a reference price.
///
/// Most providers only publish a last/close price, so bid and ask sit
/// `spread_factor` either side of it and sizes are a random slice of volume.
pub(crate) fn quote_from_reference(
    source: DataSource,
    price: f64,
    volume_24h: f64,
    market_cap: Option<f64>,
    spread_factor: f64,
    rng: &dyn RandomSource,
) -> SnapshotFragment {
    SnapshotFragment {
        bid_price: price * (1.0 - spread_factor),
        ask_price: price * (1.0 + spread_factor),
        bid_size: volume_24h * rng.uniform(MIN_SIZE_FRACTION, MAX_SIZE_FRACTION),
        ask_size: volume_24h * rng.uniform(MIN_SIZE_FRACTION, MAX_SIZE_FRACTION),
        volume_24h,
        market_cap: market_cap.filter(|cap| *cap > 0.0),
        source,
    }
}

/// Shared wiring every HTTP adapter needs
#[derive(Clone)]
pub struct AdapterContext {
    pub settings: ProviderSettings,
    pub cache: Arc<RequestCache>,
    pub rng: Arc<dyn RandomSource>,
}

impl AdapterContext {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.settings.ttl_ms)
    }

    pub fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }
}

/// Build the ordered fallback chain from configuration.
///
/// Disabled providers are skipped; unknown names are a configuration error.
pub fn build_chain(
    config: &ProvidersConfig,
    cache: Arc<RequestCache>,
    rng: Arc<dyn RandomSource>,
) -> Result<Vec<Arc<dyn ProviderAdapter>>> {
    let mut chain: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    for name in &config.order {
        let source = match DataSource::from_str(name) {
            Some(DataSource::Error) | None => bail!("Unknown provider in chain: {}", name),
            Some(source) => source,
        };

        let settings = config.settings_for(source);
        if !settings.enabled {
            tracing::info!(provider = %source, "Provider disabled, skipping");
            continue;
        }

        let ctx = AdapterContext {
            settings: settings.clone(),
            cache: cache.clone(),
            rng: rng.clone(),
        };

        if let Some(adapter) = adapter_for(source, ctx) {
            chain.push(adapter);
        }
    }

    if chain.is_empty() {
        bail!("No providers enabled in chain {:?}", config.order);
    }

    tracing::info!(
        chain = ?chain.iter().map(|p| p.source().as_str()).collect::<Vec<_>>(),
        "Provider fallback chain built"
    );

    Ok(chain)
}

fn adapter_for(source: DataSource, ctx: AdapterContext) -> Option<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match source {
        DataSource::Coinbase => Arc::new(CoinbaseClient::new(ctx)),
        DataSource::Binance => Arc::new(BinanceClient::new(ctx)),
        DataSource::Bybit => Arc::new(BybitClient::new(ctx)),
        DataSource::CoinGecko => Arc::new(CoinGeckoClient::new(ctx)),
        DataSource::AlphaVantageDaily => Arc::new(AlphaVantageDailyClient::new(ctx)),
        DataSource::Error => return None,
    };
    Some(adapter)
}
