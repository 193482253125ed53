//! Binance spot 24h ticker client

use async_trait::async_trait;
use serde::Deserialize;

use crate::oracle::sources::{
    decode, quote_from_reference, require_non_negative, require_positive, resolve_number,
    AdapterContext, ProviderAdapter, RawNumber,
};
use crate::oracle::{ProviderError, SnapshotFragment};
use crate::random::RandomSource;
use crate::types::{DataSource, Symbol};

const PROVIDER: &str = "binance";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker24h {
    last_price: Option<RawNumber>,
    weighted_avg_price: Option<RawNumber>,
    volume: Option<RawNumber>,
}

pub struct BinanceClient {
    ctx: AdapterContext,
}

impl BinanceClient {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    /// `BTC/USD` -> `BTCUSDT`; Binance spot quotes USD pairs in USDT
    fn trading_pair(symbol: &Symbol) -> String {
        let quote = match symbol.quote() {
            "USD" => "USDT",
            other => other,
        };
        format!("{}{}", symbol.base(), quote)
    }

    fn parse_ticker(
        payload: serde_json::Value,
        spread_factor: f64,
        rng: &dyn RandomSource,
    ) -> Result<SnapshotFragment, ProviderError> {
        let ticker: BinanceTicker24h = decode(PROVIDER, payload)?;

        let price = resolve_number(
            PROVIDER,
            ("lastPrice", ticker.last_price.as_ref()),
            Some(("weightedAvgPrice", ticker.weighted_avg_price.as_ref())),
        )?;
        let price = require_positive(PROVIDER, "lastPrice", price)?;

        let volume = resolve_number(PROVIDER, ("volume", ticker.volume.as_ref()), None)?;
        let volume = require_non_negative(PROVIDER, "volume", volume)?;

        Ok(quote_from_reference(
            DataSource::Binance,
            price,
            volume,
            None,
            spread_factor,
            rng,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for BinanceClient {
    fn source(&self) -> DataSource {
        DataSource::Binance
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<SnapshotFragment, ProviderError> {
        let pair = Self::trading_pair(symbol);
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.ctx.base_url(), pair);
        let key = format!("{}:{}", PROVIDER, pair);

        let payload = self
            .ctx
            .cache
            .get_or_fetch(PROVIDER, &url, &key, self.ctx.ttl())
            .await?;

        Self::parse_ticker(payload, self.ctx.settings.spread_factor, self.ctx.rng.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::FixedRandom;
    use serde_json::json;

    #[test]
    fn maps_usd_to_usdt() {
        let btc = Symbol::parse("BTC/USD").unwrap();
        let eth_btc = Symbol::parse("ETH/BTC").unwrap();
        assert_eq!(BinanceClient::trading_pair(&btc), "BTCUSDT");
        assert_eq!(BinanceClient::trading_pair(&eth_btc), "ETHBTC");
    }

    #[test]
    fn parses_24h_ticker() {
        let payload = json!({
            "symbol": "ETHUSDT",
            "lastPrice": "2000.00",
            "weightedAvgPrice": "1995.12",
            "volume": "500.0",
            "quoteVolume": "1000000.0"
        });

        let fragment = BinanceClient::parse_ticker(payload, 0.0002, &FixedRandom(0.3)).unwrap();
        assert!(fragment.bid_price < 2000.0 && 2000.0 < fragment.ask_price);
        assert_eq!(fragment.volume_24h, 500.0);
        assert_eq!(fragment.source, DataSource::Binance);
    }

    #[test]
    fn uses_weighted_average_when_last_price_missing() {
        let payload = json!({ "weightedAvgPrice": 1995.0, "volume": "1" });
        let fragment = BinanceClient::parse_ticker(payload, 0.0, &FixedRandom(0.3)).unwrap();
        assert_eq!(fragment.bid_price, 1995.0);
    }

    #[test]
    fn rejects_nan_volume() {
        let payload = json!({ "lastPrice": "2000", "volume": "NaN" });
        let err = BinanceClient::parse_ticker(payload, 0.0002, &FixedRandom(0.3)).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidNumber { ref field, .. } if field == "volume"));
    }
}
