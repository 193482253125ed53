//! Bybit V5 spot tickers client

use async_trait::async_trait;
use serde::Deserialize;

use crate::oracle::sources::{
    decode, quote_from_reference, require_non_negative, require_positive, resolve_number,
    AdapterContext, ProviderAdapter, RawNumber,
};
use crate::oracle::{ProviderError, SnapshotFragment};
use crate::random::RandomSource;
use crate::types::{DataSource, Symbol};

const PROVIDER: &str = "bybit";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<BybitResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct BybitResult {
    #[serde(default)]
    list: Vec<BybitTicker>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    last_price: Option<RawNumber>,
    usd_index_price: Option<RawNumber>,
    volume24h: Option<RawNumber>,
}

pub struct BybitClient {
    ctx: AdapterContext,
}

impl BybitClient {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    /// `BTC/USD` -> `BTCUSDT`
    fn build_symbol(symbol: &Symbol) -> String {
        let quote = match symbol.quote() {
            "USD" => "USDT",
            other => other,
        };
        format!("{}{}", symbol.base(), quote)
    }

    fn parse_tickers(
        payload: serde_json::Value,
        symbol: &str,
        spread_factor: f64,
        rng: &dyn RandomSource,
    ) -> Result<SnapshotFragment, ProviderError> {
        let response: BybitResponse = decode(PROVIDER, payload)?;

        if response.ret_code != 0 {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                message: format!("retCode {}: {}", response.ret_code, response.ret_msg),
            });
        }

        let ticker = response
            .result
            .and_then(|result| result.list.into_iter().next())
            .ok_or_else(|| ProviderError::Empty {
                provider: PROVIDER,
                symbol: symbol.to_string(),
            })?;

        let price = resolve_number(
            PROVIDER,
            ("lastPrice", ticker.last_price.as_ref()),
            Some(("usdIndexPrice", ticker.usd_index_price.as_ref())),
        )?;
        let price = require_positive(PROVIDER, "lastPrice", price)?;

        let volume = resolve_number(PROVIDER, ("volume24h", ticker.volume24h.as_ref()), None)?;
        let volume = require_non_negative(PROVIDER, "volume24h", volume)?;

        Ok(quote_from_reference(
            DataSource::Bybit,
            price,
            volume,
            None,
            spread_factor,
            rng,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for BybitClient {
    fn source(&self) -> DataSource {
        DataSource::Bybit
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<SnapshotFragment, ProviderError> {
        let bybit_symbol = Self::build_symbol(symbol);
        let url = format!(
            "{}/v5/market/tickers?category=spot&symbol={}",
            self.ctx.base_url(),
            bybit_symbol
        );
        let key = format!("{}:{}", PROVIDER, bybit_symbol);

        let payload = self
            .ctx
            .cache
            .get_or_fetch(PROVIDER, &url, &key, self.ctx.ttl())
            .await?;

        Self::parse_tickers(
            payload,
            &bybit_symbol,
            self.ctx.settings.spread_factor,
            self.ctx.rng.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::FixedRandom;
    use serde_json::json;

    #[test]
    fn parses_spot_ticker() {
        let payload = json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "spot",
                "list": [{
                    "symbol": "SOLUSDT",
                    "bid1Price": "99.98",
                    "ask1Price": "100.02",
                    "lastPrice": "100.00",
                    "volume24h": "250000",
                    "usdIndexPrice": "100.01"
                }]
            }
        });

        let fragment =
            BybitClient::parse_tickers(payload, "SOLUSDT", 0.0005, &FixedRandom(0.1)).unwrap();
        assert_eq!(fragment.source, DataSource::Bybit);
        assert!((fragment.bid_price - 99.95).abs() < 1e-9);
        assert!((fragment.ask_price - 100.05).abs() < 1e-9);
        assert_eq!(fragment.volume_24h, 250000.0);
    }

    #[test]
    fn api_error_code_is_provider_error() {
        let payload = json!({ "retCode": 10001, "retMsg": "params error", "result": {} });
        let err = BybitClient::parse_tickers(payload, "FOOUSDT", 0.0005, &FixedRandom(0.1))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
    }

    #[test]
    fn empty_list_is_provider_error() {
        let payload = json!({ "retCode": 0, "retMsg": "OK", "result": { "list": [] } });
        let err = BybitClient::parse_tickers(payload, "FOOUSDT", 0.0005, &FixedRandom(0.1))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Empty { .. }));
    }
}
