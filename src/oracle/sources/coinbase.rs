//! Coinbase Exchange REST ticker client
//!
//! Uses the public `/products/{id}/ticker` endpoint; no credentials needed.

use async_trait::async_trait;
use serde::Deserialize;

use crate::oracle::sources::{
    decode, quote_from_reference, require_non_negative, require_positive, resolve_number,
    AdapterContext, ProviderAdapter, RawNumber,
};
use crate::oracle::{ProviderError, SnapshotFragment};
use crate::random::RandomSource;
use crate::types::{DataSource, Symbol};

const PROVIDER: &str = "coinbase";

#[derive(Debug, Clone, Deserialize)]
struct CoinbaseTicker {
    price: Option<RawNumber>,
    /// Older ticker payloads carry the last trade here
    last: Option<RawNumber>,
    volume: Option<RawNumber>,
}

pub struct CoinbaseClient {
    ctx: AdapterContext,
}

impl CoinbaseClient {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    /// `BTC/USD` -> `BTC-USD`
    fn product_id(symbol: &Symbol) -> String {
        symbol.dashed()
    }

    fn parse_ticker(
        payload: serde_json::Value,
        spread_factor: f64,
        rng: &dyn RandomSource,
    ) -> Result<SnapshotFragment, ProviderError> {
        let ticker: CoinbaseTicker = decode(PROVIDER, payload)?;

        let price = resolve_number(
            PROVIDER,
            ("price", ticker.price.as_ref()),
            Some(("last", ticker.last.as_ref())),
        )?;
        let price = require_positive(PROVIDER, "price", price)?;

        let volume = resolve_number(PROVIDER, ("volume", ticker.volume.as_ref()), None)?;
        let volume = require_non_negative(PROVIDER, "volume", volume)?;

        Ok(quote_from_reference(
            DataSource::Coinbase,
            price,
            volume,
            None,
            spread_factor,
            rng,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for CoinbaseClient {
    fn source(&self) -> DataSource {
        DataSource::Coinbase
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<SnapshotFragment, ProviderError> {
        let product_id = Self::product_id(symbol);
        let url = format!("{}/products/{}/ticker", self.ctx.base_url(), product_id);
        let key = format!("{}:{}", PROVIDER, product_id);

        let payload = self
            .ctx
            .cache
            .get_or_fetch(PROVIDER, &url, &key, self.ctx.ttl())
            .await?;

        Self::parse_ticker(payload, self.ctx.settings.spread_factor, self.ctx.rng.as_ref())
    }
}
