//! CoinGecko simple-price client
//!
//! The only provider that reports market capitalization. Volume and market cap
//! are both quote-currency notionals, so their ratio is unit-consistent.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::oracle::sources::{
    decode, quote_from_reference, require_non_negative, require_positive, resolve_number,
    AdapterContext, ProviderAdapter, RawNumber,
};
use crate::oracle::{ProviderError, SnapshotFragment};
use crate::random::RandomSource;
use crate::types::{DataSource, Symbol};

const PROVIDER: &str = "coingecko";

/// `{ "<coin id>": { "<vs>": .., "<vs>_market_cap": .., "<vs>_24h_vol": .. } }`
///
/// Any field may be `null` for thinly covered coins; `null` reads as absent.
type SimplePriceResponse = HashMap<String, HashMap<String, Option<RawNumber>>>;

/// Field by name, with `null` treated as absent
fn field<'a>(fields: &'a HashMap<String, Option<RawNumber>>, name: &str) -> Option<&'a RawNumber> {
    fields.get(name).and_then(Option::as_ref)
}

pub struct CoinGeckoClient {
    ctx: AdapterContext,
}

impl CoinGeckoClient {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    /// Map a base asset ticker to its CoinGecko coin id
    fn coin_id(base: &str) -> Option<&'static str> {
        match base {
            "BTC" => Some("bitcoin"),
            "ETH" => Some("ethereum"),
            "SOL" => Some("solana"),
            "XRP" => Some("ripple"),
            "ADA" => Some("cardano"),
            "DOGE" => Some("dogecoin"),
            "LTC" => Some("litecoin"),
            "DOT" => Some("polkadot"),
            "AVAX" => Some("avalanche-2"),
            "LINK" => Some("chainlink"),
            "BNB" => Some("binancecoin"),
            "MATIC" => Some("matic-network"),
            _ => None,
        }
    }

    fn parse_simple_price(
        payload: serde_json::Value,
        coin_id: &str,
        vs: &str,
        spread_factor: f64,
        rng: &dyn RandomSource,
    ) -> Result<SnapshotFragment, ProviderError> {
        let response: SimplePriceResponse = decode(PROVIDER, payload)?;
        let fields = response.get(coin_id).ok_or_else(|| ProviderError::Empty {
            provider: PROVIDER,
            symbol: format!("{}/{}", coin_id, vs),
        })?;

        let price_field = vs.to_string();
        let price_alt = format!("{}_price", vs);
        let price = resolve_number(
            PROVIDER,
            (price_field.as_str(), field(fields, &price_field)),
            Some((price_alt.as_str(), field(fields, &price_alt))),
        )?;
        let price = require_positive(PROVIDER, &price_field, price)?;

        let volume_field = format!("{}_24h_vol", vs);
        let volume = resolve_number(
            PROVIDER,
            (volume_field.as_str(), field(fields, &volume_field)),
            None,
        )?;
        let volume = require_non_negative(PROVIDER, &volume_field, volume)?;

        let market_cap = field(fields, &format!("{}_market_cap", vs)).and_then(RawNumber::as_finite);

        Ok(quote_from_reference(
            DataSource::CoinGecko,
            price,
            volume,
            market_cap,
            spread_factor,
            rng,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for CoinGeckoClient {
    fn source(&self) -> DataSource {
        DataSource::CoinGecko
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<SnapshotFragment, ProviderError> {
        let coin_id =
            Self::coin_id(symbol.base()).ok_or_else(|| ProviderError::UnsupportedSymbol {
                provider: PROVIDER,
                symbol: symbol.to_string(),
            })?;
        let vs = symbol.quote().to_lowercase();

        let mut url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies={}&include_market_cap=true&include_24hr_vol=true",
            self.ctx.base_url(),
            coin_id,
            vs
        );
        if let Some(key) = self.ctx.settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            url.push_str("&x_cg_demo_api_key=");
            url.push_str(key);
        }
        let key = format!("{}:{}:{}", PROVIDER, coin_id, vs);

        let payload = self
            .ctx
            .cache
            .get_or_fetch(PROVIDER, &url, &key, self.ctx.ttl())
            .await?;

        Self::parse_simple_price(
            payload,
            coin_id,
            &vs,
            self.ctx.settings.spread_factor,
            self.ctx.rng.as_ref(),
        )
    }
}
