//! Alpha Vantage `DIGITAL_CURRENCY_DAILY` client
//!
//! Last-resort provider in the default chain. Unlike the other adapters it
//! answers with an `error`-tagged placeholder fragment instead of failing when
//! the time series is missing or unreadable, which stops the fallback chain at
//! this adapter. Missing credentials still fail normally.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::oracle::sources::{
    decode, quote_from_reference, require_non_negative, require_positive, resolve_number,
    AdapterContext, ProviderAdapter, RawNumber,
};
use crate::oracle::{ProviderError, SnapshotFragment};
use crate::random::RandomSource;
use crate::types::{DataSource, Symbol};

const PROVIDER: &str = "alpha_vantage_daily";

#[derive(Debug, Clone, Deserialize)]
struct DailyResponse {
    /// Keyed by `YYYY-MM-DD`, so the last key is the latest day
    #[serde(rename = "Time Series (Digital Currency Daily)")]
    time_series: Option<BTreeMap<String, HashMap<String, RawNumber>>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

impl DailyResponse {
    fn notice(&self) -> &str {
        self.error_message
            .as_deref()
            .or(self.note.as_deref())
            .or(self.information.as_deref())
            .unwrap_or("time series missing")
    }
}

pub struct AlphaVantageDailyClient {
    ctx: AdapterContext,
}

impl AlphaVantageDailyClient {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    fn parse_daily(
        payload: serde_json::Value,
        quote: &str,
        spread_factor: f64,
        rng: &dyn RandomSource,
    ) -> Result<SnapshotFragment, ProviderError> {
        let response: DailyResponse = decode(PROVIDER, payload)?;

        let latest = match response
            .time_series
            .as_ref()
            .and_then(|series| series.iter().next_back())
        {
            Some((_, fields)) => fields,
            None => {
                tracing::warn!(
                    provider = PROVIDER,
                    notice = %response.notice(),
                    "Daily series unavailable, returning placeholder"
                );
                return Ok(SnapshotFragment::placeholder());
            }
        };

        match Self::fragment_from_day(latest, quote, spread_factor, rng) {
            Ok(fragment) => Ok(fragment),
            Err(e) => {
                tracing::warn!(provider = PROVIDER, error = %e, "Daily bar unreadable, returning placeholder");
                Ok(SnapshotFragment::placeholder())
            }
        }
    }

    fn fragment_from_day(
        fields: &HashMap<String, RawNumber>,
        quote: &str,
        spread_factor: f64,
        rng: &dyn RandomSource,
    ) -> Result<SnapshotFragment, ProviderError> {
        let close_alt = format!("4a. close ({})", quote);
        let close = resolve_number(
            PROVIDER,
            ("4. close", fields.get("4. close")),
            Some((close_alt.as_str(), fields.get(&close_alt))),
        )?;
        let close = require_positive(PROVIDER, "4. close", close)?;

        let volume = resolve_number(PROVIDER, ("5. volume", fields.get("5. volume")), None)?;
        let volume = require_non_negative(PROVIDER, "5. volume", volume)?;

        let market_cap = fields
            .get(&format!("6. market cap ({})", quote))
            .and_then(RawNumber::as_finite);

        Ok(quote_from_reference(
            DataSource::AlphaVantageDaily,
            close,
            volume,
            market_cap,
            spread_factor,
            rng,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for AlphaVantageDailyClient {
    fn source(&self) -> DataSource {
        DataSource::AlphaVantageDaily
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<SnapshotFragment, ProviderError> {
        let api_key = self
            .ctx
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingCredentials(PROVIDER))?;

        let url = format!(
            "{}/query?function=DIGITAL_CURRENCY_DAILY&symbol={}&market={}&apikey={}",
            self.ctx.base_url(),
            symbol.base(),
            symbol.quote(),
            api_key
        );
        let key = format!("{}:{}:{}", PROVIDER, symbol.base(), symbol.quote());

        let payload = self
            .ctx
            .cache
            .get_or_fetch(PROVIDER, &url, &key, self.ctx.ttl())
            .await?;

        Self::parse_daily(
            payload,
            symbol.quote(),
            self.ctx.settings.spread_factor,
            self.ctx.rng.as_ref(),
        )
    }
}
