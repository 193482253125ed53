//! Fallback Aggregator - Walks the provider chain for one symbol
//!
//! Providers are tried strictly in order; the first success is enriched with
//! synthetic depth and liquidity metrics. When every provider fails the result
//! is a zeroed `error` snapshot, so callers never handle an error path.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::liquidity::{self, MetricsInput, OrderBookSynthesizer};
use crate::oracle::sources::ProviderAdapter;
use crate::oracle::{ProviderError, SnapshotFragment};
use crate::types::{DataSource, NormalizedSnapshot, Symbol};

type SharedSnapshot = Shared<BoxFuture<'static, NormalizedSnapshot>>;

/// Running success/failure counters for one provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub source: DataSource,
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    pub last_success_ts: Option<i64>,
}

impl ProviderHealth {
    fn new(source: DataSource) -> Self {
        Self {
            source,
            successes: 0,
            failures: 0,
            last_error: None,
            last_success_ts: None,
        }
    }
}

/// Ordered provider chain with per-symbol single-flight
pub struct FallbackAggregator {
    chain: Arc<ProviderChain>,
    /// Chain runs currently in flight, keyed by symbol
    inflight: Mutex<HashMap<Symbol, SharedSnapshot>>,
}

/// Drops the in-flight entry once its caller is done, even on cancellation or
/// panic, so a poisoned or finished run is never joined later.
struct InflightGuard<'a> {
    inflight: &'a Mutex<HashMap<Symbol, SharedSnapshot>>,
    symbol: &'a Symbol,
    run: &'a SharedSnapshot,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight
            .get(self.symbol)
            .map_or(false, |current| current.ptr_eq(self.run))
        {
            inflight.remove(self.symbol);
        }
    }
}

struct ProviderChain {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    synthesizer: OrderBookSynthesizer,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    health: RwLock<HashMap<DataSource, ProviderHealth>>,
}

impl FallbackAggregator {
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        synthesizer: OrderBookSynthesizer,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
    ) -> Self {
        let health = providers
            .iter()
            .map(|p| (p.source(), ProviderHealth::new(p.source())))
            .collect();

        Self {
            chain: Arc::new(ProviderChain {
                providers,
                synthesizer,
                clock,
                fetch_timeout,
                health: RwLock::new(health),
            }),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch, normalize and enrich the latest snapshot for `symbol`.
    ///
    /// Never fails: if no provider succeeds the zeroed `error` snapshot is
    /// returned. Concurrent calls for the same symbol share one chain run.
    pub async fn fetch_all_data_for_symbol(&self, symbol: &Symbol) -> NormalizedSnapshot {
        let run = self.join_or_start(symbol);
        let _guard = InflightGuard {
            inflight: &self.inflight,
            symbol,
            run: &run,
        };
        run.clone().await
    }

    fn join_or_start(&self, symbol: &Symbol) -> SharedSnapshot {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inflight.get(symbol) {
            return existing.clone();
        }

        let chain = self.chain.clone();
        let owned = symbol.clone();
        let run = async move { chain.run(&owned).await }.boxed().shared();
        inflight.insert(symbol.clone(), run.clone());
        run
    }

    /// Provider tags in fallback order
    pub fn chain(&self) -> Vec<DataSource> {
        self.chain.providers.iter().map(|p| p.source()).collect()
    }

    /// Health counters in fallback order
    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        let health = self.chain.health.read().await;
        self.chain
            .providers
            .iter()
            .filter_map(|p| health.get(&p.source()).cloned())
            .collect()
    }
}

impl ProviderChain {
    async fn run(&self, symbol: &Symbol) -> NormalizedSnapshot {
        for provider in &self.providers {
            let source = provider.source();

            let result = match tokio::time::timeout(self.fetch_timeout, provider.fetch(symbol)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: source.as_str(),
                    timeout_ms: self.fetch_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(fragment) if fragment.is_placeholder() => {
                    tracing::warn!(
                        symbol = %symbol,
                        source = %source,
                        "Provider returned placeholder data, stopping chain"
                    );
                    self.record_failure(source, "placeholder data".to_string())
                        .await;
                    return NormalizedSnapshot::error(symbol.clone(), self.clock.now_millis());
                }
                Ok(fragment) => {
                    tracing::debug!(symbol = %symbol, source = %source, "Provider fetch succeeded");
                    self.record_success(source).await;
                    return self.enrich(symbol, fragment);
                }
                Err(e) => {
                    tracing::warn!(
                        symbol = %symbol,
                        source = %source,
                        error = %e,
                        "Provider fetch failed, trying next"
                    );
                    self.record_failure(source, e.to_string()).await;
                }
            }
        }

        tracing::error!(
            symbol = %symbol,
            providers = self.providers.len(),
            "All providers failed, returning error snapshot"
        );
        NormalizedSnapshot::error(symbol.clone(), self.clock.now_millis())
    }

    /// Attach synthetic depth and liquidity metrics to a provider fragment
    fn enrich(&self, symbol: &Symbol, fragment: SnapshotFragment) -> NormalizedSnapshot {
        let depth = self.synthesizer.generate(
            fragment.bid_price,
            fragment.ask_price,
            fragment.bid_size,
            fragment.ask_size,
        );

        let metrics = liquidity::compute(&MetricsInput {
            price: (fragment.bid_price + fragment.ask_price) / 2.0,
            bid_price: fragment.bid_price,
            ask_price: fragment.ask_price,
            bid_size: fragment.bid_size,
            ask_size: fragment.ask_size,
            volume_24h: fragment.volume_24h,
            market_cap: fragment.market_cap,
            depth: Some(&depth),
        });

        NormalizedSnapshot {
            symbol: symbol.clone(),
            timestamp: self.clock.now_millis(),
            bid_price: fragment.bid_price,
            ask_price: fragment.ask_price,
            bid_size: fragment.bid_size,
            ask_size: fragment.ask_size,
            volume_24h: fragment.volume_24h,
            source: fragment.source,
            market_cap: fragment.market_cap,
            depth: Some(depth),
            liquidity_score: Some(metrics.liquidity_score),
            market_depth_ratio: Some(metrics.market_depth_ratio),
            volume_to_mcap_ratio: metrics.volume_to_mcap_ratio,
            spread_percentage: Some(metrics.spread_percentage),
            slippage_impact: Some(metrics.slippage_impact),
        }
    }

    async fn record_success(&self, source: DataSource) {
        let mut health = self.health.write().await;
        let entry = health
            .entry(source)
            .or_insert_with(|| ProviderHealth::new(source));
        entry.successes += 1;
        entry.last_success_ts = Some(self.clock.now_millis());
    }

    async fn record_failure(&self, source: DataSource, error: String) {
        let mut health = self.health.write().await;
        let entry = health
            .entry(source)
            .or_insert_with(|| ProviderHealth::new(source));
        entry.failures += 1;
        entry.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::liquidity::DEPTH_LEVELS;
    use crate::oracle::sources::MockProviderAdapter;
    use crate::random::FixedRandom;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn btc() -> Symbol {
        Symbol::parse("BTC/USD").unwrap()
    }

    fn aggregator(providers: Vec<Arc<dyn ProviderAdapter>>) -> FallbackAggregator {
        FallbackAggregator::new(
            providers,
            OrderBookSynthesizer::new(Arc::new(FixedRandom(0.5))),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            Duration::from_secs(10),
        )
    }

    fn fragment(source: DataSource, price: f64, volume: f64) -> SnapshotFragment {
        SnapshotFragment {
            bid_price: price * 0.9998,
            ask_price: price * 1.0002,
            bid_size: volume * 0.0003,
            ask_size: volume * 0.0003,
            volume_24h: volume,
            market_cap: None,
            source,
        }
    }

    fn failing(source: DataSource) -> MockProviderAdapter {
        let mut mock = MockProviderAdapter::new();
        mock.expect_source().return_const(source);
        mock.expect_fetch().times(1).returning(move |_| {
            Err(ProviderError::Api {
                provider: source.as_str(),
                message: "unavailable".to_string(),
            })
        });
        mock
    }

    fn succeeding(source: DataSource, price: f64, volume: f64) -> MockProviderAdapter {
        let mut mock = MockProviderAdapter::new();
        mock.expect_source().return_const(source);
        mock.expect_fetch()
            .times(1)
            .returning(move |_| Ok(fragment(source, price, volume)));
        mock
    }

    fn untouched(source: DataSource) -> MockProviderAdapter {
        let mut mock = MockProviderAdapter::new();
        mock.expect_source().return_const(source);
        mock.expect_fetch().never();
        mock
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let agg = aggregator(vec![
            Arc::new(failing(DataSource::Coinbase)),
            Arc::new(succeeding(DataSource::Binance, 2000.0, 500.0)),
        ]);

        let snapshot = agg.fetch_all_data_for_symbol(&btc()).await;
        assert_eq!(snapshot.source, DataSource::Binance);
        assert!(snapshot.bid_price < 2000.0 && 2000.0 < snapshot.ask_price);
        assert_eq!(snapshot.timestamp, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let agg = aggregator(vec![
            Arc::new(failing(DataSource::Coinbase)),
            Arc::new(failing(DataSource::Binance)),
            Arc::new(succeeding(DataSource::Bybit, 100.0, 1000.0)),
            Arc::new(untouched(DataSource::CoinGecko)),
            Arc::new(untouched(DataSource::AlphaVantageDaily)),
        ]);

        let snapshot = agg.fetch_all_data_for_symbol(&btc()).await;
        assert_eq!(snapshot.source, DataSource::Bybit);
    }

    #[tokio::test]
    async fn all_failing_yields_zeroed_error_snapshot() {
        let agg = aggregator(vec![
            Arc::new(failing(DataSource::Coinbase)),
            Arc::new(failing(DataSource::Binance)),
        ]);

        let snapshot = agg.fetch_all_data_for_symbol(&btc()).await;
        assert!(snapshot.is_error());
        assert_eq!(snapshot.bid_price, 0.0);
        assert_eq!(snapshot.ask_price, 0.0);
        assert_eq!(snapshot.bid_size, 0.0);
        assert_eq!(snapshot.ask_size, 0.0);
        assert_eq!(snapshot.volume_24h, 0.0);
        assert_eq!(snapshot.liquidity_score, Some(0));
        assert_eq!(snapshot.market_depth_ratio, Some(1.0));
        assert_eq!(snapshot.spread_percentage, Some(0.0));
    }

    #[tokio::test]
    async fn placeholder_short_circuits_chain() {
        let mut daily = MockProviderAdapter::new();
        daily.expect_source().return_const(DataSource::AlphaVantageDaily);
        daily
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(SnapshotFragment::placeholder()));

        let agg = aggregator(vec![
            Arc::new(daily),
            Arc::new(untouched(DataSource::Coinbase)),
        ]);

        let snapshot = agg.fetch_all_data_for_symbol(&btc()).await;
        assert!(snapshot.is_error());
    }

    #[tokio::test]
    async fn enriches_with_depth_and_metrics() {
        let agg = aggregator(vec![Arc::new(succeeding(
            DataSource::Coinbase,
            50000.0,
            10_000.0,
        ))]);

        let snapshot = agg.fetch_all_data_for_symbol(&btc()).await;
        let depth = snapshot.depth.as_ref().unwrap();
        assert_eq!(depth.bids.len(), DEPTH_LEVELS);
        assert_eq!(depth.asks.len(), DEPTH_LEVELS);
        assert_eq!(snapshot.market_depth_ratio, Some(1.0));
        assert!(snapshot.liquidity_score.unwrap() <= 100);
        assert!(snapshot.spread_percentage.unwrap() > 0.0);
        assert!(snapshot.slippage_impact.is_some());
    }

    #[tokio::test]
    async fn tracks_provider_health() {
        let agg = aggregator(vec![
            Arc::new(failing(DataSource::Coinbase)),
            Arc::new(succeeding(DataSource::Binance, 10.0, 10.0)),
        ]);
        agg.fetch_all_data_for_symbol(&btc()).await;

        let health = agg.provider_health().await;
        assert_eq!(health[0].source, DataSource::Coinbase);
        assert_eq!(health[0].failures, 1);
        assert!(health[0].last_error.is_some());
        assert_eq!(health[1].successes, 1);
        assert_eq!(health[1].last_success_ts, Some(1_700_000_000_000));
    }

    /// Sleeps before answering and counts calls
    struct SlowAdapter {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderAdapter for SlowAdapter {
        fn source(&self) -> DataSource {
            DataSource::Coinbase
        }

        async fn fetch(&self, _symbol: &Symbol) -> Result<SnapshotFragment, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(fragment(DataSource::Coinbase, 100.0, 100.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out() {
        let slow = Arc::new(SlowAdapter {
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let agg = aggregator(vec![
            slow.clone() as Arc<dyn ProviderAdapter>,
            Arc::new(succeeding(DataSource::Binance, 10.0, 10.0)),
        ]);

        let snapshot = agg.fetch_all_data_for_symbol(&btc()).await;
        assert_eq!(snapshot.source, DataSource::Binance);

        let health = agg.provider_health().await;
        assert!(health[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("did not respond"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_run() {
        let slow = Arc::new(SlowAdapter {
            delay: Duration::from_millis(200),
            calls: AtomicUsize::new(0),
        });
        let agg = aggregator(vec![slow.clone() as Arc<dyn ProviderAdapter>]);
        let symbol = btc();

        let (a, b) = tokio::join!(
            agg.fetch_all_data_for_symbol(&symbol),
            agg.fetch_all_data_for_symbol(&symbol)
        );
        assert_eq!(a, b);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);

        agg.fetch_all_data_for_symbol(&symbol).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    }
}
