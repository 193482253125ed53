//! Liquidity Monitor
//!
//! Polls the provider chain for every configured symbol, keeps the latest
//! snapshots and trades in memory and serves them over HTTP and websocket.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use liquidity_monitor::broadcast::WebSocketBroadcaster;
use liquidity_monitor::clock::{Clock, SystemClock};
use liquidity_monitor::config::AppConfig;
use liquidity_monitor::liquidity::OrderBookSynthesizer;
use liquidity_monitor::oracle::{sources, FallbackAggregator, RequestCache};
use liquidity_monitor::poller::PollingBroadcaster;
use liquidity_monitor::random::{RandomSource, ThreadRngSource};
use liquidity_monitor::simulator::TradeSimulator;
use liquidity_monitor::store::SymbolStore;
use liquidity_monitor::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.logging.level, config.logging.json);

    tracing::info!("📈 Liquidity monitor starting");
    tracing::info!(config = %config, "Configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rng: Arc<dyn RandomSource> = Arc::new(ThreadRngSource);
    let fetch_timeout = Duration::from_millis(config.monitor.fetch_timeout_ms);

    let cache = Arc::new(RequestCache::new(fetch_timeout, clock.clone())?);
    let chain = sources::build_chain(&config.providers, cache, rng.clone())?;
    let aggregator = Arc::new(FallbackAggregator::new(
        chain,
        OrderBookSynthesizer::new(rng.clone()),
        clock.clone(),
        fetch_timeout,
    ));

    let symbols = config.symbols();
    let store = Arc::new(SymbolStore::new(config.monitor.max_trades));
    let broadcaster = WebSocketBroadcaster::new(config.monitor.broadcast_capacity);

    let poller = Arc::new(PollingBroadcaster::new(
        symbols.clone(),
        aggregator.clone(),
        store.clone(),
        Arc::new(TradeSimulator::new(rng, clock.clone())),
        broadcaster.clone(),
        clock.clone(),
        Duration::from_secs(config.monitor.poll_interval_secs),
    ));
    let poll_handle = poller.clone().spawn();

    #[cfg(feature = "dashboard")]
    {
        use liquidity_monitor::dashboard::{self, AppState};

        let state = AppState {
            symbols: Arc::new(symbols),
            store,
            aggregator,
            broadcaster,
            poller: Some(poller),
            default_trades_limit: config.monitor.default_trades_limit,
            started_at: clock.now_millis(),
            clock,
        };
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid server address {}:{}",
                    config.server.host, config.server.port
                )
            })?;

        if let Err(e) = dashboard::start_server(state, addr, shutdown_signal()).await {
            tracing::error!(error = %e, "Dashboard server failed");
        }
    }

    #[cfg(not(feature = "dashboard"))]
    {
        let _ = (store, aggregator, broadcaster, poller, clock, symbols);
        shutdown_signal().await;
    }

    if poll_handle.is_finished() {
        tracing::warn!("Polling loop exited before shutdown was requested");
    }
    poll_handle.shutdown().await;
    tracing::info!("👋 Liquidity monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("🛑 Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
