//! Polling Broadcaster
//!
//! Every interval: fetch all symbols, update the store, simulate a trade and
//! publish both to subscribers. A failing symbol never aborts the cycle or the
//! loop.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::broadcast::WebSocketBroadcaster;
use crate::clock::Clock;
use crate::oracle::FallbackAggregator;
use crate::simulator::TradeSource;
use crate::store::SymbolStore;
use crate::types::Symbol;

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: i64,
    pub symbols: usize,
    /// Symbols that ended with an `error` snapshot
    pub error_snapshots: usize,
    pub trades: usize,
    /// Symbol tasks that panicked
    pub failures: usize,
    pub duration_ms: u64,
}

/// What happened to one symbol in a cycle
struct SymbolOutcome {
    is_error: bool,
    traded: bool,
}

pub struct PollingBroadcaster {
    symbols: Vec<Symbol>,
    aggregator: Arc<FallbackAggregator>,
    store: Arc<SymbolStore>,
    trades: Arc<dyn TradeSource>,
    broadcaster: WebSocketBroadcaster,
    clock: Arc<dyn Clock>,
    interval: Duration,
    last_report: RwLock<Option<CycleReport>>,
}

impl PollingBroadcaster {
    pub fn new(
        symbols: Vec<Symbol>,
        aggregator: Arc<FallbackAggregator>,
        store: Arc<SymbolStore>,
        trades: Arc<dyn TradeSource>,
        broadcaster: WebSocketBroadcaster,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            symbols,
            aggregator,
            store,
            trades,
            broadcaster,
            clock,
            interval,
            last_report: RwLock::new(None),
        }
    }

    /// Run one cycle over every configured symbol.
    ///
    /// Symbols are processed concurrently, one task each. A panicking task is
    /// logged and reported to subscribers as an `error` message.
    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            started_at: self.clock.now_millis(),
            symbols: self.symbols.len(),
            ..CycleReport::default()
        };

        let tasks: Vec<(Symbol, JoinHandle<SymbolOutcome>)> = self
            .symbols
            .iter()
            .map(|symbol| {
                let this = Arc::clone(self);
                let owned = symbol.clone();
                let handle = tokio::spawn(async move { this.process_symbol(&owned).await });
                (symbol.clone(), handle)
            })
            .collect();

        for (symbol, handle) in tasks {
            match handle.await {
                Ok(outcome) => {
                    if outcome.is_error {
                        report.error_snapshots += 1;
                    }
                    if outcome.traded {
                        report.trades += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "Symbol task failed");
                    report.failures += 1;
                    self.broadcaster
                        .broadcast_error(symbol, format!("processing failed: {}", e));
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            symbols = report.symbols,
            errors = report.error_snapshots,
            trades = report.trades,
            failures = report.failures,
            duration_ms = report.duration_ms,
            "Poll cycle complete"
        );

        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Fetch -> store -> simulate trade -> publish for one symbol
    async fn process_symbol(&self, symbol: &Symbol) -> SymbolOutcome {
        let snapshot = self.aggregator.fetch_all_data_for_symbol(symbol).await;
        let is_error = snapshot.is_error();

        self.store.save_snapshot(snapshot.clone()).await;

        let mut traded = false;
        if snapshot.bid_price > 0.0 {
            let trade = self.trades.next_trade(symbol, snapshot.bid_price);
            self.store.save_trade(trade.clone()).await;
            self.broadcaster.broadcast_trade(trade);
            traded = true;
        }

        self.broadcaster.broadcast_snapshot(snapshot);

        SymbolOutcome { is_error, traded }
    }

    /// Start the repeating loop: run a cycle, wait `interval`, repeat until
    /// the handle is shut down.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            tracing::info!(
                symbols = self.symbols.len(),
                interval_secs = self.interval.as_secs_f64(),
                "Polling broadcaster started"
            );

            loop {
                self.run_cycle().await;

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Polling broadcaster shutdown requested");
                        break;
                    }
                }
            }
        });

        PollerHandle { shutdown_tx, task }
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

/// Handle to a running poll loop
pub struct PollerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop after the current cycle and wait for the loop to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Polling task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
