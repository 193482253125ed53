//! Symbol Store - latest snapshot and recent trades per symbol
//!
//! Single owner of both maps. Every read and write takes the map lock for the
//! duration of one operation, so readers never see a half-written snapshot.

use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::types::{NormalizedSnapshot, Symbol, Trade};

/// Trades retained per symbol unless configured otherwise
pub const DEFAULT_MAX_TRADES: usize = 100;

#[derive(Debug)]
pub struct SymbolStore {
    snapshots: RwLock<HashMap<Symbol, NormalizedSnapshot>>,
    /// Newest first
    trades: RwLock<HashMap<Symbol, VecDeque<Trade>>>,
    max_trades: usize,
}

impl SymbolStore {
    pub fn new(max_trades: usize) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            trades: RwLock::new(HashMap::new()),
            max_trades: max_trades.max(1),
        }
    }

    pub async fn get_snapshot(&self, symbol: &Symbol) -> Option<NormalizedSnapshot> {
        self.snapshots.read().await.get(symbol).cloned()
    }

    /// Replace the latest snapshot for its symbol
    pub async fn save_snapshot(&self, snapshot: NormalizedSnapshot) {
        self.snapshots
            .write()
            .await
            .insert(snapshot.symbol.clone(), snapshot);
    }

    /// Latest snapshot of every stored symbol, ordered by symbol
    pub async fn all_snapshots(&self) -> Vec<NormalizedSnapshot> {
        let mut snapshots: Vec<_> = self.snapshots.read().await.values().cloned().collect();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshots
    }

    /// Up to `limit` most recent trades, newest first
    pub async fn get_recent_trades(&self, symbol: &Symbol, limit: usize) -> Vec<Trade> {
        let limit = limit.min(self.max_trades);
        self.trades
            .read()
            .await
            .get(symbol)
            .map(|trades| trades.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Prepend a trade, dropping the oldest beyond the retention cap
    pub async fn save_trade(&self, trade: Trade) {
        let mut trades = self.trades.write().await;
        let history = trades.entry(trade.symbol.clone()).or_default();
        history.push_front(trade);
        history.truncate(self.max_trades);
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub fn max_trades(&self) -> usize {
        self.max_trades
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRADES)
    }
}
