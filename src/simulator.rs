//! Trade Simulator
//!
//! Synthesizes one plausible trade print from the current price. Stands in for
//! a real trade feed, which would implement [`TradeSource`] instead.

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::random::RandomSource;
use crate::types::{Symbol, Trade};

/// Maximum relative price jitter (0.1%)
const PRICE_JITTER: f64 = 0.001;
/// Smallest size a simulated trade can have
const MIN_TRADE_SIZE: f64 = 0.01;

/// Anything that can produce the next trade for a symbol at a given price
pub trait TradeSource: Send + Sync {
    fn next_trade(&self, symbol: &Symbol, current_price: f64) -> Trade;
}

pub struct TradeSimulator {
    rng: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
}

impl TradeSimulator {
    pub fn new(rng: Arc<dyn RandomSource>, clock: Arc<dyn Clock>) -> Self {
        Self { rng, clock }
    }

    /// Random side, price within ±0.1% of `current_price`,
    /// size `max(0.01, U(0,2) + U(-1,1))`, stamped now.
    pub fn simulate(&self, symbol: &Symbol, current_price: f64) -> Trade {
        let is_buyer_maker = self.rng.coin();
        let price = current_price * (1.0 + self.rng.uniform(-PRICE_JITTER, PRICE_JITTER));
        let size = (self.rng.uniform(0.0, 2.0) + self.rng.uniform(-1.0, 1.0)).max(MIN_TRADE_SIZE);

        Trade {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.clone(),
            timestamp: self.clock.now_millis(),
            price,
            size,
            is_buyer_maker,
        }
    }
}

impl TradeSource for TradeSimulator {
    fn next_trade(&self, symbol: &Symbol, current_price: f64) -> Trade {
        self.simulate(symbol, current_price)
    }
}
