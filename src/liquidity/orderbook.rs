//! Order-Book Synthesizer
//!
//! Generates synthetic depth around a top-of-book quote. Providers only give a
//! reference price, so these levels feed visualization and slippage estimates,
//! never trading decisions.

use std::sync::Arc;

use crate::random::RandomSource;
use crate::types::{DepthLevel, OrderBookDepth};

/// Levels generated per side
pub const DEPTH_LEVELS: usize = 10;

/// Relative price step between consecutive levels
const LEVEL_STEP: f64 = 0.0005;
/// Minimum and span of the per-level price jitter
const JITTER_MIN: f64 = 0.00001;
const JITTER_SPAN: f64 = 0.0001;
/// Linear size decay per level
const SIZE_DECAY: f64 = 0.08;

pub struct OrderBookSynthesizer {
    rng: Arc<dyn RandomSource>,
    levels: usize,
}

impl OrderBookSynthesizer {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self::with_levels(rng, DEPTH_LEVELS)
    }

    pub fn with_levels(rng: Arc<dyn RandomSource>, levels: usize) -> Self {
        Self { rng, levels }
    }

    /// Build `levels` bids below `bid_price` and `levels` asks above `ask_price`.
    ///
    /// Prices move away from the top of book strictly monotonically; sizes
    /// decay with depth and are never negative. Each level carries the running
    /// size total in `total`.
    pub fn generate(
        &self,
        bid_price: f64,
        ask_price: f64,
        bid_size: f64,
        ask_size: f64,
    ) -> OrderBookDepth {
        OrderBookDepth {
            bids: self.side(bid_price, bid_size, -1.0),
            asks: self.side(ask_price, ask_size, 1.0),
        }
    }

    fn side(&self, top_price: f64, top_size: f64, direction: f64) -> Vec<DepthLevel> {
        let mut levels = Vec::with_capacity(self.levels);
        let mut running_total = 0.0;

        for i in 0..self.levels {
            let offset = i as f64 * LEVEL_STEP + JITTER_MIN + self.rng.next_f64() * JITTER_SPAN;
            let price = top_price + direction * offset * top_price;

            let decay = (1.0 - i as f64 * SIZE_DECAY).max(0.0);
            let dampening = 0.5 + self.rng.next_f64() * 0.5;
            let size = (top_size * decay * dampening).max(0.0);

            running_total += size;
            levels.push(DepthLevel {
                price,
                size,
                total: Some(running_total),
            });
        }

        levels
    }
}
