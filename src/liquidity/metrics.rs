//! Liquidity Metrics Engine
//!
//! Spread, depth balance, volume/market-cap ratio, slippage at three order
//! tiers and the composite 0-100 liquidity score.

use crate::types::{OrderBookDepth, SlippageImpact};

/// Order sizes for the slippage tiers, as a fraction of 24h volume
const SMALL_ORDER: f64 = 0.001;
const MEDIUM_ORDER: f64 = 0.005;
const LARGE_ORDER: f64 = 0.01;

/// Spread multiples used when no depth is available
const SMALL_SPREAD_MULT: f64 = 0.5;
const MEDIUM_SPREAD_MULT: f64 = 1.5;
const LARGE_SPREAD_MULT: f64 = 3.0;

/// Score weights
const SPREAD_WEIGHT: f64 = 40.0;
const VOLUME_WEIGHT: f64 = 40.0;
const DEPTH_WEIGHT: f64 = 20.0;

#[derive(Debug, Clone, Copy)]
pub struct MetricsInput<'a> {
    /// Reference price for the spread, usually the mid
    pub price: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub volume_24h: f64,
    pub market_cap: Option<f64>,
    pub depth: Option<&'a OrderBookDepth>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityMetrics {
    pub spread_percentage: f64,
    pub market_depth_ratio: f64,
    pub volume_to_mcap_ratio: Option<f64>,
    pub slippage_impact: SlippageImpact,
    pub liquidity_score: u8,
}

pub fn compute(input: &MetricsInput<'_>) -> LiquidityMetrics {
    let spread_percentage = spread_percentage(input.price, input.bid_price, input.ask_price);
    let market_depth_ratio = depth_ratio(input.bid_size, input.ask_size);
    let market_cap = input.market_cap.filter(|cap| *cap > 0.0);
    let volume_to_mcap_ratio = market_cap.map(|cap| input.volume_24h / cap * 100.0);

    let slippage_impact = match input.depth.filter(|d| !d.asks.is_empty()) {
        Some(depth) => SlippageImpact {
            small: walk_asks(depth, input.ask_price, input.volume_24h * SMALL_ORDER),
            medium: walk_asks(depth, input.ask_price, input.volume_24h * MEDIUM_ORDER),
            large: walk_asks(depth, input.ask_price, input.volume_24h * LARGE_ORDER),
        },
        None => SlippageImpact {
            small: spread_percentage * SMALL_SPREAD_MULT,
            medium: spread_percentage * MEDIUM_SPREAD_MULT,
            large: spread_percentage * LARGE_SPREAD_MULT,
        },
    };

    let liquidity_score = liquidity_score(
        spread_percentage,
        input.volume_24h,
        market_cap,
        market_depth_ratio,
    );

    LiquidityMetrics {
        spread_percentage,
        market_depth_ratio,
        volume_to_mcap_ratio,
        slippage_impact,
        liquidity_score,
    }
}

/// `(ask - bid) / price * 100`, 0 for non-positive prices
pub fn spread_percentage(price: f64, bid_price: f64, ask_price: f64) -> f64 {
    if price > 0.0 {
        (ask_price - bid_price) / price * 100.0
    } else {
        0.0
    }
}

/// `bid_size / ask_size`, exactly 1 when the ask side is empty
pub fn depth_ratio(bid_size: f64, ask_size: f64) -> f64 {
    if ask_size > 0.0 {
        bid_size / ask_size
    } else {
        1.0
    }
}

/// Walk the asks from the top, pricing any unfilled remainder at the last
/// level, and return the average-fill slippage against `ask_price` in percent.
fn walk_asks(depth: &OrderBookDepth, ask_price: f64, order_size: f64) -> f64 {
    let last = match depth.asks.last() {
        Some(level) => level,
        None => return 0.0,
    };
    if order_size <= 0.0 || ask_price <= 0.0 {
        return 0.0;
    }

    let mut remaining = order_size;
    let mut cost = 0.0;

    for level in &depth.asks {
        if remaining <= 0.0 {
            break;
        }
        let filled = remaining.min(level.size.max(0.0));
        cost += filled * level.price;
        remaining -= filled;
    }

    if remaining > 0.0 {
        cost += remaining * last.price;
    }

    let average_fill = cost / order_size;
    (average_fill / ask_price - 1.0) * 100.0
}

/// Composite score: spread tightness (40) + volume adequacy (40) + depth
/// balance (20), rounded and clamped to `[0, 100]`.
///
/// Without a market cap the volume component is `4 * log10(volume)`, which is
/// negative for volumes below 1; the final clamp absorbs that.
pub fn liquidity_score(
    spread_percentage: f64,
    volume_24h: f64,
    market_cap: Option<f64>,
    market_depth_ratio: f64,
) -> u8 {
    let spread_component = (SPREAD_WEIGHT - spread_percentage * 100.0).max(0.0);

    let volume_component = match market_cap {
        Some(cap) if cap > 0.0 => (volume_24h / cap * 40_000.0).min(VOLUME_WEIGHT),
        _ if volume_24h > 0.0 => (volume_24h.log10() * 4.0).min(VOLUME_WEIGHT),
        _ => 0.0,
    };

    let depth_component = DEPTH_WEIGHT - (1.0 - market_depth_ratio).abs() * 10.0;

    let total = spread_component + volume_component + depth_component;
    if !total.is_finite() {
        return 0;
    }

    total.round().clamp(0.0, 100.0) as u8
}
