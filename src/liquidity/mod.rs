//! Liquidity analytics - synthetic depth and derived metrics

pub mod metrics;
mod orderbook;

pub use metrics::{compute, LiquidityMetrics, MetricsInput};
pub use orderbook::{OrderBookSynthesizer, DEPTH_LEVELS};
