//! Liquidity Monitor Library
//!
//! Multi-provider quote aggregation with synthetic depth, liquidity scoring
//! and live fan-out to subscribers.

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod liquidity;
pub mod oracle;
pub mod poller;
pub mod random;
pub mod simulator;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;
