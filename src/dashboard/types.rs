//! Dashboard API Types
//!
//! Response DTOs and the API error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oracle::ProviderHealth;
use crate::poller::CycleReport;
use crate::types::{DataSource, DepthLevel, NormalizedSnapshot, SlippageImpact, Symbol};

// ─────────────────────────────────────────────────────────────────
// Comparison
// ─────────────────────────────────────────────────────────────────

/// One row of `/market/comparison`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub symbol: Symbol,
    pub price: f64,
    pub spread_percentage: f64,
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
    pub liquidity_score: u8,
    pub market_depth_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_to_mcap_ratio: Option<f64>,
    pub slippage_impact: SlippageImpact,
    pub source: DataSource,
    pub timestamp: i64,
}

impl From<&NormalizedSnapshot> for ComparisonEntry {
    fn from(snapshot: &NormalizedSnapshot) -> Self {
        Self {
            symbol: snapshot.symbol.clone(),
            price: snapshot.mid_price(),
            spread_percentage: snapshot.spread_percentage.unwrap_or(0.0),
            volume_24h: snapshot.volume_24h,
            liquidity_score: snapshot.liquidity_score.unwrap_or(0),
            market_depth_ratio: snapshot.market_depth_ratio.unwrap_or(1.0),
            volume_to_mcap_ratio: snapshot.volume_to_mcap_ratio,
            slippage_impact: snapshot.slippage_impact.unwrap_or_default(),
            source: snapshot.source,
            timestamp: snapshot.timestamp,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Depth
// ─────────────────────────────────────────────────────────────────

/// Depth level with running size total and notional value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRow {
    pub price: f64,
    pub size: f64,
    pub total: f64,
    pub value: f64,
}

/// `/market/depth/{symbol}` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthResponse {
    pub symbol: Symbol,
    pub timestamp: i64,
    pub bids: Vec<DepthRow>,
    pub asks: Vec<DepthRow>,
    pub bid_sum: f64,
    pub ask_sum: f64,
    pub total_depth: f64,
    /// `bid_sum / ask_sum`, 1 when the ask side is empty
    pub bid_ask_ratio: f64,
    /// `(bid value - ask value) / (bid value + ask value)`, in `[-1, 1]`
    pub value_imbalance: f64,
}

impl DepthResponse {
    pub fn build(symbol: Symbol, timestamp: i64, bids: &[DepthLevel], asks: &[DepthLevel]) -> Self {
        let bids = rows(bids);
        let asks = rows(asks);

        let bid_sum = bids.last().map_or(0.0, |r| r.total);
        let ask_sum = asks.last().map_or(0.0, |r| r.total);
        let bid_value: f64 = bids.iter().map(|r| r.value).sum();
        let ask_value: f64 = asks.iter().map(|r| r.value).sum();

        let bid_ask_ratio = if ask_sum > 0.0 { bid_sum / ask_sum } else { 1.0 };
        let total_value = bid_value + ask_value;
        let value_imbalance = if total_value > 0.0 {
            (bid_value - ask_value) / total_value
        } else {
            0.0
        };

        Self {
            symbol,
            timestamp,
            bids,
            asks,
            bid_sum,
            ask_sum,
            total_depth: bid_sum + ask_sum,
            bid_ask_ratio,
            value_imbalance,
        }
    }
}

fn rows(levels: &[DepthLevel]) -> Vec<DepthRow> {
    let mut total = 0.0;
    levels
        .iter()
        .map(|level| {
            total += level.size;
            DepthRow {
                price: level.price,
                size: level.size,
                total,
                value: level.price * level.size,
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: i64,
    pub snapshots: usize,
    /// Trades retained per symbol
    pub max_trades: usize,
    pub subscribers: usize,
    /// Symbols the in-process poll loop covers, 0 without one
    pub polled_symbols: usize,
    pub last_cycle: Option<CycleReport>,
    /// Provider tags in fallback order
    pub chain: Vec<DataSource>,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid symbol '{0}', expected BASE/QUOTE")]
    InvalidSymbol(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unknown symbol {0}")]
    UnknownSymbol(Symbol),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidSymbol(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownSymbol(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "API request failed");
        }
        let body = Json(ErrorBody {
            code: status.as_u16(),
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
