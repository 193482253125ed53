//! Dashboard HTTP API
//!
//! REST endpoints and the websocket subscription channel.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use super::AppState;
use crate::types::{NormalizedSnapshot, Symbol, Trade};

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/symbols", get(get_symbols))
        .route("/liquidity/:symbol", get(get_liquidity))
        .route("/trades/:symbol", get(get_trades))
        .route("/market/comparison", get(get_comparison))
        .route("/market/depth/:symbol", get(get_depth))
        .route("/health", get(get_health))
        // WebSocket
        .route("/ws", get(websocket_handler))
        .with_state(state)
        // CORS for frontend
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}

/// Parse a path symbol and check it is configured
fn resolve_symbol(state: &AppState, raw: &str) -> ApiResult<Symbol> {
    let symbol = Symbol::parse(raw).ok_or_else(|| ApiError::InvalidSymbol(raw.to_string()))?;
    if !state.symbols.contains(&symbol) {
        return Err(ApiError::UnknownSymbol(symbol));
    }
    Ok(symbol)
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /symbols - Configured symbols in order
async fn get_symbols(State(state): State<AppState>) -> Json<Vec<Symbol>> {
    Json(state.symbols.as_ref().clone())
}

/// GET /liquidity/:symbol - Latest snapshot, fetched on demand when absent
async fn get_liquidity(
    Path(raw): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<NormalizedSnapshot>> {
    let symbol = resolve_symbol(&state, &raw)?;

    if let Some(snapshot) = state.store.get_snapshot(&symbol).await {
        return Ok(Json(snapshot));
    }

    tracing::debug!(symbol = %symbol, "No cached snapshot, fetching on demand");
    let snapshot = state.aggregator.fetch_all_data_for_symbol(&symbol).await;
    state.store.save_snapshot(snapshot).await;

    state
        .store
        .get_snapshot(&symbol)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Internal(format!("Snapshot for {} missing after save", symbol)))
}

/// GET /trades/:symbol?limit=N - Most recent trades, newest first
async fn get_trades(
    Path(raw): Path<String>,
    query: Result<Query<TradesQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Trade>>> {
    let symbol = resolve_symbol(&state, &raw)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = query.limit.unwrap_or(state.default_trades_limit);
    Ok(Json(state.store.get_recent_trades(&symbol, limit).await))
}

/// GET /market/comparison - Non-error snapshots ranked by liquidity score
async fn get_comparison(State(state): State<AppState>) -> Json<Vec<ComparisonEntry>> {
    let snapshots = state.store.all_snapshots().await;

    let mut entries: Vec<ComparisonEntry> = snapshots
        .iter()
        .filter(|s| !s.is_error())
        .map(ComparisonEntry::from)
        .collect();
    entries.sort_by(|a, b| b.liquidity_score.cmp(&a.liquidity_score));

    Json(entries)
}

/// GET /market/depth/:symbol - Depth with running totals and imbalance
async fn get_depth(
    Path(raw): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<DepthResponse>> {
    let symbol = resolve_symbol(&state, &raw)?;

    let snapshot = state
        .store
        .get_snapshot(&symbol)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No data for {}", symbol)))?;

    let depth = snapshot
        .depth
        .as_ref()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::NotFound(format!("No depth data for {}", symbol)))?;

    Ok(Json(DepthResponse::build(
        symbol,
        snapshot.timestamp,
        &depth.bids,
        &depth.asks,
    )))
}

/// GET /health - Uptime, last cycle and provider health
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (polled_symbols, last_cycle) = match &state.poller {
        Some(poller) => (poller.symbols().len(), poller.last_report().await),
        None => (0, None),
    };

    Json(HealthResponse {
        status: "ok",
        uptime_ms: state.clock.now_millis() - state.started_at,
        snapshots: state.store.snapshot_count().await,
        max_trades: state.store.max_trades(),
        subscribers: state.broadcaster.subscriber_count(),
        polled_symbols,
        last_cycle,
        chain: state.aggregator.chain(),
        providers: state.aggregator.provider_health().await,
    })
}

// ─────────────────────────────────────────────────────────────────
// WebSocket Handler
// ─────────────────────────────────────────────────────────────────

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::broadcast::WsMessage;
use crate::store::SymbolStore;

/// One serialized `snapshot` message per stored symbol
pub(crate) async fn catch_up_messages(store: &SymbolStore) -> Vec<String> {
    store
        .all_snapshots()
        .await
        .into_iter()
        .filter_map(|snapshot| {
            let symbol = snapshot.symbol.clone();
            match serde_json::to_string(&WsMessage::Snapshot(snapshot)) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Failed to serialize catch-up snapshot");
                    None
                }
            }
        })
        .collect()
}

/// Join the live stream, then read the catch-up burst.
///
/// Subscribing first means an update published while the burst is being read
/// is still delivered afterwards, at worst as a duplicate of the burst.
pub(crate) async fn open_subscription(state: &AppState) -> (broadcast::Receiver<String>, Vec<String>) {
    let rx = state.broadcaster.subscribe();
    let burst = catch_up_messages(&state.store).await;
    (rx, burst)
}

/// WebSocket upgrade handler
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Outgoing message type for WebSocket
enum OutgoingMessage {
    Text(String),
    Pong(Vec<u8>),
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    use futures_util::{SinkExt, StreamExt};

    tracing::info!("🖥️ New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();

    let (mut rx, burst) = open_subscription(&state).await;

    for json in burst {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    // Channel for outgoing messages
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutgoingMessage>(32);

    // Spawn task to send outgoing messages
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                OutgoingMessage::Text(text) => sender.send(Message::Text(text)).await,
                OutgoingMessage::Pong(data) => sender.send(Message::Pong(data)).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages (ping/pong) and broadcast updates
    loop {
        tokio::select! {
            // Broadcast updates
            broadcast_msg = rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        if out_tx.send(OutgoingMessage::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "WebSocket subscriber lagging, skipped messages");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            // Incoming messages
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        // Respond with pong via the outgoing channel
                        if out_tx.send(OutgoingMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received WebSocket message: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    tracing::info!("🖥️ WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::WebSocketBroadcaster;
    use crate::clock::{Clock, ManualClock};
    use crate::liquidity::OrderBookSynthesizer;
    use crate::oracle::sources::{MockProviderAdapter, ProviderAdapter};
    use crate::oracle::{FallbackAggregator, SnapshotFragment};
    use crate::random::FixedRandom;
    use crate::store::SymbolStore;
    use crate::types::{DataSource, DepthLevel, OrderBookDepth};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn sym(raw: &str) -> Symbol {
        Symbol::parse(raw).unwrap()
    }

    fn state_with(adapter: MockProviderAdapter) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(10_000));
        let aggregator = FallbackAggregator::new(
            vec![Arc::new(adapter) as Arc<dyn ProviderAdapter>],
            OrderBookSynthesizer::new(Arc::new(FixedRandom(0.5))),
            clock.clone(),
            Duration::from_secs(5),
        );

        AppState {
            symbols: Arc::new(vec![sym("BTC/USD"), sym("ETH/USD")]),
            store: Arc::new(SymbolStore::new(100)),
            aggregator: Arc::new(aggregator),
            broadcaster: WebSocketBroadcaster::new(16),
            poller: None,
            default_trades_limit: 50,
            clock,
            started_at: 4_000,
        }
    }

    fn idle_state() -> AppState {
        let mut adapter = MockProviderAdapter::new();
        adapter.expect_source().return_const(DataSource::Coinbase);
        adapter.expect_fetch().never();
        state_with(adapter)
    }

    fn scored(symbol: &str, score: u8, source: DataSource) -> NormalizedSnapshot {
        let mut snapshot = NormalizedSnapshot::error(sym(symbol), 1);
        snapshot.source = source;
        snapshot.bid_price = 10.0;
        snapshot.ask_price = 10.2;
        snapshot.liquidity_score = Some(score);
        snapshot
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lists_configured_symbols() {
        let (status, body) = get(idle_state(), "/symbols").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["BTC/USD", "ETH/USD"]));
    }

    #[tokio::test]
    async fn liquidity_fetches_on_demand_when_absent() {
        let mut adapter = MockProviderAdapter::new();
        adapter.expect_source().return_const(DataSource::Coinbase);
        adapter.expect_fetch().times(1).returning(|_| {
            Ok(SnapshotFragment {
                bid_price: 49_995.0,
                ask_price: 50_005.0,
                bid_size: 2.0,
                ask_size: 2.0,
                volume_24h: 20_000.0,
                market_cap: None,
                source: DataSource::Coinbase,
            })
        });
        let state = state_with(adapter);
        let store = state.store.clone();

        let (status, body) = get(state.clone(), "/liquidity/BTC-USD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "coinbase");
        assert_eq!(body["symbol"], "BTC/USD");
        assert_eq!(body["depthLevels"]["bids"].as_array().unwrap().len(), 10);
        assert!(store.get_snapshot(&sym("BTC/USD")).await.is_some());

        // second request is served from the store
        let (status, _) = get(state, "/liquidity/BTC%2FUSD").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_unknown_and_malformed_symbols() {
        let (status, body) = get(idle_state(), "/liquidity/DOGE-USD").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);

        let (status, _) = get(idle_state(), "/trades/BTCUSD").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn trades_respect_limit() {
        let state = idle_state();
        for n in 0..5 {
            state
                .store
                .save_trade(Trade {
                    id: format!("t-{}", n),
                    symbol: sym("ETH/USD"),
                    timestamp: n,
                    price: 2000.0,
                    size: 1.0,
                    is_buyer_maker: false,
                })
                .await;
        }

        let (status, body) = get(state.clone(), "/trades/eth-usd?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["t-4", "t-3"]);

        let (_, body) = get(state, "/trades/ETH_USD").await;
        assert_eq!(body.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn malformed_limit_is_json_bad_request() {
        let (status, body) = get(idle_state(), "/trades/BTC-USD?limit=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert!(!body["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn comparison_ranks_and_skips_errors() {
        let state = idle_state();
        state.store.save_snapshot(scored("BTC/USD", 70, DataSource::Binance)).await;
        state.store.save_snapshot(scored("ETH/USD", 90, DataSource::Coinbase)).await;
        state
            .store
            .save_snapshot(NormalizedSnapshot::error(sym("SOL/USD"), 1))
            .await;

        let (status, body) = get(state, "/market/comparison").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["symbol"], "ETH/USD");
        assert_eq!(rows[0]["liquidityScore"], 90);
        assert_eq!(rows[1]["symbol"], "BTC/USD");
        assert!((rows[1]["price"].as_f64().unwrap() - 10.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn depth_requires_depth_data() {
        let state = idle_state();
        let (status, _) = get(state.clone(), "/market/depth/BTC-USD").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state
            .store
            .save_snapshot(NormalizedSnapshot::error(sym("BTC/USD"), 1))
            .await;
        let (status, _) = get(state.clone(), "/market/depth/BTC-USD").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut snapshot = scored("BTC/USD", 50, DataSource::Coinbase);
        snapshot.depth = Some(OrderBookDepth {
            bids: vec![DepthLevel::new(9.9, 1.0), DepthLevel::new(9.8, 2.0)],
            asks: vec![DepthLevel::new(10.3, 1.5)],
        });
        state.store.save_snapshot(snapshot).await;

        let (status, body) = get(state, "/market/depth/BTC-USD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bidSum"], 3.0);
        assert_eq!(body["askSum"], 1.5);
        assert_eq!(body["totalDepth"], 4.5);
        assert_eq!(body["bidAskRatio"], 2.0);
        assert_eq!(body["bids"][1]["total"], 3.0);
    }

    #[tokio::test]
    async fn health_reports_uptime_and_providers() {
        let (status, body) = get(idle_state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["uptimeMs"], 6_000);
        assert_eq!(body["providers"][0]["source"], "coinbase");
        assert_eq!(body["chain"], serde_json::json!(["coinbase"]));
        assert_eq!(body["maxTrades"], 100);
        assert_eq!(body["polledSymbols"], 0);
        assert!(body["lastCycle"].is_null());
    }

    #[tokio::test]
    async fn catch_up_has_one_snapshot_per_stored_symbol() {
        let state = idle_state();
        state.store.save_snapshot(scored("ETH/USD", 80, DataSource::Binance)).await;
        state
            .store
            .save_snapshot(NormalizedSnapshot::error(sym("BTC/USD"), 1))
            .await;

        let burst = catch_up_messages(&state.store).await;
        let messages: Vec<Value> = burst
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect();

        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m["type"] == "snapshot"));
        assert_eq!(messages[0]["data"]["symbol"], "BTC/USD");
        assert_eq!(messages[0]["data"]["source"], "error");
        assert_eq!(messages[1]["data"]["symbol"], "ETH/USD");
        assert_eq!(messages[1]["data"]["source"], "binance");
    }

    #[tokio::test]
    async fn empty_store_has_empty_catch_up() {
        assert!(catch_up_messages(&SymbolStore::new(10)).await.is_empty());
    }

    #[tokio::test]
    async fn subscription_is_live_before_catch_up_is_read() {
        let state = idle_state();
        state.store.save_snapshot(scored("BTC/USD", 70, DataSource::Coinbase)).await;

        let (mut rx, burst) = open_subscription(&state).await;
        assert_eq!(burst.len(), 1);
        assert_eq!(state.broadcaster.subscriber_count(), 1);

        // published after the burst was read, before the socket forwards it
        state
            .broadcaster
            .broadcast_snapshot(scored("ETH/USD", 60, DataSource::Bybit));

        let live: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(live["type"], "snapshot");
        assert_eq!(live["data"]["symbol"], "ETH/USD");
    }
}
