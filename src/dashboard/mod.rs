//! Dashboard Module
//!
//! HTTP/WebSocket API over the symbol store and the live update stream.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::broadcast::WebSocketBroadcaster;
use crate::clock::Clock;
use crate::oracle::FallbackAggregator;
use crate::poller::PollingBroadcaster;
use crate::store::SymbolStore;
use crate::types::Symbol;

/// Shared handles every request handler reads from
#[derive(Clone)]
pub struct AppState {
    /// Configured symbols, in configuration order
    pub symbols: Arc<Vec<Symbol>>,
    pub store: Arc<SymbolStore>,
    pub aggregator: Arc<FallbackAggregator>,
    pub broadcaster: WebSocketBroadcaster,
    /// Present when the poll loop runs in this process
    pub poller: Option<Arc<PollingBroadcaster>>,
    pub default_trades_limit: usize,
    pub clock: Arc<dyn Clock>,
    /// Process start, epoch millis
    pub started_at: i64,
}

/// Start the dashboard server and serve until `shutdown` resolves
pub async fn start_server<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    tracing::info!("🖥️ Dashboard API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("🖥️ Dashboard API stopped");
    Ok(())
}
