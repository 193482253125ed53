//! Subscriber fan-out
//!
//! Serializes each update once and hands it to every live subscriber through a
//! tokio broadcast channel. Sending never waits on a subscriber; a slow one
//! lags and skips messages instead.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{NormalizedSnapshot, Symbol, Trade};

/// Envelope pushed to subscribers: `{"type": "...", "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WsMessage {
    Snapshot(NormalizedSnapshot),
    Trade(Trade),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub symbol: Symbol,
    pub message: String,
}

/// Channel for broadcasting updates to subscribers
#[derive(Debug, Clone)]
pub struct WebSocketBroadcaster {
    tx: broadcast::Sender<String>,
}

impl WebSocketBroadcaster {
    /// Create a new broadcaster with the given per-subscriber buffer
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to receive broadcast messages
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast a message to all connected subscribers
    pub fn broadcast(&self, msg: &WsMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => {
                // No receivers is fine
                let _ = self.tx.send(json);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize broadcast message"),
        }
    }

    pub fn broadcast_snapshot(&self, snapshot: NormalizedSnapshot) {
        self.broadcast(&WsMessage::Snapshot(snapshot));
    }

    pub fn broadcast_trade(&self, trade: Trade) {
        self.broadcast(&WsMessage::Trade(trade));
    }

    pub fn broadcast_error(&self, symbol: Symbol, message: impl Into<String>) {
        self.broadcast(&WsMessage::Error(ErrorPayload {
            symbol,
            message: message.into(),
        }));
    }
}

impl Default for WebSocketBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn btc() -> Symbol {
        Symbol::parse("BTC/USD").unwrap()
    }

    #[test]
    fn envelope_has_type_and_data() {
        let msg = WsMessage::Snapshot(NormalizedSnapshot::error(btc(), 42));
        let json: Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["data"]["symbol"], "BTC/USD");
        assert_eq!(json["data"]["source"], "error");
        assert_eq!(json["data"]["bidPrice"], 0.0);

        let err = WsMessage::Error(ErrorPayload {
            symbol: btc(),
            message: "boom".to_string(),
        });
        let json: Value = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "boom");
    }

    #[tokio::test]
    async fn every_subscriber_receives_updates() {
        let broadcaster = WebSocketBroadcaster::new(8);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.broadcast_error(btc(), "down");

        for rx in [&mut a, &mut b] {
            let raw = rx.recv().await.unwrap();
            let msg: WsMessage = serde_json::from_str(&raw).unwrap();
            assert!(matches!(msg, WsMessage::Error(ref p) if p.message == "down"));
        }
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let broadcaster = WebSocketBroadcaster::new(1);
        broadcaster.broadcast_error(btc(), "nobody listening");
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking() {
        let broadcaster = WebSocketBroadcaster::new(2);
        let mut slow = broadcaster.subscribe();

        for i in 0..5 {
            broadcaster.broadcast_error(btc(), format!("msg {}", i));
        }

        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        let raw = slow.recv().await.unwrap();
        assert!(raw.contains("msg 3"));
    }
}
