use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A serialized notification plus the session that caused it.
///
/// Connection loops drop events whose `origin` matches their own session
/// id — the sender learns the outcome from its own RPC reply instead.
#[derive(Clone)]
pub struct BroadcastEvent {
    pub origin: Option<Uuid>,
    pub payload: String,
}

/// Broadcasts JSON-RPC notification strings to connected WebSocket clients.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send a JSON-RPC notification to every connected client.
    pub fn broadcast(&self, method: &str, params: Value) {
        self.send(None, method, params);
    }

    /// Send a JSON-RPC notification to every connected client except the
    /// originating session.
    pub fn broadcast_from(&self, origin: Uuid, method: &str, params: Value) {
        self.send(Some(origin), method, params);
    }

    fn send(&self, origin: Option<Uuid>, method: &str, params: Value) {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        // Ignore errors — no subscribers is fine
        let _ = self.tx.send(BroadcastEvent {
            origin,
            payload: serde_json::to_string(&notification).unwrap_or_default(),
        });
    }

    /// Subscribe to all broadcast events. Callers filter by origin.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}
