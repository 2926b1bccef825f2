pub mod client;
pub mod config;
pub mod rpc;
pub mod store;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use config::TodoConfig;
use rpc::event::EventBroadcaster;
use store::TodoStore;

/// Shared application state passed to every RPC handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<TodoConfig>,
    /// The authoritative todo collection. Clients hold derived copies.
    pub store: Arc<TodoStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Currently connected WebSocket sessions.
    pub connections: Arc<AtomicUsize>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: TodoConfig) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(TodoStore::new()),
            broadcaster: Arc::new(EventBroadcaster::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            started_at: std::time::Instant::now(),
        }
    }
}
