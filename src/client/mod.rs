// SPDX-License-Identifier: MIT
//! JSON-RPC WebSocket client for the todod server.
//!
//! One connection carries both request/response calls and server-pushed
//! notifications. A reader task routes replies to their pending call by
//! id and decodes notifications into [`ServerEvent`]s on a channel the
//! caller consumes.

pub mod state;
pub mod ui;

use crate::store::Todo;
use anyhow::{Context as _, Result};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

const CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ClientError>>>>>;

/// A server-pushed notification, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// One-time greeting on connect. Informational only.
    Welcome { message: String },
    /// Another session created this todo.
    Created(Todo),
    /// Another session changed this todo (update or mark-as-done).
    Updated(Todo),
    /// Another session deleted the todo with this id.
    Deleted { id: u64 },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Entity not found")]
    NotFound,
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("connection closed")]
    Closed,
}

/// Client half of the persistent bidirectional channel.
///
/// Cheap to share: calls lock the write half only for the send itself.
pub struct TodoClient {
    sink: tokio::sync::Mutex<WsSink>,
    pending: Pending,
    next_id: AtomicU64,
}

impl TodoClient {
    /// Connect and spawn the reader task.
    ///
    /// Returns the client plus the stream of server notifications. Dropping
    /// the receiver is fine — events are discarded when nobody listens.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ServerEvent>)> {
        let (ws, _) = tokio::time::timeout(CALL_TIMEOUT, connect_async(url))
            .await
            .context("timed out connecting to server")?
            .context("failed to connect to server WebSocket")?;
        let (sink, stream) = ws.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(64);

        tokio::spawn(read_loop(stream, pending.clone(), events_tx));

        Ok((
            Self {
                sink: tokio::sync::Mutex::new(sink),
                pending,
                next_id: AtomicU64::new(1),
            },
            events_rx,
        ))
    }

    /// Send one RPC call and await its reply.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        let send = {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(serde_json::to_string(&request)?))
                .await
        };
        if let Err(e) = send {
            self.pending.lock().unwrap().remove(&id);
            return Err(e).context("ws send failed");
        }

        let reply = tokio::time::timeout(CALL_TIMEOUT, rx)
            .await
            .map_err(|_| {
                self.pending.lock().unwrap().remove(&id);
                anyhow::anyhow!("timed out waiting for reply to {method}")
            })?
            .map_err(|_| ClientError::Closed)?;
        Ok(reply?)
    }

    // ── Typed wrappers ───────────────────────────────────────────────────────

    pub async fn list(&self) -> Result<Vec<Todo>> {
        let result = self.call("todo.list", json!({})).await?;
        serde_json::from_value(result["data"].clone()).context("todo.list: malformed data")
    }

    /// Create a todo and return its server-assigned id.
    pub async fn create(&self, text: &str, done: bool) -> Result<u64> {
        let result = self
            .call("todo.create", json!({ "text": text, "done": done }))
            .await?;
        result["data"].as_u64().context("todo.create: missing id")
    }

    pub async fn read(&self, id: u64) -> Result<Todo> {
        let result = self.call("todo.read", json!({ "id": id })).await?;
        serde_json::from_value(result["data"].clone()).context("todo.read: malformed data")
    }

    pub async fn update(&self, todo: &Todo) -> Result<()> {
        self.call(
            "todo.update",
            json!({ "id": todo.id, "text": todo.text, "done": todo.done }),
        )
        .await?;
        Ok(())
    }

    pub async fn mark_done(&self, id: u64) -> Result<()> {
        self.call("todo.markAsDone", json!({ "id": id })).await?;
        Ok(())
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        self.call("todo.delete", json!({ "id": id })).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.call("daemon.ping", json!({})).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<Value> {
        self.call("daemon.status", json!({})).await
    }
}

/// Route incoming frames: replies (id) to their pending call, notifications
/// (method) onto the event channel.
async fn read_loop(
    mut stream: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    pending: Pending,
    events_tx: mpsc::Sender<ServerEvent>,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let v: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(err = %e, "malformed frame from server");
                        continue;
                    }
                };
                if let Some(id) = v.get("id").and_then(Value::as_u64) {
                    let sender = pending.lock().unwrap().remove(&id);
                    if let Some(tx) = sender {
                        let _ = tx.send(decode_reply(&v));
                    }
                } else if let Some(method) = v.get("method").and_then(Value::as_str) {
                    match decode_event(method, &v["params"]) {
                        Some(event) => {
                            if events_tx.send(event).await.is_err() {
                                // Receiver gone — keep draining replies.
                                debug!("event receiver dropped");
                            }
                        }
                        None => debug!(method = %method, "unhandled notification"),
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(err = %e, "ws error");
                break;
            }
            _ => {}
        }
    }
    // Connection gone — fail every in-flight call.
    for (_, tx) in pending.lock().unwrap().drain() {
        let _ = tx.send(Err(ClientError::Closed));
    }
}

fn decode_reply(v: &Value) -> Result<Value, ClientError> {
    match v.get("error") {
        Some(err) => {
            let code = err["code"].as_i64().unwrap_or(0);
            let message = err["message"].as_str().unwrap_or_default().to_string();
            if code == i64::from(crate::rpc::ENTITY_NOT_FOUND) {
                Err(ClientError::NotFound)
            } else {
                Err(ClientError::Rpc { code, message })
            }
        }
        None => Ok(v["result"].clone()),
    }
}

fn decode_event(method: &str, params: &Value) -> Option<ServerEvent> {
    match method {
        "welcome" => Some(ServerEvent::Welcome {
            message: params["message"].as_str().unwrap_or_default().to_string(),
        }),
        "todo.created" => serde_json::from_value(params.clone())
            .ok()
            .map(ServerEvent::Created),
        "todo.updated" => serde_json::from_value(params.clone())
            .ok()
            .map(ServerEvent::Updated),
        "todo.deleted" => params["id"].as_u64().map(|id| ServerEvent::Deleted { id }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event_created() {
        let params = json!({ "id": 1001, "text": "milk", "done": false });
        let event = decode_event("todo.created", &params).unwrap();
        assert_eq!(
            event,
            ServerEvent::Created(Todo {
                id: 1001,
                text: "milk".into(),
                done: false
            })
        );
    }

    #[test]
    fn test_decode_event_deleted_and_unknown() {
        assert_eq!(
            decode_event("todo.deleted", &json!({ "id": 7 })),
            Some(ServerEvent::Deleted { id: 7 })
        );
        assert_eq!(decode_event("todo.exploded", &json!({})), None);
    }

    #[test]
    fn test_decode_reply_not_found() {
        let v = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": 404, "message": "Entity not found" } });
        assert!(matches!(decode_reply(&v), Err(ClientError::NotFound)));
    }
}
