use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
/// Integration tests for the todod JSON-RPC server.
/// Spins up a real server on a free port and tests all RPC methods,
/// including the broadcast fan-out between sessions.
use std::io::{Read as _, Write as _};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use todod::config::TodoConfig;
use todod::AppContext;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a server on a random port and return the WebSocket URL.
async fn start_test_server() -> (String, Arc<AppContext>) {
    let port = get_free_port();
    // Point at a nonexistent config file so a stray todod.toml in the
    // working directory can't leak into tests.
    let config = TodoConfig::new(
        Some(port),
        None,
        Some("warn".to_string()),
        Some("/nonexistent/todod.toml".into()),
    );
    let ctx = Arc::new(AppContext::new(config));

    let ctx_server = ctx.clone();
    tokio::spawn(async move {
        todod::rpc::run(ctx_server).await.ok();
    });

    // Give server a moment to bind
    tokio::time::sleep(Duration::from_millis(50)).await;

    let url = format!("ws://127.0.0.1:{port}");
    (url, ctx)
}

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn connect(url: &str) -> Ws {
    connect_async(url).await.expect("ws connect failed").0
}

/// Read frames until the `welcome` notification arrives.
async fn expect_welcome(ws: &mut Ws) -> Value {
    next_notification(ws).await
}

/// Send one request on an open connection and read frames until its reply.
async fn rpc(ws: &mut Ws, id: u64, method: &str, params: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    ws.send(Message::Text(serde_json::to_string(&request).unwrap()))
        .await
        .unwrap();

    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("id").and_then(Value::as_u64) == Some(id) {
                return v;
            }
        }
    }
}

/// One-shot helper: fresh connection, single call.
async fn ws_rpc(url: &str, method: &str, params: Value) -> Value {
    let mut ws = connect(url).await;
    rpc(&mut ws, 1, method, params).await
}

/// Read frames until the next notification (a frame with a method, no id).
async fn next_notification(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for notification")
            .expect("ws stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("method").is_some() {
                return v;
            }
        }
    }
}

/// Assert that no frame arrives within 200 ms.
async fn assert_silent(ws: &mut Ws) {
    let res = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(res.is_err(), "expected no frame, got: {res:?}");
}

#[tokio::test]
async fn test_daemon_ping() {
    let (url, _ctx) = start_test_server().await;
    let resp = ws_rpc(&url, "daemon.ping", json!({})).await;
    assert_eq!(resp["result"]["pong"], true);
}

#[tokio::test]
async fn test_daemon_status() {
    let (url, _ctx) = start_test_server().await;
    let resp = ws_rpc(&url, "daemon.status", json!({})).await;
    let result = &resp["result"];
    assert!(result["version"].is_string());
    assert!(result["uptime"].is_number());
    assert_eq!(result["todos"], 0);
    assert_eq!(result["activeSessions"], 1);
}

#[tokio::test]
async fn test_method_not_found() {
    let (url, _ctx) = start_test_server().await;
    let resp = ws_rpc(&url, "no.such.method", json!({})).await;
    assert_eq!(resp["error"]["code"], -32601);
}

#[tokio::test]
async fn test_welcome_on_connect() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;
    let welcome = expect_welcome(&mut ws).await;
    assert_eq!(welcome["method"], "welcome");
    assert!(welcome["params"]["message"].is_string());
    // One-time only — nothing else arrives unprompted.
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn test_create_assigns_fresh_ids_and_defaults_done() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;

    let resp = rpc(&mut ws, 1, "todo.create", json!({ "text": "milk" })).await;
    assert_eq!(resp["result"]["data"], 1001);

    let resp = rpc(&mut ws, 2, "todo.create", json!({ "text": "bread" })).await;
    assert_eq!(resp["result"]["data"], 1002);

    let read = rpc(&mut ws, 3, "todo.read", json!({ "id": 1001 })).await;
    assert_eq!(
        read["result"]["data"],
        json!({ "id": 1001, "text": "milk", "done": false })
    );
}

#[tokio::test]
async fn test_read_not_found() {
    let (url, _ctx) = start_test_server().await;
    let resp = ws_rpc(&url, "todo.read", json!({ "id": 9999 })).await;
    assert_eq!(resp["error"]["code"], 404);
    assert_eq!(resp["error"]["message"], "Entity not found");
}

#[tokio::test]
async fn test_update_changes_only_target() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;

    let a = rpc(&mut ws, 1, "todo.create", json!({ "text": "a" })).await["result"]["data"]
        .as_u64()
        .unwrap();
    let b = rpc(&mut ws, 2, "todo.create", json!({ "text": "b" })).await["result"]["data"]
        .as_u64()
        .unwrap();

    let resp = rpc(
        &mut ws,
        3,
        "todo.update",
        json!({ "id": a, "text": "a2", "done": true }),
    )
    .await;
    assert!(resp.get("error").is_none(), "update error: {resp:?}");
    assert_eq!(resp["result"], json!({}));

    let list = rpc(&mut ws, 4, "todo.list", json!({})).await;
    assert_eq!(
        list["result"]["data"],
        json!([
            { "id": a, "text": "a2", "done": true },
            { "id": b, "text": "b", "done": false }
        ])
    );
}

#[tokio::test]
async fn test_update_not_found() {
    let (url, _ctx) = start_test_server().await;
    let resp = ws_rpc(
        &url,
        "todo.update",
        json!({ "id": 9999, "text": "x", "done": false }),
    )
    .await;
    assert_eq!(resp["error"]["code"], 404);
}

#[tokio::test]
async fn test_mark_as_done_idempotent() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;

    let id = rpc(&mut ws, 1, "todo.create", json!({ "text": "milk" })).await["result"]["data"]
        .as_u64()
        .unwrap();

    let first = rpc(&mut ws, 2, "todo.markAsDone", json!({ "id": id })).await;
    assert!(first.get("error").is_none());
    let second = rpc(&mut ws, 3, "todo.markAsDone", json!({ "id": id })).await;
    assert!(second.get("error").is_none());

    let read = rpc(&mut ws, 4, "todo.read", json!({ "id": id })).await;
    assert_eq!(read["result"]["data"]["done"], true);
}

#[tokio::test]
async fn test_delete_then_delete_again() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;

    let a = rpc(&mut ws, 1, "todo.create", json!({ "text": "a" })).await["result"]["data"]
        .as_u64()
        .unwrap();
    let b = rpc(&mut ws, 2, "todo.create", json!({ "text": "b" })).await["result"]["data"]
        .as_u64()
        .unwrap();
    let c = rpc(&mut ws, 3, "todo.create", json!({ "text": "c" })).await["result"]["data"]
        .as_u64()
        .unwrap();

    let resp = rpc(&mut ws, 4, "todo.delete", json!({ "id": b })).await;
    assert!(resp.get("error").is_none());

    // Order of the survivors is unchanged
    let list = rpc(&mut ws, 5, "todo.list", json!({})).await;
    let ids: Vec<u64> = list["result"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![a, c]);

    let again = rpc(&mut ws, 6, "todo.delete", json!({ "id": b })).await;
    assert_eq!(again["error"]["code"], 404);
}

#[tokio::test]
async fn test_broadcast_excludes_sender() {
    let (url, _ctx) = start_test_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    expect_welcome(&mut a).await;
    expect_welcome(&mut b).await;

    let resp = rpc(&mut a, 1, "todo.create", json!({ "text": "milk" })).await;
    let id = resp["result"]["data"].as_u64().unwrap();

    // B hears about it...
    let event = next_notification(&mut b).await;
    assert_eq!(event["method"], "todo.created");
    assert_eq!(
        event["params"],
        json!({ "id": id, "text": "milk", "done": false })
    );

    // ...A does not — it already has the reply.
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_failed_mutation_broadcasts_nothing() {
    let (url, _ctx) = start_test_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    expect_welcome(&mut a).await;
    expect_welcome(&mut b).await;

    let resp = rpc(&mut a, 1, "todo.delete", json!({ "id": 9999 })).await;
    assert_eq!(resp["error"]["code"], 404);
    assert_silent(&mut b).await;
}

/// Two clients running the full scenario: create on A is observed by B,
/// delete on B is observed by A, and both end with an empty list.
#[tokio::test]
async fn test_end_to_end_two_clients() {
    let (url, _ctx) = start_test_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    expect_welcome(&mut a).await;
    expect_welcome(&mut b).await;

    // A creates "milk" and gets the first id.
    let resp = rpc(&mut a, 1, "todo.create", json!({ "text": "milk", "done": false })).await;
    assert_eq!(resp["result"]["data"], 1001);

    // B receives the created broadcast.
    let event = next_notification(&mut b).await;
    assert_eq!(event["method"], "todo.created");
    assert_eq!(
        event["params"],
        json!({ "id": 1001, "text": "milk", "done": false })
    );

    // A lists one entry.
    let list = rpc(&mut a, 2, "todo.list", json!({})).await;
    assert_eq!(list["result"]["data"].as_array().unwrap().len(), 1);
    assert_eq!(list["result"]["data"][0]["id"], 1001);

    // B deletes it; A (not B) receives the deleted broadcast.
    let resp = rpc(&mut b, 1, "todo.delete", json!({ "id": 1001 })).await;
    assert!(resp.get("error").is_none());
    let event = next_notification(&mut a).await;
    assert_eq!(event["method"], "todo.deleted");
    assert_eq!(event["params"], json!({ "id": 1001 }));
    assert_silent(&mut b).await;

    // Both see an empty collection.
    let list_a = rpc(&mut a, 3, "todo.list", json!({})).await;
    assert_eq!(list_a["result"]["data"].as_array().unwrap().len(), 0);
    let list_b = rpc(&mut b, 2, "todo.list", json!({})).await;
    assert_eq!(list_b["result"]["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_invalid_params() {
    let (url, _ctx) = start_test_server().await;
    let resp = ws_rpc(&url, "todo.create", json!({})).await;
    assert_eq!(resp["error"]["code"], -32602);
}

#[tokio::test]
async fn test_invalid_request_version() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;
    ws.send(Message::Text(
        json!({ "jsonrpc": "1.0", "id": 1, "method": "daemon.ping" }).to_string(),
    ))
    .await
    .unwrap();
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("error").is_some() {
                assert_eq!(v["error"]["code"], -32600);
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_parse_error() {
    let (url, _ctx) = start_test_server().await;
    let mut ws = connect(&url).await;
    ws.send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("error").is_some() {
                assert_eq!(v["error"]["code"], -32700);
                assert_eq!(v["id"], Value::Null);
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_origin_allowlist() {
    let (url, _ctx) = start_test_server().await;

    // Listed origin passes the handshake.
    let mut req = url.clone().into_client_request().unwrap();
    req.headers_mut()
        .insert("Origin", "http://localhost:8080".parse().unwrap());
    assert!(connect_async(req).await.is_ok());

    // Unlisted origin is rejected before the socket is established.
    let mut req = url.clone().into_client_request().unwrap();
    req.headers_mut()
        .insert("Origin", "http://evil.example".parse().unwrap());
    assert!(connect_async(req).await.is_err());

    // No Origin header (native client) always passes.
    assert!(connect_async(&url).await.is_ok());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_url, ctx) = start_test_server().await;
    let port = ctx.config.port;

    // Give the server a moment to be ready
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Use a blocking TCP connection in a spawn_blocking to avoid mixing sync I/O
    let result = tokio::task::spawn_blocking(move || {
        let mut stream = TcpStream::connect(format!("127.0.0.1:{port}"))?;
        stream.write_all(b"GET /health HTTP/1.0\r\nHost: localhost\r\n\r\n")?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        Ok::<String, std::io::Error>(response)
    })
    .await
    .unwrap()
    .expect("TCP connect failed");

    // Extract the JSON body (after the blank line separating headers from body)
    let body = result.split("\r\n\r\n").nth(1).unwrap_or(&result);
    let json: serde_json::Value = serde_json::from_str(body).expect("health body is not JSON");

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime"].is_number());
    assert_eq!(json["todos"], 0);
    assert!(json["port"].is_number());
}
