//! Handlers for the `todo.*` RPC methods.
//!
//! Mutating handlers reply to the caller and broadcast a notification to
//! every other session. A failed lookup replies with the not-found error
//! and broadcasts nothing — each call resolves to exactly one reply.

use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
struct CreateParams {
    text: String,
    done: Option<bool>,
}

#[derive(Deserialize)]
struct UpdateParams {
    id: u64,
    text: String,
    done: bool,
}

#[derive(Deserialize)]
struct IdParams {
    id: u64,
}

pub async fn list(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "data": ctx.store.list() }))
}

pub async fn create(params: Value, ctx: &AppContext, origin: Uuid) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let todo = ctx.store.create(p.text, p.done.unwrap_or(false));
    info!(id = todo.id, "todo created");
    ctx.broadcaster
        .broadcast_from(origin, "todo.created", serde_json::to_value(&todo)?);
    Ok(json!({ "data": todo.id }))
}

pub async fn read(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let todo = ctx.store.get(p.id)?;
    Ok(json!({ "data": todo }))
}

pub async fn update(params: Value, ctx: &AppContext, origin: Uuid) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let todo = ctx.store.update(p.id, p.text, p.done)?;
    info!(id = todo.id, "todo updated");
    ctx.broadcaster
        .broadcast_from(origin, "todo.updated", serde_json::to_value(&todo)?);
    Ok(json!({}))
}

pub async fn mark_as_done(params: Value, ctx: &AppContext, origin: Uuid) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    let todo = ctx.store.mark_done(p.id)?;
    info!(id = todo.id, "todo marked done");
    // No dedicated "done" event — done-marking is an update to consumers.
    ctx.broadcaster
        .broadcast_from(origin, "todo.updated", serde_json::to_value(&todo)?);
    Ok(json!({}))
}

pub async fn delete(params: Value, ctx: &AppContext, origin: Uuid) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    ctx.store.remove(p.id)?;
    info!(id = p.id, "todo deleted");
    ctx.broadcaster
        .broadcast_from(origin, "todo.deleted", json!({ "id": p.id }));
    Ok(json!({}))
}
