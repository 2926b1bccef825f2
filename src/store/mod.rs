//! In-memory todo store — the authoritative collection.
//!
//! The server process owns exactly one `TodoStore`, injected into every
//! RPC handler through `AppContext`. All access goes through the lock;
//! each operation finds and mutates under one guard, so operations are
//! atomic with respect to the collection.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;

/// Ids are handed out from a monotonic counter, never reused within a
/// process lifetime. Wall-clock ids would collide within one tick.
const FIRST_ID: u64 = 1001;

/// A todo item as stored and as serialized over the RPC wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No todo with the requested id.
    #[error("entity not found")]
    NotFound,
}

struct Inner {
    todos: Vec<Todo>,
    next_id: u64,
}

pub struct TodoStore {
    inner: RwLock<Inner>,
}

impl TodoStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                todos: Vec::new(),
                next_id: FIRST_ID,
            }),
        }
    }

    /// Append a new todo and return it with its assigned id.
    ///
    /// Creation cannot fail.
    pub fn create(&self, text: String, done: bool) -> Todo {
        let mut inner = self.inner.write().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let todo = Todo { id, text, done };
        inner.todos.push(todo.clone());
        todo
    }

    pub fn get(&self, id: u64) -> Result<Todo, StoreError> {
        let inner = self.inner.read().unwrap();
        inner
            .todos
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Overwrite `text` and `done` in place, preserving position.
    pub fn update(&self, id: u64, text: String, done: bool) -> Result<Todo, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let todo = inner
            .todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound)?;
        todo.text = text;
        todo.done = done;
        Ok(todo.clone())
    }

    /// Set `done = true`. Idempotent — marking twice is not an error.
    pub fn mark_done(&self, id: u64) -> Result<Todo, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let todo = inner
            .todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound)?;
        todo.done = true;
        Ok(todo.clone())
    }

    /// Remove the matching entry, preserving the order of the rest.
    pub fn remove(&self, id: u64) -> Result<Todo, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let idx = inner
            .todos
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound)?;
        Ok(inner.todos.remove(idx))
    }

    /// Snapshot of the collection in insertion order.
    pub fn list(&self) -> Vec<Todo> {
        self.inner.read().unwrap().todos.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new()
    }
}
