//! Local mirror of the server's todo list.
//!
//! Two reconciliation paths feed the mirror: broadcast notifications
//! (changes made by other sessions — the server never echoes a session's
//! own mutations back to it) and this session's own acks. Local entries
//! change only after the round trip confirms success.

use super::ServerEvent;
use crate::store::Todo;

/// The derived, eventually-consistent copy of the server collection.
#[derive(Debug, Default)]
pub struct TodoList {
    todos: Vec<Todo>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mirror — used with the initial `todo.list` result.
    pub fn replace(&mut self, todos: Vec<Todo>) {
        self.todos = todos;
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn len(&self) -> usize {
        self.todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    /// Reconcile a broadcast notification into the mirror.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Welcome { .. } => {}
            ServerEvent::Created(todo) => self.todos.push(todo.clone()),
            ServerEvent::Updated(todo) => self.replace_entry(todo.clone()),
            ServerEvent::Deleted { id } => self.remove_entry(*id),
        }
    }

    // ── Ack-side mutations ───────────────────────────────────────────────────

    pub fn push(&mut self, todo: Todo) {
        self.todos.push(todo);
    }

    /// Swap in the new version of an entry, preserving its position.
    /// No-op when the id is not present locally.
    pub fn replace_entry(&mut self, todo: Todo) {
        if let Some(slot) = self.todos.iter_mut().find(|t| t.id == todo.id) {
            *slot = todo;
        }
    }

    pub fn set_done(&mut self, id: u64) {
        if let Some(todo) = self.todos.iter_mut().find(|t| t.id == id) {
            todo.done = true;
        }
    }

    pub fn remove_entry(&mut self, id: u64) {
        self.todos.retain(|t| t.id != id);
    }
}

/// What a submit keypress should do, given the input buffer and edit state.
#[derive(Debug, PartialEq, Eq)]
pub enum Submit {
    /// Blank input — nothing to send.
    Ignore,
    Create { text: String },
    Update(Todo),
}

/// Decide the submit action.
///
/// Editing a todo's text un-marks it: a changed wording is a new piece of
/// work, so `done` resets to false. Re-submitting unchanged text keeps
/// the completion flag.
pub fn plan_submit(input: &str, editing: Option<&Todo>) -> Submit {
    let text = input.trim();
    if text.is_empty() {
        return Submit::Ignore;
    }
    match editing {
        Some(original) => {
            let done = if text != original.text {
                false
            } else {
                original.done
            };
            Submit::Update(Todo {
                id: original.id,
                text: text.to_string(),
                done,
            })
        }
        None => Submit::Create {
            text: text.to_string(),
        },
    }
}
