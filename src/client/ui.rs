// SPDX-License-Identifier: MIT
//! `todod ui` — interactive terminal client.
//!
//! Renders the mirrored todo list and reconciles it live from broadcast
//! notifications while the user works. Server errors surface on the
//! status line; they never end the session.
//!
//! Keys: `a` add, `e` edit, `d` mark done, `x` delete, `j`/`k` move,
//! `q` quit. In the input line: Enter submits, Esc cancels.

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;

use super::state::{plan_submit, Submit, TodoList};
use super::{ClientError, ServerEvent, TodoClient};
use crate::store::Todo;

enum Mode {
    Normal,
    /// Input line focused — creating a new todo, or editing `editing`.
    Input { editing: Option<Todo> },
}

pub struct TodoUi {
    client: TodoClient,
    events: mpsc::Receiver<ServerEvent>,
    list: TodoList,
    input: String,
    mode: Mode,
    cursor: usize,
    status: String,
}

/// Connect, load the initial list, and run the terminal UI until quit.
pub async fn run(url: &str) -> Result<()> {
    let (client, events) = TodoClient::connect(url).await?;
    let todos = client.list().await?;
    let mut list = TodoList::new();
    list.replace(todos);

    let mut ui = TodoUi {
        client,
        events,
        list,
        input: String::new(),
        mode: Mode::Normal,
        cursor: 0,
        status: String::new(),
    };

    enable_raw_mode()?;
    execute!(std::io::stdout(), EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = ui.event_loop(&mut terminal).await;

    // Always restore the terminal, even when the loop failed.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

impl TodoUi {
    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    ) -> Result<()> {
        let mut input_events = EventStream::new();
        loop {
            terminal.draw(|f| self.draw(f))?;
            tokio::select! {
                maybe_key = input_events.next() => {
                    match maybe_key {
                        Some(Ok(Event::Key(key))) => {
                            if self.handle_key(key).await? {
                                return Ok(());
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => anyhow::bail!("terminal input error: {e}"),
                        None => return Ok(()),
                    }
                }
                maybe_event = self.events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_server_event(event),
                        None => anyhow::bail!("connection to server lost"),
                    }
                }
            }
        }
    }

    /// Returns true when the UI should quit.
    async fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.kind != KeyEventKind::Press {
            return Ok(false);
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(true);
        }
        match self.mode {
            Mode::Normal => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('j') | KeyCode::Down => {
                    if self.cursor + 1 < self.list.len() {
                        self.cursor += 1;
                    }
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    self.cursor = self.cursor.saturating_sub(1);
                }
                KeyCode::Char('a') => {
                    self.input.clear();
                    self.mode = Mode::Input { editing: None };
                }
                KeyCode::Char('e') => self.begin_edit(),
                KeyCode::Char('d') => self.mark_done_selected().await,
                KeyCode::Char('x') | KeyCode::Delete => self.delete_selected().await,
                _ => {}
            },
            Mode::Input { .. } => match key.code {
                KeyCode::Esc => {
                    self.input.clear();
                    self.mode = Mode::Normal;
                }
                KeyCode::Enter => self.submit().await,
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            },
        }
        Ok(false)
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        if let ServerEvent::Welcome { message } = &event {
            self.status = message.clone();
        }
        self.list.apply(&event);
        self.clamp_cursor();
    }

    /// One edit target at a time — entering edit mode replaces any
    /// previous target.
    fn begin_edit(&mut self) {
        if let Some(todo) = self.list.todos().get(self.cursor).cloned() {
            self.input = todo.text.clone();
            self.mode = Mode::Input {
                editing: Some(todo),
            };
        }
    }

    async fn submit(&mut self) {
        let editing = match &self.mode {
            Mode::Input { editing } => editing.clone(),
            Mode::Normal => None,
        };
        match plan_submit(&self.input, editing.as_ref()) {
            // Blank input: keep the line open, send nothing.
            Submit::Ignore => return,
            Submit::Create { text } => match self.client.create(&text, false).await {
                Ok(id) => {
                    self.list.push(Todo {
                        id,
                        text,
                        done: false,
                    });
                    self.status.clear();
                }
                Err(e) => self.report(e),
            },
            Submit::Update(draft) => match self.client.update(&draft).await {
                Ok(()) => {
                    self.list.replace_entry(draft);
                    self.status.clear();
                }
                Err(e) => self.report(e),
            },
        }
        self.input.clear();
        self.mode = Mode::Normal;
        self.clamp_cursor();
    }

    async fn mark_done_selected(&mut self) {
        let Some(todo) = self.list.todos().get(self.cursor) else {
            return;
        };
        let id = todo.id;
        match self.client.mark_done(id).await {
            Ok(()) => {
                self.list.set_done(id);
                self.status.clear();
            }
            Err(e) => self.report(e),
        }
    }

    async fn delete_selected(&mut self) {
        let Some(todo) = self.list.todos().get(self.cursor) else {
            return;
        };
        let id = todo.id;
        match self.client.delete(id).await {
            Ok(()) => {
                self.list.remove_entry(id);
                self.status.clear();
                self.clamp_cursor();
            }
            Err(e) => self.report(e),
        }
    }

    /// Non-fatal error display — the session continues.
    fn report(&mut self, e: anyhow::Error) {
        self.status = match e.downcast_ref::<ClientError>() {
            Some(ClientError::NotFound) => "Error: Entity not found".to_string(),
            _ => format!("Error: {e:#}"),
        };
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.list.len().saturating_sub(1));
    }

    // ── Rendering ────────────────────────────────────────────────────────────

    fn draw(&self, f: &mut Frame) {
        let [header, body, input, footer] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(f.area());

        let title = Paragraph::new(Line::from(Span::styled(
            " todod — realtime todos",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        f.render_widget(title, header);

        let items: Vec<ListItem> = self
            .list
            .todos()
            .iter()
            .map(|t| {
                let marker = if t.done { "✓" } else { " " };
                let style = if t.done {
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("[{marker}] ")),
                    Span::styled(t.text.clone(), style),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("todos"))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        let mut state = ListState::default();
        if !self.list.is_empty() {
            state.select(Some(self.cursor));
        }
        f.render_stateful_widget(list, body, &mut state);

        let input_title = match &self.mode {
            Mode::Normal => "input (a to add, e to edit)".to_string(),
            Mode::Input { editing: None } => "new todo (Enter to submit, Esc to cancel)".to_string(),
            Mode::Input {
                editing: Some(todo),
            } => format!("edit todo #{} (Enter to submit, Esc to cancel)", todo.id),
        };
        let input_box = Paragraph::new(self.input.as_str())
            .block(Block::default().borders(Borders::ALL).title(input_title));
        f.render_widget(input_box, input);

        let footer_line = if self.status.is_empty() {
            Line::from(Span::styled(
                " a add · e edit · d done · x delete · j/k move · q quit",
                Style::default().fg(Color::DarkGray),
            ))
        } else if self.status.starts_with("Error") {
            Line::from(Span::styled(
                format!(" {}", self.status),
                Style::default().fg(Color::Red),
            ))
        } else {
            Line::from(Span::styled(
                format!(" {}", self.status),
                Style::default().fg(Color::DarkGray),
            ))
        };
        f.render_widget(Paragraph::new(footer_line), footer);
    }
}
