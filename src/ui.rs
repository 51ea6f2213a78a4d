use crate::app::{AppEvent, EventSender, Palette};
use crate::error::{Result, SnipError};
use crate::index::LibrarySet;
use crate::models::Snippet;

use crossterm::{
    event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Terminal,
};
use std::io::{self, stdout};
use std::sync::Arc;
use tracing::{debug, error};

const PREVIEW_CHARS: usize = 60;

/// What a key press did to the picker.
#[derive(Debug, PartialEq, Eq)]
pub enum PickerAction {
    Continue,
    Select(usize),
    Cancel,
}

/// Query text and cursor of the picker, kept apart from drawing.
pub struct PickerState<'a> {
    snippets: &'a [Snippet],
    query: String,
    matches: Vec<usize>,
    selected: usize,
    offset: usize,
}

impl<'a> PickerState<'a> {
    pub fn new(snippets: &'a [Snippet], query: &str) -> Self {
        let mut state = Self {
            snippets,
            query: query.to_string(),
            matches: Vec::new(),
            selected: 0,
            offset: 0,
        };
        state.refilter();
        state
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> impl Iterator<Item = &'a Snippet> + '_ {
        self.matches.iter().map(|&i| &self.snippets[i])
    }

    pub fn selected(&self) -> Option<&'a Snippet> {
        self.matches.get(self.selected).map(|&i| &self.snippets[i])
    }

    fn refilter(&mut self) {
        self.matches = self
            .snippets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.matches_filter(&self.query))
            .map(|(i, _)| i)
            .collect();
        self.selected = 0;
        self.offset = 0;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> PickerAction {
        if key.kind != KeyEventKind::Press {
            return PickerAction::Continue;
        }
        match key.code {
            KeyCode::Esc => return PickerAction::Cancel,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return PickerAction::Cancel
            }
            KeyCode::Enter => {
                if let Some(&index) = self.matches.get(self.selected) {
                    return PickerAction::Select(index);
                }
            }
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.matches.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Backspace => {
                if self.query.pop().is_some() {
                    self.refilter();
                }
            }
            KeyCode::Char(c) => {
                self.query.push(c);
                self.refilter();
            }
            _ => {}
        }
        PickerAction::Continue
    }

    /// Keep the selection inside a window of `visible` rows.
    fn scroll_to_selection(&mut self, visible: usize) {
        if visible == 0 {
            return;
        }
        if self.selected >= self.offset + visible {
            self.offset = self.selected + 1 - visible;
        } else if self.selected < self.offset {
            self.offset = self.selected;
        }
    }
}

/// Interactive substring picker over `snippets`. Returns the chosen snippet,
/// or `None` if the user backed out.
pub fn pick_snippet(snippets: &[Snippet], query: &str, show_preview: bool) -> Result<Option<Snippet>> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout());
    let result = Terminal::new(backend)
        .map_err(SnipError::from)
        .and_then(|mut terminal| run_picker(&mut terminal, snippets, query, show_preview));

    // Clean up terminal
    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen)?;

    result
}

fn run_picker(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    snippets: &[Snippet],
    query: &str,
    show_preview: bool,
) -> Result<Option<Snippet>> {
    let mut state = PickerState::new(snippets, query);

    loop {
        terminal.draw(|f| {
            let area = f.area();
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(3),
                    Constraint::Length(2),
                ])
                .split(area);

            let body = if show_preview {
                Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
                    .split(rows[1])
            } else {
                Layout::default()
                    .constraints([Constraint::Percentage(100)])
                    .split(rows[1])
            };

            let search = Paragraph::new(Line::from(vec![
                Span::styled("> ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                Span::raw(state.query().to_string()),
            ]))
            .block(Block::default().borders(Borders::ALL).title(" Search "));

            let visible = body[0].height.saturating_sub(2) as usize;
            state.scroll_to_selection(visible);

            let items: Vec<ListItem> = state
                .matches()
                .enumerate()
                .skip(state.offset)
                .take(visible)
                .map(|(i, snippet)| {
                    let marker = if i == state.selected {
                        Span::styled("> ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
                    } else {
                        Span::raw("  ")
                    };
                    let line = Line::from(vec![
                        marker,
                        Span::styled(snippet.name.clone(), Style::default().fg(Color::White)),
                        Span::raw(" "),
                        Span::styled(
                            format!("[{}]", snippet.library_name),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]);
                    if i == state.selected {
                        ListItem::new(line).style(Style::default().bg(Color::DarkGray))
                    } else {
                        ListItem::new(line)
                    }
                })
                .collect();

            let title = format!(" Snippets ({}) ", state.matches.len());
            let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

            let help = Paragraph::new(Line::from(vec![
                Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
                Span::raw(": Navigate  "),
                Span::styled("Enter", Style::default().fg(Color::Yellow)),
                Span::raw(": Select  "),
                Span::styled("Esc", Style::default().fg(Color::Yellow)),
                Span::raw(": Cancel  "),
                Span::raw("Type to filter"),
            ]))
            .block(Block::default().borders(Borders::TOP));

            f.render_widget(search, rows[0]);
            f.render_widget(list, body[0]);
            if show_preview {
                f.render_widget(preview(state.selected()), body[1]);
            }
            f.render_widget(help, rows[2]);
        })?;

        if let event::Event::Key(key) = event::read()? {
            match state.handle_key(key) {
                PickerAction::Continue => {}
                PickerAction::Select(index) => return Ok(Some(snippets[index].clone())),
                PickerAction::Cancel => return Ok(None),
            }
        }
    }
}

fn preview(snippet: Option<&Snippet>) -> Paragraph<'static> {
    let block = Block::default().borders(Borders::ALL).title(" Preview ");
    let Some(snippet) = snippet else {
        return Paragraph::new("No matching snippets").block(block);
    };

    let mut lines = Vec::new();
    if !snippet.description.is_empty() {
        lines.push(Line::from(Span::styled(
            snippet.description.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }
    if !snippet.tags.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("tags: {}", snippet.tags.join(", ")),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if !lines.is_empty() {
        lines.push(Line::raw(""));
    }
    lines.extend(snippet.content.lines().map(|l| Line::raw(l.to_string())));

    Paragraph::new(lines).block(block).wrap(Wrap { trim: false })
}

/// One-line summary used by the `list` and `search` commands.
pub fn summary_line(snippet: &Snippet) -> String {
    format!(
        "{:<20} {:<24} {}",
        format!("{}/{}", snippet.library_name, snippet.id),
        snippet.name,
        snippet.preview(PREVIEW_CHARS)
    )
}

/// Palette that takes over the terminal when summoned.
#[derive(Default)]
pub struct TerminalPalette {
    snapshot: Option<Arc<LibrarySet>>,
    show_preview: bool,
}

impl TerminalPalette {
    pub fn new(show_preview: bool) -> Self {
        Self {
            snapshot: None,
            show_preview,
        }
    }
}

impl Palette for TerminalPalette {
    fn show(&mut self, events: &EventSender) {
        let snippets = self
            .snapshot
            .as_ref()
            .map(|s| s.all_snippets())
            .unwrap_or_default();

        match pick_snippet(&snippets, "", self.show_preview) {
            Ok(Some(snippet)) => {
                let _ = events.send(AppEvent::Insert(snippet));
            }
            Ok(None) => debug!("Palette dismissed"),
            Err(e) => error!(error = %e, "Palette failed"),
        }
    }

    fn refresh(&mut self, snapshot: Arc<LibrarySet>) {
        self.snapshot = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippets() -> Vec<Snippet> {
        let mut a = Snippet::new("for_loop", "For Loop", "for i in x:");
        a.tags = vec!["loop".to_string()];
        let b = Snippet::new("while_loop", "While", "while True:");
        let c = Snippet::new("header", "Header", "#!/bin/sh");
        vec![a, b, c]
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn typing_filters_and_resets_selection() {
        let all = snippets();
        let mut state = PickerState::new(&all, "");
        assert_eq!(state.matches().count(), 3);

        state.handle_key(key(KeyCode::Down));
        for c in "loop".chars() {
            state.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(state.query(), "loop");
        assert_eq!(state.matches().count(), 1);
        assert_eq!(state.selected().map(|s| s.id.as_str()), Some("for_loop"));

        state.handle_key(key(KeyCode::Backspace));
        assert_eq!(state.query(), "loo");
    }

    #[test]
    fn enter_selects_original_index() {
        let all = snippets();
        let mut state = PickerState::new(&all, "head");
        assert_eq!(state.handle_key(key(KeyCode::Enter)), PickerAction::Select(2));
    }

    #[test]
    fn enter_with_no_matches_does_nothing() {
        let all = snippets();
        let mut state = PickerState::new(&all, "zzz");
        assert_eq!(state.handle_key(key(KeyCode::Enter)), PickerAction::Continue);
        assert_eq!(state.handle_key(key(KeyCode::Esc)), PickerAction::Cancel);
    }

    #[test]
    fn selection_stays_in_range() {
        let all = snippets();
        let mut state = PickerState::new(&all, "");
        state.handle_key(key(KeyCode::Up));
        assert_eq!(state.selected, 0);
        for _ in 0..10 {
            state.handle_key(key(KeyCode::Down));
        }
        assert_eq!(state.selected, 2);

        state.scroll_to_selection(2);
        assert_eq!(state.offset, 1);
    }

    #[test]
    fn ctrl_c_cancels() {
        let all = snippets();
        let mut state = PickerState::new(&all, "");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(state.handle_key(ctrl_c), PickerAction::Cancel);
    }
}
