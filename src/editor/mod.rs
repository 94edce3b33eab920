//! Interactive Line Editor
//!
//! A keypress state machine over a logical buffer, kept free of terminal
//! I/O so every transition is testable, plus a thin raw-mode driver that
//! reads crossterm events and repaints.
//!
//! The editor owns the terminal while reading; the shell restores
//! cooked mode before running a submitted line. Ctrl+C clears the buffer
//! and asks for a fresh prompt; Ctrl+D on an empty buffer exits.

pub mod buffer;
pub mod display;
pub mod search;
pub mod suggest;

use std::io::Write;

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, SetAttribute};
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;

use crate::complete::CompletionGroup;
use crate::parser::is_input_complete;

pub use buffer::EditorBuffer;
pub use display::{display_width, strip_ansi};
pub use search::ReverseSearch;
pub use suggest::SuggestionState;

/// What the driver should do after one keypress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// State changed (or not); repaint and keep reading.
    Continue,
    /// The buffer is a complete line; submit it.
    Submit,
    /// Ctrl+C: discard the buffer, fresh prompt.
    Interrupt,
    /// Ctrl+D on an empty buffer: end the session.
    Eof,
    /// Ctrl+L: clear the screen and repaint.
    ClearScreen,
}

/// Outcome of one `read_line` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorOutcome {
    Line(String),
    Interrupted,
    Eof,
}

/// Callbacks the state machine pulls on demand.
pub struct EditorHooks<'a> {
    /// Completion groups for (buffer, cursor).
    pub complete: &'a mut dyn FnMut(&str, usize) -> Vec<CompletionGroup>,
    /// History entries matching a query (for the trailing History group).
    pub history_matches: &'a mut dyn FnMut(&str) -> Vec<String>,
    /// Cap for merged suggestions.
    pub max_suggestions: usize,
}

/// The pure editor state machine.
pub struct EditorState {
    pub buffer: EditorBuffer,
    pub reverse_search: ReverseSearch,
    pub suggestions: SuggestionState,
    history: Vec<String>,
    /// Selection inside the prefix-filtered history matches while
    /// browsing; `None` means not browsing.
    browse: Option<BrowseState>,
}

struct BrowseState {
    matches: Vec<String>,
    /// `matches.len()` means "past the newest": the original input.
    index: usize,
    original_input: String,
}

impl EditorState {
    pub fn new(term_width: usize) -> Self {
        Self {
            buffer: EditorBuffer::new(),
            reverse_search: ReverseSearch::default(),
            suggestions: SuggestionState::new(term_width),
            history: Vec::new(),
            browse: None,
        }
    }

    /// Install the history snapshot for browsing and reverse search.
    pub fn set_history(&mut self, entries: Vec<String>) {
        self.history = entries;
    }

    pub fn is_browsing_history(&self) -> bool {
        self.browse.is_some()
    }

    /// Reset per-line state; the buffer starts empty.
    pub fn begin_line(&mut self) {
        self.buffer.clear();
        self.browse = None;
        self.suggestions.clear();
    }

    /// Feed one keypress. See `Action` for what the caller does next.
    pub fn handle_key(&mut self, key: KeyEvent, hooks: &mut EditorHooks<'_>) -> Action {
        if key.kind != KeyEventKind::Press && key.kind != KeyEventKind::Repeat {
            return Action::Continue;
        }

        if self.reverse_search.is_active() {
            return self.handle_search_key(key);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match (key.code, ctrl, alt) {
            (KeyCode::Char('c'), true, _) => {
                self.buffer.clear();
                self.browse = None;
                self.suggestions.clear();
                Action::Interrupt
            }
            (KeyCode::Char('d'), true, _) => {
                if self.buffer.is_empty() {
                    Action::Eof
                } else {
                    self.buffer.delete();
                    self.refresh_suggestions(hooks);
                    Action::Continue
                }
            }
            (KeyCode::Char('l'), true, _) => Action::ClearScreen,
            (KeyCode::Char('r'), true, _) => {
                self.reverse_search.start(&self.buffer.text());
                Action::Continue
            }
            (KeyCode::Char('a'), true, _) => {
                self.buffer.move_line_start();
                Action::Continue
            }
            (KeyCode::Char('e'), true, _) => {
                self.buffer.move_line_end();
                Action::Continue
            }
            (KeyCode::Char('k'), true, _) => {
                self.buffer.kill_to_end();
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Char('u'), true, _) => {
                self.buffer.kill_to_start();
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Char('w'), true, _) => {
                self.buffer.delete_word_left();
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Char('b'), true, _) => {
                self.buffer.move_left();
                Action::Continue
            }
            (KeyCode::Char('f'), true, _) => {
                self.buffer.move_right();
                Action::Continue
            }
            (KeyCode::Char('b'), _, true) => {
                self.buffer.move_word_left();
                Action::Continue
            }
            (KeyCode::Char('f'), _, true) => {
                self.buffer.move_word_right();
                Action::Continue
            }
            (KeyCode::Char('d'), _, true) => {
                self.buffer.delete_word_right();
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Char(c), false, false) => {
                self.exit_browse_keep_buffer();
                self.buffer.insert_char(c);
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Backspace, _, _) => {
                self.exit_browse_keep_buffer();
                self.buffer.backspace();
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Delete, _, _) => {
                self.buffer.delete();
                self.refresh_suggestions(hooks);
                Action::Continue
            }
            (KeyCode::Left, _, _) => {
                if self.suggestions.is_visible() {
                    self.suggestions.move_left();
                } else {
                    self.buffer.move_left();
                }
                Action::Continue
            }
            (KeyCode::Right, _, _) => {
                if self.suggestions.is_visible() {
                    self.suggestions.move_right();
                } else if self.buffer.cursor() == self.buffer.len() {
                    self.accept_ghost();
                } else {
                    self.buffer.move_right();
                }
                Action::Continue
            }
            (KeyCode::Up, _, _) => {
                if self.suggestions.is_visible() {
                    self.suggestions.move_up();
                } else if self.buffer.line_col().0 > 0 {
                    self.buffer.move_line_up();
                } else {
                    self.browse_older();
                }
                Action::Continue
            }
            (KeyCode::Down, _, _) => {
                if self.suggestions.is_visible() {
                    self.suggestions.move_down();
                } else if self.buffer.move_line_down() {
                    // moved within a multi-line buffer
                } else {
                    self.browse_newer();
                }
                Action::Continue
            }
            (KeyCode::Home, _, _) => {
                self.buffer.move_line_start();
                Action::Continue
            }
            (KeyCode::End, _, _) => {
                self.buffer.move_line_end();
                Action::Continue
            }
            (KeyCode::Tab, _, _) => {
                self.handle_tab(hooks);
                Action::Continue
            }
            (KeyCode::Esc, _, _) => {
                if self.suggestions.is_visible() {
                    self.suggestions.hide();
                } else if self.browse.is_some() {
                    self.cancel_browse();
                }
                Action::Continue
            }
            (KeyCode::Enter, _, _) => {
                if self.suggestions.is_visible() {
                    self.insert_selected_suggestion();
                    return Action::Continue;
                }
                if !is_input_complete(&self.buffer.text()) {
                    self.buffer.insert_char('\n');
                    return Action::Continue;
                }
                self.browse = None;
                self.suggestions.clear();
                Action::Submit
            }
            _ => Action::Continue,
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match (key.code, ctrl) {
            (KeyCode::Char('r'), true) => {
                self.reverse_search.cycle_older();
                Action::Continue
            }
            (KeyCode::Char('c'), true) | (KeyCode::Esc, _) => {
                let restored = self.reverse_search.cancel();
                self.buffer.set_text(&restored);
                Action::Continue
            }
            (KeyCode::Enter, _) => {
                let accepted = self.reverse_search.accept();
                self.buffer.set_text(&accepted);
                Action::Submit
            }
            (KeyCode::Backspace, _) => {
                self.reverse_search.pop_char(&self.history);
                Action::Continue
            }
            (KeyCode::Char(c), false) => {
                self.reverse_search.push_char(c, &self.history);
                Action::Continue
            }
            _ => {
                // Any other key accepts the match and re-dispatches.
                let accepted = self.reverse_search.accept();
                self.buffer.set_text(&accepted);
                Action::Continue
            }
        }
    }

    fn handle_tab(&mut self, hooks: &mut EditorHooks<'_>) {
        if self.suggestions.is_visible() {
            self.suggestions.move_right();
            return;
        }
        self.fetch_suggestions(hooks);
        let total: usize = self.suggestions.groups().iter().map(|g| g.items.len()).sum();
        match total {
            0 => {}
            1 => self.insert_selected_suggestion(),
            _ => self.suggestions.show(),
        }
    }

    /// Recompute the ghost/list source after a buffer edit. Suppressed
    /// while browsing history.
    fn refresh_suggestions(&mut self, hooks: &mut EditorHooks<'_>) {
        if self.browse.is_some() {
            return;
        }
        self.suggestions.hide();
        self.fetch_suggestions(hooks);
    }

    fn fetch_suggestions(&mut self, hooks: &mut EditorHooks<'_>) {
        let text = self.buffer.text();
        let groups = (hooks.complete)(&text, self.buffer.cursor());
        self.suggestions.set_groups(groups);
        let matches = (hooks.history_matches)(&text);
        self.suggestions
            .merge_history(&matches, hooks.max_suggestions, &text);
    }

    /// The dimmed inline suffix to draw after the cursor, when eligible.
    pub fn ghost(&self) -> Option<String> {
        if self.browse.is_some()
            || self.reverse_search.is_active()
            || self.suggestions.is_visible()
            || self.buffer.cursor() != self.buffer.len()
        {
            return None;
        }
        self.suggestions.ghost_suffix(&self.buffer.word_before_cursor())
    }

    fn accept_ghost(&mut self) {
        if let Some(suffix) = self.ghost() {
            self.buffer.insert_str(&suffix);
        }
    }

    fn insert_selected_suggestion(&mut self) {
        let text = match self.suggestions.selected_item() {
            Some(item) => item.text.clone(),
            None => return,
        };
        let word = self.buffer.word_before_cursor();
        for _ in 0..word.chars().count() {
            self.buffer.backspace();
        }
        self.buffer.insert_str(&text);
        self.suggestions.hide();
    }

    // -- history browsing ------------------------------------------------

    fn browse_older(&mut self) {
        if self.browse.is_none() {
            let original_input = self.buffer.text();
            let matches: Vec<String> = self
                .history
                .iter()
                .filter(|entry| entry.starts_with(&original_input))
                .cloned()
                .collect();
            let index = matches.len();
            self.browse = Some(BrowseState { matches, index, original_input });
            self.suggestions.clear();
        }
        if let Some(browse) = &mut self.browse {
            if browse.index > 0 {
                browse.index -= 1;
                self.buffer.set_text(&browse.matches[browse.index].clone());
            }
        }
    }

    fn browse_newer(&mut self) {
        if let Some(browse) = &mut self.browse {
            browse.index += 1;
            if browse.index >= browse.matches.len() {
                // Past the newest match: restore what was being typed.
                let original = browse.original_input.clone();
                self.buffer.set_text(&original);
                self.browse = None;
            } else {
                let entry = browse.matches[browse.index].clone();
                self.buffer.set_text(&entry);
            }
        }
    }

    fn cancel_browse(&mut self) {
        if let Some(browse) = self.browse.take() {
            self.buffer.set_text(&browse.original_input);
        }
    }

    /// Editing a recalled entry ends browsing but keeps the text.
    fn exit_browse_keep_buffer(&mut self) {
        self.browse = None;
    }
}

/// Raw-mode guard: cooked mode is restored even on early return.
struct RawMode;

impl RawMode {
    fn enter() -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// The terminal driver around `EditorState`.
pub struct LineEditor {
    continuation_prompt: String,
    /// Rows the previous repaint occupied, for clearing.
    painted_rows: u16,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self { continuation_prompt: "... ".to_string(), painted_rows: 0 }
    }

    /// Read one line. The prompt may contain ANSI styling; width math
    /// uses the stripped form.
    pub fn read_line(
        &mut self,
        prompt: &str,
        state: &mut EditorState,
        hooks: &mut EditorHooks<'_>,
    ) -> std::io::Result<EditorOutcome> {
        let _raw = RawMode::enter()?;
        state.begin_line();
        self.painted_rows = 0;
        self.render(prompt, state)?;

        loop {
            match crossterm::event::read()? {
                Event::Key(key) => match state.handle_key(key, hooks) {
                    Action::Continue => self.render(prompt, state)?,
                    Action::Submit => {
                        let line = state.buffer.text();
                        self.finish_line(prompt, state)?;
                        return Ok(EditorOutcome::Line(line));
                    }
                    Action::Interrupt => {
                        self.finish_line(prompt, state)?;
                        return Ok(EditorOutcome::Interrupted);
                    }
                    Action::Eof => {
                        self.finish_line(prompt, state)?;
                        return Ok(EditorOutcome::Eof);
                    }
                    Action::ClearScreen => {
                        let mut out = std::io::stdout();
                        out.queue(Clear(ClearType::All))?;
                        out.queue(crossterm::cursor::MoveTo(0, 0))?;
                        out.flush()?;
                        self.painted_rows = 0;
                        self.render(prompt, state)?;
                    }
                },
                Event::Resize(width, _) => {
                    state.suggestions.set_term_width(width as usize);
                    self.render(prompt, state)?;
                }
                _ => {}
            }
        }
    }

    /// Repaint the edit region: move to its top, clear down, rewrite.
    fn render(&mut self, prompt: &str, state: &EditorState) -> std::io::Result<()> {
        let mut out = std::io::stdout();
        out.queue(MoveToColumn(0))?;
        if self.painted_rows > 0 {
            out.queue(MoveUp(self.painted_rows))?;
        }
        out.queue(Clear(ClearType::FromCursorDown))?;

        let mut rows: u16 = 0;
        let (cursor_line, cursor_col) = state.buffer.line_col();

        if state.reverse_search.is_active() {
            let preview = state.reverse_search.current().unwrap_or("");
            write!(
                out,
                "(reverse-i-search)`{}': {}",
                state.reverse_search.query(),
                preview
            )?;
            out.flush()?;
            self.painted_rows = 0;
            return Ok(());
        }

        let lines = state.buffer.lines();
        let last_index = lines.len() - 1;
        for (index, line) in lines.iter().enumerate() {
            let line_prompt = if index == 0 { prompt } else { &self.continuation_prompt };
            write!(out, "{}{}", line_prompt, line)?;
            if index == last_index {
                if let Some(ghost) = state.ghost() {
                    out.queue(SetAttribute(Attribute::Dim))?;
                    write!(out, "{}", ghost)?;
                    out.queue(SetAttribute(Attribute::Reset))?;
                }
            }
            if index < last_index {
                write!(out, "\r\n")?;
                rows += 1;
            }
        }

        if state.suggestions.is_visible() {
            rows += self.render_suggestion_list(&mut out, state)?;
        }

        // Park the cursor on its logical position.
        let rows_below_cursor = rows - cursor_line as u16;
        if rows_below_cursor > 0 {
            out.queue(MoveUp(rows_below_cursor))?;
        }
        let prompt_width = if cursor_line == 0 {
            display_width(prompt)
        } else {
            display_width(&self.continuation_prompt)
        };
        let cursor_cols: usize = lines[cursor_line]
            .chars()
            .take(cursor_col)
            .map(display::char_width)
            .sum();
        out.queue(MoveToColumn((prompt_width + cursor_cols) as u16))?;
        out.flush()?;
        self.painted_rows = cursor_line as u16;
        Ok(())
    }

    /// Rows written for the grouped suggestion list.
    fn render_suggestion_list(
        &self,
        out: &mut std::io::Stdout,
        state: &EditorState,
    ) -> std::io::Result<u16> {
        let mut rows = 0u16;
        for (group_index, group) in state.suggestions.groups().iter().enumerate() {
            if group.items.is_empty() {
                continue;
            }
            if !group.title.is_empty() {
                write!(out, "\r\n")?;
                out.queue(SetAttribute(Attribute::Bold))?;
                write!(out, "{}", group.title)?;
                out.queue(SetAttribute(Attribute::Reset))?;
                rows += 1;
            }
            let layout = state.suggestions.layout(group_index);
            let cell = group
                .items
                .iter()
                .map(|item| display_width(&item.text))
                .max()
                .unwrap_or(1)
                + 2;
            for row in 0..layout.rows {
                write!(out, "\r\n")?;
                rows += 1;
                for column in 0..layout.columns {
                    let index = row * layout.columns + column;
                    let item = match group.items.get(index) {
                        Some(item) => item,
                        None => break,
                    };
                    let selected = state.suggestions.selected() == Some((group_index, index));
                    if selected {
                        out.queue(SetAttribute(Attribute::Reverse))?;
                    }
                    write!(out, "{}", item.text)?;
                    if selected {
                        out.queue(SetAttribute(Attribute::Reset))?;
                    }
                    let pad = cell - display_width(&item.text);
                    write!(out, "{}", " ".repeat(pad))?;
                }
            }
        }
        Ok(rows)
    }

    /// Leave the edit region tidy and move to the next terminal line.
    fn finish_line(&mut self, prompt: &str, state: &EditorState) -> std::io::Result<()> {
        // Repaint once without overlays so the scrollback keeps only the
        // submitted text.
        let mut out = std::io::stdout();
        out.queue(MoveToColumn(0))?;
        if self.painted_rows > 0 {
            out.queue(MoveUp(self.painted_rows))?;
        }
        out.queue(Clear(ClearType::FromCursorDown))?;
        let lines = state.buffer.lines();
        for (index, line) in lines.iter().enumerate() {
            let line_prompt = if index == 0 { prompt } else { &self.continuation_prompt };
            write!(out, "{}{}\r\n", line_prompt, line)?;
        }
        out.flush()?;
        self.painted_rows = 0;
        Ok(())
    }
}
