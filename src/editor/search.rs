//! Reverse Incremental Search (Ctrl+R)
//!
//! Each keystroke refines the query and selects the most recent match;
//! repeated Ctrl+R cycles to older matches. Accept commits the selected
//! entry into the buffer; Escape cancels and restores the original.

/// State of one reverse-search session.
#[derive(Debug, Clone, Default)]
pub struct ReverseSearch {
    active: bool,
    query: String,
    matches: Vec<String>,
    index: usize,
    saved_buffer: String,
}

impl ReverseSearch {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Enter search mode, remembering the buffer for cancel.
    pub fn start(&mut self, saved_buffer: &str) {
        self.active = true;
        self.query.clear();
        self.matches.clear();
        self.index = 0;
        self.saved_buffer = saved_buffer.to_string();
    }

    /// Append a char to the query and reselect the most recent match.
    pub fn push_char(&mut self, c: char, history: &[String]) {
        self.query.push(c);
        self.refresh(history);
    }

    /// Drop the last query char.
    pub fn pop_char(&mut self, history: &[String]) {
        self.query.pop();
        self.refresh(history);
    }

    /// Ctrl+R again: move to the next-older match, sticking at the
    /// oldest.
    pub fn cycle_older(&mut self) {
        if self.index + 1 < self.matches.len() {
            self.index += 1;
        }
    }

    /// The currently selected match.
    pub fn current(&self) -> Option<&str> {
        self.matches.get(self.index).map(String::as_str)
    }

    /// Accept: leave search mode, returning the text the buffer should
    /// take (the match, or the typed query when nothing matched).
    pub fn accept(&mut self) -> String {
        let text = self
            .current()
            .map(str::to_string)
            .unwrap_or_else(|| self.saved_buffer.clone());
        self.active = false;
        text
    }

    /// Cancel: leave search mode, restoring the original buffer.
    pub fn cancel(&mut self) -> String {
        self.active = false;
        std::mem::take(&mut self.saved_buffer)
    }

    fn refresh(&mut self, history: &[String]) {
        let needle = self.query.to_lowercase();
        self.matches = history
            .iter()
            .rev()
            .filter(|entry| entry.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        self.index = 0;
    }
}
