//! Suggestion Overlay
//!
//! Holds the completion groups the editor is displaying, the selection,
//! and the two-dimensional navigation over grouped results:
//!
//! - Left/Right move within the current group, wrapping row-major.
//! - Down moves down a row within the group, else crosses to the next
//!   group preserving the column (clamped).
//! - Up crosses rows/groups the other way, clamping to the last row.
//!
//! Also computes the inline ghost suffix and merges history matches as a
//! trailing "History" group.

use crate::complete::{CompletionGroup, CompletionItem, ItemKind};
use crate::editor::display::display_width;

/// Grid shape of one group at the current terminal width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupLayout {
    pub columns: usize,
    pub rows: usize,
}

/// Selection and display state for the overlay.
#[derive(Default)]
pub struct SuggestionState {
    groups: Vec<CompletionGroup>,
    visible: bool,
    selected: Option<(usize, usize)>,
    term_width: usize,
    /// One-shot suppression of the history merge.
    pub suppress_history_once: bool,
}

impl SuggestionState {
    pub fn new(term_width: usize) -> Self {
        Self { term_width: term_width.max(1), ..Default::default() }
    }

    pub fn set_term_width(&mut self, width: usize) {
        self.term_width = width.max(1);
    }

    /// Install fresh groups; selection moves to the first item.
    pub fn set_groups(&mut self, groups: Vec<CompletionGroup>) {
        self.groups = groups;
        self.selected = self
            .groups
            .iter()
            .position(|group| !group.items.is_empty())
            .map(|group_index| (group_index, 0));
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.selected = None;
        self.visible = false;
    }

    pub fn groups(&self) -> &[CompletionGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|group| group.items.is_empty())
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn selected(&self) -> Option<(usize, usize)> {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&CompletionItem> {
        let (group, item) = self.selected?;
        self.groups.get(group)?.items.get(item)
    }

    /// Grid layout of a group from the terminal width.
    pub fn layout(&self, group_index: usize) -> GroupLayout {
        let group = match self.groups.get(group_index) {
            Some(group) if !group.items.is_empty() => group,
            _ => return GroupLayout { columns: 1, rows: 0 },
        };
        let cell = group
            .items
            .iter()
            .map(|item| display_width(&item.text))
            .max()
            .unwrap_or(1)
            + 2;
        let columns = (self.term_width / cell).max(1);
        let rows = group.items.len().div_ceil(columns);
        GroupLayout { columns, rows }
    }

    /// Right: next item in the group, wrapping row-major.
    pub fn move_right(&mut self) {
        if let Some((group, item)) = self.selected {
            let len = self.groups[group].items.len();
            self.selected = Some((group, (item + 1) % len));
        }
    }

    /// Left: previous item in the group, wrapping row-major.
    pub fn move_left(&mut self) {
        if let Some((group, item)) = self.selected {
            let len = self.groups[group].items.len();
            self.selected = Some((group, (item + len - 1) % len));
        }
    }

    /// Down: next row in the group, else first row of the next group,
    /// preserving the column (clamped).
    pub fn move_down(&mut self) {
        let (group, item) = match self.selected {
            Some(selection) => selection,
            None => return,
        };
        let layout = self.layout(group);
        let len = self.groups[group].items.len();
        let column = item % layout.columns;

        if item + layout.columns < len {
            self.selected = Some((group, item + layout.columns));
            return;
        }
        // Clamped move into a shorter final row of the same group.
        let row = item / layout.columns;
        if row + 1 < layout.rows {
            self.selected = Some((group, len - 1));
            return;
        }
        if let Some(next) = self.next_nonempty_group(group) {
            let next_layout = self.layout(next);
            let next_len = self.groups[next].items.len();
            let target = column.min(next_layout.columns - 1).min(next_len - 1);
            self.selected = Some((next, target));
        }
    }

    /// Up: previous row in the group, else the last row of the previous
    /// group, preserving the column (clamped to that row's width).
    pub fn move_up(&mut self) {
        let (group, item) = match self.selected {
            Some(selection) => selection,
            None => return,
        };
        let layout = self.layout(group);
        let column = item % layout.columns;

        if item >= layout.columns {
            self.selected = Some((group, item - layout.columns));
            return;
        }
        if let Some(prev) = self.prev_nonempty_group(group) {
            let prev_layout = self.layout(prev);
            let prev_len = self.groups[prev].items.len();
            let last_row_start = (prev_layout.rows - 1) * prev_layout.columns;
            let target = (last_row_start + column.min(prev_layout.columns - 1)).min(prev_len - 1);
            self.selected = Some((prev, target));
        }
    }

    fn next_nonempty_group(&self, from: usize) -> Option<usize> {
        (from + 1..self.groups.len()).find(|&index| !self.groups[index].items.is_empty())
    }

    fn prev_nonempty_group(&self, from: usize) -> Option<usize> {
        (0..from).rev().find(|&index| !self.groups[index].items.is_empty())
    }

    /// Ghost suffix for the inline suggestion: the selected item's tail
    /// beyond the word being typed.
    pub fn ghost_suffix(&self, word: &str) -> Option<String> {
        let item = self.selected_item()?;
        if word.is_empty() || !item.text.starts_with(word) || item.text == word {
            return None;
        }
        Some(item.text[word.len()..].to_string())
    }

    /// Append matching history entries as a trailing "History" group when
    /// there is room under `max`. Suppressed for `cd` lines and by the
    /// one-shot flag; deduped against existing labels.
    pub fn merge_history(&mut self, matches: &[String], max: usize, line: &str) {
        if self.suppress_history_once {
            self.suppress_history_once = false;
            return;
        }
        if line.trim_start().starts_with("cd ") {
            return;
        }
        let existing: usize = self.groups.iter().map(|group| group.items.len()).sum();
        if existing >= max {
            return;
        }
        let labels: std::collections::HashSet<String> = self
            .groups
            .iter()
            .flat_map(|group| group.items.iter().map(|item| item.text.clone()))
            .collect();
        let items: Vec<CompletionItem> = matches
            .iter()
            .filter(|entry| !labels.contains(*entry))
            .take(max - existing)
            .map(|entry| CompletionItem::new(entry.clone(), ItemKind::History))
            .collect();
        if items.is_empty() {
            return;
        }
        let had_selection = self.selected.is_some();
        self.groups.push(CompletionGroup::titled("History", items));
        if !had_selection {
            self.selected = Some((self.groups.len() - 1, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<CompletionItem> {
        names
            .iter()
            .map(|name| CompletionItem::new(*name, ItemKind::Other))
            .collect()
    }

    /// Two groups laid out on a 40-column terminal: items are 8 wide, so
    /// cells are 10 and each group has 4 columns.
    fn two_group_state() -> SuggestionState {
        let mut state = SuggestionState::new(40);
        state.set_groups(vec![
            CompletionGroup::titled(
                "Commands",
                items(&[
                    "cmd-0000", "cmd-0001", "cmd-0002", "cmd-0003", "cmd-0004", "cmd-0005",
                ]),
            ),
            CompletionGroup::titled("Files", items(&["fil-0000", "fil-0001", "fil-0002"])),
        ]);
        state
    }

    #[test]
    fn test_layout_grid() {
        let state = two_group_state();
        let layout = state.layout(0);
        assert_eq!(layout.columns, 4);
        assert_eq!(layout.rows, 2);
        let layout = state.layout(1);
        assert_eq!(layout.columns, 4);
        assert_eq!(layout.rows, 1);
    }

    #[test]
    fn test_initial_selection() {
        let state = two_group_state();
        assert_eq!(state.selected(), Some((0, 0)));
    }

    #[test]
    fn test_left_right_wrap_within_group() {
        let mut state = two_group_state();
        state.move_left();
        assert_eq!(state.selected(), Some((0, 5)), "wraps to the group's last item");
        state.move_right();
        assert_eq!(state.selected(), Some((0, 0)));
        state.move_right();
        assert_eq!(state.selected(), Some((0, 1)));
    }

    #[test]
    fn test_down_within_group_rows() {
        let mut state = two_group_state();
        state.move_right(); // (0,1)
        state.move_down();
        assert_eq!(state.selected(), Some((0, 5)), "column 1 on row 1");
    }

    #[test]
    fn test_down_clamps_to_short_row() {
        let mut state = two_group_state();
        for _ in 0..3 {
            state.move_right();
        }
        assert_eq!(state.selected(), Some((0, 3)));
        state.move_down();
        // Row 1 has items 4..=5 only; column 3 clamps to the last item.
        assert_eq!(state.selected(), Some((0, 5)));
    }

    #[test]
    fn test_down_crosses_group_preserving_column() {
        let mut state = two_group_state();
        // Move to (0,5): row 1, column 1.
        state.move_right();
        state.move_down();
        assert_eq!(state.selected(), Some((0, 5)));
        state.move_down();
        assert_eq!(state.selected(), Some((1, 1)), "column 1 in the next group");
    }

    #[test]
    fn test_down_at_bottom_stays() {
        let mut state = two_group_state();
        state.move_down();
        state.move_down(); // into group 1
        let at_bottom = state.selected();
        state.move_down();
        assert_eq!(state.selected(), at_bottom);
    }

    #[test]
    fn test_up_crosses_group_to_last_row() {
        let mut state = two_group_state();
        state.move_down();
        state.move_down();
        assert_eq!(state.selected(), Some((1, 0)));
        state.move_up();
        // Back into group 0's last row (items 4..=5), column 0 → item 4.
        assert_eq!(state.selected(), Some((0, 4)));
        state.move_up();
        assert_eq!(state.selected(), Some((0, 0)));
        state.move_up();
        assert_eq!(state.selected(), Some((0, 0)), "top stays put");
    }

    #[test]
    fn test_ghost_suffix() {
        let mut state = SuggestionState::new(80);
        state.set_groups(vec![CompletionGroup::anonymous(items(&["checkout"]))]);
        assert_eq!(state.ghost_suffix("che"), Some("ckout".to_string()));
        assert_eq!(state.ghost_suffix("checkout"), None);
        assert_eq!(state.ghost_suffix(""), None);
        assert_eq!(state.ghost_suffix("x"), None);
    }

    #[test]
    fn test_merge_history_appends_group() {
        let mut state = SuggestionState::new(80);
        state.set_groups(vec![CompletionGroup::anonymous(items(&["git"]))]);
        state.merge_history(
            &["git status".to_string(), "git".to_string()],
            10,
            "gi",
        );
        let history = state.groups().iter().find(|g| g.title == "History").unwrap();
        // "git" is deduped against the existing label.
        assert_eq!(history.items.len(), 1);
        assert_eq!(history.items[0].text, "git status");
        assert_eq!(history.items[0].kind, ItemKind::History);
    }

    #[test]
    fn test_merge_history_respects_max() {
        let mut state = SuggestionState::new(80);
        state.set_groups(vec![CompletionGroup::anonymous(items(&["a", "b", "c"]))]);
        state.merge_history(&["x".to_string(), "y".to_string()], 4, "");
        let history = state.groups().iter().find(|g| g.title == "History").unwrap();
        assert_eq!(history.items.len(), 1, "only one slot under max");

        let mut full = SuggestionState::new(80);
        full.set_groups(vec![CompletionGroup::anonymous(items(&["a", "b"]))]);
        full.merge_history(&["x".to_string()], 2, "");
        assert!(full.groups().iter().all(|g| g.title != "History"));
    }

    #[test]
    fn test_merge_history_suppressed_for_cd() {
        let mut state = SuggestionState::new(80);
        state.set_groups(vec![CompletionGroup::anonymous(items(&["dir/"]))]);
        state.merge_history(&["cd /tmp".to_string()], 10, "cd d");
        assert!(state.groups().iter().all(|g| g.title != "History"));
    }

    #[test]
    fn test_merge_history_one_shot_suppression() {
        let mut state = SuggestionState::new(80);
        state.suppress_history_once = true;
        state.set_groups(vec![CompletionGroup::anonymous(items(&["a"]))]);
        state.merge_history(&["b".to_string()], 10, "");
        assert!(state.groups().iter().all(|g| g.title != "History"));
        // The flag clears after one use.
        state.merge_history(&["b".to_string()], 10, "");
        assert!(state.groups().iter().any(|g| g.title == "History"));
    }

    #[test]
    fn test_empty_groups_have_no_selection() {
        let mut state = SuggestionState::new(80);
        state.set_groups(vec![]);
        assert_eq!(state.selected(), None);
        assert!(state.is_empty());
        state.move_down();
        state.move_left();
        assert_eq!(state.selected(), None);
    }
}
