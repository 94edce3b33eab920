//! Editor Buffer and Cursor Model
//!
//! The logical text state of the line editor: a buffer of chars and a
//! cursor index in `0..=len`. Multi-line input derives line/column by
//! splitting on `\n`. All operations preserve the cursor invariant.
//!
//! Word motions treat a word as a run of `\w` or `-` characters.
//! Word-left lands on the start of the previous word; word-right lands
//! one past the end of the current (or next) word.

/// Logical buffer + cursor. Indices are char positions, not bytes.
#[derive(Debug, Clone, Default)]
pub struct EditorBuffer {
    chars: Vec<char>,
    cursor: usize,
    /// Goal column preserved across consecutive vertical motions.
    goal_column: Option<usize>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

impl EditorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let cursor = chars.len();
        Self { chars, cursor, goal_column: None }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn char_at(&self, index: usize) -> Option<char> {
        self.chars.get(index).copied()
    }

    /// Replace the whole buffer, cursor at end.
    pub fn set_text(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
        self.goal_column = None;
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.cursor = 0;
        self.goal_column = None;
    }

    pub fn insert_char(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
        self.goal_column = None;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars() {
            self.chars.insert(self.cursor, c);
            self.cursor += 1;
        }
        self.goal_column = None;
    }

    /// Delete the char before the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        self.goal_column = None;
        true
    }

    /// Delete the char under the cursor.
    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.chars.len() {
            return false;
        }
        self.chars.remove(self.cursor);
        self.goal_column = None;
        true
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
        self.goal_column = None;
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.chars.len() {
            self.cursor += 1;
        }
        self.goal_column = None;
    }

    /// Start of the previous word: skip separators, then the word run.
    pub fn move_word_left(&mut self) {
        while self.cursor > 0 && !is_word_char(self.chars[self.cursor - 1]) {
            self.cursor -= 1;
        }
        while self.cursor > 0 && is_word_char(self.chars[self.cursor - 1]) {
            self.cursor -= 1;
        }
        self.goal_column = None;
    }

    /// One past the end of the current/next word: skip separators, then
    /// the word run.
    pub fn move_word_right(&mut self) {
        let len = self.chars.len();
        while self.cursor < len && !is_word_char(self.chars[self.cursor]) {
            self.cursor += 1;
        }
        while self.cursor < len && is_word_char(self.chars[self.cursor]) {
            self.cursor += 1;
        }
        self.goal_column = None;
    }

    /// (line, column) of the cursor, derived by splitting on `\n`.
    pub fn line_col(&self) -> (usize, usize) {
        let mut line = 0;
        let mut col = 0;
        for &c in self.chars.iter().take(self.cursor) {
            if c == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// The buffer's lines as strings.
    pub fn lines(&self) -> Vec<String> {
        self.text().split('\n').map(str::to_string).collect()
    }

    fn line_bounds(&self) -> Vec<(usize, usize)> {
        let mut bounds = Vec::new();
        let mut start = 0;
        for (index, &c) in self.chars.iter().enumerate() {
            if c == '\n' {
                bounds.push((start, index));
                start = index + 1;
            }
        }
        bounds.push((start, self.chars.len()));
        bounds
    }

    /// Move up one line, preserving the goal column, clamped to the
    /// target line's length. Returns false on the first line.
    pub fn move_line_up(&mut self) -> bool {
        let (line, col) = self.line_col();
        if line == 0 {
            return false;
        }
        let goal = *self.goal_column.get_or_insert(col);
        let bounds = self.line_bounds();
        let (start, end) = bounds[line - 1];
        self.cursor = start + goal.min(end - start);
        true
    }

    /// Move down one line, preserving the goal column. Returns false on
    /// the last line.
    pub fn move_line_down(&mut self) -> bool {
        let (line, col) = self.line_col();
        let bounds = self.line_bounds();
        if line + 1 >= bounds.len() {
            return false;
        }
        let goal = *self.goal_column.get_or_insert(col);
        let (start, end) = bounds[line + 1];
        self.cursor = start + goal.min(end - start);
        true
    }

    /// Start of the current line.
    pub fn move_line_start(&mut self) {
        let (line, _) = self.line_col();
        self.cursor = self.line_bounds()[line].0;
        self.goal_column = None;
    }

    /// End of the current line.
    pub fn move_line_end(&mut self) {
        let (line, _) = self.line_col();
        self.cursor = self.line_bounds()[line].1;
        self.goal_column = None;
    }

    /// Kill from the cursor to end of line; returns the killed text.
    pub fn kill_to_end(&mut self) -> String {
        let (line, _) = self.line_col();
        let (_, end) = self.line_bounds()[line];
        let killed: String = self.chars.drain(self.cursor..end).collect();
        self.goal_column = None;
        killed
    }

    /// Kill from start of line to the cursor; returns the killed text.
    pub fn kill_to_start(&mut self) -> String {
        let (line, _) = self.line_col();
        let (start, _) = self.line_bounds()[line];
        let killed: String = self.chars.drain(start..self.cursor).collect();
        self.cursor = start;
        self.goal_column = None;
        killed
    }

    /// Delete the word before the cursor.
    pub fn delete_word_left(&mut self) -> String {
        let end = self.cursor;
        self.move_word_left();
        let start = self.cursor;
        self.chars.drain(start..end).collect()
    }

    /// Delete the word after the cursor.
    pub fn delete_word_right(&mut self) -> String {
        let start = self.cursor;
        let mut probe = self.clone();
        probe.move_word_right();
        let end = probe.cursor;
        self.goal_column = None;
        self.chars.drain(start..end).collect()
    }

    /// The word under construction before the cursor (for completion).
    pub fn word_before_cursor(&self) -> String {
        let mut start = self.cursor;
        while start > 0 {
            let c = self.chars[start - 1];
            if c.is_whitespace() {
                break;
            }
            start -= 1;
        }
        self.chars[start..self.cursor].iter().collect()
    }

    /// Invariant check, used by tests after every operation.
    pub fn cursor_in_bounds(&self) -> bool {
        self.cursor <= self.chars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_text() {
        let mut buffer = EditorBuffer::new();
        buffer.insert_str("hello");
        assert_eq!(buffer.text(), "hello");
        assert_eq!(buffer.cursor(), 5);
        assert!(buffer.cursor_in_bounds());
    }

    #[test]
    fn test_insert_mid_buffer() {
        let mut buffer = EditorBuffer::from_text("held");
        buffer.move_left();
        buffer.insert_char('l');
        assert_eq!(buffer.text(), "helld");
        assert_eq!(buffer.cursor(), 4);
    }

    #[test]
    fn test_backspace_and_delete() {
        let mut buffer = EditorBuffer::from_text("abc");
        assert!(buffer.backspace());
        assert_eq!(buffer.text(), "ab");
        buffer.move_line_start();
        assert!(buffer.delete());
        assert_eq!(buffer.text(), "b");
        assert!(!buffer.backspace(), "backspace at 0 is a no-op");
        assert!(buffer.cursor_in_bounds());
    }

    #[test]
    fn test_horizontal_motion_clamps() {
        let mut buffer = EditorBuffer::from_text("ab");
        buffer.move_right();
        assert_eq!(buffer.cursor(), 2);
        buffer.move_left();
        buffer.move_left();
        buffer.move_left();
        assert_eq!(buffer.cursor(), 0);
        assert!(buffer.cursor_in_bounds());
    }

    #[test]
    fn test_word_motion() {
        let mut buffer = EditorBuffer::from_text("git commit -m message");
        buffer.move_word_left();
        assert_eq!(buffer.cursor(), 14, "start of 'message'");
        buffer.move_word_left();
        // "-m" is a word run because '-' is a word char
        assert_eq!(buffer.cursor(), 11);
        buffer.move_word_right();
        assert_eq!(buffer.cursor(), 13, "end of '-m'");
    }

    #[test]
    fn test_word_motion_skips_punctuation() {
        let mut buffer = EditorBuffer::from_text("a  ..  b");
        buffer.move_line_start();
        buffer.move_word_right();
        assert_eq!(buffer.cursor(), 1);
        buffer.move_word_right();
        assert_eq!(buffer.cursor(), 8, "skips dots and spaces to end of 'b'");
    }

    #[test]
    fn test_line_col_multiline() {
        let mut buffer = EditorBuffer::from_text("one\ntwo\nthree");
        assert_eq!(buffer.line_col(), (2, 5));
        buffer.move_line_start();
        assert_eq!(buffer.line_col(), (2, 0));
    }

    #[test]
    fn test_vertical_motion_preserves_goal_column() {
        let mut buffer = EditorBuffer::from_text("longer line\nab\nanother long");
        // Cursor at end: line 2, col 12.
        assert!(buffer.move_line_up());
        // "ab" clamps to col 2.
        assert_eq!(buffer.line_col(), (1, 2));
        assert!(buffer.move_line_up());
        // Goal column 12 is restored on the longer first line (len 11).
        assert_eq!(buffer.line_col(), (0, 11));
        assert!(!buffer.move_line_up(), "already on first line");
    }

    #[test]
    fn test_vertical_motion_down() {
        let mut buffer = EditorBuffer::from_text("abcdef\nxy\nlonger");
        buffer.move_line_start();
        // To line 0 end.
        while buffer.line_col().0 > 0 {
            buffer.move_line_up();
        }
        buffer.move_line_end();
        assert_eq!(buffer.line_col(), (0, 6));
        assert!(buffer.move_line_down());
        assert_eq!(buffer.line_col(), (1, 2));
        assert!(buffer.move_line_down());
        assert_eq!(buffer.line_col(), (2, 6));
        assert!(!buffer.move_line_down());
    }

    #[test]
    fn test_kill_to_end() {
        let mut buffer = EditorBuffer::from_text("hello world");
        buffer.move_word_left();
        let killed = buffer.kill_to_end();
        assert_eq!(killed, "world");
        assert_eq!(buffer.text(), "hello ");
    }

    #[test]
    fn test_kill_to_start() {
        let mut buffer = EditorBuffer::from_text("hello world");
        buffer.move_word_left();
        let killed = buffer.kill_to_start();
        assert_eq!(killed, "hello ");
        assert_eq!(buffer.text(), "world");
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_kill_respects_line_bounds() {
        let mut buffer = EditorBuffer::from_text("one\ntwo");
        buffer.move_line_start();
        let killed = buffer.kill_to_end();
        assert_eq!(killed, "two");
        assert_eq!(buffer.text(), "one\n");
    }

    #[test]
    fn test_delete_word_left() {
        let mut buffer = EditorBuffer::from_text("git status");
        let killed = buffer.delete_word_left();
        assert_eq!(killed, "status");
        assert_eq!(buffer.text(), "git ");
    }

    #[test]
    fn test_delete_word_right() {
        let mut buffer = EditorBuffer::from_text("git status");
        buffer.move_line_start();
        let killed = buffer.delete_word_right();
        assert_eq!(killed, "git");
        assert_eq!(buffer.text(), " status");
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_word_before_cursor() {
        let buffer = EditorBuffer::from_text("git sta");
        assert_eq!(buffer.word_before_cursor(), "sta");
        let buffer = EditorBuffer::from_text("git ");
        assert_eq!(buffer.word_before_cursor(), "");
    }

    #[test]
    fn test_cursor_invariant_fuzz() {
        let mut buffer = EditorBuffer::new();
        let ops: Vec<fn(&mut EditorBuffer)> = vec![
            |b| b.insert_char('x'),
            |b| {
                b.backspace();
            },
            |b| {
                b.delete();
            },
            |b| b.move_left(),
            |b| b.move_right(),
            |b| b.move_word_left(),
            |b| b.move_word_right(),
            |b| {
                b.move_line_up();
            },
            |b| {
                b.move_line_down();
            },
            |b| b.move_line_start(),
            |b| b.move_line_end(),
            |b| {
                b.kill_to_end();
            },
            |b| {
                b.kill_to_start();
            },
            |b| b.insert_char('\n'),
        ];
        // Deterministic walk over every op from varied states.
        for seed in 0..ops.len() {
            for (step, op) in ops.iter().cycle().skip(seed).take(64).enumerate() {
                op(&mut buffer);
                assert!(
                    buffer.cursor_in_bounds(),
                    "cursor out of bounds after step {} (seed {})",
                    step,
                    seed
                );
            }
        }
    }
}
