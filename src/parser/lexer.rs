//! Lexer for Command Lines
//!
//! The lexer tokenizes input into a stream of tokens that the parser
//! consumes. It handles:
//! - Operators and separators (`|`, `&&`, `||`, `;`, `&`, newline)
//! - Redirection operators, including fd-prefixed forms (`2>`, `2>>`, `n>&m`)
//! - Words with quoting rules (single, double, backslash escapes)
//! - Line continuation (`\` before newline splices lines)
//! - Comments (`#` outside quotes until newline)
//! - Here-document bodies (collected up to the delimiter line)
//!
//! Substitution syntax (`$(...)`, `${...}`, backticks, `$((...))`) is kept
//! intact inside word text; the expansion engine interprets it later.

use crate::ast::{QuoteKind, RedirKind, Word, WordPart};
use crate::error::ShellError;

/// Redirection operator recognized by the lexer. File and here-string
/// operators take the next `Word` token as their operand.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirOp {
    /// `<`, `>`, `>>`, `2>`, `2>>`, `&>`, `&>>`
    File { kind: RedirKind },
    /// `n>&m` or `n>&-`
    Dup { fd: i32, target: Option<i32> },
    /// `<<DELIM` / `<<-DELIM`; `content` is filled in when the body lines
    /// have been consumed.
    HereDoc { delimiter: String, strip_tabs: bool, content: String },
    /// `<<<`
    HereString,
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    Pipe,
    AndAnd,
    OrOr,
    Semi,
    Amp,
    Newline,
    Redirect(RedirOp),
}

/// Word-terminating metacharacters outside quotes.
fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '<' | '>')
}

struct PendingHeredoc {
    token_index: usize,
    delimiter: String,
    strip_tabs: bool,
}

/// Tokenizer state machine.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHeredoc>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
            pending_heredocs: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Tokenize the entire input. Here-doc bodies are consumed from the
    /// lines following their operator and stored in the `HereDoc` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ShellError> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' => {
                    self.pos += 1;
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    // Line continuation: splice before any operator logic.
                    self.pos += 2;
                }
                '\\' if self.peek_at(1).is_none() => {
                    return Err(ShellError::Parse(
                        "unterminated line continuation".to_string(),
                    ));
                }
                '\n' => {
                    self.pos += 1;
                    self.collect_heredoc_bodies()?;
                    self.tokens.push(Token::Newline);
                }
                '#' => {
                    // Comment until newline; `#` mid-word is handled in
                    // read_word and never reaches here.
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '|' => {
                    self.pos += 1;
                    if self.peek() == Some('|') {
                        self.pos += 1;
                        self.tokens.push(Token::OrOr);
                    } else {
                        self.tokens.push(Token::Pipe);
                    }
                }
                '&' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('&') => {
                            self.pos += 1;
                            self.tokens.push(Token::AndAnd);
                        }
                        Some('>') => {
                            self.pos += 1;
                            let append = self.peek() == Some('>');
                            if append {
                                self.pos += 1;
                            }
                            self.tokens.push(Token::Redirect(RedirOp::File {
                                kind: RedirKind::Both { append },
                            }));
                        }
                        _ => self.tokens.push(Token::Amp),
                    }
                }
                ';' => {
                    self.pos += 1;
                    self.tokens.push(Token::Semi);
                }
                '<' => self.lex_less()?,
                '>' => self.lex_great(1)?,
                c if c.is_ascii_digit() && self.fd_prefix_ahead() => {
                    let fd = self.read_fd_number()?;
                    self.lex_great(fd)?;
                }
                _ => {
                    let word = self.read_word()?;
                    self.tokens.push(Token::Word(word));
                }
            }
        }

        if !self.pending_heredocs.is_empty() {
            // End of input inside a here-doc body.
            self.collect_heredoc_bodies()?;
        }

        Ok(self.tokens)
    }

    /// True when the digits at the cursor are immediately followed by a
    /// redirection operator, making them an fd prefix rather than a word.
    fn fd_prefix_ahead(&self) -> bool {
        let mut i = 0;
        while self.peek_at(i).map_or(false, |c| c.is_ascii_digit()) {
            i += 1;
        }
        i > 0 && self.peek_at(i) == Some('>')
    }

    fn read_fd_number(&mut self) -> Result<i32, ShellError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        digits
            .parse::<i32>()
            .map_err(|_| ShellError::Parse(format!("invalid file descriptor: {}", digits)))
    }

    /// `<`, `<<`, `<<-`, `<<<`
    fn lex_less(&mut self) -> Result<(), ShellError> {
        self.pos += 1; // consume '<'
        if self.peek() == Some('<') {
            self.pos += 1;
            if self.peek() == Some('<') {
                self.pos += 1;
                self.tokens.push(Token::Redirect(RedirOp::HereString));
                return Ok(());
            }
            let strip_tabs = self.peek() == Some('-');
            if strip_tabs {
                self.pos += 1;
            }
            let delimiter = self.read_heredoc_delimiter()?;
            self.tokens.push(Token::Redirect(RedirOp::HereDoc {
                delimiter: delimiter.clone(),
                strip_tabs,
                content: String::new(),
            }));
            self.pending_heredocs.push(PendingHeredoc {
                token_index: self.tokens.len() - 1,
                delimiter,
                strip_tabs,
            });
        } else {
            self.tokens
                .push(Token::Redirect(RedirOp::File { kind: RedirKind::Input }));
        }
        Ok(())
    }

    /// `>`, `>>`, and the fd-prefixed `n>`, `n>>`, `n>&m`, `n>&-`.
    /// Called with the cursor on `>` and the fd the operator applies to.
    fn lex_great(&mut self, fd: i32) -> Result<(), ShellError> {
        self.pos += 1; // consume '>'
        match self.peek() {
            Some('>') => {
                self.pos += 1;
                let kind = match fd {
                    1 => RedirKind::Append,
                    2 => RedirKind::ErrorAppend,
                    n => {
                        return Err(ShellError::Parse(format!(
                            "unsupported file descriptor in redirection: {}",
                            n
                        )))
                    }
                };
                self.tokens.push(Token::Redirect(RedirOp::File { kind }));
            }
            Some('&') => {
                self.pos += 1;
                if self.peek() == Some('-') {
                    self.pos += 1;
                    self.tokens
                        .push(Token::Redirect(RedirOp::Dup { fd, target: None }));
                } else if self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    let target = self.read_fd_number()?;
                    self.tokens
                        .push(Token::Redirect(RedirOp::Dup { fd, target: Some(target) }));
                } else {
                    return Err(ShellError::Parse(
                        "expected file descriptor or '-' after '>&'".to_string(),
                    ));
                }
            }
            _ => {
                let kind = match fd {
                    1 => RedirKind::Output,
                    2 => RedirKind::Error,
                    n => {
                        return Err(ShellError::Parse(format!(
                            "unsupported file descriptor in redirection: {}",
                            n
                        )))
                    }
                };
                self.tokens.push(Token::Redirect(RedirOp::File { kind }));
            }
        }
        Ok(())
    }

    /// Read the delimiter word after `<<` / `<<-`. Quotes around the
    /// delimiter are accepted and stripped.
    fn read_heredoc_delimiter(&mut self) -> Result<String, ShellError> {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
        let mut delim = String::new();
        match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                while let Some(c) = self.advance() {
                    if c == q {
                        break;
                    }
                    delim.push(c);
                }
            }
            _ => {
                while let Some(c) = self.peek() {
                    if is_metachar(c) {
                        break;
                    }
                    delim.push(c);
                    self.pos += 1;
                }
            }
        }
        if delim.is_empty() {
            return Err(ShellError::Parse("missing here-document delimiter".to_string()));
        }
        Ok(delim)
    }

    /// After a newline, consume the body lines of any pending here-docs,
    /// in operator order. The delimiter line must be exact and alone;
    /// `<<-` strips leading tabs (only tabs) from body and delimiter lines.
    fn collect_heredoc_bodies(&mut self) -> Result<(), ShellError> {
        let pending: Vec<PendingHeredoc> = self.pending_heredocs.drain(..).collect();
        for heredoc in pending {
            let mut content = String::new();
            let mut terminated = false;
            while self.pos < self.chars.len() {
                let mut line = String::new();
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    line.push(c);
                    self.pos += 1;
                }
                let had_newline = self.peek() == Some('\n');
                if had_newline {
                    self.pos += 1;
                }
                let check = if heredoc.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if check == heredoc.delimiter {
                    terminated = true;
                    break;
                }
                if heredoc.strip_tabs {
                    content.push_str(line.trim_start_matches('\t'));
                } else {
                    content.push_str(&line);
                }
                content.push('\n');
                if !had_newline {
                    break;
                }
            }
            if !terminated {
                return Err(ShellError::Parse(format!(
                    "unterminated here-document (expecting `{}`)",
                    heredoc.delimiter
                )));
            }
            if let Some(Token::Redirect(RedirOp::HereDoc { content: slot, .. })) =
                self.tokens.get_mut(heredoc.token_index)
            {
                *slot = content;
            }
        }
        Ok(())
    }

    /// Read one word, building quote-aware parts. Substitution spans
    /// (`$(..)`, `${..}`, `$((..))`, backticks) are kept whole so their
    /// inner metacharacters do not terminate the word.
    fn read_word(&mut self) -> Result<Word, ShellError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut text = String::new();
        let mut quote = QuoteKind::None;

        fn flush(parts: &mut Vec<WordPart>, text: &mut String, quote: QuoteKind) {
            if !text.is_empty() {
                parts.push(WordPart { text: std::mem::take(text), quote });
            }
        }

        // Track whether this word saw an opening quote at all, so `""` and
        // `''` produce an (empty) quoted part instead of nothing.
        let mut saw_quote: Option<QuoteKind> = None;

        while let Some(c) = self.peek() {
            match c {
                c if is_metachar(c) => break,
                '\'' => {
                    flush(&mut parts, &mut text, quote);
                    quote = QuoteKind::Single;
                    saw_quote = Some(quote);
                    self.pos += 1;
                    loop {
                        match self.advance() {
                            Some('\'') => break,
                            Some(ch) => text.push(ch),
                            None => {
                                return Err(ShellError::Parse(
                                    "unterminated single quote".to_string(),
                                ))
                            }
                        }
                    }
                    flush(&mut parts, &mut text, quote);
                    // An empty quoted span still contributes a part.
                    if parts.last().map_or(true, |p| p.quote != QuoteKind::Single) {
                        parts.push(WordPart { text: String::new(), quote: QuoteKind::Single });
                    }
                    quote = QuoteKind::None;
                }
                '"' => {
                    flush(&mut parts, &mut text, quote);
                    quote = QuoteKind::Double;
                    saw_quote = Some(quote);
                    self.pos += 1;
                    self.read_double_quoted(&mut text)?;
                    flush(&mut parts, &mut text, quote);
                    if parts.last().map_or(true, |p| p.quote != QuoteKind::Double) {
                        parts.push(WordPart { text: String::new(), quote: QuoteKind::Double });
                    }
                    quote = QuoteKind::None;
                }
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('\n') => {
                            // Continuation inside a word joins the halves.
                            self.pos += 1;
                        }
                        Some(ch) => {
                            // Escaped characters behave like single-quoted
                            // text: literal, never expanded.
                            flush(&mut parts, &mut text, quote);
                            self.pos += 1;
                            let mut escaped = String::new();
                            escaped.push(ch);
                            match parts.last_mut() {
                                Some(p) if p.quote == QuoteKind::Single => {
                                    p.text.push(ch);
                                }
                                _ => parts.push(WordPart {
                                    text: escaped,
                                    quote: QuoteKind::Single,
                                }),
                            }
                        }
                        None => {
                            return Err(ShellError::Parse(
                                "unterminated line continuation".to_string(),
                            ))
                        }
                    }
                }
                '$' => {
                    text.push('$');
                    self.pos += 1;
                    match self.peek() {
                        Some('(') => self.read_paren_span(&mut text)?,
                        Some('{') => self.read_brace_span(&mut text)?,
                        _ => {}
                    }
                }
                '`' => {
                    self.pos += 1;
                    text.push('`');
                    loop {
                        match self.advance() {
                            Some('`') => {
                                text.push('`');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => {
                                return Err(ShellError::Parse(
                                    "unterminated backquote substitution".to_string(),
                                ))
                            }
                        }
                    }
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        flush(&mut parts, &mut text, quote);
        if parts.is_empty() {
            if let Some(q) = saw_quote {
                parts.push(WordPart { text: String::new(), quote: q });
            }
        }
        Ok(Word { parts })
    }

    /// Consume a `$(...)`-style span (including `$((...))`), tracking
    /// nesting, appending the raw text. Cursor is on the opening paren.
    fn read_paren_span(&mut self, text: &mut String) -> Result<(), ShellError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => {
                    depth += 1;
                    text.push(c);
                    self.pos += 1;
                }
                ')' => {
                    depth -= 1;
                    text.push(c);
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                '\'' => {
                    text.push(c);
                    self.pos += 1;
                    loop {
                        match self.advance() {
                            Some('\'') => {
                                text.push('\'');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => {
                                return Err(ShellError::Parse(
                                    "unterminated single quote".to_string(),
                                ))
                            }
                        }
                    }
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
        Err(ShellError::Parse("unterminated command substitution".to_string()))
    }

    /// Consume a `${...}` span, tracking brace nesting.
    fn read_brace_span(&mut self, text: &mut String) -> Result<(), ShellError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            text.push(c);
            self.pos += 1;
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ShellError::Parse("unterminated parameter expansion".to_string()))
    }

    /// Body of a double-quoted string. `\` escapes `"`, `$`, backtick and
    /// `\`; `\<newline>` splices; substitution spans are kept whole so a
    /// `"` inside `$(...)` does not close the string.
    fn read_double_quoted(&mut self, text: &mut String) -> Result<(), ShellError> {
        loop {
            match self.advance() {
                Some('"') => return Ok(()),
                Some('\\') => match self.advance() {
                    Some('\n') => {}
                    Some(ch @ ('"' | '$' | '`' | '\\')) => text.push(ch),
                    Some(ch) => {
                        text.push('\\');
                        text.push(ch);
                    }
                    None => {
                        return Err(ShellError::Parse(
                            "unterminated double quote".to_string(),
                        ))
                    }
                },
                Some('$') => {
                    text.push('$');
                    if self.peek() == Some('(') {
                        self.read_paren_span(text)?;
                    } else if self.peek() == Some('{') {
                        self.read_brace_span(text)?;
                    }
                }
                Some('`') => {
                    text.push('`');
                    loop {
                        match self.advance() {
                            Some('`') => {
                                text.push('`');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => {
                                return Err(ShellError::Parse(
                                    "unterminated backquote substitution".to_string(),
                                ))
                            }
                        }
                    }
                }
                Some(ch) => text.push(ch),
                None => {
                    return Err(ShellError::Parse("unterminated double quote".to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap()
    }

    fn word_texts(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Word(w) => Some(w.flat_text()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_words() {
        let tokens = lex("echo hello world");
        assert_eq!(word_texts(&tokens), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_operators() {
        let tokens = lex("a | b && c || d ; e &");
        let ops: Vec<&Token> = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Word(_)))
            .collect();
        assert_eq!(
            ops,
            vec![&Token::Pipe, &Token::AndAnd, &Token::OrOr, &Token::Semi, &Token::Amp]
        );
    }

    #[test]
    fn test_single_quotes_are_literal() {
        let tokens = lex("echo '$HOME | x'");
        match &tokens[1] {
            Token::Word(w) => {
                assert_eq!(w.flat_text(), "$HOME | x");
                assert!(w.is_fully_single_quoted());
            }
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn test_double_quotes_keep_dollar() {
        let tokens = lex(r#"echo "hi $USER""#);
        match &tokens[1] {
            Token::Word(w) => {
                assert_eq!(w.flat_text(), "hi $USER");
                assert_eq!(w.parts[0].quote, QuoteKind::Double);
            }
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn test_escaped_dollar_is_literal() {
        let tokens = lex(r"echo \$HOME");
        match &tokens[1] {
            Token::Word(w) => {
                assert_eq!(w.flat_text(), "$HOME");
                assert_eq!(w.parts[0].quote, QuoteKind::Single);
            }
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_quote_parts() {
        let tokens = lex(r#"echo pre"$MID"'post'"#);
        match &tokens[1] {
            Token::Word(w) => {
                assert_eq!(w.parts.len(), 3);
                assert_eq!(w.parts[0].quote, QuoteKind::None);
                assert_eq!(w.parts[1].quote, QuoteKind::Double);
                assert_eq!(w.parts[2].quote, QuoteKind::Single);
            }
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_quotes_produce_empty_part() {
        let tokens = lex(r#"echo """#);
        match &tokens[1] {
            Token::Word(w) => {
                assert_eq!(w.flat_text(), "");
                assert_eq!(w.parts.len(), 1);
            }
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn test_comment_skipped() {
        let tokens = lex("echo hi # a comment | not a pipe");
        assert_eq!(word_texts(&tokens), vec!["echo", "hi"]);
        assert!(!tokens.contains(&Token::Pipe));
    }

    #[test]
    fn test_hash_inside_word_is_literal() {
        let tokens = lex("echo foo#bar");
        assert_eq!(word_texts(&tokens), vec!["echo", "foo#bar"]);
    }

    #[test]
    fn test_line_continuation_splices() {
        let tokens = lex("echo foo \\\nbar");
        assert_eq!(word_texts(&tokens), vec!["echo", "foo", "bar"]);
        assert!(!tokens.contains(&Token::Newline));
    }

    #[test]
    fn test_continuation_inside_word() {
        let tokens = lex("echo fo\\\no");
        assert_eq!(word_texts(&tokens), vec!["echo", "foo"]);
    }

    #[test]
    fn test_redirections() {
        let tokens = lex("cmd < in > out 2> err >> log");
        let redirs: Vec<&RedirOp> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Redirect(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(redirs.len(), 4);
        assert_eq!(redirs[0], &RedirOp::File { kind: RedirKind::Input });
        assert_eq!(redirs[1], &RedirOp::File { kind: RedirKind::Output });
        assert_eq!(redirs[2], &RedirOp::File { kind: RedirKind::Error });
        assert_eq!(redirs[3], &RedirOp::File { kind: RedirKind::Append });
    }

    #[test]
    fn test_fd_dup_and_close() {
        let tokens = lex("cmd 2>&1 3>&-");
        let redirs: Vec<&RedirOp> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Redirect(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(redirs[0], &RedirOp::Dup { fd: 2, target: Some(1) });
        assert_eq!(redirs[1], &RedirOp::Dup { fd: 3, target: None });
    }

    #[test]
    fn test_both_redirect() {
        let tokens = lex("cmd &> all &>> all2");
        let redirs: Vec<&RedirOp> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Redirect(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(redirs[0], &RedirOp::File { kind: RedirKind::Both { append: false } });
        assert_eq!(redirs[1], &RedirOp::File { kind: RedirKind::Both { append: true } });
    }

    #[test]
    fn test_digit_word_is_not_fd() {
        let tokens = lex("echo 2 foo");
        assert_eq!(word_texts(&tokens), vec!["echo", "2", "foo"]);
    }

    #[test]
    fn test_word_glued_to_redirect() {
        let tokens = lex("echo2>f");
        assert_eq!(word_texts(&tokens), vec!["echo2", "f"]);
        assert!(tokens
            .iter()
            .any(|t| matches!(t, Token::Redirect(RedirOp::File { kind: RedirKind::Output }))));
    }

    #[test]
    fn test_heredoc_body_collection() {
        let tokens = lex("cat <<EOF\nline one\nline two\nEOF\n");
        let heredoc = tokens
            .iter()
            .find_map(|t| match t {
                Token::Redirect(RedirOp::HereDoc { delimiter, content, strip_tabs }) => {
                    Some((delimiter.clone(), content.clone(), *strip_tabs))
                }
                _ => None,
            })
            .expect("heredoc token");
        assert_eq!(heredoc.0, "EOF");
        assert_eq!(heredoc.1, "line one\nline two\n");
        assert!(!heredoc.2);
    }

    #[test]
    fn test_heredoc_strip_tabs() {
        let tokens = lex("cat <<-EOF\n\t\tindented\n\tEOF\n");
        let content = tokens
            .iter()
            .find_map(|t| match t {
                Token::Redirect(RedirOp::HereDoc { content, .. }) => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(content, "indented\n");
    }

    #[test]
    fn test_heredoc_spaces_not_stripped() {
        let tokens = lex("cat <<-EOF\n  spaces stay\nEOF\n");
        let content = tokens
            .iter()
            .find_map(|t| match t {
                Token::Redirect(RedirOp::HereDoc { content, .. }) => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(content, "  spaces stay\n");
    }

    #[test]
    fn test_heredoc_delimiter_must_be_alone() {
        let tokens = lex("cat <<EOF\nEOF extra\nEOF\n");
        let content = tokens
            .iter()
            .find_map(|t| match t {
                Token::Redirect(RedirOp::HereDoc { content, .. }) => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(content, "EOF extra\n");
    }

    #[test]
    fn test_unterminated_heredoc_errors() {
        let err = Lexer::new("cat <<EOF\nno end").tokenize().unwrap_err();
        assert!(err.to_string().contains("unterminated here-document"));
    }

    #[test]
    fn test_here_string() {
        let tokens = lex("cat <<< hello");
        assert!(tokens.contains(&Token::Redirect(RedirOp::HereString)));
    }

    #[test]
    fn test_command_substitution_kept_whole() {
        let tokens = lex("echo $(ls | wc -l)");
        assert_eq!(word_texts(&tokens), vec!["echo", "$(ls | wc -l)"]);
        assert!(!tokens.contains(&Token::Pipe));
    }

    #[test]
    fn test_nested_command_substitution() {
        let tokens = lex("echo $(echo $(echo hi))");
        assert_eq!(word_texts(&tokens), vec!["echo", "$(echo $(echo hi))"]);
    }

    #[test]
    fn test_parameter_braces_kept_whole() {
        let tokens = lex("echo ${FOO:-a b}");
        assert_eq!(word_texts(&tokens), vec!["echo", "${FOO:-a b}"]);
    }

    #[test]
    fn test_backticks_kept_whole() {
        let tokens = lex("echo `date +%s`");
        assert_eq!(word_texts(&tokens), vec!["echo", "`date +%s`"]);
    }

    #[test]
    fn test_quote_inside_substitution_does_not_close_string() {
        let tokens = lex(r#"echo "$(echo "inner")""#);
        match &tokens[1] {
            Token::Word(w) => assert_eq!(w.flat_text(), r#"$(echo "inner")"#),
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_quote_errors() {
        assert!(Lexer::new("echo 'oops").tokenize().is_err());
        assert!(Lexer::new("echo \"oops").tokenize().is_err());
    }
}
