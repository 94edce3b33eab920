//! Abstract Syntax Tree (AST) Types for Command Lines
//!
//! A parsed line is a `CommandChain`: pipelines joined by `&&`, `||`, `;`
//! or newline. A `Pipeline` is commands joined by `|`, optionally marked
//! background by a trailing `&`. Words keep their quoting structure so the
//! expansion engine can apply the right rules per part.

use std::fmt;

// =============================================================================
// WORDS
// =============================================================================

/// Quoting applied to a word part. Expansion rules depend on it:
/// single-quoted parts are literal, double-quoted parts expand parameters
/// but are never split or globbed, unquoted parts get the full treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    None,
    Single,
    Double,
}

/// One contiguous run of characters with uniform quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPart {
    pub text: String,
    pub quote: QuoteKind,
}

/// A shell word: one or more parts glued together without whitespace,
/// e.g. `pre"$MID"'post'` has three parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// A single unquoted part.
    pub fn unquoted(text: impl Into<String>) -> Self {
        Self { parts: vec![WordPart { text: text.into(), quote: QuoteKind::None }] }
    }

    /// A single part with the given quoting.
    pub fn quoted(text: impl Into<String>, quote: QuoteKind) -> Self {
        Self { parts: vec![WordPart { text: text.into(), quote }] }
    }

    /// The word flattened to plain text, quoting removed.
    pub fn flat_text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }

    /// True if any part is quoted. Quoted words never word-split or glob.
    pub fn is_quoted(&self) -> bool {
        self.parts.iter().any(|p| p.quote != QuoteKind::None)
    }

    /// True if the entire word is single-quoted (no expansion at all).
    pub fn is_fully_single_quoted(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|p| p.quote == QuoteKind::Single)
    }

    /// Canonical source rendering, re-quoting each part.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part.quote {
                QuoteKind::None => out.push_str(&part.text),
                QuoteKind::Single => {
                    out.push('\'');
                    out.push_str(&part.text);
                    out.push('\'');
                }
                QuoteKind::Double => {
                    out.push('"');
                    out.push_str(&part.text);
                    out.push('"');
                }
            }
        }
        out
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

/// Direction and mode for a file redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirKind {
    /// `<` read file into stdin
    Input,
    /// `>` / `1>` truncating write
    Output,
    /// `>>` / `1>>` append
    Append,
    /// `2>` truncating write on stderr
    Error,
    /// `2>>` append on stderr
    ErrorAppend,
    /// `&>` / `&>>` both stdout and stderr; `append` distinguishes them
    Both { append: bool },
}

impl RedirKind {
    /// The fd this kind writes (or reads, for Input).
    pub fn fd(&self) -> i32 {
        match self {
            RedirKind::Input => 0,
            RedirKind::Output | RedirKind::Append => 1,
            RedirKind::Error | RedirKind::ErrorAppend => 2,
            RedirKind::Both { .. } => 1,
        }
    }

    pub fn is_append(&self) -> bool {
        matches!(
            self,
            RedirKind::Append | RedirKind::ErrorAppend | RedirKind::Both { append: true }
        )
    }

    /// Operator text for rendering.
    pub fn operator(&self) -> &'static str {
        match self {
            RedirKind::Input => "<",
            RedirKind::Output => ">",
            RedirKind::Append => ">>",
            RedirKind::Error => "2>",
            RedirKind::ErrorAppend => "2>>",
            RedirKind::Both { append: false } => "&>",
            RedirKind::Both { append: true } => "&>>",
        }
    }
}

/// One redirection attached to a command. Exactly one direction per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirection {
    /// File-backed redirection: `<`, `>`, `>>`, `2>`, `2>>`, `&>`, `&>>`.
    File { kind: RedirKind, target: Word },
    /// `n>&m` duplicates fd `m` onto `n`; `target: None` is `n>&-` (close).
    FdDup { fd: i32, target: Option<i32> },
    /// `<<DELIM` / `<<-DELIM` with the accumulated body.
    HereDoc { delimiter: String, strip_tabs: bool, content: String },
    /// `<<<word` feeds the word (plus trailing newline) to stdin.
    HereString { word: Word },
}

impl Redirection {
    pub fn render(&self) -> String {
        match self {
            Redirection::File { kind, target } => {
                format!("{} {}", kind.operator(), target.render())
            }
            Redirection::FdDup { fd, target: Some(t) } => format!("{}>&{}", fd, t),
            Redirection::FdDup { fd, target: None } => format!("{}>&-", fd),
            Redirection::HereDoc { delimiter, strip_tabs, .. } => {
                if *strip_tabs {
                    format!("<<-{}", delimiter)
                } else {
                    format!("<<{}", delimiter)
                }
            }
            Redirection::HereString { word } => format!("<<< {}", word.render()),
        }
    }
}

// =============================================================================
// COMMANDS, PIPELINES, CHAINS
// =============================================================================

/// One parsed command invocation: `words[0]` expands to the name, the rest
/// to arguments. Words are kept unexpanded; expansion runs at execute time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub words: Vec<Word>,
    pub redirections: Vec<Redirection>,
    /// Original source text for xtrace and job labels.
    pub raw_text: String,
}

impl Command {
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = self.words.iter().map(Word::render).collect();
        parts.extend(self.redirections.iter().map(Redirection::render));
        parts.join(" ")
    }
}

/// Commands joined by `|`; a trailing `&` marks the whole pipeline
/// background.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub background: bool,
}

impl Pipeline {
    pub fn render(&self) -> String {
        let body = self
            .commands
            .iter()
            .map(Command::render)
            .collect::<Vec<_>>()
            .join(" | ");
        if self.background {
            format!("{} &", body)
        } else {
            body
        }
    }
}

/// Operator joining two pipelines in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOperator {
    /// `&&` — run right iff left exited 0
    And,
    /// `||` — run right iff left exited nonzero
    Or,
    /// `;` or newline — run right unconditionally
    Seq,
}

impl ChainOperator {
    pub fn render(&self) -> &'static str {
        match self {
            ChainOperator::And => "&&",
            ChainOperator::Or => "||",
            ChainOperator::Seq => ";",
        }
    }
}

/// A full parsed input: pipelines joined by chain operators, with
/// short-circuit semantics. `operators.len() == pipelines.len() - 1`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandChain {
    pub pipelines: Vec<Pipeline>,
    pub operators: Vec<ChainOperator>,
}

impl CommandChain {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Canonical debug rendering; `parse(render(parse(x)))` is equivalent
    /// to `parse(x)` for canonical inputs.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, pipeline) in self.pipelines.iter().enumerate() {
            if i > 0 {
                out.push(' ');
                out.push_str(self.operators[i - 1].render());
                out.push(' ');
            }
            out.push_str(&pipeline.render());
        }
        out
    }
}

impl fmt::Display for CommandChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
