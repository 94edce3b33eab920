//! Word Expansion Engine
//!
//! Applied after parse, before spawn, per word. Order of operations:
//!
//! 1. history refs (`!!`, `!n`, `!prefix`) — unquoted text only
//! 2. tilde at the start of the word
//! 3. parameter expansion and arithmetic
//! 4. command substitution (sandboxed by default)
//! 5. IFS word splitting — unquoted results only
//! 6. pathname expansion — unquoted results only
//!
//! The [`Expander`] borrows everything it needs from the shell for the
//! duration of one command's expansion; it owns nothing.

pub mod arithmetic;
pub mod cache;
pub mod command_sub;
pub mod history_sub;
pub mod parameter;
pub mod tilde;
pub mod words;

use std::collections::HashMap;

use crate::ast::{QuoteKind, Word};
use crate::error::ExpansionError;
use crate::history::HistoryStore;

pub use cache::{resolve_executable, ExpansionCaches, LruCache};
pub use command_sub::{SubstitutionHost, SubstitutionMode, SubstitutionPolicy};

/// Special parameters the expansion scanner resolves outside the
/// environment map.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialVars {
    /// `$?`
    pub last_exit: i32,
    /// `$$`
    pub shell_pid: u32,
    /// `$!`
    pub last_bg_pid: Option<u32>,
}

/// One-command expansion context. Borrows shell state; see module docs.
pub struct Expander<'a> {
    pub env: &'a HashMap<String, String>,
    pub cwd: &'a str,
    pub nounset: bool,
    pub noglob: bool,
    pub special: SpecialVars,
    pub history: Option<&'a HistoryStore>,
    pub caches: &'a mut ExpansionCaches,
    pub policy: &'a SubstitutionPolicy,
    pub host: Option<&'a mut dyn SubstitutionHost>,
}

impl<'a> Expander<'a> {
    /// Expand one word into zero or more fields.
    pub fn expand_word(&mut self, word: &Word) -> Result<Vec<String>, ExpansionError> {
        let text = self.expand_parts(word)?;
        if word.is_quoted() {
            // Quoted words are never split or globbed; an empty quoted
            // word is still one (empty) field.
            return Ok(vec![text]);
        }
        let ifs = self
            .env
            .get("IFS")
            .cloned()
            .unwrap_or_else(|| words::DEFAULT_IFS.to_string());
        let fields = words::split_fields(&text, &ifs, &mut self.caches.args);
        if self.noglob {
            return Ok(fields);
        }
        Ok(fields
            .iter()
            .flat_map(|field| words::glob_field(field, self.cwd))
            .collect())
    }

    /// Expand a word to exactly one string (redirection targets, here-
    /// string bodies): no splitting, no globbing.
    pub fn expand_to_string(&mut self, word: &Word) -> Result<String, ExpansionError> {
        self.expand_parts(word)
    }

    /// Expand a full argv; empty unquoted expansions vanish.
    pub fn expand_words(&mut self, words: &[Word]) -> Result<Vec<String>, ExpansionError> {
        let mut out = Vec::new();
        for word in words {
            out.extend(self.expand_word(word)?);
        }
        Ok(out)
    }

    /// Steps 1–4 over each part, honoring its quoting.
    fn expand_parts(&mut self, word: &Word) -> Result<String, ExpansionError> {
        let mut text = String::new();
        for (index, part) in word.parts.iter().enumerate() {
            match part.quote {
                QuoteKind::Single => text.push_str(&part.text),
                QuoteKind::Double => {
                    text.push_str(&parameter::expand_text(self, &part.text)?)
                }
                QuoteKind::None => {
                    let mut piece = part.text.clone();
                    if let Some(history) = self.history {
                        if history_sub::has_history_ref(&piece) {
                            piece = history_sub::expand_history_refs(&piece, history)?;
                        }
                    }
                    if index == 0 {
                        piece = tilde::expand_tilde(&piece, self.env);
                    }
                    text.push_str(&parameter::expand_text(self, &piece)?);
                }
            }
        }
        Ok(text)
    }
}
