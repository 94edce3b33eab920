//! History References
//!
//! Expands `!!`, `!n`, and `!prefix` against the history store. Applied
//! first in the per-word expansion order, and only to unquoted word text;
//! the expanded text then flows through the remaining steps (so `sudo !!`
//! word-splits the recalled command as usual).

use crate::error::ExpansionError;
use crate::history::HistoryStore;

/// True if the word text contains a history reference worth expanding.
pub fn has_history_ref(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '!' {
            match chars.get(i + 1) {
                Some('!') => return true,
                Some(c) if c.is_ascii_digit() || c.is_ascii_alphabetic() => return true,
                _ => {}
            }
        }
    }
    false
}

/// Replace history references in one word's text. `!` followed by
/// whitespace, end of word, or `=` is literal, matching interactive-shell
/// conventions.
pub fn expand_history_refs(
    text: &str,
    history: &HistoryStore,
) -> Result<String, ExpansionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '!' {
            out.push(c);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('!') => {
                let last = history
                    .last()
                    .ok_or_else(|| ExpansionError::HistoryNotFound("!!".to_string()))?;
                out.push_str(last);
                i += 2;
            }
            Some(d) if d.is_ascii_digit() => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let number: String = chars[start..end].iter().collect();
                let n: usize = number
                    .parse()
                    .map_err(|_| ExpansionError::HistoryNotFound(format!("!{}", number)))?;
                let entry = history
                    .get(n)
                    .ok_or_else(|| ExpansionError::HistoryNotFound(format!("!{}", number)))?;
                out.push_str(entry);
                i = end;
            }
            Some(a) if a.is_ascii_alphabetic() => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric()
                        || chars[end] == '_'
                        || chars[end] == '-')
                {
                    end += 1;
                }
                let prefix: String = chars[start..end].iter().collect();
                let entry = history
                    .find_prefix(&prefix)
                    .ok_or_else(|| ExpansionError::HistoryNotFound(format!("!{}", prefix)))?;
                out.push_str(entry);
                i = end;
            }
            _ => {
                out.push('!');
                i += 1;
            }
        }
    }
    Ok(out)
}
