//! Parameter Expansion
//!
//! The left-to-right scanner over a word's text that rewrites `$VAR`,
//! `${VAR}`, `${VAR:-default}`, `$((...))`, `$(...)`, backticks, and the
//! special parameters `$?`, `$$`, `$!`. Defaults are expanded recursively.
//!
//! Under `set -u` a reference to an unset variable is an error unless the
//! `:-` default form supplies a fallback.

use crate::error::ExpansionError;
use crate::expansion::arithmetic;
use crate::expansion::command_sub;
use crate::expansion::Expander;

/// Expand every dollar/backtick form in `text`.
pub fn expand_text(expander: &mut Expander, text: &str) -> Result<String, ExpansionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '$' => {
                let (expanded, next) = expand_dollar(expander, &chars, i)?;
                out.push_str(&expanded);
                i = next;
            }
            '`' => {
                match find_closing_backtick(&chars, i + 1) {
                    Some(end) => {
                        let body: String = chars[i + 1..end].iter().collect();
                        out.push_str(&run_substitution(expander, &body)?);
                        i = end + 1;
                    }
                    None => {
                        out.push('`');
                        i += 1;
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Expand one `$`-introduced form starting at `start` (which indexes the
/// `$`). Returns the replacement and the index after the form.
fn expand_dollar(
    expander: &mut Expander,
    chars: &[char],
    start: usize,
) -> Result<(String, usize), ExpansionError> {
    let next = chars.get(start + 1).copied();
    match next {
        // $((expr))
        Some('(') if chars.get(start + 2) == Some(&'(') => {
            let end = find_arith_end(chars, start + 3)?;
            let body: String = chars[start + 3..end].iter().collect();
            let value = eval_arithmetic(expander, &body)?;
            Ok((value.to_string(), end + 2))
        }
        // $(cmd)
        Some('(') => {
            let end = find_matching_paren(chars, start + 2)?;
            let body: String = chars[start + 2..end].iter().collect();
            Ok((run_substitution(expander, &body)?, end + 1))
        }
        // ${...}
        Some('{') => {
            let end = find_matching_brace(chars, start + 2)?;
            let inner: String = chars[start + 2..end].iter().collect();
            Ok((expand_braced(expander, &inner)?, end + 1))
        }
        // Special parameters
        Some('?') => Ok((expander.special.last_exit.to_string(), start + 2)),
        Some('$') => Ok((expander.special.shell_pid.to_string(), start + 2)),
        Some('!') => {
            let text = expander
                .special
                .last_bg_pid
                .map(|pid| pid.to_string())
                .unwrap_or_default();
            Ok((text, start + 2))
        }
        // $NAME
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            let mut end = start + 1;
            while end < chars.len()
                && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
            {
                end += 1;
            }
            let name: String = chars[start + 1..end].iter().collect();
            Ok((lookup(expander, &name)?, end))
        }
        // Lone `$` stays literal.
        _ => Ok(("$".to_string(), start + 1)),
    }
}

/// `${NAME}` or `${NAME:-default}`. The default is itself expanded.
fn expand_braced(expander: &mut Expander, inner: &str) -> Result<String, ExpansionError> {
    if let Some(idx) = inner.find(":-") {
        let name = &inner[..idx];
        let default = &inner[idx + 2..];
        let value = expander.env.get(name).cloned().unwrap_or_default();
        if value.is_empty() {
            return expand_text(expander, default);
        }
        return Ok(value);
    }
    lookup(expander, inner)
}

/// Plain variable lookup with `nounset` enforcement.
fn lookup(expander: &Expander, name: &str) -> Result<String, ExpansionError> {
    match expander.env.get(name) {
        Some(value) => Ok(value.clone()),
        None if expander.nounset => Err(ExpansionError::UnboundVariable(name.to_string())),
        None => Ok(String::new()),
    }
}

fn eval_arithmetic(expander: &mut Expander, body: &str) -> Result<i64, ExpansionError> {
    // Variables inside the expression may themselves be `$`-forms.
    let body = expand_inner_substitutions(expander, body)?;
    let expr = match expander.caches.arithmetic.get(&body) {
        Some(cached) => cached.clone(),
        None => {
            let parsed = arithmetic::parse(&body)?;
            expander.caches.arithmetic.put(body.clone(), parsed.clone());
            parsed
        }
    };
    arithmetic::eval(&expr, expander.env)
}

/// Expand `$(...)` bodies nested inside an arithmetic expression; bare
/// variable names are left for the arithmetic evaluator itself.
fn expand_inner_substitutions(
    expander: &mut Expander,
    body: &str,
) -> Result<String, ExpansionError> {
    if body.contains("$(") {
        expand_text(expander, body)
    } else {
        Ok(body.to_string())
    }
}

fn run_substitution(expander: &mut Expander, body: &str) -> Result<String, ExpansionError> {
    use command_sub::SubstitutionMode;
    match expander.policy.mode {
        SubstitutionMode::Sandbox => {
            command_sub::run_sandboxed(body, expander.policy, expander.env, expander.cwd)
        }
        SubstitutionMode::Full => match expander.host.as_deref_mut() {
            Some(host) => host.run_substitution(body),
            None => Err(ExpansionError::Substitution(
                "no executor available for full-mode substitution".to_string(),
            )),
        },
    }
}

fn find_matching_paren(chars: &[char], from: usize) -> Result<usize, ExpansionError> {
    let mut depth = 1;
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExpansionError::Substitution("unmatched `(`".to_string()))
}

/// Find the `))` that closes `$((`, tracking inner parens.
fn find_arith_end(chars: &[char], from: usize) -> Result<usize, ExpansionError> {
    let mut depth = 0i32;
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                if depth == 0 && chars.get(i + 1) == Some(&')') {
                    return Ok(i);
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExpansionError::Arithmetic("unmatched `((`".to_string()))
}

fn find_matching_brace(chars: &[char], from: usize) -> Result<usize, ExpansionError> {
    let mut depth = 1;
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExpansionError::Substitution("unmatched `${`".to_string()))
}

fn find_closing_backtick(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&i| chars[i] == '`')
}
