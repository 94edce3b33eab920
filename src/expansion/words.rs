//! Word Splitting and Pathname Expansion
//!
//! The last two steps of the per-word pipeline, applied only to unquoted
//! expansion results: IFS field splitting (cached) and globbing.

use tracing::debug;

use crate::expansion::cache::LruCache;

/// Default IFS when the variable is unset.
pub const DEFAULT_IFS: &str = " \t\n";

/// Split expanded text into fields on the IFS characters. Runs of
/// separators collapse and empty fields are dropped, matching the
/// behavior for whitespace IFS. Results are cached by (text, ifs).
pub fn split_fields(
    text: &str,
    ifs: &str,
    cache: &mut LruCache<(String, String), Vec<String>>,
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let key = (text.to_string(), ifs.to_string());
    if let Some(cached) = cache.get(&key) {
        return cached.clone();
    }
    let fields: Vec<String> = text
        .split(|c: char| ifs.contains(c))
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect();
    cache.put(key, fields.clone());
    fields
}

/// True if the field contains unescaped glob metacharacters.
pub fn has_glob_chars(field: &str) -> bool {
    field.contains('*') || field.contains('?') || field.contains('[')
}

/// Pathname-expand one field. No matches (or an invalid pattern) leaves
/// the field literal; matches come back sorted.
pub fn glob_field(field: &str, cwd: &str) -> Vec<String> {
    if !has_glob_chars(field) {
        return vec![field.to_string()];
    }

    let relative = !field.starts_with('/');
    let pattern = if relative {
        format!("{}/{}", cwd.trim_end_matches('/'), field)
    } else {
        field.to_string()
    };

    let entries = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            debug!(pattern = %field, error = %e, "invalid glob pattern");
            return vec![field.to_string()];
        }
    };

    let prefix = format!("{}/", cwd.trim_end_matches('/'));
    let mut matches: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|path| {
            let text = path.to_string_lossy().into_owned();
            if relative {
                // Report matches the way the pattern was written.
                text.strip_prefix(&prefix).map(str::to_string).unwrap_or(text)
            } else {
                text
            }
        })
        .collect();

    if matches.is_empty() {
        return vec![field.to_string()];
    }
    matches.sort();
    matches
}
