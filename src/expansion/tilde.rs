//! Tilde Expansion
//!
//! `~` at the start of an unquoted word becomes `$HOME`. `~user` forms are
//! left untouched (user database lookups are not a shell-core concern).

use std::collections::HashMap;

/// Expand a leading tilde against the environment's HOME, falling back to
/// the OS temp dir when HOME is unset.
pub fn expand_tilde(text: &str, env: &HashMap<String, String>) -> String {
    let home = || {
        env.get("HOME")
            .cloned()
            .unwrap_or_else(|| std::env::temp_dir().to_string_lossy().into_owned())
    };
    if text == "~" {
        home()
    } else if let Some(rest) = text.strip_prefix("~/") {
        format!("{}/{}", home(), rest)
    } else {
        text.to_string()
    }
}
