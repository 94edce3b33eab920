//! History Store
//!
//! File-backed command history: one command per line, UTF-8, newline
//! terminated. Loaded synchronously on construction so the shell can
//! reference it immediately. Saves rewrite the whole file through a
//! temp-file rename, so concurrent saves never interleave partial lines
//! (last writer wins).
//!
//! Add policy: empty lines are rejected; leading-space lines are rejected
//! under `ignoreSpace`; consecutive duplicates are rejected under
//! `ignoreDuplicates`; the store caps at `maxEntries`, dropping oldest.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{expand_tilde_path, HistoryConfig};
use crate::error::ShellError;

/// Search strategies for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Case-insensitive substring.
    Exact,
    /// Prefix match.
    Startswith,
    /// Regular expression; an invalid pattern matches nothing.
    Regex,
    /// Case-insensitive subsequence.
    #[default]
    Fuzzy,
}

/// Aggregate statistics over the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStats {
    pub total: usize,
    pub unique: usize,
    /// Top commands by frequency, most frequent first, capped at 10.
    pub top: Vec<(String, usize)>,
}

/// The persistent history store.
pub struct HistoryStore {
    entries: Vec<String>,
    path: Option<PathBuf>,
    config: HistoryConfig,
}

impl HistoryStore {
    /// Create the store and load the file synchronously. An empty
    /// `file` keeps the store purely in-memory (used by tests and
    /// subshells).
    pub fn with_config(config: HistoryConfig) -> Self {
        let path = if config.file.is_empty() {
            None
        } else {
            Some(expand_tilde_path(&config.file))
        };
        let mut store = Self { entries: Vec::new(), path, config };
        store.load();
        store
    }

    fn load(&mut self) {
        let path = match &self.path {
            Some(path) if path.exists() => path,
            _ => return,
        };
        match std::fs::read_to_string(path) {
            Ok(text) => {
                self.entries = text
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                let overflow = self.entries.len().saturating_sub(self.config.max_entries);
                if overflow > 0 {
                    self.entries.drain(..overflow);
                }
                debug!(count = self.entries.len(), "history loaded");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "history load failed"),
        }
    }

    /// Apply the add policy; returns true when the entry was recorded.
    pub fn add(&mut self, command: &str) -> bool {
        if command.trim().is_empty() {
            return false;
        }
        if self.config.ignore_space && command.starts_with(' ') {
            return false;
        }
        if self.config.ignore_duplicates && self.entries.last().map(String::as_str) == Some(command)
        {
            return false;
        }
        self.entries.push(command.to_string());
        let overflow = self.entries.len().saturating_sub(self.config.max_entries);
        if overflow > 0 {
            self.entries.drain(..overflow);
        }
        true
    }

    /// Persist the whole store: write a temp file next to the target and
    /// rename over it.
    pub fn save(&self) -> Result<(), ShellError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ShellError::History(e.to_string()))?;
            }
        }
        let tmp = path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)
                .map_err(|e| ShellError::History(e.to_string()))?;
            for entry in &self.entries {
                writeln!(file, "{}", entry).map_err(|e| ShellError::History(e.to_string()))?;
            }
        }
        std::fs::rename(&tmp, path).map_err(|e| ShellError::History(e.to_string()))
    }

    /// Search with the given mode; `limit` caps the result count.
    pub fn search(&self, query: &str, mode: SearchMode, limit: Option<usize>) -> Vec<String> {
        let matcher: Box<dyn Fn(&str) -> bool> = match mode {
            SearchMode::Exact => {
                let needle = query.to_lowercase();
                Box::new(move |entry: &str| entry.to_lowercase().contains(&needle))
            }
            SearchMode::Startswith => {
                let needle = query.to_string();
                Box::new(move |entry: &str| entry.starts_with(&needle))
            }
            SearchMode::Regex => match regex_lite::Regex::new(query) {
                Ok(re) => Box::new(move |entry: &str| re.is_match(entry)),
                Err(_) => return Vec::new(),
            },
            SearchMode::Fuzzy => {
                let needle = query.to_lowercase();
                Box::new(move |entry: &str| is_subsequence(&needle, &entry.to_lowercase()))
            }
        };
        let mut results: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matcher(entry))
            .cloned()
            .collect();
        if let Some(cap) = limit.or(self.config.search_limit) {
            results.truncate(cap);
        }
        results
    }

    /// The most recent entry (`!!`).
    pub fn last(&self) -> Option<&String> {
        self.entries.last()
    }

    /// 1-based lookup (`!n`).
    pub fn get(&self, n: usize) -> Option<&String> {
        if n == 0 {
            return None;
        }
        self.entries.get(n - 1)
    }

    /// Most recent entry starting with `prefix` (`!prefix`).
    pub fn find_prefix(&self, prefix: &str) -> Option<&String> {
        self.entries.iter().rev().find(|entry| entry.starts_with(prefix))
    }

    pub fn stats(&self) -> HistoryStats {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.as_str()).or_default() += 1;
        }
        let unique = counts.len();
        let mut top: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(entry, count)| (entry.to_string(), count))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(10);
        HistoryStats { total: self.entries.len(), unique, top }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// True when every char of `needle` appears in `haystack` in order.
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = needle.chars();
    let mut current = match chars.next() {
        Some(c) => c,
        None => return true,
    };
    for c in haystack.chars() {
        if c == current {
            match chars.next() {
                Some(next) => current = next,
                None => return true,
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> HistoryStore {
        let mut config = HistoryConfig::default();
        config.file = String::new();
        HistoryStore::with_config(config)
    }

    fn store_with(entries: &[&str]) -> HistoryStore {
        let mut store = memory_store();
        for entry in entries {
            store.add(entry);
        }
        store
    }

    #[test]
    fn test_add_appends() {
        let mut store = memory_store();
        assert!(store.add("ls"));
        assert!(store.add("pwd"));
        assert_eq!(store.entries(), &["ls".to_string(), "pwd".to_string()]);
        assert_eq!(store.last().map(String::as_str), Some("pwd"));
    }

    #[test]
    fn test_add_rejects_empty() {
        let mut store = memory_store();
        assert!(!store.add(""));
        assert!(!store.add("   "));
        assert!(store.is_empty());
    }

    #[test]
    fn test_ignore_space() {
        let mut store = memory_store();
        assert!(!store.add(" secret-command"));
        assert!(store.is_empty());

        let mut config = HistoryConfig::default();
        config.file = String::new();
        config.ignore_space = false;
        let mut store = HistoryStore::with_config(config);
        assert!(store.add(" kept"));
    }

    #[test]
    fn test_ignore_consecutive_duplicates() {
        let mut store = memory_store();
        assert!(store.add("ls"));
        assert!(!store.add("ls"));
        assert!(store.add("pwd"));
        assert!(store.add("ls"), "non-consecutive duplicate is kept");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_max_entries_drops_oldest() {
        let mut config = HistoryConfig::default();
        config.file = String::new();
        config.max_entries = 3;
        let mut store = HistoryStore::with_config(config);
        for n in 1..=5 {
            store.add(&format!("cmd-{}", n));
        }
        assert_eq!(
            store.entries(),
            &["cmd-3".to_string(), "cmd-4".to_string(), "cmd-5".to_string()]
        );
    }

    #[test]
    fn test_search_exact_case_insensitive() {
        let store = store_with(&["Git Status", "ls -la", "git push"]);
        let results = store.search("git", SearchMode::Exact, None);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_startswith() {
        let store = store_with(&["git status", "ls", "git push"]);
        let results = store.search("git", SearchMode::Startswith, None);
        assert_eq!(results, vec!["git status".to_string(), "git push".to_string()]);
    }

    #[test]
    fn test_search_regex() {
        let store = store_with(&["git status", "git push", "ls"]);
        let results = store.search(r"^git\s+p", SearchMode::Regex, None);
        assert_eq!(results, vec!["git push".to_string()]);
    }

    #[test]
    fn test_search_invalid_regex_is_empty() {
        let store = store_with(&["git status"]);
        assert!(store.search("[unclosed", SearchMode::Regex, None).is_empty());
    }

    #[test]
    fn test_search_fuzzy_subsequence() {
        let store = store_with(&["git checkout main", "ls -la", "echo gcm"]);
        let results = store.search("gcm", SearchMode::Fuzzy, None);
        assert_eq!(results.len(), 2);
        assert!(results.contains(&"git checkout main".to_string()));
    }

    #[test]
    fn test_search_limit() {
        let store = store_with(&["a1", "a2", "a3"]);
        let results = store.search("a", SearchMode::Exact, Some(2));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_expansion_lookups() {
        let store = store_with(&["first", "second", "third"]);
        assert_eq!(store.last().map(String::as_str), Some("third"));
        assert_eq!(store.get(1).map(String::as_str), Some("first"));
        assert_eq!(store.get(0), None);
        assert_eq!(store.get(99), None);
        assert_eq!(store.find_prefix("sec").map(String::as_str), Some("second"));
        assert_eq!(store.find_prefix("zzz"), None);
    }

    #[test]
    fn test_stats() {
        let mut config = HistoryConfig::default();
        config.file = String::new();
        config.ignore_duplicates = false;
        let mut store = HistoryStore::with_config(config);
        for cmd in ["ls", "ls", "git status", "ls", "pwd"] {
            store.add(cmd);
        }
        let stats = store.stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.unique, 3);
        assert_eq!(stats.top[0], ("ls".to_string(), 3));
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("history");
        let mut config = HistoryConfig::default();
        config.file = file.to_string_lossy().into_owned();

        let mut store = HistoryStore::with_config(config.clone());
        store.add("one");
        store.add("two");
        store.save().unwrap();

        let text = std::fs::read_to_string(&file).unwrap();
        assert_eq!(text, "one\ntwo\n");

        let reloaded = HistoryStore::with_config(config);
        assert_eq!(reloaded.entries(), &["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_load_respects_max_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("history");
        std::fs::write(&file, "a\nb\nc\nd\n").unwrap();

        let mut config = HistoryConfig::default();
        config.file = file.to_string_lossy().into_owned();
        config.max_entries = 2;
        let store = HistoryStore::with_config(config);
        assert_eq!(store.entries(), &["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let mut config = HistoryConfig::default();
        config.file = "/nonexistent/dir/history".to_string();
        let store = HistoryStore::with_config(config);
        assert!(store.is_empty());
    }

    #[test]
    fn test_is_subsequence() {
        assert!(is_subsequence("gcm", "git checkout main"));
        assert!(is_subsequence("", "anything"));
        assert!(!is_subsequence("xyz", "abc"));
        assert!(is_subsequence("abc", "abc"));
    }
}
