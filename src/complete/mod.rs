//! Completion Provider
//!
//! Builds grouped completions for `(buffer, cursor)`. Command position
//! completes builtins, aliases, and PATH executables; argument positions
//! dispatch on the line's first token to a builtin-specific contract, or
//! fall back to filenames. Plugin completions are prepended, then merged
//! with dedup by label.

pub mod builtin_args;

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::config::CompletionConfig;

/// What a completion item denotes; drives display hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Builtin,
    Command,
    Alias,
    File,
    Directory,
    Variable,
    Signal,
    Flag,
    History,
    Other,
}

/// One suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub text: String,
    pub description: Option<String>,
    pub kind: ItemKind,
}

impl CompletionItem {
    pub fn new(text: impl Into<String>, kind: ItemKind) -> Self {
        Self { text: text.into(), description: None, kind }
    }

    pub fn described(text: impl Into<String>, description: impl Into<String>, kind: ItemKind) -> Self {
        Self { text: text.into(), description: Some(description.into()), kind }
    }
}

/// A titled section of suggestions. Flat completions use one anonymous
/// group (empty title).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionGroup {
    pub title: String,
    pub items: Vec<CompletionItem>,
}

impl CompletionGroup {
    pub fn titled(title: impl Into<String>, items: Vec<CompletionItem>) -> Self {
        Self { title: title.into(), items }
    }

    pub fn anonymous(items: Vec<CompletionItem>) -> Self {
        Self { title: String::new(), items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Borrowed shell state the provider completes against.
pub struct CompletionContext<'a> {
    pub builtin_names: &'a [String],
    pub aliases: &'a IndexMap<String, String>,
    pub env: &'a HashMap<String, String>,
    pub dir_stack: &'a [String],
    pub cwd: &'a str,
    pub config: &'a CompletionConfig,
}

/// A plugin-registered completer for lines starting with a prefix.
pub struct PluginCompletion {
    pub command_prefix: String,
    pub complete: Box<dyn Fn(&str, usize) -> Vec<CompletionItem> + Send + Sync>,
}

/// The provider. Holds plugin completers and a TTL-bounded PATH scan
/// cache.
#[derive(Default)]
pub struct CompletionProvider {
    plugins: Vec<PluginCompletion>,
    path_cache: HashMap<String, (Instant, Vec<String>)>,
}

impl CompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_plugin(&mut self, completion: PluginCompletion) {
        self.plugins.push(completion);
    }

    /// Produce completion groups for the cursor position.
    pub fn complete(
        &mut self,
        buffer: &str,
        cursor: usize,
        ctx: &CompletionContext<'_>,
    ) -> Vec<CompletionGroup> {
        if !ctx.config.enabled {
            return Vec::new();
        }
        let line: String = buffer.chars().take(cursor).collect();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let completing_new = line.ends_with(' ') || line.is_empty();
        let prefix = if completing_new { "" } else { tokens.last().copied().unwrap_or("") };
        let arg_index = if completing_new { tokens.len() } else { tokens.len().saturating_sub(1) };

        let mut groups: Vec<CompletionGroup> = Vec::new();

        // Plugin completions come first.
        for plugin in &self.plugins {
            if line.starts_with(&plugin.command_prefix) {
                let items = (plugin.complete)(&line, cursor);
                if !items.is_empty() {
                    groups.push(CompletionGroup::titled("Plugin", items));
                }
            }
        }

        if arg_index == 0 {
            groups.extend(self.complete_command_names(prefix, ctx));
        } else {
            let first = tokens.first().copied().unwrap_or("");
            let prev = if completing_new {
                tokens.last().copied()
            } else if tokens.len() >= 2 {
                Some(tokens[tokens.len() - 2])
            } else {
                None
            };
            match builtin_args::complete_for(first, prefix, arg_index, prev, ctx) {
                Some(builtin_groups) => groups.extend(builtin_groups),
                None => {
                    let files = complete_filenames(prefix, ctx.cwd);
                    if !files.is_empty() {
                        groups.push(CompletionGroup::titled("Files", files));
                    }
                }
            }
        }

        dedup_groups(&mut groups);
        groups.retain(|group| !group.is_empty());
        for group in &mut groups {
            group.items.truncate(ctx.config.max_suggestions);
        }
        groups
    }

    fn complete_command_names(
        &mut self,
        prefix: &str,
        ctx: &CompletionContext<'_>,
    ) -> Vec<CompletionGroup> {
        let matches = |candidate: &str| matches_prefix(candidate, prefix, ctx.config.case_sensitive);

        let builtins: Vec<CompletionItem> = ctx
            .builtin_names
            .iter()
            .filter(|name| matches(name))
            .map(|name| CompletionItem::new(name.clone(), ItemKind::Builtin))
            .collect();

        let aliases: Vec<CompletionItem> = ctx
            .aliases
            .iter()
            .filter(|(name, _)| matches(name))
            .map(|(name, value)| {
                CompletionItem::described(name.clone(), value.clone(), ItemKind::Alias)
            })
            .collect();

        let path_var = ctx.env.get("PATH").cloned().unwrap_or_default();
        let mut executables: Vec<CompletionItem> = self
            .scan_path(&path_var, ctx.config)
            .into_iter()
            .filter(|name| matches(name))
            .map(|name| CompletionItem::new(name, ItemKind::Command))
            .collect();
        executables.truncate(ctx.config.bin_path_max_suggestions);

        let mut groups = Vec::new();
        if !builtins.is_empty() {
            groups.push(CompletionGroup::titled("Builtins", builtins));
        }
        if !aliases.is_empty() {
            groups.push(CompletionGroup::titled("Aliases", aliases));
        }
        if !executables.is_empty() {
            groups.push(CompletionGroup::titled("Commands", executables));
        }
        groups
    }

    /// Executable names on PATH, cached per directory with a TTL.
    fn scan_path(&mut self, path_var: &str, config: &CompletionConfig) -> Vec<String> {
        let ttl = Duration::from_secs(config.cache.ttl);
        let mut names: Vec<String> = Vec::new();
        for dir in path_var.split(':').filter(|dir| !dir.is_empty()) {
            if config.cache.enabled {
                if let Some((at, cached)) = self.path_cache.get(dir) {
                    if at.elapsed() < ttl {
                        names.extend(cached.iter().cloned());
                        continue;
                    }
                }
            }
            let scanned = scan_dir_executables(dir);
            if config.cache.enabled {
                if self.path_cache.len() >= config.cache.max_entries {
                    self.path_cache.clear();
                }
                self.path_cache
                    .insert(dir.to_string(), (Instant::now(), scanned.clone()));
            }
            names.extend(scanned);
        }
        names.sort();
        names.dedup();
        names
    }
}

pub(crate) fn matches_prefix(candidate: &str, prefix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        candidate.starts_with(prefix)
    } else {
        candidate.to_lowercase().starts_with(&prefix.to_lowercase())
    }
}

pub(crate) fn scan_dir_executables(dir: &str) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut names = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if is_executable_file(&path) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Filename completion: directories are suffixed `/`.
pub fn complete_filenames(prefix: &str, cwd: &str) -> Vec<CompletionItem> {
    let (dir_part, name_part) = match prefix.rfind('/') {
        Some(idx) => (&prefix[..=idx], &prefix[idx + 1..]),
        None => ("", prefix),
    };
    let base = if dir_part.starts_with('/') {
        std::path::PathBuf::from(dir_part)
    } else {
        Path::new(cwd).join(dir_part)
    };
    let entries = match std::fs::read_dir(&base) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut items: Vec<CompletionItem> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            if !name.starts_with(name_part) {
                return None;
            }
            if name.starts_with('.') && !name_part.starts_with('.') {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let text = if is_dir {
                format!("{}{}/", dir_part, name)
            } else {
                format!("{}{}", dir_part, name)
            };
            let kind = if is_dir { ItemKind::Directory } else { ItemKind::File };
            Some(CompletionItem::new(text, kind))
        })
        .collect();
    items.sort_by(|a, b| a.text.cmp(&b.text));
    items
}

/// Directory-only completion for `cd`.
pub fn complete_directories(prefix: &str, cwd: &str) -> Vec<CompletionItem> {
    complete_filenames(prefix, cwd)
        .into_iter()
        .filter(|item| item.kind == ItemKind::Directory)
        .collect()
}

/// Drop repeated labels across groups, keeping the first occurrence.
fn dedup_groups(groups: &mut [CompletionGroup]) {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for group in groups.iter_mut() {
        group.items.retain(|item| seen.insert(item.text.clone()));
    }
}
