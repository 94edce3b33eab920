//! Shell Configuration
//!
//! The serde model for `~/.krusty.toml`. Field names follow the documented
//! camelCase option keys; every field carries the documented default so a
//! missing file or a partial file behaves identically to the defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::history::SearchMode;
use crate::hooks::HookConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub verbose: bool,
    pub stream_output: bool,
    pub prompt: PromptConfig,
    pub history: HistoryConfig,
    pub completion: CompletionConfig,
    pub execution: ExecutionConfig,
    pub expansion: ExpansionConfig,
    /// name -> replacement text
    pub aliases: HashMap<String, String>,
    /// extra environment entries applied at startup
    pub environment: HashMap<String, String>,
    /// plugin names/paths to load (dynamic loading is a collaborator)
    pub plugins: Vec<String>,
    /// event name -> hooks registered for it
    pub hooks: HashMap<String, Vec<HookConfig>>,
    /// prompt module order
    pub modules: Vec<String>,
    /// theme color mapping, consumed by the theme collaborator
    pub theme: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            stream_output: true,
            prompt: PromptConfig::default(),
            history: HistoryConfig::default(),
            completion: CompletionConfig::default(),
            execution: ExecutionConfig::default(),
            expansion: ExpansionConfig::default(),
            aliases: HashMap::new(),
            environment: HashMap::new(),
            plugins: Vec::new(),
            hooks: HashMap::new(),
            modules: Vec::new(),
            theme: HashMap::new(),
        }
    }
}

/// Prompt rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptConfig {
    pub format: String,
    pub show_git: bool,
    pub show_time: bool,
    pub show_user: bool,
    pub show_host: bool,
    pub show_path: bool,
    pub show_exit_code: bool,
    pub transient: bool,
    pub simple_when_not_tty: bool,
    /// Set once at startup; `{time}` renders relative to this when fixed.
    pub startup_timestamp: Option<i64>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            format: "{path} {modules}{symbol} ".to_string(),
            show_git: true,
            show_time: false,
            show_user: false,
            show_host: false,
            show_path: true,
            show_exit_code: true,
            transient: false,
            simple_when_not_tty: true,
            startup_timestamp: None,
        }
    }
}

/// History persistence and search options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
    pub max_entries: usize,
    pub file: String,
    pub ignore_duplicates: bool,
    pub ignore_space: bool,
    pub search_mode: SearchMode,
    pub search_limit: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            file: "~/.krusty_history".to_string(),
            ignore_duplicates: true,
            ignore_space: true,
            search_mode: SearchMode::Fuzzy,
            search_limit: None,
        }
    }
}

/// Completion engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompletionConfig {
    pub enabled: bool,
    pub case_sensitive: bool,
    pub max_suggestions: usize,
    pub bin_path_max_suggestions: usize,
    pub cache: CompletionCacheConfig,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            case_sensitive: false,
            max_suggestions: 10,
            bin_path_max_suggestions: 20,
            cache: CompletionCacheConfig::default(),
        }
    }
}

/// PATH-scan cache knobs for completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompletionCacheConfig {
    pub enabled: bool,
    /// Seconds a cached PATH scan stays valid.
    pub ttl: u64,
    pub max_entries: usize,
}

impl Default for CompletionCacheConfig {
    fn default() -> Self {
        Self { enabled: true, ttl: 60, max_entries: 256 }
    }
}

/// External command execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// None disables the timeout entirely.
    pub default_timeout_ms: Option<u64>,
    /// Signal sent on timeout before escalating to SIGKILL.
    pub kill_signal: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { default_timeout_ms: None, kill_signal: "SIGTERM".to_string() }
    }
}

/// Expansion cache caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpansionConfig {
    pub cache_limits: CacheLimits,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { cache_limits: CacheLimits::default() }
    }
}

/// Max-entry caps for the three expansion LRU caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheLimits {
    pub arg: usize,
    pub exec: usize,
    pub arithmetic: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self { arg: 256, exec: 128, arithmetic: 64 }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults;
    /// a malformed file is an error so typos are not silently swallowed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Default configuration path: `~/.krusty.toml`.
    pub fn default_path() -> PathBuf {
        home_dir().join(".krusty.toml")
    }
}

/// Resolve a leading `~` against `$HOME`, falling back to the OS temp
/// directory when HOME is unset.
pub fn expand_tilde_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}

/// `$HOME`, or the OS temp dir when unset.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert!(!config.verbose);
        assert!(config.stream_output);
        assert_eq!(config.history.max_entries, 1000);
        assert_eq!(config.history.file, "~/.krusty_history");
        assert!(config.history.ignore_duplicates);
        assert!(config.history.ignore_space);
        assert!(config.completion.enabled);
        assert!(!config.completion.case_sensitive);
        assert_eq!(config.completion.max_suggestions, 10);
        assert_eq!(config.completion.bin_path_max_suggestions, 20);
        assert_eq!(config.execution.kill_signal, "SIGTERM");
        assert!(config.execution.default_timeout_ms.is_none());
        assert!(config.prompt.simple_when_not_tty);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            verbose = true

            [history]
            maxEntries = 50
            "#,
        )
        .unwrap();
        assert!(config.verbose);
        assert_eq!(config.history.max_entries, 50);
        // untouched sections keep their defaults
        assert_eq!(config.history.file, "~/.krusty_history");
        assert_eq!(config.completion.max_suggestions, 10);
    }

    #[test]
    fn test_aliases_and_environment_sections() {
        let config: Config = toml::from_str(
            r#"
            [aliases]
            ll = "ls -l"

            [environment]
            EDITOR = "vim"
            "#,
        )
        .unwrap();
        assert_eq!(config.aliases.get("ll").map(String::as_str), Some("ls -l"));
        assert_eq!(config.environment.get("EDITOR").map(String::as_str), Some("vim"));
    }

    #[test]
    fn test_expand_tilde_path() {
        std::env::set_var("HOME", "/home/krusty-test");
        assert_eq!(
            expand_tilde_path("~/.krusty_history"),
            PathBuf::from("/home/krusty-test/.krusty_history")
        );
        assert_eq!(expand_tilde_path("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/krusty.toml")).unwrap();
        assert_eq!(config.history.max_entries, 1000);
    }
}
