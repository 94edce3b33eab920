//! Shell Core
//!
//! The ownership root: configuration, environment, aliases, builtins,
//! history, hooks, jobs, plugins, completion, prompt, and the line
//! editor all live here, and the REPL orchestrates them. Lifecycle hook
//! events fire at the documented boundaries (`shell:init`,
//! `command:before/after/error`, `directory:change`, `prompt:before`,
//! `history:add`, `job:suspended`, `job:resumed`, `shell:exit`).

use std::collections::{HashMap, HashSet};
use std::io::IsTerminal;

use indexmap::IndexMap;
use serde_json::json;
use tracing::{debug, warn};

use crate::builtins::{default_registry, BuiltinRegistry};
use crate::complete::{CompletionContext, CompletionProvider};
use crate::config::Config;
use crate::editor::{EditorHooks, EditorOutcome, EditorState, LineEditor};
use crate::exec::{CommandResult, ExecEnv, Executor};
use crate::expansion::{ExpansionCaches, SubstitutionPolicy};
use crate::history::HistoryStore;
use crate::hooks::HookManager;
use crate::jobs::{signals, JobManager};
use crate::parser;
use crate::plugins::PluginManager;
use crate::prompt::{ModuleContext, PromptComposer};

/// Shell options toggled by `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOptions {
    /// set -e
    pub errexit: bool,
    /// set -u
    pub nounset: bool,
    /// set -x
    pub xtrace: bool,
    /// set -v
    pub verbose: bool,
    /// set -o pipefail
    pub pipefail: bool,
    /// set -o noglob
    pub noglob: bool,
    /// set -o noclobber
    pub noclobber: bool,
    /// set -o vi / set -o emacs (mutually exclusive)
    pub vi: bool,
    pub emacs: bool,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            errexit: false,
            nounset: false,
            xtrace: false,
            verbose: false,
            pipefail: false,
            noglob: false,
            noclobber: false,
            vi: false,
            emacs: true,
        }
    }
}

/// Mutable interpreter state threaded through execution. Cloning
/// produces a subshell snapshot (used by command substitution and
/// background builtin stages).
#[derive(Debug, Clone)]
pub struct ShellState {
    pub env: HashMap<String, String>,
    pub cwd: String,
    pub previous_dir: String,
    pub last_exit_code: i32,
    pub last_background_pid: Option<u32>,
    pub shell_pid: u32,
    pub options: ShellOptions,
    pub aliases: IndexMap<String, String>,
    pub exported: HashSet<String>,
    pub dir_stack: Vec<String>,
    /// Set by the `exit` builtin; the REPL honors it at the chain
    /// boundary.
    pub exit_requested: Option<i32>,
}

impl ShellState {
    /// Build initial state from the process environment plus config
    /// overrides.
    pub fn from_config(config: &Config) -> Self {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        for (key, value) in &config.environment {
            env.insert(key.clone(), value.clone());
        }
        env.entry("IFS".to_string()).or_insert_with(|| " \t\n".to_string());
        env.insert("SHELL".to_string(), "krusty".to_string());

        let cwd = std::env::current_dir()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/".to_string());

        let mut aliases = IndexMap::new();
        for (name, value) in &config.aliases {
            aliases.insert(name.clone(), value.clone());
        }

        let exported: HashSet<String> = env.keys().cloned().collect();

        let mut options = ShellOptions::default();
        options.verbose = config.verbose;

        Self {
            env,
            previous_dir: cwd.clone(),
            cwd,
            last_exit_code: 0,
            last_background_pid: None,
            shell_pid: std::process::id(),
            options,
            aliases,
            exported,
            dir_stack: Vec::new(),
            exit_requested: None,
        }
    }

    /// Deterministic state for unit tests: minimal env, temp-friendly.
    pub fn for_tests() -> Self {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/home/test".to_string());
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env.insert("IFS".to_string(), " \t\n".to_string());
        let cwd = std::env::temp_dir().to_string_lossy().into_owned();
        Self {
            env,
            previous_dir: cwd.clone(),
            cwd,
            last_exit_code: 0,
            last_background_pid: None,
            shell_pid: std::process::id(),
            options: ShellOptions::default(),
            aliases: IndexMap::new(),
            exported: HashSet::new(),
            dir_stack: Vec::new(),
            exit_requested: None,
        }
    }
}

/// The shell. See module docs for what lives here.
pub struct Shell {
    pub config: Config,
    pub state: ShellState,
    pub builtins: BuiltinRegistry,
    pub history: HistoryStore,
    pub hooks: HookManager,
    pub jobs: JobManager,
    pub plugins: PluginManager,
    pub completions: CompletionProvider,
    pub prompt: PromptComposer,
    pub caches: ExpansionCaches,
    pub policy: SubstitutionPolicy,
    editor: LineEditor,
    editor_state: EditorState,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        let state = ShellState::from_config(&config);
        let history = HistoryStore::with_config(config.history.clone());
        let hooks = HookManager::from_config(&config.hooks);
        let caches = ExpansionCaches::new(&config.expansion.cache_limits);
        let prompt = PromptComposer::new(config.prompt.clone(), config.theme.clone());
        let term_width = crossterm::terminal::size()
            .map(|(width, _)| width as usize)
            .unwrap_or(80);

        Self {
            state,
            builtins: default_registry(),
            history,
            hooks,
            jobs: JobManager::new(),
            plugins: PluginManager::new(),
            completions: CompletionProvider::new(),
            prompt,
            caches,
            policy: SubstitutionPolicy::default(),
            editor: LineEditor::new(),
            editor_state: EditorState::new(term_width),
            config,
        }
    }

    /// The interactive REPL. Returns the process exit code.
    pub async fn run_interactive(&mut self, norc: bool) -> i32 {
        signals::install_handlers();
        self.dispatch_hook("shell:init", json!({})).await;

        if !norc {
            self.run_rc_file().await;
        }

        loop {
            if let Some(code) = self.state.exit_requested {
                self.shutdown().await;
                return code;
            }

            self.jobs_status_lines();
            self.dispatch_job_events().await;
            self.dispatch_hook("prompt:before", json!({})).await;
            let prompt = self.render_prompt();

            let outcome = self.read_line(&prompt);
            match outcome {
                Ok(EditorOutcome::Line(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.run_line(&line).await;
                }
                Ok(EditorOutcome::Interrupted) => {
                    // Ctrl+C at the prompt: nothing executes.
                    self.state.last_exit_code = 130;
                }
                Ok(EditorOutcome::Eof) => break,
                Err(e) => {
                    warn!(error = %e, "editor failure");
                    break;
                }
            }
        }

        let code = self.state.exit_requested.unwrap_or(self.state.last_exit_code);
        self.shutdown().await;
        code
    }

    /// Execute a script file; the last chain's exit code propagates.
    pub async fn run_script_file(&mut self, path: &std::path::Path) -> i32 {
        let script = match std::fs::read_to_string(path) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("krusty: {}: {}", path.display(), e);
                return 127;
            }
        };
        self.run_source(&script).await
    }

    /// Execute a `-c` command string.
    pub async fn run_command_string(&mut self, input: &str) -> i32 {
        self.run_source(input).await
    }

    async fn run_source(&mut self, source: &str) -> i32 {
        let result = self.run_line(source).await;
        if let Some(code) = self.state.exit_requested {
            return code;
        }
        result.exit_code
    }

    /// Parse and execute one input, with lifecycle hooks and history.
    pub async fn run_line(&mut self, line: &str) -> CommandResult {
        if self.state.options.verbose {
            eprintln!("{}", line);
        }

        let before = self
            .dispatch_hook("command:before", json!({ "command": line }))
            .await;
        if before {
            debug!("command suppressed by hook preventDefault");
            return CommandResult::ok();
        }

        let chain = match parser::parse(line) {
            Ok(chain) => chain,
            Err(error) => {
                let code = error.exit_code();
                eprintln!("krusty: {}", error);
                self.state.last_exit_code = code;
                self.dispatch_hook(
                    "command:error",
                    json!({ "command": line, "exit_code": code }),
                )
                .await;
                return CommandResult::failure_with_code(format!("krusty: {}\n", error), code);
            }
        };
        if chain.is_empty() {
            return CommandResult::ok();
        }

        let cwd_before = self.state.cwd.clone();
        let streaming = self.config.stream_output && std::io::stdout().is_terminal();
        let executor = Executor {
            builtins: &self.builtins,
            exec_config: &self.config.execution,
            policy: &self.policy,
            stream_output: streaming,
        };
        let result = {
            let mut env = ExecEnv {
                state: &mut self.state,
                caches: &mut self.caches,
                jobs: Some(&self.jobs),
                history: Some(&mut self.history),
            };
            executor.run_chain(&mut env, &chain).await
        };
        self.state.last_exit_code = result.exit_code;

        if !result.streamed {
            use std::io::Write;
            if !result.stdout.is_empty() {
                let _ = std::io::stdout().write_all(&result.stdout);
            }
            if !result.stderr.is_empty() {
                let _ = std::io::stderr().write_all(&result.stderr);
            }
        }

        self.dispatch_job_events().await;

        if self.history.add(line) {
            if let Err(e) = self.history.save() {
                warn!(error = %e, "history save failed");
            }
            self.dispatch_hook("history:add", json!({ "command": line })).await;
        }

        if self.state.cwd != cwd_before {
            let data = json!({ "from": cwd_before, "to": self.state.cwd });
            self.dispatch_hook("directory:change", data).await;
        }

        if result.exit_code == 0 {
            self.dispatch_hook(
                "command:after",
                json!({ "command": line, "exit_code": 0 }),
            )
            .await;
        } else {
            self.dispatch_hook(
                "command:error",
                json!({ "command": line, "exit_code": result.exit_code }),
            )
            .await;
        }

        result
    }

    /// Report job status transitions (`job:suspended` / `job:resumed`)
    /// queued by the job manager since the last drain.
    async fn dispatch_job_events(&mut self) {
        for event in self.jobs.take_events() {
            let data = json!({
                "id": event.id,
                "pgid": event.pgid,
                "command": event.command,
            });
            self.dispatch_hook(event.event, data).await;
        }
    }

    /// Fire an event; returns the folded `preventDefault` flag.
    async fn dispatch_hook(&mut self, event: &str, data: serde_json::Value) -> bool {
        let outcome = self
            .hooks
            .execute_hooks(event, data, &self.state.cwd, &self.state.env)
            .await;
        outcome.prevent_default
    }

    fn render_prompt(&self) -> String {
        let ctx = ModuleContext {
            cwd: &self.state.cwd,
            env: &self.state.env,
            last_exit: self.state.last_exit_code,
        };
        self.prompt.render(&ctx)
    }

    /// Report finished background jobs before the next prompt, the way
    /// interactive shells do.
    fn jobs_status_lines(&mut self) {
        if !signals::take_child_status_change() {
            return;
        }
        for job in self.jobs.reap_done() {
            if job.background {
                eprintln!("[{}]+  Done    {}", job.id, job.command);
            }
        }
    }

    fn read_line(&mut self, prompt: &str) -> std::io::Result<EditorOutcome> {
        let Shell {
            editor,
            editor_state,
            completions,
            state,
            builtins,
            config,
            history,
            ..
        } = self;

        editor_state.set_history(history.entries().to_vec());
        editor_state
            .suggestions
            .set_term_width(
                crossterm::terminal::size()
                    .map(|(width, _)| width as usize)
                    .unwrap_or(80),
            );

        let builtin_names = builtins.names();
        let mut complete = |buffer: &str, cursor: usize| {
            let ctx = CompletionContext {
                builtin_names: &builtin_names,
                aliases: &state.aliases,
                env: &state.env,
                dir_stack: &state.dir_stack,
                cwd: &state.cwd,
                config: &config.completion,
            };
            completions.complete(buffer, cursor, &ctx)
        };
        let mut history_matches = |query: &str| {
            history.search(query, config.history.search_mode, Some(5))
        };
        let mut hooks = EditorHooks {
            complete: &mut complete,
            history_matches: &mut history_matches,
            max_suggestions: config.completion.max_suggestions,
        };
        editor.read_line(prompt, editor_state, &mut hooks)
    }

    async fn run_rc_file(&mut self) {
        let rc = crate::config::home_dir().join(".krustyrc");
        if !rc.is_file() {
            return;
        }
        match std::fs::read_to_string(&rc) {
            Ok(script) => {
                debug!(path = %rc.display(), "running rc file");
                self.run_line(&script).await;
            }
            Err(e) => warn!(path = %rc.display(), error = %e, "rc file unreadable"),
        }
    }

    async fn shutdown(&mut self) {
        self.dispatch_hook("shell:exit", json!({})).await;
        if let Err(e) = self.history.save() {
            warn!(error = %e, "history save on exit failed");
        }
        self.plugins.shutdown();
    }
}
