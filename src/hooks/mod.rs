//! Hook Dispatcher
//!
//! Event pipeline dispatched at shell lifecycle boundaries
//! (`shell:init`, `command:before/after/error`, `directory:change`,
//! `prompt:before`, `history:add`, `job:suspended`, `job:resumed`).
//!
//! Hooks are keyed by event and run in descending priority (ties keep
//! insertion order). Each dispatch builds an immutable [`HookContext`],
//! guards against re-entrant dispatch of the same `(event, data)`, runs
//! programmatic callbacks first (FIFO, errors logged), then configured
//! hooks: conditions AND-ed, handler raced against its timeout.
//! `stopPropagation` halts the loop; a synchronous failure halts it;
//! async hook failures do not.

pub mod conditions;

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use conditions::{ConditionKind, ConditionSpec, HookCondition};

/// What a configured hook runs when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "lowercase")]
pub enum HookAction {
    /// Shell command line (template-expanded).
    Command { command: String },
    /// Script file executed directly.
    Script { path: String },
    /// Named callback registered programmatically.
    Function { function: String },
    /// Handler registered by a plugin, addressed `plugin:handler`.
    Plugin { plugin: String },
}

/// One configured hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    pub name: String,
    #[serde(flatten)]
    pub action: HookAction,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, rename = "async")]
    pub run_async: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Snapshot passed to every handler for one dispatch. Immutable from the
/// handler's perspective; influence flows back only through `HookResult`.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub event: String,
    pub data: serde_json::Value,
    pub cwd: String,
    pub environment: HashMap<String, String>,
    pub timestamp: i64,
}

/// Outcome of one handler.
#[derive(Debug, Clone, Default)]
pub struct HookResult {
    pub hook_name: String,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
    pub prevent_default: bool,
    pub stop_propagation: bool,
}

impl HookResult {
    pub fn ok(name: impl Into<String>) -> Self {
        Self { hook_name: name.into(), success: true, ..Default::default() }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            hook_name: name.into(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// All results of one dispatch plus the folded `preventDefault` flag.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub results: Vec<HookResult>,
    pub prevent_default: bool,
}

/// Programmatic handler type.
pub type HookCallback = Box<dyn Fn(&HookContext) -> HookResult + Send + Sync>;

/// The dispatcher. Owned exclusively by the shell core.
#[derive(Default)]
pub struct HookManager {
    hooks: HashMap<String, Vec<HookConfig>>,
    callbacks: HashMap<String, Vec<HookCallback>>,
    functions: HashMap<String, HookCallback>,
    active: HashSet<String>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the configuration's `hooks` table.
    pub fn from_config(table: &HashMap<String, Vec<HookConfig>>) -> Self {
        let mut manager = Self::new();
        for (event, configs) in table {
            for config in configs {
                manager.register(event, config.clone());
            }
        }
        manager
    }

    /// Register a configured hook; keeps the event's list sorted by
    /// descending priority, insertion order on ties.
    pub fn register(&mut self, event: &str, config: HookConfig) {
        let list = self.hooks.entry(event.to_string()).or_default();
        list.push(config);
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Remove every hook with the given name under an event.
    pub fn unregister(&mut self, event: &str, name: &str) -> bool {
        match self.hooks.get_mut(event) {
            Some(list) => {
                let before = list.len();
                list.retain(|hook| hook.name != name);
                before != list.len()
            }
            None => false,
        }
    }

    /// Register a programmatic callback; callbacks run before configured
    /// hooks, in FIFO order.
    pub fn on(&mut self, event: &str, callback: HookCallback) {
        self.callbacks.entry(event.to_string()).or_default().push(callback);
    }

    /// Register a named function handler (used by `function` and
    /// `plugin` triggers).
    pub fn define_function(&mut self, name: &str, callback: HookCallback) {
        self.functions.insert(name.to_string(), callback);
    }

    pub fn hooks_for(&self, event: &str) -> &[HookConfig] {
        self.hooks.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dispatch an event. See module docs for the exact sequencing.
    pub async fn execute_hooks(
        &mut self,
        event: &str,
        data: serde_json::Value,
        cwd: &str,
        environment: &HashMap<String, String>,
    ) -> DispatchOutcome {
        let ctx = HookContext {
            event: event.to_string(),
            data,
            cwd: cwd.to_string(),
            environment: environment.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        let key = reentrancy_key(event, &ctx.data);
        if self.active.contains(&key) {
            debug!(event, "re-entrant hook dispatch suppressed");
            return DispatchOutcome::default();
        }
        self.active.insert(key.clone());
        let outcome = self.dispatch_inner(&ctx).await;
        self.active.remove(&key);
        outcome
    }

    async fn dispatch_inner(&self, ctx: &HookContext) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        if let Some(callbacks) = self.callbacks.get(&ctx.event) {
            for callback in callbacks {
                let started = Instant::now();
                let mut result = callback(ctx);
                result.duration = started.elapsed();
                if !result.success {
                    warn!(event = %ctx.event, hook = %result.hook_name, "callback hook failed");
                }
                outcome.prevent_default |= result.prevent_default;
                outcome.results.push(result);
            }
        }

        for hook in self.hooks_for(&ctx.event) {
            if !hook.enabled {
                continue;
            }
            if !conditions::evaluate_all(&hook.conditions, ctx) {
                continue;
            }

            let started = Instant::now();
            let timeout = Duration::from_millis(hook.timeout_ms.max(1));
            let mut result =
                match tokio::time::timeout(timeout, self.run_hook(hook, ctx)).await {
                    Ok(result) => result,
                    Err(_) => HookResult::failed(&hook.name, "timeout"),
                };
            result.duration = started.elapsed();

            outcome.prevent_default |= result.prevent_default;
            let stop = result.stop_propagation;
            let failed_sync = !result.success && !hook.run_async;
            if !result.success {
                warn!(event = %ctx.event, hook = %hook.name, error = ?result.error, "hook failed");
            }
            outcome.results.push(result);
            if stop || failed_sync {
                break;
            }
        }

        outcome
    }

    async fn run_hook(&self, hook: &HookConfig, ctx: &HookContext) -> HookResult {
        match &hook.action {
            HookAction::Command { command } => {
                let expanded = expand_template(command, ctx);
                run_external(&hook.name, "sh", &["-c", &expanded], ctx).await
            }
            HookAction::Script { path } => {
                let expanded = expand_template(path, ctx);
                if !std::path::Path::new(&expanded).exists() {
                    return HookResult::failed(
                        &hook.name,
                        format!("script not found: {}", expanded),
                    );
                }
                run_external(&hook.name, &expanded, &[], ctx).await
            }
            HookAction::Function { function } => match self.functions.get(function) {
                Some(callback) => {
                    let mut result = callback(ctx);
                    result.hook_name = hook.name.clone();
                    result
                }
                None => HookResult::failed(
                    &hook.name,
                    format!("function not found: {}", function),
                ),
            },
            HookAction::Plugin { plugin } => match self.functions.get(plugin) {
                Some(callback) => {
                    let mut result = callback(ctx);
                    result.hook_name = hook.name.clone();
                    result
                }
                None => HookResult::failed(
                    &hook.name,
                    format!("plugin handler not found: {}", plugin),
                ),
            },
        }
    }
}

/// Run a hook's external command, capturing output. Hook commands go
/// through the system shell, never back into the REPL executor, so a
/// hook can never re-enter the pipeline that dispatched it.
async fn run_external(
    name: &str,
    program: &str,
    args: &[&str],
    ctx: &HookContext,
) -> HookResult {
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(&ctx.cwd)
        .envs(&ctx.environment)
        .stdin(std::process::Stdio::null())
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => HookResult {
            hook_name: name.to_string(),
            success: true,
            output: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            ..Default::default()
        },
        Ok(output) => HookResult {
            hook_name: name.to_string(),
            success: false,
            output: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            error: Some(format!(
                "exit {}: {}",
                output.status.code().unwrap_or(1),
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            ..Default::default()
        },
        Err(e) => HookResult::failed(name, e.to_string()),
    }
}

/// Expand `{event}`, `{cwd}`, `{timestamp}`, `{data}` (JSON), and
/// `{ENV_VAR}` placeholders.
pub fn expand_template(template: &str, ctx: &HookContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            name.push(inner);
        }
        if !closed {
            out.push('{');
            out.push_str(&name);
            continue;
        }
        match name.as_str() {
            "event" => out.push_str(&ctx.event),
            "cwd" => out.push_str(&ctx.cwd),
            "timestamp" => out.push_str(&ctx.timestamp.to_string()),
            "data" => out.push_str(&ctx.data.to_string()),
            other => match ctx.environment.get(other) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(other);
                    out.push('}');
                }
            },
        }
    }
    out
}

fn reentrancy_key(event: &str, data: &serde_json::Value) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.to_string().hash(&mut hasher);
    format!("{}:{:x}", event, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn environment() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env.insert("GREETING".to_string(), "hello".to_string());
        env
    }

    fn command_hook(name: &str, command: &str, priority: i32) -> HookConfig {
        HookConfig {
            name: name.to_string(),
            action: HookAction::Command { command: command.to_string() },
            priority,
            enabled: true,
            run_async: false,
            timeout_ms: 5000,
            conditions: Vec::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_priority_order_with_stable_ties() {
        let mut manager = HookManager::new();
        manager.register("evt", command_hook("low", "true", 1));
        manager.register("evt", command_hook("high", "true", 10));
        manager.register("evt", command_hook("mid-a", "true", 5));
        manager.register("evt", command_hook("mid-b", "true", 5));

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        let names: Vec<&str> = outcome.results.iter().map(|r| r.hook_name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_callbacks_run_first_in_fifo() {
        let mut manager = HookManager::new();
        manager.register("evt", command_hook("configured", "true", 100));
        manager.on("evt", Box::new(|_| HookResult::ok("cb-1")));
        manager.on("evt", Box::new(|_| HookResult::ok("cb-2")));

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        let names: Vec<&str> = outcome.results.iter().map(|r| r.hook_name.as_str()).collect();
        assert_eq!(names, vec!["cb-1", "cb-2", "configured"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_callback_error_does_not_abort() {
        let mut manager = HookManager::new();
        manager.on("evt", Box::new(|_| HookResult::failed("bad-cb", "boom")));
        manager.register("evt", command_hook("after", "true", 0));

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[1].success);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_failure_halts_loop() {
        let mut manager = HookManager::new();
        manager.register("evt", command_hook("fails", "false", 10));
        manager.register("evt", command_hook("never-runs", "true", 1));

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].success);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_failure_continues() {
        let mut manager = HookManager::new();
        let mut failing = command_hook("fails-async", "false", 10);
        failing.run_async = true;
        manager.register("evt", failing);
        manager.register("evt", command_hook("still-runs", "true", 1));

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_produces_failure_result() {
        let mut manager = HookManager::new();
        let mut slow = command_hook("slow", "sleep 5", 0);
        slow.timeout_ms = 50;
        manager.register("evt", slow);

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].success);
        assert_eq!(outcome.results[0].error.as_deref(), Some("timeout"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conditions_gate_execution() {
        let mut manager = HookManager::new();
        let mut gated = command_hook("gated", "true", 0);
        gated.conditions = vec![ConditionSpec::Full(HookCondition {
            kind: ConditionKind::Env,
            value: "MISSING_VAR".to_string(),
            operator: None,
        })];
        manager.register("evt", gated);

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert!(outcome.results.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disabled_hook_skipped() {
        let mut manager = HookManager::new();
        let mut hook = command_hook("off", "true", 0);
        hook.enabled = false;
        manager.register("evt", hook);

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert!(outcome.results.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_function_hook_and_missing_function() {
        let mut manager = HookManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.define_function(
            "bump",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                HookResult::ok("bump")
            }),
        );
        manager.register(
            "evt",
            HookConfig {
                name: "fn-hook".to_string(),
                action: HookAction::Function { function: "bump".to_string() },
                priority: 0,
                enabled: true,
                run_async: false,
                timeout_ms: 1000,
                conditions: Vec::new(),
            },
        );
        manager.register(
            "evt2",
            HookConfig {
                name: "missing-fn".to_string(),
                action: HookAction::Function { function: "nope".to_string() },
                priority: 0,
                enabled: true,
                run_async: false,
                timeout_ms: 1000,
                conditions: Vec::new(),
            },
        );

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert!(outcome.results[0].success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let outcome = manager
            .execute_hooks("evt2", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert!(!outcome.results[0].success);
        assert!(outcome.results[0].error.as_ref().unwrap().contains("not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reentrancy_guard() {
        // A dispatch key marked active yields an empty outcome.
        let mut manager = HookManager::new();
        manager.register("evt", command_hook("any", "true", 0));
        let data = serde_json::json!({"n": 1});
        let key = reentrancy_key("evt", &data);
        manager.active.insert(key);

        let outcome = manager
            .execute_hooks("evt", data.clone(), "/tmp", &environment())
            .await;
        assert!(outcome.results.is_empty());

        // Different data is a different key and proceeds.
        let outcome = manager
            .execute_hooks("evt", serde_json::json!({"n": 2}), "/tmp", &environment())
            .await;
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_template_expansion_in_command() {
        let mut manager = HookManager::new();
        manager.register("evt", command_hook("echoes", "echo {event} {GREETING}", 0));
        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        let output = outcome.results[0].output.as_deref().unwrap_or_default();
        assert!(output.contains("evt"));
        assert!(output.contains("hello"));
    }

    #[test]
    fn test_expand_template_placeholders() {
        let ctx = HookContext {
            event: "command:before".to_string(),
            data: serde_json::json!({"k": "v"}),
            cwd: "/work".to_string(),
            environment: environment(),
            timestamp: 42,
        };
        assert_eq!(
            expand_template("{event}|{cwd}|{timestamp}", &ctx),
            "command:before|/work|42"
        );
        assert_eq!(expand_template("{GREETING}", &ctx), "hello");
        assert_eq!(expand_template("{data}", &ctx), r#"{"k":"v"}"#);
        // Unknown placeholders survive literally.
        assert_eq!(expand_template("{UNKNOWN}", &ctx), "{UNKNOWN}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_propagation_halts() {
        let mut manager = HookManager::new();
        manager.define_function(
            "stopper",
            Box::new(|_| HookResult {
                hook_name: "stopper".to_string(),
                success: true,
                stop_propagation: true,
                ..Default::default()
            }),
        );
        manager.register(
            "evt",
            HookConfig {
                name: "first".to_string(),
                action: HookAction::Function { function: "stopper".to_string() },
                priority: 10,
                enabled: true,
                run_async: false,
                timeout_ms: 1000,
                conditions: Vec::new(),
            },
        );
        manager.register("evt", command_hook("second", "true", 1));

        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].hook_name, "first");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prevent_default_folds_into_outcome() {
        let mut manager = HookManager::new();
        manager.on(
            "evt",
            Box::new(|_| HookResult {
                hook_name: "guard".to_string(),
                success: true,
                prevent_default: true,
                ..Default::default()
            }),
        );
        let outcome = manager
            .execute_hooks("evt", serde_json::json!({}), "/tmp", &environment())
            .await;
        assert!(outcome.prevent_default);
    }
}
