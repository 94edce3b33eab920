//! Hook Condition Evaluation
//!
//! A hook runs only when all of its conditions pass (AND). Kinds:
//! `env` (variable present and truthy), `file` (exists, is a file),
//! `directory` (exists, is a directory), `command` (resolvable on PATH),
//! `custom` (small expression evaluated against the context). The
//! optional `not` operator inverts the result. A bare-string condition
//! runs as a shell command and passes iff it exits 0.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hooks::HookContext;

/// Condition kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Env,
    File,
    Directory,
    Command,
    Custom,
}

/// A structured condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub value: String,
    #[serde(default)]
    pub operator: Option<String>,
}

/// Either a structured condition or a bare command string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Command(String),
    Full(HookCondition),
}

/// Evaluate all conditions; empty list passes.
pub fn evaluate_all(conditions: &[ConditionSpec], ctx: &HookContext) -> bool {
    conditions.iter().all(|condition| evaluate(condition, ctx))
}

/// Evaluate one condition spec.
pub fn evaluate(condition: &ConditionSpec, ctx: &HookContext) -> bool {
    match condition {
        ConditionSpec::Command(text) => run_probe_command(text, ctx),
        ConditionSpec::Full(full) => {
            let passed = match full.kind {
                ConditionKind::Env => env_truthy(ctx, &full.value),
                ConditionKind::File => resolve_path(ctx, &full.value).is_file(),
                ConditionKind::Directory => resolve_path(ctx, &full.value).is_dir(),
                ConditionKind::Command => command_on_path(ctx, &full.value),
                ConditionKind::Custom => custom_expression(ctx, &full.value),
            };
            if full.operator.as_deref() == Some("not") {
                !passed
            } else {
                passed
            }
        }
    }
}

fn env_truthy(ctx: &HookContext, name: &str) -> bool {
    match ctx.environment.get(name) {
        Some(value) => !value.is_empty() && value != "0" && value != "false",
        None => false,
    }
}

fn resolve_path(ctx: &HookContext, value: &str) -> std::path::PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new(&ctx.cwd).join(path)
    }
}

fn command_on_path(ctx: &HookContext, name: &str) -> bool {
    if name.contains('/') {
        return Path::new(name).is_file();
    }
    let path_var = match ctx.environment.get("PATH") {
        Some(path) => path.clone(),
        None => return false,
    };
    path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .any(|dir| Path::new(dir).join(name).is_file())
}

/// Tiny expression language for `custom` conditions, evaluated after
/// template expansion: `a == b`, `a != b`, `a contains b`, or a bare
/// truthy value (non-empty, not "0"/"false").
fn custom_expression(ctx: &HookContext, expression: &str) -> bool {
    let expanded = crate::hooks::expand_template(expression, ctx);
    if let Some((left, right)) = split_operator(&expanded, "==") {
        return left == right;
    }
    if let Some((left, right)) = split_operator(&expanded, "!=") {
        return left != right;
    }
    if let Some((left, right)) = split_operator(&expanded, "contains") {
        return left.contains(&right);
    }
    let bare = expanded.trim();
    !bare.is_empty() && bare != "0" && bare != "false"
}

fn split_operator(expression: &str, op: &str) -> Option<(String, String)> {
    let pattern = format!(" {} ", op);
    expression.split_once(&pattern).map(|(left, right)| {
        (
            left.trim().trim_matches('\'').trim_matches('"').to_string(),
            right.trim().trim_matches('\'').trim_matches('"').to_string(),
        )
    })
}

/// Bare-string condition: run it as a shell command, pass on exit 0.
fn run_probe_command(text: &str, ctx: &HookContext) -> bool {
    let expanded = crate::hooks::expand_template(text, ctx);
    std::process::Command::new("sh")
        .arg("-c")
        .arg(&expanded)
        .current_dir(&ctx.cwd)
        .envs(&ctx.environment)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookContext;

    fn ctx() -> HookContext {
        let mut environment = std::collections::HashMap::new();
        environment.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        environment.insert("SET_VAR".to_string(), "yes".to_string());
        environment.insert("ZERO_VAR".to_string(), "0".to_string());
        HookContext {
            event: "command:before".to_string(),
            data: serde_json::json!({"command": "ls"}),
            cwd: "/tmp".to_string(),
            environment,
            timestamp: 1_700_000_000,
        }
    }

    fn full(kind: ConditionKind, value: &str) -> ConditionSpec {
        ConditionSpec::Full(HookCondition { kind, value: value.to_string(), operator: None })
    }

    #[test]
    fn test_env_condition() {
        assert!(evaluate(&full(ConditionKind::Env, "SET_VAR"), &ctx()));
        assert!(!evaluate(&full(ConditionKind::Env, "MISSING_VAR"), &ctx()));
        assert!(!evaluate(&full(ConditionKind::Env, "ZERO_VAR"), &ctx()));
    }

    #[test]
    fn test_not_operator_inverts() {
        let condition = ConditionSpec::Full(HookCondition {
            kind: ConditionKind::Env,
            value: "MISSING_VAR".to_string(),
            operator: Some("not".to_string()),
        });
        assert!(evaluate(&condition, &ctx()));
    }

    #[test]
    fn test_file_and_directory_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("probe.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(evaluate(
            &full(ConditionKind::File, &file.to_string_lossy()),
            &ctx()
        ));
        assert!(evaluate(
            &full(ConditionKind::Directory, &dir.path().to_string_lossy()),
            &ctx()
        ));
        assert!(!evaluate(
            &full(ConditionKind::File, &dir.path().to_string_lossy()),
            &ctx()
        ));
    }

    #[test]
    fn test_command_condition() {
        assert!(evaluate(&full(ConditionKind::Command, "sh"), &ctx()));
        assert!(!evaluate(&full(ConditionKind::Command, "no-such-cmd-xyz"), &ctx()));
    }

    #[test]
    fn test_custom_expression() {
        assert!(evaluate(&full(ConditionKind::Custom, "{event} == 'command:before'"), &ctx()));
        assert!(evaluate(&full(ConditionKind::Custom, "{event} != 'prompt:before'"), &ctx()));
        assert!(evaluate(&full(ConditionKind::Custom, "{cwd} contains tmp"), &ctx()));
        assert!(!evaluate(&full(ConditionKind::Custom, ""), &ctx()));
        assert!(evaluate(&full(ConditionKind::Custom, "anything"), &ctx()));
    }

    #[test]
    fn test_string_condition_runs_command() {
        assert!(evaluate(&ConditionSpec::Command("true".to_string()), &ctx()));
        assert!(!evaluate(&ConditionSpec::Command("false".to_string()), &ctx()));
    }

    #[test]
    fn test_evaluate_all_is_and() {
        let conditions = vec![
            full(ConditionKind::Env, "SET_VAR"),
            full(ConditionKind::Command, "sh"),
        ];
        assert!(evaluate_all(&conditions, &ctx()));

        let conditions = vec![
            full(ConditionKind::Env, "SET_VAR"),
            full(ConditionKind::Env, "MISSING_VAR"),
        ];
        assert!(!evaluate_all(&conditions, &ctx()));
        assert!(evaluate_all(&[], &ctx()));
    }
}
