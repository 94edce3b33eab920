//! Command Substitution
//!
//! Runs `$(...)` and backtick bodies. Two modes:
//!
//! - `Sandbox` (default): only an explicit allowlist of command names may
//!   execute, and shell metacharacters (`;`, `|`, `&`, redirection,
//!   nested backticks) are rejected outright. The body is run as a single
//!   argv with output captured.
//! - `Full`: the body is handed to the shell's own executor through the
//!   [`SubstitutionHost`] capability.
//!
//! Trailing newlines are stripped from the captured output, as shells do.

use std::collections::HashMap;
use std::process::Stdio;

use tracing::debug;

use crate::error::ExpansionError;

/// How command substitution bodies are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionMode {
    Sandbox,
    Full,
}

/// Sandbox policy: mode plus the allowlisted command names.
#[derive(Debug, Clone)]
pub struct SubstitutionPolicy {
    pub mode: SubstitutionMode,
    pub allowlist: Vec<String>,
}

impl Default for SubstitutionPolicy {
    fn default() -> Self {
        Self {
            mode: SubstitutionMode::Sandbox,
            allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Commands the sandbox permits by default: read-only probes a prompt or
/// script is likely to need.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "basename", "cat", "date", "dirname", "echo", "git", "head", "hostname",
    "ls", "pwd", "tail", "tr", "uname", "wc", "which", "whoami",
];

/// Capability handle for `Full` mode: the shell's executor runs the body
/// and returns captured stdout.
pub trait SubstitutionHost {
    fn run_substitution(&mut self, body: &str) -> Result<String, ExpansionError>;
}

/// Metacharacters the sandbox refuses anywhere in the body.
const FORBIDDEN: &[char] = &[';', '|', '&', '<', '>', '`'];

/// Execute a substitution body under the sandbox policy.
pub fn run_sandboxed(
    body: &str,
    policy: &SubstitutionPolicy,
    env: &HashMap<String, String>,
    cwd: &str,
) -> Result<String, ExpansionError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(String::new());
    }
    if let Some(bad) = body.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(ExpansionError::SandboxViolation(format!(
            "metacharacter `{}` not allowed in sandboxed substitution",
            bad
        )));
    }

    let mut argv = body.split_whitespace();
    let name = match argv.next() {
        Some(name) => name,
        None => return Ok(String::new()),
    };
    if !policy.allowlist.iter().any(|allowed| allowed == name) {
        return Err(ExpansionError::SandboxViolation(format!(
            "command `{}` not in sandbox allowlist",
            name
        )));
    }

    debug!(command = name, "running sandboxed substitution");
    let output = std::process::Command::new(name)
        .args(argv)
        .envs(env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| ExpansionError::Substitution(format!("{}: {}", name, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    Ok(strip_trailing_newlines(&stdout))
}

/// Shells strip all trailing newlines from substitution output.
pub fn strip_trailing_newlines(s: &str) -> String {
    s.trim_end_matches('\n').to_string()
}
