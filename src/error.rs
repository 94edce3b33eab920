//! Shell Error Taxonomy
//!
//! Every failure the core can produce maps to one of these kinds. Errors
//! carry enough context to print the user-facing message and to compute the
//! exit code of the failed command; they never abort the REPL.

use thiserror::Error;

/// Exit code for a command that could not be found on PATH.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code for a command that was found but could not be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit code reported for a syntax error.
pub const EXIT_SYNTAX_ERROR: i32 = 2;

/// Base added to the signal number when a process dies from a signal.
pub const EXIT_SIGNAL_BASE: i32 = 128;

/// Unified error type for the shell core.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Syntax error in a chain, pipeline, or redirection. Nothing executes.
    #[error("syntax error: {0}")]
    Parse(String),

    /// Word expansion failed (unbound variable under `set -u`, invalid
    /// arithmetic, sandbox-forbidden command substitution).
    #[error("{0}")]
    Expansion(#[from] ExpansionError),

    /// A child process could not be spawned.
    #[error("{name}: {message}")]
    Spawn {
        name: String,
        message: String,
        /// 127 for not-found, 126 for permission denied.
        exit_code: i32,
    },

    /// A redirection target could not be opened or an fd was invalid.
    #[error("{target}: {message}")]
    Redirection { target: String, message: String },

    /// A command exceeded its configured timeout and was killed.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, signal: i32 },

    /// A job operation referenced a missing job or an invalid transition.
    /// Job APIs normally report this by returning `false`; the variant
    /// exists for the builtins that must print a message.
    #[error("job {0}: no such job")]
    Job(u32),

    /// A hook handler failed. Recorded in the hook result, never fatal.
    #[error("hook '{name}': {message}")]
    Hook { name: String, message: String },

    /// History persistence failed. Logged, non-fatal.
    #[error("history: {0}")]
    History(String),

    /// Underlying I/O failure not covered by a more specific kind.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Exit code a failed command reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::Parse(_) => EXIT_SYNTAX_ERROR,
            ShellError::Expansion(_) => 1,
            ShellError::Spawn { exit_code, .. } => *exit_code,
            ShellError::Redirection { .. } => 1,
            ShellError::Timeout { signal, .. } => EXIT_SIGNAL_BASE + signal,
            ShellError::Job(_) => 1,
            ShellError::Hook { .. } => 1,
            ShellError::History(_) => 1,
            ShellError::Io(_) => 1,
        }
    }

    /// Spawn failure for a command that is not on PATH.
    pub fn not_found(name: impl Into<String>) -> Self {
        ShellError::Spawn {
            name: name.into(),
            message: "command not found".to_string(),
            exit_code: EXIT_NOT_FOUND,
        }
    }

    /// Spawn failure for a command that exists but cannot be executed.
    pub fn not_executable(name: impl Into<String>) -> Self {
        ShellError::Spawn {
            name: name.into(),
            message: "permission denied".to_string(),
            exit_code: EXIT_NOT_EXECUTABLE,
        }
    }
}

/// Errors produced during word expansion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpansionError {
    /// `set -u` and a variable with no value and no `:-` default.
    #[error("{0}: unbound variable")]
    UnboundVariable(String),

    /// Arithmetic expression could not be parsed or evaluated.
    #[error("arithmetic: {0}")]
    Arithmetic(String),

    /// Command substitution rejected by the sandbox.
    #[error("command substitution: {0}")]
    SandboxViolation(String),

    /// Command substitution accepted but failed to run.
    #[error("command substitution: {0}")]
    Substitution(String),

    /// History reference (`!n`, `!prefix`) with no matching entry.
    #[error("{0}: event not found")]
    HistoryNotFound(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShellError>;
