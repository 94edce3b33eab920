//! Command Results
//!
//! The result record every execution path produces. Output is carried as
//! raw bytes so binary data survives capture and forwarding; text is only
//! decoded at boundaries that are inherently textual (builtin stdin,
//! substitution results, terminal messages). When `streamed` is set the
//! output already went to the terminal live and `stdout`/`stderr` may be
//! empty; callers must not re-emit them.

use std::time::Duration;

/// Script control-flow markers set by builtins; the script engine uses
/// them to unwind loops and functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultMetadata {
    pub is_return: bool,
    pub is_break: bool,
    pub is_continue: bool,
    /// Nesting levels for break/continue.
    pub level: u32,
}

impl ResultMetadata {
    pub fn is_control_flow(&self) -> bool {
        self.is_return || self.is_break || self.is_continue
    }
}

/// Execution result from a command, pipeline, or chain.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    pub streamed: bool,
    pub metadata: ResultMetadata,
}

impl CommandResult {
    pub fn new(
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
        exit_code: i32,
    ) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Success with no output.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_exit(exit_code: i32) -> Self {
        Self { exit_code, ..Default::default() }
    }

    /// Failure with a stderr message and exit 1.
    pub fn failure(stderr: impl Into<Vec<u8>>) -> Self {
        Self::failure_with_code(stderr, 1)
    }

    pub fn failure_with_code(stderr: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self { exit_code, stderr: stderr.into(), ..Default::default() }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded for display; invalid UTF-8 is replaced.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded for display; invalid UTF-8 is replaced.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_result() {
        let r = CommandResult::ok();
        assert_eq!(r.exit_code, 0);
        assert!(r.success());
        assert!(!r.streamed);
    }

    #[test]
    fn test_failure_result() {
        let r = CommandResult::failure("bad things\n");
        assert_eq!(r.exit_code, 1);
        assert_eq!(r.stderr_text(), "bad things\n");
        assert!(!r.success());
    }

    #[test]
    fn test_constructors_accept_strings_and_bytes() {
        let from_str = CommandResult::new("text", "", 0);
        assert_eq!(from_str.stdout, b"text");

        let raw = vec![0xff, 0xfe, b'x'];
        let from_bytes = CommandResult::new(raw.clone(), Vec::new(), 0);
        assert_eq!(from_bytes.stdout, raw, "bytes pass through unmodified");
        assert!(from_bytes.stdout_text().contains('x'));
    }

    #[test]
    fn test_metadata_control_flow() {
        let mut m = ResultMetadata::default();
        assert!(!m.is_control_flow());
        m.is_break = true;
        m.level = 2;
        assert!(m.is_control_flow());
    }
}
