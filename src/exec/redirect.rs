//! Redirection Resolver
//!
//! Translates a command's parsed redirections into an ordered list of fd
//! operations, then folds those operations into the effective wiring for
//! stdin, stdout, and stderr. Operations apply left to right; when several
//! target the same fd, the last one wins (dups observe the state at the
//! point they appear, so `> f 2>&1` and `2>&1 > f` differ as expected).

use crate::ast::{RedirKind, Redirection, Word};
use crate::error::{ExpansionError, ShellError};

/// A single fd operation, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum FdOp {
    /// Open `path` on `fd` (read for fd 0, write/append otherwise).
    Open { fd: i32, path: String, append: bool },
    /// `to>&from`: make `to` refer to whatever `from` currently is.
    Dup { from: i32, to: i32 },
    /// `fd>&-`
    Close { fd: i32 },
    /// Here-doc / here-string body for stdin.
    Feed { content: String },
}

/// Effective stdin source after folding.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StdinSpec {
    #[default]
    Default,
    File(String),
    Content(String),
}

/// Effective sink for stdout or stderr after folding.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OutSpec {
    #[default]
    Default,
    File { path: String, append: bool },
    /// Write wherever the other stream writes (resolved snapshot).
    SameAsStdout,
    SameAsStderr,
    Closed,
}

/// The folded wiring for one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedirectionPlan {
    pub stdin: StdinSpec,
    pub stdout: OutSpec,
    pub stderr: OutSpec,
}

impl RedirectionPlan {
    pub fn is_default(&self) -> bool {
        *self == RedirectionPlan::default()
    }

    /// True when stdout is redirected away from the pipe/terminal; a
    /// pipeline link for this stage is superseded in that case.
    pub fn stdout_redirected(&self) -> bool {
        self.stdout != OutSpec::Default
    }
}

/// Lower parsed redirections into fd operations. `expand` resolves each
/// target word (parameter/tilde expansion, no splitting).
pub fn lower<F>(redirections: &[Redirection], mut expand: F) -> Result<Vec<FdOp>, ShellError>
where
    F: FnMut(&Word) -> Result<String, ExpansionError>,
{
    let mut ops = Vec::with_capacity(redirections.len());
    for redirection in redirections {
        match redirection {
            Redirection::File { kind, target } => {
                let path = expand(target)?;
                match kind {
                    RedirKind::Both { append } => {
                        // `&>f` is `>f 2>&1`.
                        ops.push(FdOp::Open { fd: 1, path, append: *append });
                        ops.push(FdOp::Dup { from: 1, to: 2 });
                    }
                    kind => ops.push(FdOp::Open {
                        fd: kind.fd(),
                        path,
                        append: kind.is_append(),
                    }),
                }
            }
            Redirection::FdDup { fd, target: Some(from) } => {
                ops.push(FdOp::Dup { from: *from, to: *fd })
            }
            Redirection::FdDup { fd, target: None } => ops.push(FdOp::Close { fd: *fd }),
            Redirection::HereDoc { content, .. } => {
                ops.push(FdOp::Feed { content: content.clone() })
            }
            Redirection::HereString { word } => {
                let mut content = expand(word)?;
                content.push('\n');
                ops.push(FdOp::Feed { content });
            }
        }
    }
    Ok(ops)
}

/// Fold fd operations into the effective three-stream wiring.
pub fn fold(ops: &[FdOp]) -> Result<RedirectionPlan, ShellError> {
    let mut plan = RedirectionPlan::default();

    // Track what fds 1 and 2 currently point at so dups snapshot state.
    for op in ops {
        match op {
            FdOp::Open { fd, path, append } => match fd {
                0 => plan.stdin = StdinSpec::File(path.clone()),
                1 => plan.stdout = OutSpec::File { path: path.clone(), append: *append },
                2 => plan.stderr = OutSpec::File { path: path.clone(), append: *append },
                n => {
                    return Err(ShellError::Redirection {
                        target: path.clone(),
                        message: format!("unsupported file descriptor {}", n),
                    })
                }
            },
            FdOp::Dup { from, to } => {
                let source = match from {
                    1 => plan.stdout.clone(),
                    2 => plan.stderr.clone(),
                    0 => {
                        return Err(ShellError::Redirection {
                            target: format!("{}>&{}", to, from),
                            message: "cannot duplicate stdin onto an output".to_string(),
                        })
                    }
                    n => {
                        return Err(ShellError::Redirection {
                            target: format!("{}>&{}", to, n),
                            message: format!("bad file descriptor {}", n),
                        })
                    }
                };
                let resolved = match source {
                    // Snapshot: duplicate the current target, or alias the
                    // stream itself when it is still default.
                    OutSpec::Default => {
                        if *from == 1 {
                            OutSpec::SameAsStdout
                        } else {
                            OutSpec::SameAsStderr
                        }
                    }
                    other => other,
                };
                match to {
                    1 => plan.stdout = resolved,
                    2 => plan.stderr = resolved,
                    n => {
                        return Err(ShellError::Redirection {
                            target: format!("{}>&{}", n, from),
                            message: format!("unsupported file descriptor {}", n),
                        })
                    }
                }
            }
            FdOp::Close { fd } => match fd {
                1 => plan.stdout = OutSpec::Closed,
                2 => plan.stderr = OutSpec::Closed,
                0 => plan.stdin = StdinSpec::Content(String::new()),
                _ => {}
            },
            FdOp::Feed { content } => plan.stdin = StdinSpec::Content(content.clone()),
        }
    }
    Ok(plan)
}

/// Lower and fold in one step.
pub fn resolve<F>(
    redirections: &[Redirection],
    expand: F,
) -> Result<RedirectionPlan, ShellError>
where
    F: FnMut(&Word) -> Result<String, ExpansionError>,
{
    fold(&lower(redirections, expand)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(word: &Word) -> Result<String, ExpansionError> {
        Ok(word.flat_text())
    }

    fn file(kind: RedirKind, path: &str) -> Redirection {
        Redirection::File { kind, target: Word::unquoted(path) }
    }

    #[test]
    fn test_simple_output() {
        let plan = resolve(&[file(RedirKind::Output, "out.txt")], literal).unwrap();
        assert_eq!(plan.stdout, OutSpec::File { path: "out.txt".into(), append: false });
        assert_eq!(plan.stderr, OutSpec::Default);
    }

    #[test]
    fn test_append_and_error() {
        let plan = resolve(
            &[file(RedirKind::Append, "log"), file(RedirKind::Error, "err")],
            literal,
        )
        .unwrap();
        assert_eq!(plan.stdout, OutSpec::File { path: "log".into(), append: true });
        assert_eq!(plan.stderr, OutSpec::File { path: "err".into(), append: false });
    }

    #[test]
    fn test_input_file() {
        let plan = resolve(&[file(RedirKind::Input, "data.txt")], literal).unwrap();
        assert_eq!(plan.stdin, StdinSpec::File("data.txt".into()));
    }

    #[test]
    fn test_both_records_append_flag() {
        let plan = resolve(&[file(RedirKind::Both { append: true }, "all")], literal).unwrap();
        assert_eq!(plan.stdout, OutSpec::File { path: "all".into(), append: true });
        assert_eq!(plan.stderr, OutSpec::File { path: "all".into(), append: true });
    }

    #[test]
    fn test_dup_after_redirect_follows_file() {
        // `> f 2>&1`: stderr joins the file.
        let plan = resolve(
            &[
                file(RedirKind::Output, "f"),
                Redirection::FdDup { fd: 2, target: Some(1) },
            ],
            literal,
        )
        .unwrap();
        assert_eq!(plan.stderr, OutSpec::File { path: "f".into(), append: false });
    }

    #[test]
    fn test_dup_before_redirect_keeps_original() {
        // `2>&1 > f`: stderr aliases the original stdout, not the file.
        let plan = resolve(
            &[
                Redirection::FdDup { fd: 2, target: Some(1) },
                file(RedirKind::Output, "f"),
            ],
            literal,
        )
        .unwrap();
        assert_eq!(plan.stderr, OutSpec::SameAsStdout);
        assert_eq!(plan.stdout, OutSpec::File { path: "f".into(), append: false });
    }

    #[test]
    fn test_last_redirection_wins() {
        let plan = resolve(
            &[file(RedirKind::Output, "first"), file(RedirKind::Output, "second")],
            literal,
        )
        .unwrap();
        assert_eq!(plan.stdout, OutSpec::File { path: "second".into(), append: false });
    }

    #[test]
    fn test_close_fd() {
        let plan = resolve(&[Redirection::FdDup { fd: 2, target: None }], literal).unwrap();
        assert_eq!(plan.stderr, OutSpec::Closed);
    }

    #[test]
    fn test_heredoc_feeds_stdin() {
        let plan = resolve(
            &[Redirection::HereDoc {
                delimiter: "EOF".into(),
                strip_tabs: false,
                content: "body\n".into(),
            }],
            literal,
        )
        .unwrap();
        assert_eq!(plan.stdin, StdinSpec::Content("body\n".into()));
    }

    #[test]
    fn test_herestring_appends_newline() {
        let plan = resolve(
            &[Redirection::HereString { word: Word::unquoted("hello") }],
            literal,
        )
        .unwrap();
        assert_eq!(plan.stdin, StdinSpec::Content("hello\n".into()));
    }

    #[test]
    fn test_bad_fd_is_redirection_error() {
        let err = resolve(&[file(RedirKind::Both { append: false }, "x")], |_| {
            Err(ExpansionError::UnboundVariable("X".into()))
        })
        .unwrap_err();
        assert!(matches!(err, ShellError::Expansion(_)));

        let ops = vec![FdOp::Dup { from: 7, to: 1 }];
        assert!(fold(&ops).is_err());
    }
}
