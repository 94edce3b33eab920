//! Pipeline Executor
//!
//! Runs parsed chains. Two pipeline strategies:
//!
//! - **Streaming**: external-only pipelines under `streamOutput` are wired
//!   with real OS pipes, share a fresh process group (leader pid = pgid),
//!   and write to the terminal live. `CommandResult.streamed` is set.
//! - **Captured**: pipelines containing builtins (or any capturing
//!   context, e.g. full-mode command substitution) run stage by stage;
//!   a builtin stage executes in-process into a byte buffer which is
//!   forwarded to the next stage's stdin.
//!
//! Exit policy: the last stage's code, or the rightmost non-zero code
//! under `pipefail`. Chains short-circuit on `&&`/`||`. Timeouts deliver
//! the configured kill signal to the pgid and escalate to SIGKILL after a
//! grace period.

use std::io::Write;
use std::os::fd::{FromRawFd, OwnedFd};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::ast::{ChainOperator, Command, CommandChain, Pipeline, QuoteKind, Word};
use crate::builtins::{BuiltinContext, BuiltinRegistry};
use crate::config::ExecutionConfig;
use crate::error::{ExpansionError, ShellError, EXIT_SIGNAL_BASE};
use crate::exec::redirect::{self, OutSpec, RedirectionPlan, StdinSpec};
use crate::exec::result::CommandResult;
use crate::expansion::{
    self, resolve_executable, Expander, ExpansionCaches, SpecialVars, SubstitutionHost,
    SubstitutionMode, SubstitutionPolicy,
};
use crate::history::HistoryStore;
use crate::jobs::{signals, JobManager};
use crate::parser;
use crate::shell::ShellState;

/// Polling cadence for suspend/timeout checks while a foreground
/// pipeline runs.
const WAIT_POLL_MS: u64 = 25;

/// Grace period between the configured kill signal and SIGKILL.
const KILL_GRACE_MS: u64 = 200;

/// Immutable executor configuration, borrowed from the shell per run.
pub struct Executor<'a> {
    pub builtins: &'a BuiltinRegistry,
    pub exec_config: &'a ExecutionConfig,
    pub policy: &'a SubstitutionPolicy,
    pub stream_output: bool,
}

/// Mutable shell pieces threaded through one execution.
pub struct ExecEnv<'a> {
    pub state: &'a mut ShellState,
    pub caches: &'a mut ExpansionCaches,
    pub jobs: Option<&'a JobManager>,
    pub history: Option<&'a mut HistoryStore>,
}

/// One prepared pipeline stage: expanded argv plus folded redirections.
#[derive(Debug)]
struct Stage {
    argv: Vec<String>,
    plan: RedirectionPlan,
    kind: StageKind,
}

#[derive(Debug)]
enum StageKind {
    Builtin,
    External(std::path::PathBuf),
    /// Redirections with no command name: apply them and succeed.
    RedirectionsOnly,
    /// Command name did not resolve; carries the failure result.
    Failed(i32, String),
}

impl<'a> Executor<'a> {
    /// Evaluate a full chain with short-circuit semantics. The final exit
    /// code is the last executed segment's.
    pub async fn run_chain(&self, env: &mut ExecEnv<'_>, chain: &CommandChain) -> CommandResult {
        let mut aggregate = CommandResult::ok();
        let mut last = CommandResult::ok();

        for (index, pipeline) in chain.pipelines.iter().enumerate() {
            if index > 0 {
                let run = match chain.operators[index - 1] {
                    ChainOperator::And => last.exit_code == 0,
                    ChainOperator::Or => last.exit_code != 0,
                    ChainOperator::Seq => true,
                };
                if !run {
                    continue;
                }
            }

            last = self.run_pipeline(env, pipeline).await;
            env.state.last_exit_code = last.exit_code;

            aggregate.stdout.extend_from_slice(&last.stdout);
            aggregate.stderr.extend_from_slice(&last.stderr);
            aggregate.streamed = aggregate.streamed || last.streamed;
            aggregate.duration += last.duration;

            if last.metadata.is_control_flow() {
                aggregate.metadata = last.metadata;
                break;
            }
            if env.state.exit_requested.is_some() {
                break;
            }
            if env.state.options.errexit && last.exit_code != 0 {
                break;
            }
        }

        aggregate.exit_code = last.exit_code;
        aggregate
    }

    /// Execute one pipeline, choosing the streaming or captured strategy.
    pub async fn run_pipeline(&self, env: &mut ExecEnv<'_>, pipeline: &Pipeline) -> CommandResult {
        let started = Instant::now();
        let mut stages = Vec::with_capacity(pipeline.commands.len());
        for command in &pipeline.commands {
            match self.prepare_stage(env, command) {
                Ok(stage) => stages.push(stage),
                Err(error) => {
                    let code = error.exit_code();
                    env.state.last_exit_code = code;
                    return CommandResult::failure_with_code(format!("krusty: {}\n", error), code);
                }
            }
        }

        if stages.is_empty() {
            return CommandResult::ok();
        }

        let raw = pipeline.render();
        let all_external = stages
            .iter()
            .all(|stage| matches!(stage.kind, StageKind::External(_)));

        let mut result = if pipeline.background {
            self.spawn_background(env, stages, &raw).await
        } else if all_external && self.stream_output {
            self.run_streaming(env, stages, &raw).await
        } else {
            self.run_captured(env, stages).await
        };
        result.duration = started.elapsed();
        result
    }

    // ------------------------------------------------------------------
    // Stage preparation: alias expansion, word expansion, xtrace,
    // redirection folding, command resolution
    // ------------------------------------------------------------------

    fn prepare_stage(&self, env: &mut ExecEnv<'_>, command: &Command) -> Result<Stage, ShellError> {
        let words = self.apply_aliases(env, &command.words);
        let (argv, plan) = self.expand_command(env, &words, &command.redirections)?;

        if env.state.options.xtrace && !argv.is_empty() {
            eprintln!("+ {}", argv.join(" "));
        }

        let kind = if argv.is_empty() {
            StageKind::RedirectionsOnly
        } else if self.builtins.contains(&argv[0]) {
            StageKind::Builtin
        } else {
            let path_var = env.state.env.get("PATH").cloned().unwrap_or_default();
            match resolve_executable(env.caches, &argv[0], &path_var) {
                Some(path) => StageKind::External(path),
                None => StageKind::Failed(
                    crate::error::EXIT_NOT_FOUND,
                    format!("krusty: {}: command not found\n", argv[0]),
                ),
            }
        };

        Ok(Stage { argv, plan, kind })
    }

    /// One-level alias expansion on the command position.
    fn apply_aliases(&self, env: &ExecEnv<'_>, words: &[Word]) -> Vec<Word> {
        let first = match words.first() {
            Some(word) if !word.is_quoted() => word.flat_text(),
            _ => return words.to_vec(),
        };
        let replacement = match env.state.aliases.get(&first) {
            Some(text) => text.clone(),
            None => return words.to_vec(),
        };
        let mut spliced = match parser::Lexer::new(&replacement).tokenize() {
            Ok(tokens) => tokens
                .into_iter()
                .filter_map(|token| match token {
                    parser::Token::Word(word) => Some(word),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            Err(_) => vec![Word::quoted(replacement, QuoteKind::Single)],
        };
        spliced.extend(words.iter().skip(1).cloned());
        spliced
    }

    fn expand_command(
        &self,
        env: &mut ExecEnv<'_>,
        words: &[Word],
        redirections: &[crate::ast::Redirection],
    ) -> Result<(Vec<String>, RedirectionPlan), ShellError> {
        // Full-mode substitution runs against a subshell snapshot of the
        // state; mutations inside `$(...)` do not leak out.
        let mut host = if self.policy.mode == SubstitutionMode::Full {
            Some(ShellSubstHost {
                builtins: self.builtins,
                exec_config: self.exec_config,
                policy: self.policy,
                state: env.state.clone(),
                caches: ExpansionCaches::default(),
            })
        } else {
            None
        };

        let special = SpecialVars {
            last_exit: env.state.last_exit_code,
            shell_pid: env.state.shell_pid,
            last_bg_pid: env.state.last_background_pid,
        };
        let mut expander = Expander {
            env: &env.state.env,
            cwd: &env.state.cwd,
            nounset: env.state.options.nounset,
            noglob: env.state.options.noglob,
            special,
            history: env.history.as_deref(),
            caches: &mut *env.caches,
            policy: self.policy,
            host: host.as_mut().map(|h| h as &mut dyn SubstitutionHost),
        };

        let argv = expander.expand_words(words)?;
        let plan = redirect::resolve(redirections, |word| expander.expand_to_string(word))?;
        Ok((argv, plan))
    }

    // ------------------------------------------------------------------
    // Streaming strategy
    // ------------------------------------------------------------------

    async fn run_streaming(
        &self,
        env: &mut ExecEnv<'_>,
        stages: Vec<Stage>,
        raw: &str,
    ) -> CommandResult {
        let spawned = match self.spawn_pipeline(env, &stages, false) {
            Ok(spawned) => spawned,
            Err(error) => {
                return CommandResult::failure_with_code(
                    format!("krusty: {}\n", error),
                    error.exit_code(),
                )
            }
        };
        let pgid = spawned.pgid;
        let job_id = env
            .jobs
            .map(|jobs| jobs.add_job(raw, pgid, false));

        signals::give_terminal_to(pgid);
        let outcome = self.wait_foreground(spawned.children, pgid).await;
        signals::reclaim_terminal();

        let mut result = match outcome {
            WaitOutcome::Completed { codes, timed_out } => {
                if let (Some(jobs), Some(id)) = (env.jobs, job_id) {
                    jobs.mark_done(id, *codes.last().unwrap_or(&0));
                    // Only this job leaves the table; finished background
                    // jobs stay until the next prompt reports them.
                    jobs.remove(id);
                }
                let mut result = CommandResult::with_exit(final_exit_code(
                    &codes,
                    env.state.options.pipefail,
                ));
                if timed_out {
                    result.stderr =
                        format!("krusty: {}: command timed out\n", first_word(raw)).into_bytes();
                }
                result
            }
            WaitOutcome::Suspended { remaining, .. } => {
                signals::clear_foreground_pgid();
                if let (Some(jobs), Some(id)) = (env.jobs, job_id) {
                    jobs.suspend(id);
                    // A waiter keeps the handles and records the real exit
                    // whenever the job is resumed and finishes.
                    let waiter = jobs.clone();
                    tokio::spawn(async move {
                        let mut code = 0;
                        for mut child in remaining {
                            if let Ok(status) = child.wait().await {
                                code = exit_code_from_status(status);
                            }
                        }
                        waiter.mark_done(id, code);
                    });
                    let label = jobs
                        .get(id)
                        .map(|job| format!("[{}]+  Stopped    {}\n", job.id, job.command))
                        .unwrap_or_default();
                    eprint!("{}", label);
                }
                CommandResult::with_exit(EXIT_SIGNAL_BASE + libc::SIGTSTP)
            }
        };
        result.streamed = true;
        result
    }

    async fn spawn_background(
        &self,
        env: &mut ExecEnv<'_>,
        stages: Vec<Stage>,
        raw: &str,
    ) -> CommandResult {
        // Builtins inside a background pipeline run in subshell fashion
        // against a state snapshot; only external stages survive to the
        // job table.
        if stages
            .iter()
            .any(|stage| !matches!(stage.kind, StageKind::External(_)))
        {
            let mut snapshot = env.state.clone();
            let mut caches = ExpansionCaches::default();
            let mut sub_env = ExecEnv {
                state: &mut snapshot,
                caches: &mut caches,
                jobs: None,
                history: None,
            };
            let result = self.run_captured(&mut sub_env, stages).await;
            if !result.stdout.is_empty() {
                let _ = std::io::stdout().write_all(&result.stdout);
            }
            if !result.stderr.is_empty() {
                let _ = std::io::stderr().write_all(&result.stderr);
            }
            return CommandResult::with_exit(result.exit_code);
        }

        let spawned = match self.spawn_pipeline(env, &stages, true) {
            Ok(spawned) => spawned,
            Err(error) => {
                return CommandResult::failure_with_code(
                    format!("krusty: {}\n", error),
                    error.exit_code(),
                )
            }
        };
        let pgid = spawned.pgid;
        env.state.last_background_pid = Some(pgid as u32);

        let job_id = env.jobs.map(|jobs| jobs.add_job(raw, pgid, true));
        if let (Some(jobs), Some(id)) = (env.jobs, job_id) {
            let waiter = jobs.clone();
            let children = spawned.children;
            tokio::spawn(async move {
                let mut code = 0;
                for mut child in children {
                    if let Ok(status) = child.wait().await {
                        code = exit_code_from_status(status);
                    }
                }
                waiter.mark_done(id, code);
            });
            println!("[{}] {}", id, pgid);
        }
        CommandResult::ok()
    }

    /// Spawn every stage of an external pipeline, wiring OS pipes between
    /// adjacent stages and placing all children in one process group.
    fn spawn_pipeline(
        &self,
        env: &ExecEnv<'_>,
        stages: &[Stage],
        background: bool,
    ) -> Result<SpawnedPipeline, ShellError> {
        let count = stages.len();
        let mut children: Vec<Child> = Vec::with_capacity(count);
        let mut pgid: i32 = 0;
        let mut prev_read: Option<OwnedFd> = None;
        let mut feeds: Vec<(OwnedFd, String)> = Vec::new();

        for (index, stage) in stages.iter().enumerate() {
            let path = match &stage.kind {
                StageKind::External(path) => path,
                _ => {
                    return Err(ShellError::Spawn {
                        name: stage.argv.first().cloned().unwrap_or_default(),
                        message: "not an external command".to_string(),
                        exit_code: 1,
                    })
                }
            };

            let mut command = tokio::process::Command::new(path);
            command.args(&stage.argv[1..]);
            command.env_clear();
            command.envs(&env.state.env);
            command.current_dir(&env.state.cwd);

            // stdin
            match &stage.plan.stdin {
                StdinSpec::Default => match prev_read.take() {
                    Some(read_end) => {
                        command.stdin(Stdio::from(std::fs::File::from(read_end)));
                    }
                    None if background => {
                        command.stdin(Stdio::null());
                    }
                    None => {
                        command.stdin(Stdio::inherit());
                    }
                },
                StdinSpec::File(path) => {
                    let file = std::fs::File::open(path).map_err(|e| {
                        ShellError::Redirection { target: path.clone(), message: e.to_string() }
                    })?;
                    command.stdin(Stdio::from(file));
                }
                StdinSpec::Content(content) => {
                    let (read_end, write_end) = os_pipe()?;
                    command.stdin(Stdio::from(std::fs::File::from(read_end)));
                    feeds.push((write_end, content.clone()));
                }
            }

            // Pipe to the next stage, unless this stage's stdout is
            // redirected (the redirection supersedes the pipe link).
            let mut next_read: Option<OwnedFd> = None;
            let pipe_write: Option<OwnedFd> = if index + 1 < count {
                let (read_end, write_end) = os_pipe()?;
                next_read = Some(read_end);
                Some(write_end)
            } else {
                None
            };

            let stdout_file = self.wire_stdout(&mut command, stage, pipe_write)?;
            self.wire_stderr(&mut command, stage, stdout_file)?;

            let leader_pgid = pgid;
            unsafe {
                command.pre_exec(move || {
                    libc::setpgid(0, leader_pgid);
                    Ok(())
                });
            }

            let child = command.spawn().map_err(|e| spawn_error(&stage.argv[0], e))?;
            if index == 0 {
                pgid = child.id().map(|pid| pid as i32).unwrap_or(0);
                // Mirror the child's setpgid from the parent side to
                // close the window before the first exec.
                unsafe {
                    libc::setpgid(pgid, pgid);
                }
            }
            prev_read = next_read;
            children.push(child);
        }

        // Feed here-doc/here-string content from blocking tasks so large
        // bodies cannot deadlock against the pipe buffer.
        for (write_end, content) in feeds {
            tokio::task::spawn_blocking(move || {
                let mut file = std::fs::File::from(write_end);
                let _ = file.write_all(content.as_bytes());
            });
        }

        Ok(SpawnedPipeline { children, pgid })
    }

    /// Wire a stage's stdout; returns the opened file when stderr may
    /// need to dup it.
    fn wire_stdout(
        &self,
        command: &mut tokio::process::Command,
        stage: &Stage,
        pipe_write: Option<OwnedFd>,
    ) -> Result<Option<std::fs::File>, ShellError> {
        match &stage.plan.stdout {
            OutSpec::Default => match pipe_write {
                Some(write_end) => {
                    // Keep a clone so `2>&1` can dup stderr onto the
                    // same pipe.
                    let file = std::fs::File::from(write_end);
                    let clone = file.try_clone().ok();
                    command.stdout(Stdio::from(file));
                    Ok(clone)
                }
                None => {
                    command.stdout(Stdio::inherit());
                    Ok(None)
                }
            },
            OutSpec::File { path, append } => {
                let file = open_out_file(path, *append)?;
                let clone = file.try_clone().ok();
                command.stdout(Stdio::from(file));
                Ok(clone)
            }
            OutSpec::SameAsStderr => {
                command.stdout(Stdio::inherit());
                Ok(None)
            }
            OutSpec::SameAsStdout => {
                // Folding never aliases stdout to itself.
                command.stdout(Stdio::inherit());
                Ok(None)
            }
            OutSpec::Closed => {
                command.stdout(Stdio::null());
                Ok(None)
            }
        }
    }

    fn wire_stderr(
        &self,
        command: &mut tokio::process::Command,
        stage: &Stage,
        stdout_file: Option<std::fs::File>,
    ) -> Result<(), ShellError> {
        match &stage.plan.stderr {
            OutSpec::Default => {
                command.stderr(Stdio::inherit());
            }
            OutSpec::File { path, append } => {
                let file = open_out_file(path, *append)?;
                command.stderr(Stdio::from(file));
            }
            OutSpec::SameAsStdout => match stdout_file {
                Some(file) => {
                    command.stderr(Stdio::from(file));
                }
                // stdout is the inherited terminal; stderr joins it.
                None => {
                    command.stderr(Stdio::inherit());
                }
            },
            OutSpec::SameAsStderr => {
                command.stderr(Stdio::inherit());
            }
            OutSpec::Closed => {
                command.stderr(Stdio::null());
            }
        }
        Ok(())
    }

    /// Await an external foreground pipeline, polling for Ctrl+Z suspends
    /// and the configured timeout.
    async fn wait_foreground(&self, children: Vec<Child>, pgid: i32) -> WaitOutcome {
        let mut children = children;
        let mut codes: Vec<i32> = Vec::with_capacity(children.len());
        let deadline = self
            .exec_config
            .default_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let kill_signal =
            signals::signal_from_name(&self.exec_config.kill_signal).unwrap_or(libc::SIGTERM);
        let mut timed_out = false;
        let mut suspended = false;

        // Child::wait is cancel-safe, so the poll-with-timeout loop can
        // retry it without losing the exit status.
        'stages: for index in 0..children.len() {
            loop {
                let poll = tokio::time::timeout(
                    Duration::from_millis(WAIT_POLL_MS),
                    children[index].wait(),
                )
                .await;
                match poll {
                    Ok(Ok(status)) => {
                        codes.push(exit_code_from_status(status));
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "wait failed");
                        codes.push(1);
                        break;
                    }
                    Err(_) => {
                        if signals::take_suspend_request() {
                            suspended = true;
                            break 'stages;
                        }
                        if let Some(at) = deadline {
                            if !timed_out && Instant::now() >= at {
                                timed_out = true;
                                let _ = signals::kill_pgid(pgid, kill_signal);
                                tokio::spawn(async move {
                                    tokio::time::sleep(Duration::from_millis(KILL_GRACE_MS))
                                        .await;
                                    let _ = signals::kill_pgid(pgid, libc::SIGKILL);
                                });
                            }
                        }
                    }
                }
            }
        }
        if suspended {
            return WaitOutcome::Suspended { remaining: children, codes };
        }
        WaitOutcome::Completed { codes, timed_out }
    }

    // ------------------------------------------------------------------
    // Captured strategy
    // ------------------------------------------------------------------

    async fn run_captured(&self, env: &mut ExecEnv<'_>, stages: Vec<Stage>) -> CommandResult {
        let count = stages.len();
        let mut carry: Vec<u8> = Vec::new();
        let mut final_stdout: Vec<u8> = Vec::new();
        let mut stderr_agg: Vec<u8> = Vec::new();
        let mut codes: Vec<i32> = Vec::with_capacity(count);
        let mut metadata = crate::exec::result::ResultMetadata::default();

        for (index, stage) in stages.into_iter().enumerate() {
            let is_last = index + 1 == count;

            let stdin_data: Vec<u8> = match &stage.plan.stdin {
                StdinSpec::Default => std::mem::take(&mut carry),
                StdinSpec::File(path) => match std::fs::read(path) {
                    Ok(content) => content,
                    Err(e) => {
                        stderr_agg
                            .extend_from_slice(format!("krusty: {}: {}\n", path, e).as_bytes());
                        codes.push(1);
                        carry.clear();
                        continue;
                    }
                },
                StdinSpec::Content(content) => content.clone().into_bytes(),
            };

            let stage_result = match &stage.kind {
                StageKind::Failed(code, message) => {
                    CommandResult::failure_with_code(message.clone(), *code)
                }
                StageKind::RedirectionsOnly => apply_redirections_only(&stage.plan),
                StageKind::Builtin => {
                    let mut ctx = BuiltinContext {
                        state: &mut *env.state,
                        jobs: env.jobs,
                        history: env.history.as_deref_mut(),
                        builtins: self.builtins,
                        exec_config: self.exec_config,
                        policy: self.policy,
                        caches: &mut *env.caches,
                    };
                    // Builtins consume text; bytes are decoded at this
                    // boundary only.
                    let stdin_text = String::from_utf8_lossy(&stdin_data);
                    match self.builtins.get(&stage.argv[0]) {
                        Some(builtin) => builtin.execute(&mut ctx, &stage.argv[1..], &stdin_text),
                        None => CommandResult::failure_with_code(
                            format!("krusty: {}: command not found\n", stage.argv[0]),
                            crate::error::EXIT_NOT_FOUND,
                        ),
                    }
                }
                StageKind::External(path) => {
                    self.run_captured_external(env, &stage, path.clone(), stdin_data).await
                }
            };

            codes.push(stage_result.exit_code);
            metadata = stage_result.metadata;

            // Route stdout per the folded plan.
            match &stage.plan.stdout {
                OutSpec::Default => {
                    if is_last {
                        final_stdout.extend_from_slice(&stage_result.stdout);
                    } else {
                        carry = stage_result.stdout;
                    }
                }
                OutSpec::File { path, append } => {
                    if let Err(e) = write_out_file(path, *append, &stage_result.stdout) {
                        stderr_agg
                            .extend_from_slice(format!("krusty: {}: {}\n", path, e).as_bytes());
                    }
                    if !is_last {
                        carry.clear();
                    }
                }
                OutSpec::SameAsStderr => stderr_agg.extend_from_slice(&stage_result.stdout),
                OutSpec::SameAsStdout | OutSpec::Closed => {
                    if !is_last {
                        carry.clear();
                    }
                }
            }

            // Route stderr.
            match &stage.plan.stderr {
                OutSpec::Default => stderr_agg.extend_from_slice(&stage_result.stderr),
                OutSpec::File { path, append } => {
                    if let Err(e) = write_out_file(path, *append, &stage_result.stderr) {
                        stderr_agg
                            .extend_from_slice(format!("krusty: {}: {}\n", path, e).as_bytes());
                    }
                }
                OutSpec::SameAsStdout => {
                    if is_last {
                        final_stdout.extend_from_slice(&stage_result.stderr);
                    } else {
                        carry.extend_from_slice(&stage_result.stderr);
                    }
                }
                OutSpec::SameAsStderr | OutSpec::Closed => {}
            }

            if metadata.is_control_flow() || env.state.exit_requested.is_some() {
                break;
            }
        }

        let exit_code = final_exit_code(&codes, env.state.options.pipefail);
        CommandResult {
            exit_code,
            stdout: final_stdout,
            stderr: stderr_agg,
            duration: Duration::default(),
            streamed: false,
            metadata,
        }
    }

    async fn run_captured_external(
        &self,
        env: &ExecEnv<'_>,
        stage: &Stage,
        path: std::path::PathBuf,
        stdin_data: Vec<u8>,
    ) -> CommandResult {
        let mut command = tokio::process::Command::new(&path);
        command.args(&stage.argv[1..]);
        command.env_clear();
        command.envs(&env.state.env);
        command.current_dir(&env.state.cwd);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        unsafe {
            command.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error = spawn_error(&stage.argv[0], e);
                return CommandResult::failure_with_code(
                    format!("krusty: {}\n", error),
                    error.exit_code(),
                );
            }
        };

        let pid = child.id().map(|pid| pid as i32).unwrap_or(0);
        signals::set_foreground_pgid(pid);

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(&stdin_data).await;
                drop(stdin);
            });
        }

        let kill_signal =
            signals::signal_from_name(&self.exec_config.kill_signal).unwrap_or(libc::SIGTERM);
        let waited = match self.exec_config.default_timeout_ms {
            Some(ms) => {
                match tokio::time::timeout(
                    Duration::from_millis(ms),
                    child.wait_with_output(),
                )
                .await
                {
                    Ok(output) => output,
                    Err(_) => {
                        let _ = signals::kill_pgid(pid, kill_signal);
                        tokio::time::sleep(Duration::from_millis(KILL_GRACE_MS)).await;
                        let _ = signals::kill_pgid(pid, libc::SIGKILL);
                        signals::clear_foreground_pgid();
                        return CommandResult::failure_with_code(
                            format!("krusty: {}: command timed out\n", stage.argv[0]),
                            EXIT_SIGNAL_BASE + kill_signal,
                        );
                    }
                }
            }
            None => child.wait_with_output().await,
        };
        signals::clear_foreground_pgid();

        match waited {
            Ok(output) => CommandResult::new(
                output.stdout,
                output.stderr,
                exit_code_from_status(output.status),
            ),
            Err(e) => CommandResult::failure(format!("krusty: {}: {}\n", stage.argv[0], e)),
        }
    }
}

struct SpawnedPipeline {
    children: Vec<Child>,
    pgid: i32,
}

enum WaitOutcome {
    Completed { codes: Vec<i32>, timed_out: bool },
    Suspended { remaining: Vec<Child>, codes: Vec<i32> },
}

/// Subshell host for full-mode command substitution: runs the body with
/// the shell's own executor against a state snapshot.
pub struct ShellSubstHost<'a> {
    pub builtins: &'a BuiltinRegistry,
    pub exec_config: &'a ExecutionConfig,
    pub policy: &'a SubstitutionPolicy,
    pub state: ShellState,
    pub caches: ExpansionCaches,
}

impl SubstitutionHost for ShellSubstHost<'_> {
    fn run_substitution(&mut self, body: &str) -> Result<String, ExpansionError> {
        let chain = parser::parse(body)
            .map_err(|e| ExpansionError::Substitution(e.to_string()))?;
        let executor = Executor {
            builtins: self.builtins,
            exec_config: self.exec_config,
            policy: self.policy,
            stream_output: false,
        };
        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let mut env = ExecEnv {
                    state: &mut self.state,
                    caches: &mut self.caches,
                    jobs: None,
                    history: None,
                };
                executor.run_chain(&mut env, &chain).await
            })
        });
        debug!(exit = result.exit_code, "full-mode substitution finished");
        // Substitution results are words; decode at this boundary.
        let text = String::from_utf8_lossy(&result.stdout);
        Ok(expansion::command_sub::strip_trailing_newlines(&text))
    }
}

/// Final pipeline exit: last stage, or rightmost non-zero with pipefail.
pub fn final_exit_code(codes: &[i32], pipefail: bool) -> i32 {
    if codes.is_empty() {
        return 0;
    }
    if pipefail {
        if let Some(&code) = codes.iter().rev().find(|&&code| code != 0) {
            return code;
        }
        return 0;
    }
    *codes.last().unwrap_or(&0)
}

/// Exit code from a process status: the code itself, or 128+signal.
pub fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_SIGNAL_BASE + signal;
        }
    }
    status.code().unwrap_or(1)
}

fn spawn_error(name: &str, error: std::io::Error) -> ShellError {
    match error.kind() {
        std::io::ErrorKind::NotFound => ShellError::not_found(name),
        std::io::ErrorKind::PermissionDenied => ShellError::not_executable(name),
        _ => ShellError::Spawn {
            name: name.to_string(),
            message: error.to_string(),
            exit_code: 126,
        },
    }
}

fn open_out_file(path: &str, append: bool) -> Result<std::fs::File, ShellError> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| ShellError::Redirection { target: path.to_string(), message: e.to_string() })
}

fn write_out_file(path: &str, append: bool, content: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    file.write_all(content)
}

/// A command that is only redirections: open/truncate the targets.
fn apply_redirections_only(plan: &RedirectionPlan) -> CommandResult {
    for spec in [&plan.stdout, &plan.stderr] {
        if let OutSpec::File { path, append } = spec {
            if let Err(e) = open_out_file(path, *append) {
                return CommandResult::failure(format!("krusty: {}\n", e));
            }
        }
    }
    CommandResult::ok()
}

/// An anonymous pipe as a pair of owned fds (read, write).
fn os_pipe() -> Result<(OwnedFd, OwnedFd), ShellError> {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(ShellError::Io(std::io::Error::last_os_error()));
    }
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

fn first_word(raw: &str) -> &str {
    raw.split_whitespace().next().unwrap_or(raw)
}
