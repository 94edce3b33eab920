//! Job Control Builtins
//!
//! `jobs`, `fg`, `bg`, `kill`, `wait`. All signal delivery goes through
//! the job manager; these builtins only resolve job specs and present
//! results.

use crate::builtins::{Builtin, BuiltinContext};
use crate::exec::CommandResult;
use crate::jobs::{signals, Job, JobManager, JobStatus};

/// Resolve a `%n` / `n` / `%%` / `%+` job spec.
fn resolve_spec(spec: &str, jobs: &JobManager) -> Option<u32> {
    match spec {
        "%%" | "%+" | "+" => jobs.most_recent(),
        "%-" | "-" => None,
        other => other.trim_start_matches('%').parse::<u32>().ok(),
    }
}

fn job_line(job: &Job, long: bool) -> String {
    let marker = '+';
    let status = job.status.as_str();
    let suffix = if job.background && job.status == JobStatus::Running {
        " &"
    } else {
        ""
    };
    if long {
        format!(
            "[{}]{}  {}  {}    {}{}\n",
            job.id, marker, job.pgid, status, job.command, suffix
        )
    } else {
        format!("[{}]{}  {}    {}{}\n", job.id, marker, status, job.command, suffix)
    }
}

fn no_job_control() -> CommandResult {
    CommandResult::failure("krusty: no job control in this shell\n")
}

/// `jobs [-lprs]`
pub struct Jobs;

impl Builtin for Jobs {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn summary(&self) -> &'static str {
        "list active jobs"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let jobs = match ctx.jobs {
            Some(jobs) => jobs,
            None => return no_job_control(),
        };
        let mut long = false;
        let mut pgid_only = false;
        let mut filter: Option<JobStatus> = None;
        for arg in args {
            match arg.as_str() {
                "-l" => long = true,
                "-p" => pgid_only = true,
                "-r" => filter = Some(JobStatus::Running),
                "-s" => filter = Some(JobStatus::Stopped),
                other => {
                    return CommandResult::failure_with_code(
                        format!("krusty: jobs: {}: invalid option\n", other),
                        2,
                    )
                }
            }
        }

        let mut out = String::new();
        for job in jobs.list() {
            if let Some(wanted) = filter {
                if job.status != wanted {
                    continue;
                }
            }
            if pgid_only {
                out.push_str(&format!("{}\n", job.pgid));
            } else {
                out.push_str(&job_line(&job, long));
            }
        }
        jobs.reap_done();
        CommandResult::new(out, String::new(), 0)
    }
}

/// `fg [%job]` — resume a stopped job in the foreground and wait.
pub struct Fg;

impl Builtin for Fg {
    fn name(&self) -> &'static str {
        "fg"
    }

    fn summary(&self) -> &'static str {
        "resume a job in the foreground"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let jobs = match ctx.jobs {
            Some(jobs) => jobs,
            None => return no_job_control(),
        };
        let id = match args.first() {
            Some(spec) => resolve_spec(spec, jobs),
            None => jobs.most_recent_stopped().or_else(|| jobs.most_recent()),
        };
        let id = match id {
            Some(id) => id,
            None => return CommandResult::failure("krusty: fg: no current job\n"),
        };
        if !jobs.resume_fg(id) {
            return CommandResult::failure(format!("krusty: fg: job {} not found\n", id));
        }
        let job = match jobs.get(id) {
            Some(job) => job,
            None => return CommandResult::failure(format!("krusty: fg: job {} not found\n", id)),
        };
        signals::give_terminal_to(job.pgid);

        let waiter = jobs.clone();
        let exit = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async { waiter.wait(id).await })
        })
        .unwrap_or(0);

        signals::reclaim_terminal();
        CommandResult::new(format!("{}\n", job.command), String::new(), exit)
    }
}

/// `bg [%job]` — resume a stopped job in the background.
pub struct Bg;

impl Builtin for Bg {
    fn name(&self) -> &'static str {
        "bg"
    }

    fn summary(&self) -> &'static str {
        "resume a job in the background"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let jobs = match ctx.jobs {
            Some(jobs) => jobs,
            None => return no_job_control(),
        };
        let id = match args.first() {
            Some(spec) => resolve_spec(spec, jobs),
            None => jobs.most_recent_stopped(),
        };
        let id = match id {
            Some(id) => id,
            None => return CommandResult::failure("krusty: bg: no current job\n"),
        };
        if !jobs.resume_bg(id) {
            return CommandResult::failure(format!(
                "krusty: bg: job {}: not stopped\n",
                id
            ));
        }
        let label = jobs
            .get(id)
            .map(|job| format!("[{}]+ {} &\n", job.id, job.command))
            .unwrap_or_default();
        CommandResult::new(label, String::new(), 0)
    }
}

/// `kill [-SIGNAL] target...` — targets are `%job` specs or pids.
pub struct Kill;

impl Builtin for Kill {
    fn name(&self) -> &'static str {
        "kill"
    }

    fn summary(&self) -> &'static str {
        "send a signal to jobs or processes"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let mut signal = libc::SIGTERM;
        let mut targets: Vec<&String> = Vec::new();
        for arg in args {
            if let Some(name) = arg.strip_prefix('-') {
                match signals::signal_from_name(name) {
                    Some(number) => signal = number,
                    None => {
                        return CommandResult::failure(format!(
                            "krusty: kill: {}: invalid signal specification\n",
                            name
                        ))
                    }
                }
            } else {
                targets.push(arg);
            }
        }
        if targets.is_empty() {
            return CommandResult::failure_with_code("krusty: kill: usage: kill [-signal] pid|%job\n", 2);
        }

        let mut err = String::new();
        let mut exit = 0;
        for target in targets {
            if target.starts_with('%') {
                let jobs = match ctx.jobs {
                    Some(jobs) => jobs,
                    None => return no_job_control(),
                };
                match resolve_spec(target, jobs) {
                    Some(id) if jobs.terminate(id, signal) => {}
                    _ => {
                        err.push_str(&format!("krusty: kill: {}: no such job\n", target));
                        exit = 1;
                    }
                }
            } else {
                match target.parse::<i32>() {
                    Ok(pid) => {
                        if let Err(e) = signals::kill_pid(pid, signal) {
                            err.push_str(&format!("krusty: kill: ({}) - {}\n", pid, e));
                            exit = 1;
                        }
                    }
                    Err(_) => {
                        err.push_str(&format!(
                            "krusty: kill: {}: arguments must be process or job IDs\n",
                            target
                        ));
                        exit = 1;
                    }
                }
            }
        }
        CommandResult::new(String::new(), err, exit)
    }
}

/// `wait [%job]` — await job completion.
pub struct Wait;

impl Builtin for Wait {
    fn name(&self) -> &'static str {
        "wait"
    }

    fn summary(&self) -> &'static str {
        "wait for jobs to finish"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let jobs = match ctx.jobs {
            Some(jobs) => jobs,
            None => return no_job_control(),
        };
        let ids: Vec<u32> = match args.first() {
            Some(spec) => match resolve_spec(spec, jobs) {
                Some(id) => vec![id],
                None => {
                    return CommandResult::failure(format!(
                        "krusty: wait: {}: no such job\n",
                        spec
                    ))
                }
            },
            None => jobs
                .list()
                .into_iter()
                .filter(|job| job.status != JobStatus::Done)
                .map(|job| job.id)
                .collect(),
        };

        let waiter = jobs.clone();
        let exit = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let mut last = 0;
                for id in ids {
                    if let Some(code) = waiter.wait(id).await {
                        last = code;
                    }
                }
                last
            })
        });
        CommandResult::with_exit(exit)
    }
}
