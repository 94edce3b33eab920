//! Core Builtins
//!
//! Directory movement, echo/true/false, exit, source, and the command
//! inspection builtins (type, which, help).

use crate::builtins::{Builtin, BuiltinContext};
use crate::exec::{CommandResult, ExecEnv, Executor};
use crate::expansion::resolve_executable;

/// `cd [dir|-]`
pub struct Cd;

impl Builtin for Cd {
    fn name(&self) -> &'static str {
        "cd"
    }

    fn summary(&self) -> &'static str {
        "change the working directory"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let state = &mut *ctx.state;
        let mut print_target = false;
        let target = match args.first().map(String::as_str) {
            None | Some("~") => state.env.get("HOME").cloned().unwrap_or_else(|| "/".to_string()),
            Some("-") => {
                if state.previous_dir.is_empty() {
                    return CommandResult::failure("krusty: cd: OLDPWD not set\n");
                }
                print_target = true;
                state.previous_dir.clone()
            }
            Some(path) => {
                if path.starts_with('/') {
                    path.to_string()
                } else if let Some(rest) = path.strip_prefix("~/") {
                    format!(
                        "{}/{}",
                        state.env.get("HOME").cloned().unwrap_or_default(),
                        rest
                    )
                } else {
                    format!("{}/{}", state.cwd.trim_end_matches('/'), path)
                }
            }
        };

        let resolved = match std::fs::canonicalize(&target) {
            Ok(path) if path.is_dir() => path,
            Ok(_) => {
                return CommandResult::failure(format!(
                    "krusty: cd: {}: Not a directory\n",
                    args.first().map(String::as_str).unwrap_or(&target)
                ))
            }
            Err(e) => {
                return CommandResult::failure(format!(
                    "krusty: cd: {}: {}\n",
                    args.first().map(String::as_str).unwrap_or(&target),
                    e
                ))
            }
        };

        let new_cwd = resolved.to_string_lossy().into_owned();
        state.previous_dir = std::mem::replace(&mut state.cwd, new_cwd.clone());
        state.env.insert("OLDPWD".to_string(), state.previous_dir.clone());
        state.env.insert("PWD".to_string(), new_cwd.clone());
        // Keep the process cwd in sync so globbing and child processes
        // agree with the shell's view.
        let _ = std::env::set_current_dir(&resolved);

        if print_target {
            CommandResult::new(format!("{}\n", new_cwd), String::new(), 0)
        } else {
            CommandResult::ok()
        }
    }
}

/// `pwd`
pub struct Pwd;

impl Builtin for Pwd {
    fn name(&self) -> &'static str {
        "pwd"
    }

    fn summary(&self) -> &'static str {
        "print the working directory"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, _args: &[String], _stdin: &str) -> CommandResult {
        CommandResult::new(format!("{}\n", ctx.state.cwd), String::new(), 0)
    }
}

/// `echo [-n] args...`
pub struct Echo;

impl Builtin for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn summary(&self) -> &'static str {
        "write arguments to standard output"
    }

    fn execute(&self, _ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let (newline, rest) = match args.first().map(String::as_str) {
            Some("-n") => (false, &args[1..]),
            _ => (true, args),
        };
        let mut out = rest.join(" ");
        if newline {
            out.push('\n');
        }
        CommandResult::new(out, String::new(), 0)
    }
}

/// `true`
pub struct True;

impl Builtin for True {
    fn name(&self) -> &'static str {
        "true"
    }

    fn summary(&self) -> &'static str {
        "return success"
    }

    fn execute(&self, _ctx: &mut BuiltinContext<'_>, _args: &[String], _stdin: &str) -> CommandResult {
        CommandResult::ok()
    }
}

/// `false`
pub struct False;

impl Builtin for False {
    fn name(&self) -> &'static str {
        "false"
    }

    fn summary(&self) -> &'static str {
        "return failure"
    }

    fn execute(&self, _ctx: &mut BuiltinContext<'_>, _args: &[String], _stdin: &str) -> CommandResult {
        CommandResult::with_exit(1)
    }
}

/// `exit [code]`
pub struct Exit;

impl Builtin for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn summary(&self) -> &'static str {
        "exit the shell"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let code = match args.first() {
            Some(arg) => match arg.parse::<i32>() {
                Ok(code) => code,
                Err(_) => {
                    return CommandResult::failure_with_code(
                        format!("krusty: exit: {}: numeric argument required\n", arg),
                        2,
                    )
                }
            },
            None => ctx.state.last_exit_code,
        };
        ctx.state.exit_requested = Some(code);
        CommandResult::with_exit(code)
    }
}

/// `source file` — run a script in the current shell context.
pub struct Source;

impl Builtin for Source {
    fn name(&self) -> &'static str {
        "source"
    }

    fn summary(&self) -> &'static str {
        "read and execute commands from a file"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let path = match args.first() {
            Some(path) => path.clone(),
            None => {
                return CommandResult::failure_with_code(
                    "krusty: source: filename argument required\n",
                    2,
                )
            }
        };
        let resolved = if path.starts_with('/') {
            path.clone()
        } else {
            format!("{}/{}", ctx.state.cwd.trim_end_matches('/'), path)
        };
        let script = match std::fs::read_to_string(&resolved) {
            Ok(script) => script,
            Err(e) => {
                return CommandResult::failure(format!("krusty: source: {}: {}\n", path, e))
            }
        };
        let chain = match crate::parser::parse(&script) {
            Ok(chain) => chain,
            Err(e) => {
                return CommandResult::failure_with_code(
                    format!("krusty: source: {}\n", e),
                    e.exit_code(),
                )
            }
        };

        let executor = Executor {
            builtins: ctx.builtins,
            exec_config: ctx.exec_config,
            policy: ctx.policy,
            stream_output: false,
        };
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let mut env = ExecEnv {
                    state: &mut *ctx.state,
                    caches: &mut *ctx.caches,
                    jobs: ctx.jobs,
                    history: ctx.history.as_deref_mut(),
                };
                executor.run_chain(&mut env, &chain).await
            })
        })
    }
}

/// `type name...`
pub struct Type;

impl Builtin for Type {
    fn name(&self) -> &'static str {
        "type"
    }

    fn summary(&self) -> &'static str {
        "describe how a command name resolves"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let mut out = String::new();
        let mut exit = 0;
        for name in args {
            if let Some(value) = ctx.state.aliases.get(name) {
                out.push_str(&format!("{} is aliased to `{}'\n", name, value));
            } else if ctx.builtins.contains(name) {
                out.push_str(&format!("{} is a shell builtin\n", name));
            } else {
                let path_var = ctx.state.env.get("PATH").cloned().unwrap_or_default();
                match resolve_executable(ctx.caches, name, &path_var) {
                    Some(path) => out.push_str(&format!("{} is {}\n", name, path.display())),
                    None => {
                        out.push_str(&format!("krusty: type: {}: not found\n", name));
                        exit = 1;
                    }
                }
            }
        }
        CommandResult::new(out, String::new(), exit)
    }
}

/// `which name...`
pub struct Which;

impl Builtin for Which {
    fn name(&self) -> &'static str {
        "which"
    }

    fn summary(&self) -> &'static str {
        "locate a command on PATH"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let mut out = String::new();
        let mut exit = 0;
        for name in args {
            if ctx.builtins.contains(name) {
                out.push_str(&format!("{}: shell built-in command\n", name));
                continue;
            }
            let path_var = ctx.state.env.get("PATH").cloned().unwrap_or_default();
            match resolve_executable(ctx.caches, name, &path_var) {
                Some(path) => out.push_str(&format!("{}\n", path.display())),
                None => exit = 1,
            }
        }
        CommandResult::new(out, String::new(), exit)
    }
}

/// `help [name]`
pub struct Help;

impl Builtin for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn summary(&self) -> &'static str {
        "list builtins and what they do"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        match args.first() {
            Some(name) => match ctx.builtins.get(name) {
                Some(builtin) => CommandResult::new(
                    format!("{}: {}\n", builtin.name(), builtin.summary()),
                    String::new(),
                    0,
                ),
                None => CommandResult::failure(format!(
                    "krusty: help: no help topics match `{}'\n",
                    name
                )),
            },
            None => {
                let mut out = String::from("krusty builtins:\n");
                for (name, builtin) in ctx.builtins.iter() {
                    out.push_str(&format!("  {:<10} {}\n", name, builtin.summary()));
                }
                CommandResult::new(out, String::new(), 0)
            }
        }
    }
}
