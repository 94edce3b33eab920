//! Option and Variable Builtins
//!
//! `set`, `export`, `unset`, `alias`, `unalias`.

use crate::builtins::{Builtin, BuiltinContext};
use crate::exec::CommandResult;

/// `set [-+euxv] [-o option] [+o option]`
pub struct Set;

impl Set {
    fn apply_flag(ctx: &mut BuiltinContext<'_>, flag: char, enable: bool) -> Result<(), String> {
        let options = &mut ctx.state.options;
        match flag {
            'e' => options.errexit = enable,
            'u' => options.nounset = enable,
            'x' => options.xtrace = enable,
            'v' => options.verbose = enable,
            other => return Err(format!("set: -{}: invalid option", other)),
        }
        Ok(())
    }

    fn apply_named(ctx: &mut BuiltinContext<'_>, name: &str, enable: bool) -> Result<(), String> {
        let options = &mut ctx.state.options;
        match name {
            "pipefail" => options.pipefail = enable,
            "noglob" => options.noglob = enable,
            "noclobber" => options.noclobber = enable,
            "errexit" => options.errexit = enable,
            "nounset" => options.nounset = enable,
            "xtrace" => options.xtrace = enable,
            "verbose" => options.verbose = enable,
            "vi" => {
                options.vi = enable;
                if enable {
                    options.emacs = false;
                }
            }
            "emacs" => {
                options.emacs = enable;
                if enable {
                    options.vi = false;
                }
            }
            other => return Err(format!("set: {}: invalid option name", other)),
        }
        Ok(())
    }

    fn render_options(ctx: &BuiltinContext<'_>) -> String {
        let options = &ctx.state.options;
        let mut out = String::new();
        for (name, on) in [
            ("errexit", options.errexit),
            ("nounset", options.nounset),
            ("xtrace", options.xtrace),
            ("verbose", options.verbose),
            ("pipefail", options.pipefail),
            ("noglob", options.noglob),
            ("noclobber", options.noclobber),
            ("vi", options.vi),
            ("emacs", options.emacs),
        ] {
            out.push_str(&format!("{:<12} {}\n", name, if on { "on" } else { "off" }));
        }
        out
    }
}

impl Builtin for Set {
    fn name(&self) -> &'static str {
        "set"
    }

    fn summary(&self) -> &'static str {
        "set or unset shell options"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        if args.is_empty() {
            return CommandResult::new(Self::render_options(ctx), String::new(), 0);
        }
        let mut iter = args.iter().peekable();
        while let Some(arg) = iter.next() {
            let (enable, body) = match arg.strip_prefix('-') {
                Some(body) => (true, body),
                None => match arg.strip_prefix('+') {
                    Some(body) => (false, body),
                    None => {
                        return CommandResult::failure_with_code(
                            format!("krusty: set: {}: invalid argument\n", arg),
                            2,
                        )
                    }
                },
            };
            if body == "o" {
                match iter.next() {
                    Some(name) => {
                        if let Err(e) = Self::apply_named(ctx, name, enable) {
                            return CommandResult::failure_with_code(
                                format!("krusty: {}\n", e),
                                2,
                            );
                        }
                    }
                    None => {
                        // `set -o` with no name lists option states.
                        return CommandResult::new(
                            Self::render_options(ctx),
                            String::new(),
                            0,
                        );
                    }
                }
                continue;
            }
            for flag in body.chars() {
                if let Err(e) = Self::apply_flag(ctx, flag, enable) {
                    return CommandResult::failure_with_code(format!("krusty: {}\n", e), 2);
                }
            }
        }
        CommandResult::ok()
    }
}

/// `export [NAME[=VALUE]...]`
pub struct Export;

impl Builtin for Export {
    fn name(&self) -> &'static str {
        "export"
    }

    fn summary(&self) -> &'static str {
        "mark variables for the environment of child processes"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        if args.is_empty() {
            let mut names: Vec<&String> = ctx.state.exported.iter().collect();
            names.sort();
            let mut out = String::new();
            for name in names {
                match ctx.state.env.get(name) {
                    Some(value) => out.push_str(&format!("export {}={:?}\n", name, value)),
                    None => out.push_str(&format!("export {}\n", name)),
                }
            }
            return CommandResult::new(out, String::new(), 0);
        }
        for arg in args {
            match arg.split_once('=') {
                Some((name, value)) => {
                    if !is_valid_name(name) {
                        return CommandResult::failure(format!(
                            "krusty: export: `{}': not a valid identifier\n",
                            arg
                        ));
                    }
                    ctx.state.env.insert(name.to_string(), value.to_string());
                    ctx.state.exported.insert(name.to_string());
                }
                None => {
                    if !is_valid_name(arg) {
                        return CommandResult::failure(format!(
                            "krusty: export: `{}': not a valid identifier\n",
                            arg
                        ));
                    }
                    ctx.state.exported.insert(arg.clone());
                }
            }
        }
        CommandResult::ok()
    }
}

/// `unset NAME...`
pub struct Unset;

impl Builtin for Unset {
    fn name(&self) -> &'static str {
        "unset"
    }

    fn summary(&self) -> &'static str {
        "remove variables from the environment"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        for name in args {
            ctx.state.env.remove(name);
            ctx.state.exported.remove(name);
        }
        CommandResult::ok()
    }
}

/// `alias [NAME[=VALUE]...]`
pub struct Alias;

impl Builtin for Alias {
    fn name(&self) -> &'static str {
        "alias"
    }

    fn summary(&self) -> &'static str {
        "define or display aliases"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        if args.is_empty() {
            let mut out = String::new();
            for (name, value) in &ctx.state.aliases {
                out.push_str(&format!("alias {}='{}'\n", name, value));
            }
            return CommandResult::new(out, String::new(), 0);
        }
        let mut out = String::new();
        let mut exit = 0;
        for arg in args {
            match arg.split_once('=') {
                Some((name, value)) => {
                    ctx.state.aliases.insert(name.to_string(), value.to_string());
                }
                None => match ctx.state.aliases.get(arg) {
                    Some(value) => out.push_str(&format!("alias {}='{}'\n", arg, value)),
                    None => {
                        out.push_str(&format!("krusty: alias: {}: not found\n", arg));
                        exit = 1;
                    }
                },
            }
        }
        CommandResult::new(out, String::new(), exit)
    }
}

/// `unalias [-a] NAME...`
pub struct Unalias;

impl Builtin for Unalias {
    fn name(&self) -> &'static str {
        "unalias"
    }

    fn summary(&self) -> &'static str {
        "remove alias definitions"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        if args.first().map(String::as_str) == Some("-a") {
            ctx.state.aliases.clear();
            return CommandResult::ok();
        }
        let mut exit = 0;
        let mut err = String::new();
        for name in args {
            if ctx.state.aliases.shift_remove(name).is_none() {
                err.push_str(&format!("krusty: unalias: {}: not found\n", name));
                exit = 1;
            }
        }
        CommandResult::new(String::new(), err, exit)
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
