//! Builtin-Aware Argument Completion
//!
//! Dispatched on the first token of the line. Each handler is the
//! exhaustive contract for that builtin's arguments; returning `None`
//! falls back to filename completion.

use crate::complete::{
    complete_directories, matches_prefix, scan_dir_executables, CompletionContext,
    CompletionGroup, CompletionItem, ItemKind,
};
use crate::jobs::signals::SIGNAL_TABLE;

/// Common printf format strings offered for the first argument.
const PRINTF_FORMATS: &[&str] = &[
    "\"%s\\n\"",
    "\"%d\\n\"",
    "\"%s: %s\\n\"",
    "\"%05d\\n\"",
    "\"%x\\n\"",
    "\"%f\\n\"",
    "\"%b\"",
    "\"%q\"",
];

/// `set -o` option names.
const SET_O_OPTIONS: &[&str] = &["vi", "emacs", "noclobber", "pipefail", "noglob"];

/// Canonical umask values.
const UMASK_VALUES: &[&str] = &["022", "027", "077", "002"];

/// Route to the handler for `first`, if one exists. `prev` is the token
/// before the one being completed (`set -o <TAB>` completes option
/// names, not flags).
pub fn complete_for(
    first: &str,
    prefix: &str,
    arg_index: usize,
    prev: Option<&str>,
    ctx: &CompletionContext<'_>,
) -> Option<Vec<CompletionGroup>> {
    match first {
        "cd" => Some(vec![CompletionGroup::titled(
            "Directories",
            complete_directories(prefix, ctx.cwd),
        )]),
        "command" | "exec" | "type" | "which" | "hash" => {
            Some(command_names(prefix, ctx, false))
        }
        "help" => Some(command_names(prefix, ctx, true)),
        "printf" => {
            if arg_index == 1 {
                Some(vec![string_group(
                    "Formats",
                    PRINTF_FORMATS,
                    prefix,
                    ctx,
                    ItemKind::Other,
                )])
            } else {
                None
            }
        }
        "getopts" => Some(getopts(prefix, arg_index, ctx)),
        "export" => Some(vec![CompletionGroup::titled(
            "Variables",
            env_names(prefix, ctx)
                .into_iter()
                .map(|name| CompletionItem::new(format!("{}=", name), ItemKind::Variable))
                .collect(),
        )]),
        "unset" => Some(vec![CompletionGroup::titled(
            "Variables",
            env_names(prefix, ctx)
                .into_iter()
                .map(|name| CompletionItem::new(name, ItemKind::Variable))
                .collect(),
        )]),
        "kill" | "trap" => Some(vec![CompletionGroup::titled(
            "Signals",
            SIGNAL_TABLE
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| matches_prefix(name, prefix, ctx.config.case_sensitive))
                .map(|name| CompletionItem::new(name, ItemKind::Signal))
                .collect(),
        )]),
        "set" => Some(set_flags(prefix, prev, ctx)),
        "read" => Some(read_args(prefix, ctx)),
        "unalias" => {
            if prefix.starts_with('-') {
                Some(vec![CompletionGroup::titled(
                    "Flags",
                    vec![CompletionItem::described("-a", "remove all aliases", ItemKind::Flag)],
                )])
            } else {
                Some(vec![alias_group(prefix, ctx)])
            }
        }
        "jobs" => Some(vec![string_group(
            "Flags",
            &["-l", "-p", "-r", "-s"],
            prefix,
            ctx,
            ItemKind::Flag,
        )]),
        "alias" => Some(vec![alias_group(prefix, ctx)]),
        "pushd" | "popd" => Some(vec![CompletionGroup::titled(
            "Stack",
            (0..ctx.dir_stack.len().max(1))
                .flat_map(|index| {
                    [format!("+{}", index), format!("-{}", index)]
                })
                .filter(|entry| entry.starts_with(prefix) || prefix.is_empty())
                .map(|entry| CompletionItem::new(entry, ItemKind::Other))
                .collect(),
        )]),
        "umask" => {
            let mut items =
                vec![CompletionItem::described("-S", "symbolic output", ItemKind::Flag)];
            items.extend(
                UMASK_VALUES
                    .iter()
                    .filter(|mask| mask.starts_with(prefix) || prefix.is_empty())
                    .map(|mask| CompletionItem::new(*mask, ItemKind::Other)),
            );
            Some(vec![CompletionGroup::titled("Masks", items)])
        }
        _ => None,
    }
}

/// Builtins plus PATH executables; `builtins_only` restricts to builtin
/// names (the `help` contract).
fn command_names(
    prefix: &str,
    ctx: &CompletionContext<'_>,
    builtins_only: bool,
) -> Vec<CompletionGroup> {
    let matches = |name: &str| matches_prefix(name, prefix, ctx.config.case_sensitive);
    let builtins: Vec<CompletionItem> = ctx
        .builtin_names
        .iter()
        .filter(|name| matches(name))
        .map(|name| CompletionItem::new(name.clone(), ItemKind::Builtin))
        .collect();
    let mut groups = vec![CompletionGroup::titled("Builtins", builtins)];
    if builtins_only {
        return groups;
    }

    let path_var = ctx.env.get("PATH").cloned().unwrap_or_default();
    let mut names: Vec<String> = path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .flat_map(scan_dir_executables)
        .filter(|name| matches(name))
        .collect();
    names.sort();
    names.dedup();
    names.truncate(ctx.config.bin_path_max_suggestions);
    groups.push(CompletionGroup::titled(
        "Commands",
        names
            .into_iter()
            .map(|name| CompletionItem::new(name, ItemKind::Command))
            .collect(),
    ));
    groups
}

fn getopts(prefix: &str, arg_index: usize, ctx: &CompletionContext<'_>) -> Vec<CompletionGroup> {
    if arg_index == 1 {
        vec![string_group(
            "Option specs",
            &["\"ab:c\"", "\":ab:\"", "\"a\""],
            prefix,
            ctx,
            ItemKind::Other,
        )]
    } else {
        vec![CompletionGroup::titled(
            "Variables",
            ["opt", "OPTION", "flag"]
                .iter()
                .filter(|name| matches_prefix(name, prefix, ctx.config.case_sensitive))
                .map(|name| CompletionItem::new(*name, ItemKind::Variable))
                .collect(),
        )]
    }
}

fn set_flags(prefix: &str, prev: Option<&str>, ctx: &CompletionContext<'_>) -> Vec<CompletionGroup> {
    // `set -o <TAB>` / `set +o <TAB>` complete option names.
    if matches!(prev, Some("-o") | Some("+o")) {
        return vec![CompletionGroup::titled(
            "Options",
            SET_O_OPTIONS
                .iter()
                .filter(|name| matches_prefix(name, prefix, ctx.config.case_sensitive))
                .map(|name| CompletionItem::new(*name, ItemKind::Other))
                .collect(),
        )];
    }
    let mut items = Vec::new();
    for sign in ['-', '+'] {
        for flag in ['e', 'u', 'x', 'v', 'o'] {
            let text = format!("{}{}", sign, flag);
            if text.starts_with(prefix) || prefix.is_empty() {
                items.push(CompletionItem::new(text, ItemKind::Flag));
            }
        }
    }
    vec![CompletionGroup::titled("Flags", items)]
}

fn read_args(prefix: &str, ctx: &CompletionContext<'_>) -> Vec<CompletionGroup> {
    if prefix.starts_with('-') {
        return vec![string_group(
            "Flags",
            &["-r", "-p", "-s", "-n", "-t", "-a"],
            prefix,
            ctx,
            ItemKind::Flag,
        )];
    }
    vec![CompletionGroup::titled(
        "Variables",
        env_names(prefix, ctx)
            .into_iter()
            .map(|name| CompletionItem::new(name, ItemKind::Variable))
            .collect(),
    )]
}

fn alias_group(prefix: &str, ctx: &CompletionContext<'_>) -> CompletionGroup {
    CompletionGroup::titled(
        "Aliases",
        ctx.aliases
            .keys()
            .filter(|name| matches_prefix(name, prefix, ctx.config.case_sensitive))
            .map(|name| CompletionItem::new(name.clone(), ItemKind::Alias))
            .collect(),
    )
}

fn env_names(prefix: &str, ctx: &CompletionContext<'_>) -> Vec<String> {
    let mut names: Vec<String> = ctx
        .env
        .keys()
        .filter(|name| matches_prefix(name, prefix, ctx.config.case_sensitive))
        .cloned()
        .collect();
    names.sort();
    names
}

fn string_group(
    title: &str,
    values: &[&str],
    prefix: &str,
    ctx: &CompletionContext<'_>,
    kind: ItemKind,
) -> CompletionGroup {
    CompletionGroup::titled(
        title,
        values
            .iter()
            .filter(|value| prefix.is_empty() || matches_prefix(value, prefix, ctx.config.case_sensitive))
            .map(|value| CompletionItem::new(*value, kind))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionConfig;
    use indexmap::IndexMap;
    use std::collections::HashMap;

    struct Fixture {
        builtin_names: Vec<String>,
        aliases: IndexMap<String, String>,
        env: HashMap<String, String>,
        dir_stack: Vec<String>,
        cwd: String,
        config: CompletionConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut env = HashMap::new();
            env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
            env.insert("HOME".to_string(), "/home/kirk".to_string());
            env.insert("EDITOR".to_string(), "vim".to_string());
            let mut aliases = IndexMap::new();
            aliases.insert("ll".to_string(), "ls -l".to_string());
            aliases.insert("gs".to_string(), "git status".to_string());
            Self {
                builtin_names: ["cd", "exit", "help", "set"].iter().map(|s| s.to_string()).collect(),
                aliases,
                env,
                dir_stack: vec!["/tmp".to_string(), "/var".to_string()],
                cwd: "/tmp".to_string(),
                config: CompletionConfig::default(),
            }
        }

        fn ctx(&self) -> CompletionContext<'_> {
            CompletionContext {
                builtin_names: &self.builtin_names,
                aliases: &self.aliases,
                env: &self.env,
                dir_stack: &self.dir_stack,
                cwd: &self.cwd,
                config: &self.config,
            }
        }
    }

    fn all_texts(groups: &[CompletionGroup]) -> Vec<String> {
        groups
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.text.clone()))
            .collect()
    }

    #[test]
    fn test_cd_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("projects")).unwrap();
        std::fs::write(dir.path().join("file"), "").unwrap();
        let mut fx = Fixture::new();
        fx.cwd = dir.path().to_string_lossy().into_owned();

        let groups = complete_for("cd", "", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert!(texts.contains(&"projects/".to_string()));
        assert!(!texts.contains(&"file".to_string()));
    }

    #[test]
    fn test_help_restricted_to_builtins() {
        let fx = Fixture::new();
        let groups = complete_for("help", "", 1, None, &fx.ctx()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title, "Builtins");
    }

    #[test]
    fn test_which_includes_path_commands() {
        let fx = Fixture::new();
        let groups = complete_for("which", "sh", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert!(texts.contains(&"sh".to_string()));
    }

    #[test]
    fn test_printf_formats_quoted() {
        let fx = Fixture::new();
        let groups = complete_for("printf", "", 1, None, &fx.ctx()).unwrap();
        assert!(groups[0].items.iter().all(|i| i.text.starts_with('"')));
    }

    #[test]
    fn test_export_appends_equals() {
        let fx = Fixture::new();
        let groups = complete_for("export", "ED", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert_eq!(texts, vec!["EDITOR=".to_string()]);
    }

    #[test]
    fn test_unset_plain_names() {
        let fx = Fixture::new();
        let groups = complete_for("unset", "ED", 1, None, &fx.ctx()).unwrap();
        assert_eq!(all_texts(&groups), vec!["EDITOR".to_string()]);
    }

    #[test]
    fn test_kill_signal_names() {
        let fx = Fixture::new();
        let groups = complete_for("kill", "SIGT", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert!(texts.contains(&"SIGTERM".to_string()));
        assert!(texts.contains(&"SIGTSTP".to_string()));
        assert!(!texts.contains(&"SIGKILL".to_string()));
    }

    #[test]
    fn test_set_dash_flags() {
        let fx = Fixture::new();
        let groups = complete_for("set", "-", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        for flag in ["-e", "-u", "-x", "-v", "-o"] {
            assert!(texts.contains(&flag.to_string()), "missing {}", flag);
        }
    }

    #[test]
    fn test_set_o_option_names() {
        let fx = Fixture::new();
        let groups = complete_for("set", "", 2, Some("-o"), &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        for option in ["vi", "emacs", "noclobber", "pipefail", "noglob"] {
            assert!(texts.contains(&option.to_string()), "missing {}", option);
        }
    }

    #[test]
    fn test_read_flags_and_variables() {
        let fx = Fixture::new();
        let groups = complete_for("read", "-", 1, None, &fx.ctx()).unwrap();
        assert!(all_texts(&groups).contains(&"-r".to_string()));

        let groups = complete_for("read", "ED", 1, None, &fx.ctx()).unwrap();
        assert!(all_texts(&groups).contains(&"EDITOR".to_string()));
    }

    #[test]
    fn test_unalias() {
        let fx = Fixture::new();
        let groups = complete_for("unalias", "-", 1, None, &fx.ctx()).unwrap();
        assert_eq!(all_texts(&groups), vec!["-a".to_string()]);

        let groups = complete_for("unalias", "g", 1, None, &fx.ctx()).unwrap();
        assert_eq!(all_texts(&groups), vec!["gs".to_string()]);
    }

    #[test]
    fn test_jobs_flags() {
        let fx = Fixture::new();
        let groups = complete_for("jobs", "-", 1, None, &fx.ctx()).unwrap();
        assert_eq!(
            all_texts(&groups),
            vec!["-l".to_string(), "-p".to_string(), "-r".to_string(), "-s".to_string()]
        );
    }

    #[test]
    fn test_alias_names() {
        let fx = Fixture::new();
        let groups = complete_for("alias", "", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert!(texts.contains(&"ll".to_string()));
        assert!(texts.contains(&"gs".to_string()));
    }

    #[test]
    fn test_pushd_stack_indices() {
        let fx = Fixture::new();
        let groups = complete_for("pushd", "+", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert!(texts.contains(&"+0".to_string()));
        assert!(texts.contains(&"+1".to_string()));
    }

    #[test]
    fn test_umask() {
        let fx = Fixture::new();
        let groups = complete_for("umask", "", 1, None, &fx.ctx()).unwrap();
        let texts = all_texts(&groups);
        assert!(texts.contains(&"-S".to_string()));
        assert!(texts.contains(&"022".to_string()));
    }

    #[test]
    fn test_unknown_builtin_falls_through() {
        let fx = Fixture::new();
        assert!(complete_for("vim", "fi", 1, None, &fx.ctx()).is_none());
    }
}
