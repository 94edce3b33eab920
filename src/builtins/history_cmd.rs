//! History Builtin
//!
//! `history [n]`, `history -c`, `history -s <mode> <query>` (search).

use crate::builtins::{Builtin, BuiltinContext};
use crate::exec::CommandResult;
use crate::history::SearchMode;

pub struct History;

impl Builtin for History {
    fn name(&self) -> &'static str {
        "history"
    }

    fn summary(&self) -> &'static str {
        "display or manipulate the history list"
    }

    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], _stdin: &str) -> CommandResult {
        let history = match ctx.history.as_deref_mut() {
            Some(history) => history,
            None => return CommandResult::failure("krusty: history: not available\n"),
        };

        match args.first().map(String::as_str) {
            Some("-c") => {
                history.clear();
                CommandResult::ok()
            }
            Some("-s") => {
                let mode = match args.get(1).map(String::as_str) {
                    Some("exact") => SearchMode::Exact,
                    Some("startswith") => SearchMode::Startswith,
                    Some("regex") => SearchMode::Regex,
                    Some("fuzzy") | None => SearchMode::Fuzzy,
                    Some(other) => {
                        return CommandResult::failure_with_code(
                            format!("krusty: history: {}: invalid search mode\n", other),
                            2,
                        )
                    }
                };
                let query = args.get(2).cloned().unwrap_or_default();
                let mut out = String::new();
                for entry in history.search(&query, mode, None) {
                    out.push_str(&entry);
                    out.push('\n');
                }
                CommandResult::new(out, String::new(), 0)
            }
            Some("--stats") => {
                let stats = history.stats();
                let mut out = format!(
                    "entries: {}\nunique: {}\n",
                    stats.total, stats.unique
                );
                for (command, count) in &stats.top {
                    out.push_str(&format!("{:>6}  {}\n", count, command));
                }
                CommandResult::new(out, String::new(), 0)
            }
            Some(n) if n.parse::<usize>().is_ok() => {
                let n: usize = n.parse().unwrap_or(0);
                let start = history.len().saturating_sub(n);
                CommandResult::new(render(history.entries(), start), String::new(), 0)
            }
            Some(other) => CommandResult::failure_with_code(
                format!("krusty: history: {}: invalid option\n", other),
                2,
            ),
            None => CommandResult::new(render(history.entries(), 0), String::new(), 0),
        }
    }
}

fn render(entries: &[String], start: usize) -> String {
    let mut out = String::new();
    for (index, entry) in entries.iter().enumerate().skip(start) {
        out.push_str(&format!("{:>5}  {}\n", index + 1, entry));
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::builtins::testing::Fixture;

    fn seed(fx: &mut Fixture) {
        for cmd in ["git status", "ls -la", "git push"] {
            fx.history.add(cmd);
        }
    }

    #[test]
    fn test_history_lists_numbered() {
        let mut fx = Fixture::new();
        seed(&mut fx);
        let result = fx.run("history", &[]);
        assert!(result.stdout_text().contains("1  git status"));
        assert!(result.stdout_text().contains("3  git push"));
    }

    #[test]
    fn test_history_tail_count() {
        let mut fx = Fixture::new();
        seed(&mut fx);
        let result = fx.run("history", &["2"]);
        assert!(!result.stdout_text().contains("git status"));
        assert!(result.stdout_text().contains("ls -la"));
        assert!(result.stdout_text().contains("git push"));
    }

    #[test]
    fn test_history_clear() {
        let mut fx = Fixture::new();
        seed(&mut fx);
        let result = fx.run("history", &["-c"]);
        assert_eq!(result.exit_code, 0);
        assert!(fx.history.is_empty());
    }

    #[test]
    fn test_history_search() {
        let mut fx = Fixture::new();
        seed(&mut fx);
        let result = fx.run("history", &["-s", "startswith", "git"]);
        assert!(result.stdout_text().contains("git status"));
        assert!(result.stdout_text().contains("git push"));
        assert!(!result.stdout_text().contains("ls -la"));
    }

    #[test]
    fn test_history_stats() {
        let mut fx = Fixture::new();
        seed(&mut fx);
        let result = fx.run("history", &["--stats"]);
        assert!(result.stdout_text().contains("entries: 3"));
        assert!(result.stdout_text().contains("unique: 3"));
    }

    #[test]
    fn test_history_invalid_option() {
        let mut fx = Fixture::new();
        let result = fx.run("history", &["-z"]);
        assert_eq!(result.exit_code, 2);
    }
}
