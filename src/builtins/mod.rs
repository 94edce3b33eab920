//! Builtin Commands
//!
//! The builtins table and the commands the core contracts require.
//! Builtins execute in-process on the editor task, writing to buffers;
//! the executor forwards their output into the pipeline.

pub mod core;
pub mod history_cmd;
pub mod jobs_cmd;
pub mod vars;

use indexmap::IndexMap;

use crate::config::ExecutionConfig;
use crate::exec::CommandResult;
use crate::expansion::{ExpansionCaches, SubstitutionPolicy};
use crate::history::HistoryStore;
use crate::jobs::JobManager;
use crate::shell::ShellState;

/// Mutable shell pieces a builtin may touch, reborrowed from the
/// executor for the duration of one call. Builtins never store these.
pub struct BuiltinContext<'a> {
    pub state: &'a mut ShellState,
    pub jobs: Option<&'a JobManager>,
    pub history: Option<&'a mut HistoryStore>,
    pub builtins: &'a BuiltinRegistry,
    pub exec_config: &'a ExecutionConfig,
    pub policy: &'a SubstitutionPolicy,
    pub caches: &'a mut ExpansionCaches,
}

/// One builtin command.
pub trait Builtin: Send + Sync {
    fn name(&self) -> &'static str;
    /// One-line description for `help`.
    fn summary(&self) -> &'static str;
    fn execute(&self, ctx: &mut BuiltinContext<'_>, args: &[String], stdin: &str)
        -> CommandResult;
}

/// Insertion-ordered builtin table.
#[derive(Default)]
pub struct BuiltinRegistry {
    commands: IndexMap<String, Box<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, builtin: Box<dyn Builtin>) {
        self.commands.insert(builtin.name().to_string(), builtin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Builtin> {
        self.commands.get(name).map(|b| b.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Box<dyn Builtin>)> {
        self.commands.iter()
    }
}

/// The standard table.
pub fn default_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();
    registry.register(Box::new(core::Cd));
    registry.register(Box::new(core::Pwd));
    registry.register(Box::new(core::Echo));
    registry.register(Box::new(core::True));
    registry.register(Box::new(core::False));
    registry.register(Box::new(core::Exit));
    registry.register(Box::new(core::Source));
    registry.register(Box::new(core::Type));
    registry.register(Box::new(core::Which));
    registry.register(Box::new(core::Help));
    registry.register(Box::new(vars::Set));
    registry.register(Box::new(vars::Export));
    registry.register(Box::new(vars::Unset));
    registry.register(Box::new(vars::Alias));
    registry.register(Box::new(vars::Unalias));
    registry.register(Box::new(jobs_cmd::Jobs));
    registry.register(Box::new(jobs_cmd::Fg));
    registry.register(Box::new(jobs_cmd::Bg));
    registry.register(Box::new(jobs_cmd::Kill));
    registry.register(Box::new(jobs_cmd::Wait));
    registry.register(Box::new(history_cmd::History));
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Shared builtin-test fixture: a full context over test state.
    pub(crate) struct Fixture {
        pub state: ShellState,
        pub jobs: JobManager,
        pub history: HistoryStore,
        pub registry: BuiltinRegistry,
        pub exec_config: ExecutionConfig,
        pub policy: SubstitutionPolicy,
        pub caches: ExpansionCaches,
    }

    impl Fixture {
        pub fn new() -> Self {
            let mut history_config = crate::config::HistoryConfig::default();
            history_config.file = String::new();
            Self {
                state: ShellState::for_tests(),
                jobs: JobManager::new(),
                history: HistoryStore::with_config(history_config),
                registry: default_registry(),
                exec_config: ExecutionConfig::default(),
                policy: SubstitutionPolicy::default(),
                caches: ExpansionCaches::default(),
            }
        }

        pub fn run(&mut self, name: &str, args: &[&str]) -> CommandResult {
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            let builtin = match self.registry.get(name) {
                Some(builtin) => builtin,
                None => panic!("no builtin named {}", name),
            };
            let mut ctx = BuiltinContext {
                state: &mut self.state,
                jobs: Some(&self.jobs),
                history: Some(&mut self.history),
                builtins: &self.registry,
                exec_config: &self.exec_config,
                policy: &self.policy,
                caches: &mut self.caches,
            };
            builtin.execute(&mut ctx, &args, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_contents() {
        let registry = default_registry();
        for name in [
            "cd", "pwd", "echo", "true", "false", "exit", "source", "type", "which", "help",
            "set", "export", "unset", "alias", "unalias", "jobs", "fg", "bg", "kill", "wait",
            "history",
        ] {
            assert!(registry.contains(name), "missing builtin {}", name);
        }
        assert!(!registry.contains("ls"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = default_registry();
        assert_eq!(registry.get("echo").map(|b| b.name()), Some("echo"));
        assert!(registry.get("nope").is_none());
    }
}
