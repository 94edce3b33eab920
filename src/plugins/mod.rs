//! Plugin System
//!
//! Plugins are capability bundles behind the [`Plugin`] trait: metadata
//! with a shell-version compatibility range, optional lifecycle hooks,
//! and optional registrations (commands, event hooks, completions,
//! aliases). Plugin commands land in the builtins table as
//! `plugin:command`; plugin aliases merge into the alias map with
//! later plugins winning.
//!
//! Dynamic loading is an external collaborator; the manager works with
//! already-constructed `Box<dyn Plugin>` values.

use indexmap::IndexMap;
use semver::{Version, VersionReq};
use tracing::{debug, warn};

use crate::builtins::{Builtin, BuiltinContext, BuiltinRegistry};
use crate::complete::{CompletionProvider, PluginCompletion};
use crate::exec::CommandResult;
use crate::hooks::{HookCallback, HookManager};

/// The shell version plugins are checked against.
pub const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity and compatibility data every plugin carries.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    /// Accepted range for the shell version: `=X`, `>X`, `>=X`, `<X`,
    /// `<=X`, or a bare version (exact).
    pub krusty_version: String,
}

/// A command a plugin contributes.
pub struct PluginCommand {
    pub description: String,
    pub usage: Option<String>,
    pub execute:
        Box<dyn Fn(&[String], &mut BuiltinContext<'_>) -> CommandResult + Send + Sync>,
}

/// Capability interface. Lifecycle methods default to no-ops; the
/// registration methods default to empty.
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> PluginMetadata;

    fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn activate(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn deactivate(&mut self) {}
    fn destroy(&mut self) {}

    /// command name -> implementation; registered as `plugin:name`.
    fn commands(&self) -> Vec<(String, PluginCommand)> {
        Vec::new()
    }
    /// event name -> handler.
    fn hooks(&self) -> Vec<(String, HookCallback)> {
        Vec::new()
    }
    fn completions(&self) -> Vec<PluginCompletion> {
        Vec::new()
    }
    fn aliases(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Parse the compatibility range into a `VersionReq`. Bare versions are
/// exact matches, not semver-caret ranges.
pub fn parse_version_range(range: &str) -> Result<VersionReq, String> {
    let trimmed = range.trim();
    if trimmed.is_empty() {
        return Err("empty version range".to_string());
    }
    let normalized = if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("={}", trimmed)
    } else if let Some(rest) = trimmed.strip_prefix('=') {
        format!("={}", rest.trim())
    } else if trimmed.starts_with(">=")
        || trimmed.starts_with("<=")
        || trimmed.starts_with('>')
        || trimmed.starts_with('<')
    {
        trimmed.to_string()
    } else {
        return Err(format!("unsupported version range: {}", trimmed));
    };
    VersionReq::parse(&normalized).map_err(|e| format!("{}: {}", trimmed, e))
}

/// Check a plugin's declared range against the shell version.
pub fn check_compatibility(metadata: &PluginMetadata, shell_version: &str) -> Result<(), String> {
    let version = Version::parse(shell_version)
        .map_err(|e| format!("bad shell version {}: {}", shell_version, e))?;
    let req = parse_version_range(&metadata.krusty_version)?;
    if req.matches(&version) {
        Ok(())
    } else {
        Err(format!(
            "plugin {} requires krusty {}, this is {}",
            metadata.name, metadata.krusty_version, shell_version
        ))
    }
}

/// Adapter: a plugin command exposed through the builtins table.
struct PluginCommandBuiltin {
    qualified: &'static str,
    description: String,
    execute:
        Box<dyn Fn(&[String], &mut BuiltinContext<'_>) -> CommandResult + Send + Sync>,
}

impl Builtin for PluginCommandBuiltin {
    fn name(&self) -> &'static str {
        self.qualified
    }

    fn summary(&self) -> &'static str {
        // The registry displays `description`; the static summary is a
        // generic marker for plugin-provided entries.
        "plugin command"
    }

    fn execute(
        &self,
        ctx: &mut BuiltinContext<'_>,
        args: &[String],
        _stdin: &str,
    ) -> CommandResult {
        debug!(command = self.qualified, desc = %self.description, "plugin command");
        (self.execute)(args, ctx)
    }
}

/// Tracks registered plugins and performs the wiring.
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<(PluginMetadata, Box<dyn Plugin>)>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|(meta, _)| meta.name.clone()).collect()
    }

    /// Register a plugin: compatibility check, initialize + activate,
    /// then wire its contributions into the shell tables.
    pub fn register(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        builtins: &mut BuiltinRegistry,
        hooks: &mut HookManager,
        completions: &mut CompletionProvider,
        aliases: &mut IndexMap<String, String>,
    ) -> Result<(), String> {
        let metadata = plugin.metadata();
        check_compatibility(&metadata, SHELL_VERSION)?;

        plugin.initialize()?;
        plugin.activate()?;

        for (command_name, command) in plugin.commands() {
            let qualified = format!("{}:{}", metadata.name, command_name);
            // The registry keys builtins by 'static names; plugin
            // commands are registered for the life of the process.
            let leaked: &'static str = Box::leak(qualified.into_boxed_str());
            builtins.register(Box::new(PluginCommandBuiltin {
                qualified: leaked,
                description: command.description,
                execute: command.execute,
            }));
        }

        for (event, callback) in plugin.hooks() {
            hooks.on(&event, callback);
        }

        for completion in plugin.completions() {
            completions.register_plugin(completion);
        }

        // Later plugins win on alias collisions.
        for (name, value) in plugin.aliases() {
            if aliases.contains_key(&name) {
                warn!(alias = %name, plugin = %metadata.name, "alias overridden by plugin");
            }
            aliases.insert(name, value);
        }

        debug!(plugin = %metadata.name, version = %metadata.version, "plugin registered");
        self.plugins.push((metadata, plugin));
        Ok(())
    }

    /// Deactivate and destroy all plugins, newest first.
    pub fn shutdown(&mut self) {
        while let Some((metadata, mut plugin)) = self.plugins.pop() {
            plugin.deactivate();
            plugin.destroy();
            debug!(plugin = %metadata.name, "plugin shut down");
        }
    }
}
