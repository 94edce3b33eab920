//! Prompt Composer
//!
//! Renders the prompt format string. Placeholders: `{path}`, `{git}`,
//! `{modules}`, `{symbol}`, `{user}`, `{host}`, `{time}`, `{exit_code}`.
//! Modules are external collaborators behind the [`PromptModule`]
//! capability trait: enabled, detected modules render in configured
//! order and are joined with spaces. Styling is stripped when stdout is
//! not a tty (or `NO_COLOR`/`TERM=dumb`/`FORCE_COLOR=0`), so width math
//! and pipelines stay clean.

use std::collections::HashMap;

use crate::config::PromptConfig;
use crate::editor::display::{display_width, strip_ansi};

/// Snapshot a module renders from.
pub struct ModuleContext<'a> {
    pub cwd: &'a str,
    pub env: &'a HashMap<String, String>,
    pub last_exit: i32,
}

/// A module's rendered fragment. `style` names a theme color.
pub struct ModuleOutput {
    pub content: String,
    pub style: Option<String>,
}

/// Capability interface for prompt modules (git, language probes, ...).
pub trait PromptModule: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, ctx: &ModuleContext<'_>) -> bool;
    fn render(&self, ctx: &ModuleContext<'_>) -> Option<ModuleOutput>;
}

/// Basic ANSI palette for theme color names. Theme values that are not
/// recognized color names pass through as raw escape sequences.
fn color_code(name: &str) -> Option<&'static str> {
    Some(match name {
        "black" => "\u{1b}[30m",
        "red" => "\u{1b}[31m",
        "green" => "\u{1b}[32m",
        "yellow" => "\u{1b}[33m",
        "blue" => "\u{1b}[34m",
        "magenta" => "\u{1b}[35m",
        "cyan" => "\u{1b}[36m",
        "white" => "\u{1b}[37m",
        "bright-black" | "gray" => "\u{1b}[90m",
        "bright-red" => "\u{1b}[91m",
        "bright-green" => "\u{1b}[92m",
        "bright-yellow" => "\u{1b}[93m",
        "bright-blue" => "\u{1b}[94m",
        "bright-magenta" => "\u{1b}[95m",
        "bright-cyan" => "\u{1b}[96m",
        _ => return None,
    })
}

const RESET: &str = "\u{1b}[0m";

/// The composer. Owns the module list and theme mapping.
pub struct PromptComposer {
    config: PromptConfig,
    modules: Vec<Box<dyn PromptModule>>,
    theme: HashMap<String, String>,
}

impl PromptComposer {
    pub fn new(config: PromptConfig, theme: HashMap<String, String>) -> Self {
        Self { config, modules: Vec::new(), theme }
    }

    /// Register a module; order of registration is render order.
    pub fn add_module(&mut self, module: Box<dyn PromptModule>) {
        self.modules.push(module);
    }

    /// Render the prompt for the next read.
    pub fn render(&self, ctx: &ModuleContext<'_>) -> String {
        let colored = self.render_colored(ctx);
        if self.config.simple_when_not_tty && !color_allowed(ctx.env) {
            strip_ansi(&colored)
        } else {
            colored
        }
    }

    /// Printable width of the rendered prompt, for the editor's cursor
    /// placement.
    pub fn width(&self, ctx: &ModuleContext<'_>) -> usize {
        display_width(&self.render(ctx))
    }

    fn render_colored(&self, ctx: &ModuleContext<'_>) -> String {
        let mut out = String::new();
        let format = self.config.format.clone();
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '{' {
                out.push(c);
                continue;
            }
            let mut name = String::new();
            let mut closed = false;
            for inner in chars.by_ref() {
                if inner == '}' {
                    closed = true;
                    break;
                }
                name.push(inner);
            }
            if !closed {
                out.push('{');
                out.push_str(&name);
                break;
            }
            out.push_str(&self.placeholder(&name, ctx));
        }
        out
    }

    fn placeholder(&self, name: &str, ctx: &ModuleContext<'_>) -> String {
        match name {
            "path" => {
                if !self.config.show_path {
                    return String::new();
                }
                self.styled("path", &short_path(ctx.cwd, ctx.env))
            }
            "symbol" => {
                if ctx.last_exit == 0 || !self.config.show_exit_code {
                    self.styled("symbol", "❯")
                } else {
                    self.styled("error", "❯")
                }
            }
            "exit_code" => {
                if self.config.show_exit_code && ctx.last_exit != 0 {
                    self.styled("error", &ctx.last_exit.to_string())
                } else {
                    String::new()
                }
            }
            "user" => {
                if !self.config.show_user {
                    return String::new();
                }
                self.styled("user", ctx.env.get("USER").map(String::as_str).unwrap_or(""))
            }
            "host" => {
                if !self.config.show_host {
                    return String::new();
                }
                self.styled(
                    "host",
                    ctx.env.get("HOSTNAME").map(String::as_str).unwrap_or(""),
                )
            }
            "time" => {
                if !self.config.show_time {
                    return String::new();
                }
                let now = match self.config.startup_timestamp {
                    Some(ts) => chrono::DateTime::from_timestamp(ts, 0)
                        .map(|dt| dt.naive_local())
                        .unwrap_or_else(|| chrono::Local::now().naive_local()),
                    None => chrono::Local::now().naive_local(),
                };
                self.styled("time", &now.format("%H:%M:%S").to_string())
            }
            "git" => {
                if !self.config.show_git {
                    return String::new();
                }
                self.module_fragment("git", ctx)
            }
            "modules" => {
                let fragments: Vec<String> = self
                    .modules
                    .iter()
                    .filter(|module| module.detect(ctx))
                    .filter_map(|module| {
                        module.render(ctx).map(|output| self.style_output(&output))
                    })
                    .filter(|fragment| !fragment.is_empty())
                    .collect();
                let joined = fragments.join(" ");
                if joined.is_empty() {
                    joined
                } else {
                    format!("{} ", joined)
                }
            }
            other => format!("{{{}}}", other),
        }
    }

    fn module_fragment(&self, name: &str, ctx: &ModuleContext<'_>) -> String {
        self.modules
            .iter()
            .find(|module| module.name() == name)
            .filter(|module| module.detect(ctx))
            .and_then(|module| module.render(ctx))
            .map(|output| self.style_output(&output))
            .unwrap_or_default()
    }

    fn style_output(&self, output: &ModuleOutput) -> String {
        match &output.style {
            Some(style) => self.apply_color(style, &output.content),
            None => output.content.clone(),
        }
    }

    fn styled(&self, element: &str, text: &str) -> String {
        match self.theme.get(element) {
            Some(color) => self.apply_color(color, text),
            None => text.to_string(),
        }
    }

    fn apply_color(&self, color: &str, text: &str) -> String {
        // Theme values may themselves be theme color names.
        let resolved = self.theme.get(color).map(String::as_str).unwrap_or(color);
        match color_code(resolved) {
            Some(code) => format!("{}{}{}", code, text, RESET),
            None if resolved.starts_with('\u{1b}') => {
                format!("{}{}{}", resolved, text, RESET)
            }
            None => text.to_string(),
        }
    }
}

/// `$HOME`-relative path with `~` shortening.
fn short_path(cwd: &str, env: &HashMap<String, String>) -> String {
    if let Some(home) = env.get("HOME") {
        if cwd == home {
            return "~".to_string();
        }
        if let Some(rest) = cwd.strip_prefix(&format!("{}/", home)) {
            return format!("~/{}", rest);
        }
    }
    cwd.to_string()
}

/// Color is allowed only on a tty, and only when the environment does
/// not opt out.
fn color_allowed(env: &HashMap<String, String>) -> bool {
    use std::io::IsTerminal;
    if env.contains_key("NO_COLOR") {
        return false;
    }
    if env.get("TERM").map(String::as_str) == Some("dumb") {
        return false;
    }
    if env.get("FORCE_COLOR").map(String::as_str) == Some("0") {
        return false;
    }
    std::io::stdout().is_terminal()
}
