use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use krusty::config::Config;
use krusty::shell::Shell;

#[derive(Parser)]
#[command(name = "krusty")]
#[command(about = "An interactive, POSIX-flavored command shell")]
#[command(version)]
struct Cli {
    /// Execute the command string and exit
    #[arg(short = 'c')]
    command: Option<String>,

    /// Configuration file (default: ~/.krusty.toml)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Skip ~/.krustyrc on interactive startup
    #[arg(long = "norc")]
    norc: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<PathBuf>,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KRUSTY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("krusty: config: {}", e);
            std::process::exit(2);
        }
    };

    let mut shell = Shell::new(config);

    let code = if let Some(command) = cli.command {
        shell.run_command_string(&command).await
    } else if let Some(script) = cli.script_file {
        // Positional parameters belong to the script engine; arguments
        // are exposed through the environment.
        if !cli.args.is_empty() {
            shell
                .state
                .env
                .insert("KRUSTY_SCRIPT_ARGS".to_string(), cli.args.join(" "));
        }
        shell.run_script_file(&script).await
    } else {
        shell.run_interactive(cli.norc).await
    };

    std::process::exit(code);
}
