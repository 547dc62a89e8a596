mod cmd_check;
mod cmd_git;
mod cmd_run;
mod cmd_shell;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pulse_supervisor::SupervisorConfig;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Run AI coding-assistant sessions side by side, one per project workspace"
)]
struct Cli {
    /// Config file (default: <config dir>/pulse/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive workspace shell (default)
    Shell,
    /// Check whether a provider's CLI is installed
    Check {
        /// claude, gemini, codex, or name=program
        provider: String,
    },
    /// Print the current git branch
    Branch {
        /// Repository path (default: current directory)
        path: Option<PathBuf>,
    },
    /// List working-tree changes
    Changes {
        /// Repository path (default: current directory)
        path: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a one-shot command through the configured shell
    Run {
        /// Working directory (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Command and arguments (after --). A single argument is taken as a
        /// raw shell command line; several are quoted as separate words.
        #[arg(last = true)]
        argv: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config.as_deref())?;
    let cwd = std::env::current_dir()?;
    let rt = tokio::runtime::Runtime::new()?;

    match cli.cmd.unwrap_or(Command::Shell) {
        Command::Shell => rt.block_on(cmd_shell::execute(config)),
        Command::Check { provider } => {
            if !rt.block_on(cmd_check::execute(config, &provider))? {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Branch { path } => {
            rt.block_on(cmd_git::branch(config, &path.unwrap_or(cwd)))
        }
        Command::Changes { path, json } => {
            rt.block_on(cmd_git::changes(config, &path.unwrap_or(cwd), json))
        }
        Command::Run { cwd: dir, argv } => {
            let code = rt.block_on(cmd_run::execute(&config, &dir.unwrap_or(cwd), &argv))?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

/// Logs go to stderr so session output on stdout stays clean.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        "debug".to_string()
    } else {
        std::env::var("PULSE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "warn".to_string())
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<SupervisorConfig> {
    match explicit {
        Some(path) => {
            anyhow::ensure!(path.exists(), "config file not found: {}", path.display());
            SupervisorConfig::load(path)
        }
        None => match SupervisorConfig::default_path() {
            Some(path) => SupervisorConfig::load(&path)
                .with_context(|| format!("loading default config {}", path.display())),
            None => Ok(SupervisorConfig::default()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_shell() {
        let cli = Cli::try_parse_from(["pulse"]).unwrap();
        assert!(cli.cmd.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn run_takes_trailing_argv() {
        let cli = Cli::try_parse_from(["pulse", "run", "--cwd", "/tmp", "--", "ls", "-la"]).unwrap();
        match cli.cmd {
            Some(Command::Run { cwd, argv }) => {
                assert_eq!(cwd, Some(PathBuf::from("/tmp")));
                assert_eq!(argv, vec!["ls", "-la"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pulse", "check", "claude", "-v", "--config", "x.json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.json")));
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_config(Some(&missing)).is_err());

        let present = dir.path().join("config.json");
        std::fs::write(&present, r#"{"init_grace_ms": 10}"#).unwrap();
        assert_eq!(load_config(Some(&present)).unwrap().init_grace_ms, 10);
    }
}
