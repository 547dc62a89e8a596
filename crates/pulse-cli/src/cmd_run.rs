use pulse_supervisor::{CommandExecutor, HostShell, SupervisorConfig};
use std::io::Write;
use std::path::Path;

/// Exit code reported when the configured timeout killed the command.
const TIMEOUT_EXIT: i32 = 124;

/// Run `argv` through the configured shell in `cwd`, replay its output, and
/// return its exit code.
pub async fn execute(config: &SupervisorConfig, cwd: &Path, argv: &[String]) -> anyhow::Result<i32> {
    if argv.is_empty() {
        anyhow::bail!("usage: pulse run [--cwd PATH] -- <command> [args...]");
    }
    let command = command_line(argv);
    let out = HostShell::from_config(config).run(&command, cwd).await?;

    std::io::stdout().write_all(out.stdout.as_bytes())?;
    std::io::stderr().write_all(out.stderr.as_bytes())?;

    if out.timed_out {
        return Ok(TIMEOUT_EXIT);
    }
    Ok(out.exit_code.unwrap_or(1))
}

/// One argument is already a command line (`pulse run -- "ls | wc -l"`);
/// several are words whose boundaries must survive the shell.
fn command_line(argv: &[String]) -> String {
    match argv {
        [line] => line.clone(),
        words => shell_words::join(words),
    }
}
