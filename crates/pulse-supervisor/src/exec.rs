//! One-shot shell commands.

use crate::config::SupervisorConfig;
use pulse_core::SupervisorError;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of a finished command. A non-zero exit is a result, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Runs a command string through some shell. The seam that keeps routing
/// logic independent of the host shell.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path) -> Result<ShellOutput, SupervisorError>;
}

/// Runs commands through the host's shell (`sh -c` on Unix; pwsh,
/// powershell or cmd.exe on Windows), buffering both streams.
#[derive(Debug, Clone, Default)]
pub struct HostShell {
    shell: Option<String>,
    timeout: Option<Duration>,
}

impl HostShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.shell_timeout(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl CommandExecutor for HostShell {
    async fn run(&self, command: &str, cwd: &Path) -> Result<ShellOutput, SupervisorError> {
        let (shell, args) = match &self.shell {
            Some(shell) => (shell.clone(), shell_args(shell, command)),
            None => default_shell_cmd(command),
        };
        tracing::debug!(%shell, cwd = %cwd.display(), command, "shell run");

        let output = Command::new(&shell)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(command, secs = limit.as_secs(), "shell command timed out");
                    return Ok(ShellOutput {
                        exit_code: None,
                        stdout: String::new(),
                        stderr: format!("command timed out after {}s: {command}", limit.as_secs()),
                        timed_out: true,
                    });
                }
            },
            None => output.await,
        }
        .map_err(|e| SupervisorError::spawn(shell.clone(), e))?;

        Ok(ShellOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        })
    }
}

/// Argument convention for an explicitly configured shell.
fn shell_args(shell: &str, command: &str) -> Vec<String> {
    let name = Path::new(shell)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match name.as_str() {
        "cmd" => vec!["/C".into(), command.into()],
        "pwsh" | "powershell" => vec!["-NoProfile".into(), "-Command".into(), command.into()],
        _ => vec!["-c".into(), command.into()],
    }
}

#[cfg(windows)]
fn default_shell_cmd(command: &str) -> (String, Vec<String>) {
    use pulse_core::provider::locate_executable;
    // Prefer PowerShell over cmd.exe for better Unix-ism support
    static SHELL: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    let shell = SHELL.get_or_init(|| {
        if locate_executable(Path::new("pwsh")).is_some() {
            "pwsh".into()
        } else if locate_executable(Path::new("powershell")).is_some() {
            "powershell".into()
        } else {
            "cmd.exe".into()
        }
    });
    (shell.clone(), shell_args(shell, command))
}

#[cfg(not(windows))]
fn default_shell_cmd(command: &str) -> (String, Vec<String>) {
    ("sh".into(), vec!["-c".into(), command.into()])
}
