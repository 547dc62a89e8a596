//! Providers: which external assistant a workspace talks to, and how to launch it.
//!
//! `Provider` is a closed set. Each variant owns its launch-environment
//! resolution behind [`LaunchStrategy`], so the supervisor never branches on
//! provider names.

use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Explicit executable paths keyed by provider trigger name (from config).
pub type BinaryOverrides = HashMap<String, PathBuf>;

/// Env var Claude Code reads to find its helper shell on Windows.
pub const CLAUDE_GIT_BASH_ENV: &str = "CLAUDE_CODE_GIT_BASH_PATH";

#[cfg(windows)]
const GIT_BASH_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Git\bin\bash.exe",
    r"C:\Program Files (x86)\Git\bin\bash.exe",
    r"C:\Git\bin\bash.exe",
];

// ── Provider ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProviderRepr", into = "ProviderRepr")]
pub enum Provider {
    ClaudeCode,
    Gemini,
    Codex,
    /// Any other interactive CLI, launched as `program args...`.
    Custom(CustomTool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTool {
    /// Trigger name typed by the user to start a session.
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Wire form: built-ins are their trigger name, custom tools an object.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ProviderRepr {
    Named(String),
    Custom(CustomTool),
}

impl From<Provider> for ProviderRepr {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Custom(tool) => ProviderRepr::Custom(tool),
            other => ProviderRepr::Named(other.trigger().to_string()),
        }
    }
}

impl TryFrom<ProviderRepr> for Provider {
    type Error = SupervisorError;

    fn try_from(repr: ProviderRepr) -> Result<Self, Self::Error> {
        match repr {
            ProviderRepr::Named(name) => name.parse(),
            ProviderRepr::Custom(tool) => Provider::custom(tool.name, tool.program, tool.args),
        }
    }
}

impl FromStr for Provider {
    type Err = SupervisorError;

    /// Accepts `claude`, `claude-code`, `gemini`, `codex`, or
    /// `name=program [args...]` for a custom tool.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((name, command)) = s.split_once('=') {
            let mut parts = command.split_whitespace();
            let program = parts.next().unwrap_or_default();
            let args = parts.map(str::to_string).collect();
            return Provider::custom(name.trim(), program, args);
        }
        match s.to_ascii_lowercase().as_str() {
            "claude" | "claude-code" => Ok(Provider::ClaudeCode),
            "gemini" => Ok(Provider::Gemini),
            "codex" => Ok(Provider::Codex),
            other => Err(SupervisorError::Validation(format!(
                "unknown provider \"{other}\" (expected claude, gemini, codex or name=program)"
            ))),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.trigger())
    }
}

impl Provider {
    pub fn custom(
        name: impl Into<String>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Result<Self, SupervisorError> {
        let name = name.into();
        let program = program.into();
        if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
            return Err(SupervisorError::Validation(
                "custom tool name must be a single non-empty word".into(),
            ));
        }
        if program.as_os_str().is_empty() {
            return Err(SupervisorError::Validation(format!(
                "custom tool \"{name}\" has no program"
            )));
        }
        Ok(Provider::Custom(CustomTool {
            name,
            program,
            args,
        }))
    }

    /// Primary trigger string; also the provider's wire name.
    pub fn trigger(&self) -> &str {
        match self {
            Provider::ClaudeCode => "claude",
            Provider::Gemini => "gemini",
            Provider::Codex => "codex",
            Provider::Custom(tool) => &tool.name,
        }
    }

    /// All strings that start a session for this provider.
    pub fn triggers(&self) -> Vec<&str> {
        match self {
            Provider::ClaudeCode => vec!["claude", "claude-code"],
            other => vec![other.trigger()],
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Provider::ClaudeCode => "Claude Code",
            Provider::Gemini => "Gemini CLI",
            Provider::Codex => "Codex CLI",
            Provider::Custom(tool) => &tool.name,
        }
    }

    pub fn install_hint(&self) -> String {
        match self {
            Provider::ClaudeCode => "Install: npm install -g @anthropic-ai/claude-code".into(),
            Provider::Gemini => "Install: npm install -g @google/gemini-cli".into(),
            Provider::Codex => "Install: npm install -g @openai/codex".into(),
            Provider::Custom(tool) => format!(
                "Check that {} is installed and on PATH",
                tool.program.display()
            ),
        }
    }

    /// If `input` is a trigger (exactly, or followed by whitespace and
    /// arguments), return the extra arguments.
    pub fn match_trigger(&self, input: &str) -> Option<Vec<String>> {
        let input = input.trim();
        self.triggers().into_iter().find_map(|trigger| {
            let rest = input.strip_prefix(trigger)?;
            if rest.is_empty() {
                Some(Vec::new())
            } else if rest.starts_with(char::is_whitespace) {
                Some(rest.split_whitespace().map(str::to_string).collect())
            } else {
                None
            }
        })
    }

    /// The executable name or path the user asked for, before PATH lookup.
    /// Precedence: `PULSE_<TRIGGER>_BIN`, config overrides, built-in default.
    pub fn requested_program(&self, overrides: &BinaryOverrides) -> PathBuf {
        if let Some(from_env) = std::env::var_os(self.bin_env_var()).filter(|v| !v.is_empty()) {
            return PathBuf::from(from_env);
        }
        if let Some(path) = overrides.get(self.trigger()) {
            return path.clone();
        }
        match self {
            Provider::ClaudeCode => PathBuf::from("claude"),
            Provider::Gemini => PathBuf::from("gemini"),
            Provider::Codex => PathBuf::from("codex"),
            Provider::Custom(tool) => tool.program.clone(),
        }
    }

    pub fn bin_env_var(&self) -> String {
        let upper: String = self
            .trigger()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("PULSE_{upper}_BIN")
    }

    fn resolve_program(&self, overrides: &BinaryOverrides) -> Result<PathBuf, SupervisorError> {
        let requested = self.requested_program(overrides);
        locate_executable(&requested).ok_or_else(|| {
            SupervisorError::spawn(
                requested.display().to_string(),
                format!("executable not found. {}", self.install_hint()),
            )
        })
    }
}

// ── Launch strategy ──

/// Everything needed to spawn a session process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
}

impl LaunchSpec {
    pub fn render(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Resolves the executable, arguments and environment for a session rooted
/// at `workspace_path`.
pub trait LaunchStrategy {
    fn resolve_launch(
        &self,
        workspace_path: &Path,
        overrides: &BinaryOverrides,
    ) -> Result<LaunchSpec, SupervisorError>;
}

impl LaunchStrategy for Provider {
    fn resolve_launch(
        &self,
        workspace_path: &Path,
        overrides: &BinaryOverrides,
    ) -> Result<LaunchSpec, SupervisorError> {
        let program = self.resolve_program(overrides)?;
        let mut spec = LaunchSpec {
            program,
            args: Vec::new(),
            cwd: workspace_path.to_path_buf(),
            env: Vec::new(),
            env_remove: Vec::new(),
        };

        match self {
            Provider::ClaudeCode => {
                // Markers that make Claude Code refuse to start nested.
                spec.env_remove = vec!["CLAUDECODE".into(), "CLAUDE_CODE".into()];
                if let Some(bash) = claude_helper_shell()? {
                    spec.env
                        .push((CLAUDE_GIT_BASH_ENV.into(), bash.display().to_string()));
                }
            }
            Provider::Gemini | Provider::Codex => {}
            Provider::Custom(tool) => spec.args = tool.args.clone(),
        }
        Ok(spec)
    }
}

#[cfg(windows)]
fn claude_helper_shell() -> Result<Option<PathBuf>, SupervisorError> {
    if let Some(existing) = std::env::var_os(CLAUDE_GIT_BASH_ENV).filter(|v| !v.is_empty()) {
        return Ok(Some(PathBuf::from(existing)));
    }
    let mut candidates: Vec<PathBuf> = GIT_BASH_CANDIDATES.iter().map(PathBuf::from).collect();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        candidates.push(
            PathBuf::from(local)
                .join("Programs")
                .join("Git")
                .join("bin")
                .join("bash.exe"),
        );
    }
    locate_helper_shell(&candidates, "bash").map(Some).ok_or_else(|| {
        SupervisorError::spawn(
            "bash",
            format!("Claude Code needs Git Bash on Windows. Install Git for Windows or set {CLAUDE_GIT_BASH_ENV}"),
        )
    })
}

#[cfg(not(windows))]
fn claude_helper_shell() -> Result<Option<PathBuf>, SupervisorError> {
    Ok(None)
}

// ── Executable lookup ──

/// Probe `candidates` in order, then fall back to a PATH lookup of `fallback`.
pub fn locate_helper_shell(candidates: &[PathBuf], fallback: &str) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .cloned()
        .or_else(|| locate_executable(Path::new(fallback)))
}

/// Resolve `program` to an executable file. Paths are checked directly; bare
/// names are searched on `PATH` (with `PATHEXT` on Windows).
pub fn locate_executable(program: &Path) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Like [`locate_executable`], against an explicit search path.
pub fn locate_executable_in(program: &Path, search_path: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(program, Some(search_path), cwd).ok()
}
