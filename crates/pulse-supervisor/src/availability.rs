use pulse_core::{BinaryOverrides, LaunchStrategy, Provider};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of probing a provider's executable. `message` is always set:
/// the version line when available, install guidance when not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Availability {
    fn missing(message: String) -> Self {
        Self {
            available: false,
            message,
            path: None,
            version: None,
        }
    }
}

/// Check that the provider's executable (and any helper it needs) is
/// reachable, by resolving its launch and running `<bin> --version`.
/// Never fails; problems come back as `available: false`.
pub async fn check_tool_availability(provider: &Provider, overrides: &BinaryOverrides) -> Availability {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let spec = match provider.resolve_launch(&cwd, overrides) {
        Ok(spec) => spec,
        Err(e) => {
            tracing::debug!(provider = %provider, error = %e, "tool not resolvable");
            return Availability::missing(format!("{} not found: {e}", provider.display_name()));
        }
    };

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    for key in &spec.env_remove {
        cmd.env_remove(key);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let probe = tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.output()).await;
    let failure = match probe {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string);
            let message = match &version {
                Some(v) => format!("{} is available ({v})", provider.display_name()),
                None => format!("{} is available", provider.display_name()),
            };
            return Availability {
                available: true,
                message,
                path: Some(spec.program),
                version,
            };
        }
        Ok(Ok(output)) => format!("`{} --version` exited with {}", spec.program.display(), output.status),
        Ok(Err(e)) => format!("could not run {}: {e}", spec.program.display()),
        Err(_) => format!(
            "`{} --version` did not finish within {}s",
            spec.program.display(),
            VERSION_PROBE_TIMEOUT.as_secs()
        ),
    };
    tracing::debug!(provider = %provider, %failure, "version probe failed");
    Availability::missing(format!(
        "{} is not working: {failure}. {}",
        provider.display_name(),
        provider.install_hint()
    ))
}
