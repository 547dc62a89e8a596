use anyhow::{Context, Result};
use pulse_core::BinaryOverrides;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supervisor settings. Every field has a default, so an empty `{}` (or no
/// file at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Program used for one-shot commands, invoked as `<shell> -c <cmd>`
    /// (`/C` for cmd.exe). `None` picks the platform shell.
    pub shell: Option<String>,
    /// Silence after spawn before a "waiting for initialization" notice.
    pub init_grace_ms: u64,
    /// Cap on the raw output retained per session.
    pub output_buffer_bytes: usize,
    /// Broadcast slots; observers lagging further lose the oldest events.
    pub event_capacity: usize,
    /// How long exit handling waits for trailing output before reporting.
    pub drain_timeout_ms: u64,
    /// Kill one-shot commands after this many seconds. `None` waits forever.
    pub shell_timeout_sec: Option<u64>,
    /// Explicit executable per provider trigger name.
    pub binaries: BinaryOverrides,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shell: None,
            init_grace_ms: 2000,
            output_buffer_bytes: 256 * 1024,
            event_capacity: 1024,
            drain_timeout_ms: 500,
            shell_timeout_sec: None,
            binaries: BinaryOverrides::new(),
        }
    }
}

impl SupervisorConfig {
    /// `<config_dir>/pulse/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pulse").join("config.json"))
    }

    /// Load from `path`. A missing file yields defaults; a present but
    /// malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: SupervisorConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok(config)
    }

    pub fn init_grace(&self) -> Duration {
        Duration::from_millis(self.init_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn shell_timeout(&self) -> Option<Duration> {
        self.shell_timeout_sec.map(Duration::from_secs)
    }
}
