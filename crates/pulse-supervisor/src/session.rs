//! One long-lived interactive child process per workspace.
//!
//! A [`SessionProcess`] is the registry's handle: stdin, pid, and the kill
//! switch. The child itself is owned by a monitor task which pumps stdout and
//! stderr, emits the initialization hint, and reports the exit back to the
//! registry exactly once.

use crate::output::{AnsiStripper, OutputBuffer, Utf8Decoder};
use crate::registry::WorkspaceRegistry;
use pulse_core::{LaunchSpec, SupervisorError, WorkspaceStatus};
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const READ_CHUNK: usize = 8192;

// ── State ──

/// Session lifecycle as seen from outside. Spawn and attach happen in one
/// `start_session` call, so a session is `Running` from the moment it is
/// visible; `SessionLaunched` marks the spawn.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session yet, or the last one was stopped by the user.
    NotStarted,
    Running,
    Completed,
    Errored,
}

impl SessionState {
    /// Derive from workspace status and whether a session is attached.
    pub fn derive(status: WorkspaceStatus, attached: bool) -> Self {
        if attached {
            return SessionState::Running;
        }
        match status {
            WorkspaceStatus::Completed => SessionState::Completed,
            WorkspaceStatus::Error => SessionState::Errored,
            WorkspaceStatus::Idle | WorkspaceStatus::Running => SessionState::NotStarted,
        }
    }
}

/// How a session process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn from_wait(result: std::io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) => ExitOutcome::Exited {
                code: status.code(),
                signal: exit_signal(&status),
            },
            Err(e) => ExitOutcome::WaitFailed(e.to_string()),
        }
    }

    pub fn status(&self) -> WorkspaceStatus {
        match self {
            ExitOutcome::Exited { code: Some(0), .. } => WorkspaceStatus::Completed,
            _ => WorkspaceStatus::Error,
        }
    }

    pub fn error(&self) -> Option<SupervisorError> {
        match self {
            ExitOutcome::Exited { code: Some(0), .. } => None,
            ExitOutcome::Exited { code, signal } => Some(SupervisorError::ProcessExit {
                code: *code,
                signal: *signal,
            }),
            ExitOutcome::WaitFailed(_) => Some(SupervisorError::ProcessExit {
                code: None,
                signal: None,
            }),
        }
    }

    /// Final line shown in the workspace's output.
    pub fn notice(&self, tool: &str) -> String {
        match (self, self.error()) {
            (_, None) => format!("{tool} session ended (exit code 0)"),
            (ExitOutcome::WaitFailed(reason), _) => {
                format!("{tool} session lost: {reason}")
            }
            (_, Some(err)) => format!("{tool} session ended: {err}"),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

// ── Session handle ──

/// State shared between the registry handle and the monitor/pump tasks.
pub(crate) struct SessionShared {
    pub workspace_id: String,
    /// Distinguishes successive sessions of one workspace so a late exit
    /// from an old process never detaches a newer one.
    pub generation: u64,
    pub tool_name: String,
    received_output: AtomicBool,
    buffer: Mutex<OutputBuffer>,
}

impl SessionShared {
    pub fn new(workspace_id: String, generation: u64, tool_name: String, buffer_cap: usize) -> Self {
        Self {
            workspace_id,
            generation,
            tool_name,
            received_output: AtomicBool::new(false),
            buffer: Mutex::new(OutputBuffer::new(buffer_cap)),
        }
    }

    pub fn has_received_output(&self) -> bool {
        self.received_output.load(Ordering::Acquire)
    }

    /// Raw retained output, escapes included.
    pub fn output(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contents()
    }

    fn record(&self, chunk: &[u8]) {
        self.received_output.store(true, Ordering::Release);
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(chunk);
    }
}

pub(crate) type StdinPipe = Arc<tokio::sync::Mutex<Option<ChildStdin>>>;

/// The registry's handle on a live session process.
pub(crate) struct SessionProcess {
    pub shared: Arc<SessionShared>,
    pub pid: Option<u32>,
    pub command: String,
    stdin: StdinPipe,
    kill_tx: Option<oneshot::Sender<oneshot::Sender<()>>>,
}

/// A spawned child whose monitor has not been started yet. Started by the
/// registry once the session is attached and the lock released.
pub(crate) struct PendingSession {
    child: Child,
    kill_rx: oneshot::Receiver<oneshot::Sender<()>>,
    shared: Arc<SessionShared>,
    shutdown: CancellationToken,
}

impl SessionProcess {
    /// Spawn the external process with piped stdio in `spec.cwd`.
    pub fn spawn(
        spec: &LaunchSpec,
        shared: SessionShared,
        shutdown: CancellationToken,
    ) -> Result<(SessionProcess, PendingSession), SupervisorError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &spec.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn(spec.program.display().to_string(), e))?;
        let stdin = child.stdin.take();
        let (kill_tx, kill_rx) = oneshot::channel();
        let shared = Arc::new(shared);

        let handle = SessionProcess {
            shared: shared.clone(),
            pid: child.id(),
            command: spec.render(),
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            kill_tx: Some(kill_tx),
        };
        let pending = PendingSession {
            child,
            kill_rx,
            shared,
            shutdown,
        };
        Ok((handle, pending))
    }

    pub fn stdin(&self) -> StdinPipe {
        self.stdin.clone()
    }

    /// Ask the monitor to kill the process. The returned receiver resolves
    /// once the kill signal has been sent (or immediately, if the process
    /// had already exited).
    pub fn terminate(mut self) -> oneshot::Receiver<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(ack_tx);
        }
        ack_rx
    }
}

impl PendingSession {
    pub fn start(self, registry: WorkspaceRegistry) {
        tokio::spawn(supervise(self, registry));
    }
}

// ── Monitor ──

async fn supervise(pending: PendingSession, registry: WorkspaceRegistry) {
    let PendingSession {
        mut child,
        mut kill_rx,
        shared,
        shutdown,
    } = pending;
    let workspace_id = shared.workspace_id.clone();

    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump(stdout, false, shared.clone(), registry.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump(stderr, true, shared.clone(), registry.clone())));
    }

    let grace = tokio::time::sleep(registry.config().init_grace());
    tokio::pin!(grace);
    let mut hinted = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = &mut kill_rx => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!(%workspace_id, error = %e, "kill failed, process likely gone");
                }
                if let Ok(ack) = request {
                    let _ = ack.send(());
                }
                break child.wait().await;
            }
            _ = shutdown.cancelled() => {
                let _ = child.start_kill();
                break child.wait().await;
            }
            _ = &mut grace, if !hinted => {
                hinted = true;
                if !shared.has_received_output() {
                    registry.deliver_output(
                        &workspace_id,
                        format!("Waiting for {} to initialize...", shared.tool_name),
                        false,
                    );
                }
            }
        }
    };
    drop(kill_rx);

    // Let trailing output reach observers before the exit notice.
    let deadline = tokio::time::Instant::now() + registry.config().drain_timeout();
    for mut handle in pumps {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            tracing::debug!(%workspace_id, "output still open after exit, abandoning pump");
            handle.abort();
        }
    }

    let outcome = ExitOutcome::from_wait(status);
    registry.handle_exit(&workspace_id, shared.generation, outcome);
}

async fn pump<R>(mut reader: R, is_error: bool, shared: Arc<SessionShared>, registry: WorkspaceRegistry)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut decoder = Utf8Decoder::default();
    let mut ansi = AnsiStripper::default();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                shared.record(chunk);
                let text = ansi.strip(&decoder.decode(chunk));
                if !text.is_empty() {
                    registry.deliver_output(&shared.workspace_id, text, is_error);
                }
            }
            Err(e) => {
                tracing::debug!(workspace_id = %shared.workspace_id, is_error, error = %e, "read failed");
                break;
            }
        }
    }
    let mut rest = ansi.strip(&decoder.finish());
    rest.push_str(&ansi.finish());
    if !rest.is_empty() {
        registry.deliver_output(&shared.workspace_id, rest, is_error);
    }
}
