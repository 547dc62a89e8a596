//! The authoritative in-memory table of workspaces and their sessions.
//!
//! All mutation goes through one lock, and every transition that changes a
//! workspace's status or session presence publishes a `WorkspaceUpdated`
//! event while that lock is held, so observers see transitions in the order
//! they happened. Reads hand out clones, never references.

use crate::broadcast::OutputBroadcaster;
use crate::config::SupervisorConfig;
use crate::session::{ExitOutcome, SessionProcess, SessionShared, SessionState};
use crate::vcs::GitReader;
use pulse_core::{
    LaunchStrategy, Provider, SupervisorError, SupervisorEvent, Workspace, WorkspaceStatus,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

struct WorkspaceEntry {
    workspace: Workspace,
    session: Option<SessionProcess>,
    /// Most recent session's shared state, kept after exit for `output()`.
    last_session: Option<Arc<SessionShared>>,
    /// Set while `remove` waits for the kill to go out.
    removing: bool,
}

impl WorkspaceEntry {
    fn snapshot(&self) -> Workspace {
        self.workspace.clone()
    }
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<WorkspaceEntry>,
    next_generation: u64,
}

impl RegistryState {
    fn entry(&self, id: &str) -> Option<&WorkspaceEntry> {
        self.entries.iter().find(|e| e.workspace.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut WorkspaceEntry> {
        self.entries.iter_mut().find(|e| e.workspace.id == id)
    }

    fn live_entry_mut(&mut self, id: &str) -> Result<&mut WorkspaceEntry, SupervisorError> {
        match self.entry_mut(id) {
            Some(entry) if !entry.removing => Ok(entry),
            _ => Err(SupervisorError::NotFound(id.to_string())),
        }
    }
}

struct Inner {
    state: Mutex<RegistryState>,
    broadcaster: OutputBroadcaster,
    config: SupervisorConfig,
    shutdown: CancellationToken,
}

/// Owns every workspace and at most one session process per workspace.
///
/// Cheap to clone; clones share the same table. Separate `new` calls give
/// fully isolated registries.
#[derive(Clone)]
pub struct WorkspaceRegistry {
    inner: Arc<Inner>,
}

impl WorkspaceRegistry {
    pub fn new(config: SupervisorConfig) -> Self {
        let broadcaster = OutputBroadcaster::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState::default()),
                broadcaster,
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn broadcaster(&self) -> &OutputBroadcaster {
        &self.inner.broadcaster
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.broadcaster.subscribe()
    }

    // ── Workspace table ──

    /// Register a new idle workspace. Relative paths are resolved against
    /// the current directory.
    pub fn create(
        &self,
        path: impl Into<PathBuf>,
        name: &str,
        provider: Provider,
    ) -> Result<Workspace, SupervisorError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(SupervisorError::Validation(
                "workspace path must not be empty".into(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(SupervisorError::Validation(
                "workspace name must not be empty".into(),
            ));
        }
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&path))
                .map_err(|e| SupervisorError::Validation(format!("cannot resolve {}: {e}", path.display())))?
        };

        let workspace = Workspace::new(path, name.to_string(), provider);
        let mut state = self.lock();
        state.entries.push(WorkspaceEntry {
            workspace: workspace.clone(),
            session: None,
            last_session: None,
            removing: false,
        });
        self.inner.broadcaster.workspace_updated(workspace.clone());
        tracing::info!(workspace_id = %workspace.id, name = %workspace.name, path = %workspace.path.display(), "workspace created");
        Ok(workspace)
    }

    /// Snapshot of every workspace, in creation order.
    pub fn list(&self) -> Vec<Workspace> {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.removing)
            .map(WorkspaceEntry::snapshot)
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Workspace, SupervisorError> {
        self.lock()
            .entry(id)
            .map(WorkspaceEntry::snapshot)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    /// Delete a workspace, killing its session first if one is running.
    /// The kill is issued before the id stops resolving; the process is not
    /// waited on.
    pub async fn remove(&self, id: &str) -> Result<(), SupervisorError> {
        let session = {
            let mut state = self.lock();
            let entry = state.live_entry_mut(id)?;
            entry.removing = true;
            entry.workspace.status = WorkspaceStatus::Idle;
            entry.session.take()
        };

        if let Some(session) = session {
            tracing::info!(workspace_id = id, pid = ?session.pid, "terminating session for removal");
            let _ = session.terminate().await;
        }

        let mut state = self.lock();
        state.entries.retain(|e| e.workspace.id != id);
        self.inner.broadcaster.workspace_removed(id);
        tracing::info!(workspace_id = id, "workspace removed");
        Ok(())
    }

    // ── Session lifecycle ──

    /// Launch the workspace's provider with `extra_args` appended.
    ///
    /// A spawn failure leaves the workspace in `error` with a notice in its
    /// output, and is also returned to the caller.
    pub async fn start_session(
        &self,
        id: &str,
        extra_args: Vec<String>,
    ) -> Result<Workspace, SupervisorError> {
        let (snapshot, pending) = {
            let mut state = self.lock();
            state.next_generation += 1;
            let generation = state.next_generation;
            let entry = state.live_entry_mut(id)?;
            if entry.session.is_some() {
                return Err(SupervisorError::SessionAlreadyActive(id.to_string()));
            }

            let provider = entry.workspace.provider.clone();
            let tool_name = provider.display_name().to_string();
            let launched = provider
                .resolve_launch(&entry.workspace.path, &self.inner.config.binaries)
                .and_then(|mut spec| {
                    spec.args.extend(extra_args);
                    let shared = SessionShared::new(
                        id.to_string(),
                        generation,
                        tool_name.clone(),
                        self.inner.config.output_buffer_bytes,
                    );
                    SessionProcess::spawn(&spec, shared, self.inner.shutdown.child_token())
                });

            let (session, pending) = match launched {
                Ok(pair) => pair,
                Err(err) => {
                    entry.workspace.status = WorkspaceStatus::Error;
                    entry.workspace.touch();
                    let snapshot = entry.snapshot();
                    tracing::warn!(workspace_id = id, error = %err, "session spawn failed");
                    self.inner
                        .broadcaster
                        .terminal_output(id, format!("Error: {err}"), true);
                    self.inner.broadcaster.workspace_updated(snapshot);
                    return Err(err);
                }
            };

            tracing::info!(workspace_id = id, pid = ?session.pid, command = %session.command, generation, "session launched");
            let starting = format!("Starting {tool_name}...");
            let pid = session.pid;
            entry.last_session = Some(session.shared.clone());
            entry.session = Some(session);
            entry.workspace.status = WorkspaceStatus::Running;
            entry.workspace.touch();
            let snapshot = entry.snapshot();

            self.inner.broadcaster.workspace_updated(snapshot.clone());
            self.inner.broadcaster.terminal_output(id, starting, false);
            self.inner.broadcaster.session_launched(id, pid);
            (snapshot, pending)
        };

        pending.start(self.clone());
        Ok(snapshot)
    }

    /// Kill the running session. The workspace goes back to `idle` right
    /// away; the process exit that follows is not reported.
    pub async fn stop_session(&self, id: &str) -> Result<(), SupervisorError> {
        let session = {
            let mut state = self.lock();
            let entry = state.live_entry_mut(id)?;
            let session = entry
                .session
                .take()
                .ok_or_else(|| SupervisorError::NoActiveSession(id.to_string()))?;
            entry.workspace.status = WorkspaceStatus::Idle;
            entry.workspace.touch();
            self.inner.broadcaster.workspace_updated(entry.snapshot());
            self.inner
                .broadcaster
                .terminal_output(id, "Session stopped", false);
            session
        };

        tracing::info!(workspace_id = id, pid = ?session.pid, "session stopped by user");
        let _ = session.terminate().await;
        Ok(())
    }

    /// Write `text` plus a newline to the session's stdin.
    pub async fn send_input(&self, id: &str, text: &str) -> Result<(), SupervisorError> {
        let stdin = {
            let mut state = self.lock();
            let entry = state.live_entry_mut(id)?;
            let session = entry
                .session
                .as_ref()
                .ok_or_else(|| SupervisorError::NoActiveSession(id.to_string()))?;
            let stdin = session.stdin();
            entry.workspace.touch();
            stdin
        };

        let mut pipe = stdin.lock().await;
        let Some(writer) = pipe.as_mut() else {
            return Err(SupervisorError::NoActiveSession(id.to_string()));
        };
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::debug!(workspace_id = id, error = %e, "stdin closed");
            *pipe = None;
            return Err(SupervisorError::NoActiveSession(id.to_string()));
        }
        Ok(())
    }

    pub fn has_active_session(&self, id: &str) -> bool {
        self.lock()
            .entry(id)
            .is_some_and(|e| e.session.is_some())
    }

    pub fn session_state(&self, id: &str) -> Result<SessionState, SupervisorError> {
        let state = self.lock();
        let entry = state
            .entry(id)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        Ok(SessionState::derive(
            entry.workspace.status,
            entry.session.is_some(),
        ))
    }

    /// Raw output retained from the current or most recent session.
    pub fn output(&self, id: &str) -> Result<String, SupervisorError> {
        let state = self.lock();
        let entry = state
            .entry(id)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        Ok(entry
            .last_session
            .as_ref()
            .map(|s| s.output())
            .unwrap_or_default())
    }

    // ── Callbacks from session monitors ──

    /// Publish display text for a workspace. Dropped if the workspace no
    /// longer exists.
    pub(crate) fn deliver_output(&self, id: &str, text: String, is_error: bool) {
        let state = self.lock();
        if state.entry(id).is_none() {
            tracing::trace!(workspace_id = id, "output for removed workspace discarded");
            return;
        }
        self.inner.broadcaster.terminal_output(id, text, is_error);
    }

    pub(crate) fn handle_exit(&self, id: &str, generation: u64, outcome: ExitOutcome) {
        let mut state = self.lock();
        let Some(entry) = state.entry_mut(id) else {
            tracing::debug!(workspace_id = id, "exit for removed workspace ignored");
            return;
        };
        let attached = entry
            .session
            .as_ref()
            .is_some_and(|s| s.shared.generation == generation);
        if !attached {
            tracing::debug!(workspace_id = id, generation, "exit of detached session ignored");
            return;
        }

        let tool = entry
            .session
            .take()
            .map(|s| s.shared.tool_name.clone())
            .unwrap_or_default();
        entry.workspace.status = outcome.status();
        entry.workspace.touch();
        let snapshot = entry.snapshot();

        match outcome.error() {
            None => tracing::info!(workspace_id = id, "session completed"),
            Some(err) => tracing::warn!(workspace_id = id, error = %err, "session ended with error"),
        }
        self.inner.broadcaster.terminal_output(
            id,
            outcome.notice(&tool),
            outcome.status() == WorkspaceStatus::Error,
        );
        self.inner.broadcaster.workspace_updated(snapshot);
    }

    // ── Metadata ──

    /// Re-read branch and file changes for a workspace and publish the
    /// result.
    pub async fn refresh_vcs(&self, id: &str, git: &GitReader) -> Result<Workspace, SupervisorError> {
        let path = self.get(id)?.path;
        let branch = git.current_branch(&path).await;
        let changes = git.file_changes(&path).await;

        let mut state = self.lock();
        let entry = state.live_entry_mut(id)?;
        entry.workspace.git_branch = branch;
        entry.workspace.file_changes = Some(changes);
        let snapshot = entry.snapshot();
        self.inner.broadcaster.workspace_updated(snapshot.clone());
        Ok(snapshot)
    }

    pub fn set_git_branch(&self, id: &str, branch: Option<String>) -> Result<Workspace, SupervisorError> {
        let mut state = self.lock();
        let entry = state.live_entry_mut(id)?;
        entry.workspace.git_branch = branch;
        let snapshot = entry.snapshot();
        self.inner.broadcaster.workspace_updated(snapshot.clone());
        Ok(snapshot)
    }

    /// Bump `last_activity` without publishing.
    pub fn touch(&self, id: &str) -> Result<(), SupervisorError> {
        let mut state = self.lock();
        state.live_entry_mut(id)?.workspace.touch();
        Ok(())
    }

    /// Kill every session. Exits are still reported through the normal
    /// path.
    pub fn shutdown(&self) {
        tracing::debug!("registry shutdown");
        self.inner.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> WorkspaceRegistry {
        WorkspaceRegistry::new(SupervisorConfig::default())
    }

    #[test]
    fn create_validates_inputs() {
        let reg = registry();
        assert!(matches!(
            reg.create("", "Proj", Provider::ClaudeCode),
            Err(SupervisorError::Validation(_))
        ));
        assert!(matches!(
            reg.create("/proj", "   ", Provider::ClaudeCode),
            Err(SupervisorError::Validation(_))
        ));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn create_trims_name_and_starts_idle() {
        let reg = registry();
        let ws = reg.create("/proj", "  Proj ", Provider::Gemini).unwrap();
        assert_eq!(ws.name, "Proj");
        assert_eq!(ws.status, WorkspaceStatus::Idle);
        assert_eq!(ws.path, PathBuf::from("/proj"));
        assert!(!reg.has_active_session(&ws.id));
        assert_eq!(reg.session_state(&ws.id).unwrap(), SessionState::NotStarted);
    }

    #[test]
    fn relative_path_is_absolutized() {
        let reg = registry();
        let ws = reg.create("some/dir", "Rel", Provider::Codex).unwrap();
        assert!(ws.path.is_absolute());
        assert!(ws.path.ends_with("some/dir"));
    }

    #[test]
    fn list_keeps_insertion_order() {
        let reg = registry();
        let a = reg.create("/a", "A", Provider::ClaudeCode).unwrap();
        let b = reg.create("/b", "B", Provider::ClaudeCode).unwrap();
        let c = reg.create("/c", "C", Provider::ClaudeCode).unwrap();
        let ids: Vec<String> = reg.list().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn registries_are_isolated() {
        let one = registry();
        let two = registry();
        let ws = one.create("/proj", "Proj", Provider::ClaudeCode).unwrap();
        assert!(two.get(&ws.id).is_err());
        assert!(two.list().is_empty());
    }

    #[tokio::test]
    async fn remove_twice_reports_not_found() {
        let reg = registry();
        let ws = reg.create("/proj", "Proj", Provider::ClaudeCode).unwrap();
        reg.remove(&ws.id).await.unwrap();
        assert_eq!(
            reg.remove(&ws.id).await,
            Err(SupervisorError::NotFound(ws.id.clone()))
        );
        assert!(reg.get(&ws.id).is_err());
    }

    #[tokio::test]
    async fn lifecycle_misuse_errors() {
        let reg = registry();
        let ws = reg.create("/proj", "Proj", Provider::ClaudeCode).unwrap();
        assert_eq!(
            reg.send_input(&ws.id, "hi").await,
            Err(SupervisorError::NoActiveSession(ws.id.clone()))
        );
        assert_eq!(
            reg.stop_session(&ws.id).await,
            Err(SupervisorError::NoActiveSession(ws.id.clone()))
        );
        assert_eq!(
            reg.send_input("ws_missing", "hi").await,
            Err(SupervisorError::NotFound("ws_missing".into()))
        );
    }

    #[tokio::test]
    async fn spawn_failure_sets_error_and_notifies() {
        let reg = registry();
        let dir = tempfile::tempdir().unwrap();
        let provider = Provider::custom("ghost", "/definitely/not/a/tool", vec![]).unwrap();
        let ws = reg.create(dir.path(), "Ghost", provider).unwrap();
        let mut rx = reg.subscribe();

        let err = reg.start_session(&ws.id, vec![]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert_eq!(reg.get(&ws.id).unwrap().status, WorkspaceStatus::Error);
        assert!(!reg.has_active_session(&ws.id));
        assert_eq!(reg.session_state(&ws.id).unwrap(), SessionState::Errored);

        let mut saw_notice = false;
        let mut saw_update = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SupervisorEvent::TerminalOutput { is_error, text, .. } => {
                    saw_notice |= is_error && text.contains("not/a/tool");
                }
                SupervisorEvent::WorkspaceUpdated { workspace } => {
                    saw_update |= workspace.status == WorkspaceStatus::Error;
                }
                _ => {}
            }
        }
        assert!(saw_notice && saw_update);
    }

    #[tokio::test]
    async fn late_output_for_removed_workspace_is_discarded() {
        let reg = registry();
        let ws = reg.create("/proj", "Proj", Provider::ClaudeCode).unwrap();
        reg.remove(&ws.id).await.unwrap();
        let mut rx = reg.subscribe();
        reg.deliver_output(&ws.id, "late".into(), false);
        reg.handle_exit(
            &ws.id,
            1,
            ExitOutcome::Exited {
                code: Some(0),
                signal: None,
            },
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_exit_is_ignored() {
        let reg = registry();
        let ws = reg.create("/proj", "Proj", Provider::ClaudeCode).unwrap();
        reg.handle_exit(
            &ws.id,
            7,
            ExitOutcome::Exited {
                code: Some(1),
                signal: None,
            },
        );
        assert_eq!(reg.get(&ws.id).unwrap().status, WorkspaceStatus::Idle);
    }

    #[tokio::test]
    async fn refresh_vcs_outside_repo_clears_metadata() {
        let reg = registry();
        let dir = tempfile::tempdir().unwrap();
        let ws = reg.create(dir.path(), "Plain", Provider::ClaudeCode).unwrap();
        reg.set_git_branch(&ws.id, Some("stale".into())).unwrap();
        let ws = reg.refresh_vcs(&ws.id, &GitReader::new()).await.unwrap();
        assert_eq!(ws.git_branch, None);
        assert_eq!(ws.file_changes, Some(vec![]));
    }
}
