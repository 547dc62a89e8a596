use crate::exec::{CommandExecutor, ShellOutput};
use crate::registry::WorkspaceRegistry;
use pulse_core::{SupervisorError, Workspace};
use std::sync::Arc;

/// Where one line of user input goes. Exactly one route per input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A session is running; the text is session input, verbatim.
    ForwardInput,
    /// The text is the provider's trigger; start a session with `args`.
    StartSession { args: Vec<String> },
    /// Anything else runs as a one-shot shell command in the workspace.
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Forwarded,
    SessionStarted { workspace: Workspace },
    Shell(ShellOutput),
}

/// Classifies user input for a workspace and dispatches it.
#[derive(Clone)]
pub struct CommandRouter {
    registry: WorkspaceRegistry,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandRouter {
    pub fn new(registry: WorkspaceRegistry, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    /// Priority order: running session, then trigger, then shell.
    pub fn classify(&self, workspace: &Workspace, input: &str) -> Route {
        if self.registry.has_active_session(&workspace.id) {
            return Route::ForwardInput;
        }
        match workspace.provider.match_trigger(input) {
            Some(args) => Route::StartSession { args },
            None => Route::Shell,
        }
    }

    pub async fn dispatch(
        &self,
        workspace_id: &str,
        input: &str,
    ) -> Result<CommandOutcome, SupervisorError> {
        let workspace = self.registry.get(workspace_id)?;
        let route = self.classify(&workspace, input);
        tracing::debug!(workspace_id, ?route, "dispatch");

        match route {
            Route::ForwardInput => {
                self.registry.send_input(workspace_id, input).await?;
                Ok(CommandOutcome::Forwarded)
            }
            Route::StartSession { args } => {
                match self.registry.start_session(workspace_id, args).await {
                    Ok(workspace) => Ok(CommandOutcome::SessionStarted { workspace }),
                    // Another caller started one between classify and start.
                    Err(SupervisorError::SessionAlreadyActive(_)) => {
                        self.registry.send_input(workspace_id, input).await?;
                        Ok(CommandOutcome::Forwarded)
                    }
                    Err(e) => Err(e),
                }
            }
            Route::Shell => {
                let command = input.trim();
                if command.is_empty() {
                    return Err(SupervisorError::Validation("empty command".into()));
                }
                self.registry.touch(workspace_id)?;
                let output = self.executor.run(command, &workspace.path).await?;
                Ok(CommandOutcome::Shell(output))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use pulse_core::Provider;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Records every shell invocation instead of running it.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, PathBuf)>>,
    }

    impl RecordingExecutor {
        fn calls(&self) -> Vec<(String, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run(&self, command: &str, cwd: &Path) -> Result<ShellOutput, SupervisorError> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), cwd.to_path_buf()));
            Ok(ShellOutput {
                exit_code: Some(0),
                stdout: "ran".into(),
                stderr: String::new(),
                timed_out: false,
            })
        }
    }

    fn setup() -> (CommandRouter, Arc<RecordingExecutor>, Workspace) {
        let registry = WorkspaceRegistry::new(SupervisorConfig::default());
        let ws = registry
            .create("/proj", "Proj", Provider::ClaudeCode)
            .unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let router = CommandRouter::new(registry, exec.clone());
        (router, exec, ws)
    }

    #[test]
    fn trigger_without_session_starts() {
        let (router, _, ws) = setup();
        assert_eq!(
            router.classify(&ws, "claude"),
            Route::StartSession { args: vec![] }
        );
        assert_eq!(
            router.classify(&ws, "  claude-code  "),
            Route::StartSession { args: vec![] }
        );
        assert_eq!(
            router.classify(&ws, "claude --resume abc"),
            Route::StartSession {
                args: vec!["--resume".into(), "abc".into()]
            }
        );
    }

    #[test]
    fn near_misses_go_to_shell() {
        let (router, _, ws) = setup();
        assert_eq!(router.classify(&ws, "claudex"), Route::Shell);
        assert_eq!(router.classify(&ws, "gemini"), Route::Shell);
        assert_eq!(router.classify(&ws, "ls -la"), Route::Shell);
    }

    #[tokio::test]
    async fn shell_runs_in_workspace_path() {
        let (router, exec, ws) = setup();
        let outcome = router.dispatch(&ws.id, "  git log -1 ").await.unwrap();
        assert!(matches!(outcome, CommandOutcome::Shell(ref out) if out.stdout == "ran"));
        assert_eq!(exec.calls(), vec![("git log -1".to_string(), PathBuf::from("/proj"))]);
        assert!(router.registry().get(&ws.id).unwrap().last_activity.is_some());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let (router, exec, ws) = setup();
        assert!(matches!(
            router.dispatch(&ws.id, "   ").await,
            Err(SupervisorError::Validation(_))
        ));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_workspace() {
        let (router, _, _) = setup();
        assert_eq!(
            router.dispatch("ws_nope", "ls").await,
            Err(SupervisorError::NotFound("ws_nope".into()))
        );
    }
}
