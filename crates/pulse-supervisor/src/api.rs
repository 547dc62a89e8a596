//! Request/response surface for a frontend. Every call resolves to a
//! serializable `{ success, ... }` shape; no error escapes as a `Result`.

use crate::availability::{self, Availability};
use crate::config::SupervisorConfig;
use crate::exec::{CommandExecutor, HostShell};
use crate::registry::WorkspaceRegistry;
use crate::router::{CommandOutcome, CommandRouter};
use crate::vcs::GitReader;
use pulse_core::{FileChange, Provider, SupervisorError, SupervisorEvent, Workspace};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

// ── Response shapes ──

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChangesResponse {
    pub success: bool,
    pub changes: Vec<FileChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<(), SupervisorError>> for AckResponse {
    fn from(result: Result<(), SupervisorError>) -> Self {
        match result {
            Ok(()) => AckResponse {
                success: true,
                error: None,
            },
            Err(e) => AckResponse {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

impl From<Result<Workspace, SupervisorError>> for WorkspaceResponse {
    fn from(result: Result<Workspace, SupervisorError>) -> Self {
        match result {
            Ok(workspace) => WorkspaceResponse {
                success: true,
                workspace: Some(workspace),
                error: None,
            },
            Err(e) => WorkspaceResponse {
                success: false,
                workspace: None,
                error: Some(e.to_string()),
            },
        }
    }
}

// ── Api ──

/// The supervisor as a frontend sees it.
#[derive(Clone)]
pub struct PulseApi {
    registry: WorkspaceRegistry,
    router: CommandRouter,
    git: GitReader,
}

impl PulseApi {
    /// Build with the host shell as command executor.
    pub fn new(config: SupervisorConfig) -> Self {
        let shell = HostShell::from_config(&config);
        Self::with_executor(config, Arc::new(shell))
    }

    pub fn with_executor(config: SupervisorConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let registry = WorkspaceRegistry::new(config);
        let router = CommandRouter::new(registry.clone(), executor);
        Self {
            registry,
            router,
            git: GitReader::new(),
        }
    }

    pub fn with_git(mut self, git: GitReader) -> Self {
        self.git = git;
        self
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.registry.subscribe()
    }

    pub fn list_workspaces(&self) -> Vec<Workspace> {
        self.registry.list()
    }

    /// `provider` is a trigger name (`claude`, `gemini`, `codex`) or a
    /// custom `name=program args` definition.
    pub async fn create_workspace(&self, path: &Path, name: &str, provider: &str) -> WorkspaceResponse {
        let created = provider
            .parse::<Provider>()
            .and_then(|provider| self.registry.create(path, name, provider));
        let workspace = match created {
            Ok(ws) => ws,
            Err(e) => return WorkspaceResponse::from(Err(e)),
        };
        let branch = self.git.current_branch(&workspace.path).await;
        if branch.is_none() {
            return WorkspaceResponse::from(Ok(workspace));
        }
        // Removed concurrently: still report the create.
        let attached = self.registry.set_git_branch(&workspace.id, branch);
        WorkspaceResponse::from(Ok(attached.unwrap_or(workspace)))
    }

    pub async fn remove_workspace(&self, id: &str) -> AckResponse {
        self.registry.remove(id).await.into()
    }

    /// Route a line of user input. Session input and session starts report
    /// success once accepted; their output arrives as events.
    pub async fn execute_command(&self, workspace_id: &str, text: &str) -> CommandResponse {
        match self.router.dispatch(workspace_id, text).await {
            Ok(CommandOutcome::Forwarded) => CommandResponse {
                success: true,
                output: None,
                error: None,
            },
            Ok(CommandOutcome::SessionStarted { workspace }) => CommandResponse {
                success: true,
                output: Some(format!(
                    "Started {} in {}",
                    workspace.provider.display_name(),
                    workspace.path.display()
                )),
                error: None,
            },
            Ok(CommandOutcome::Shell(out)) if out.success() => CommandResponse {
                success: true,
                output: Some(out.stdout),
                error: None,
            },
            Ok(CommandOutcome::Shell(out)) => {
                let error = if !out.stderr.trim().is_empty() {
                    out.stderr
                } else {
                    match out.exit_code {
                        Some(code) => format!("command exited with code {code}"),
                        None => "command terminated abnormally".to_string(),
                    }
                };
                CommandResponse {
                    success: false,
                    output: Some(out.stdout),
                    error: Some(error),
                }
            }
            Err(e) => CommandResponse {
                success: false,
                output: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn stop_session(&self, workspace_id: &str) -> AckResponse {
        self.registry.stop_session(workspace_id).await.into()
    }

    pub async fn get_git_branch(&self, path: &Path) -> BranchResponse {
        if !path.is_dir() {
            return BranchResponse {
                success: false,
                branch: None,
            };
        }
        BranchResponse {
            success: true,
            branch: self.git.current_branch(path).await,
        }
    }

    pub async fn get_file_changes(&self, path: &Path) -> FileChangesResponse {
        if !path.is_dir() {
            return FileChangesResponse {
                success: false,
                changes: Vec::new(),
                error: Some(format!("not a directory: {}", path.display())),
            };
        }
        FileChangesResponse {
            success: true,
            changes: self.git.file_changes(path).await,
            error: None,
        }
    }

    pub async fn check_tool_availability(&self, provider: &str) -> Availability {
        match provider.parse::<Provider>() {
            Ok(provider) => {
                availability::check_tool_availability(&provider, &self.registry.config().binaries)
                    .await
            }
            Err(e) => Availability {
                available: false,
                message: format!("{e}. Known tools: claude, gemini, codex"),
                path: None,
                version: None,
            },
        }
    }

    /// Re-read git state for a workspace and publish it.
    pub async fn refresh_workspace(&self, id: &str) -> WorkspaceResponse {
        self.registry.refresh_vcs(id, &self.git).await.into()
    }

    /// Raw retained output of the current or last session.
    pub fn session_output(&self, id: &str) -> CommandResponse {
        match self.registry.output(id) {
            Ok(output) => CommandResponse {
                success: true,
                output: Some(output),
                error: None,
            },
            Err(e) => CommandResponse {
                success: false,
                output: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn shutdown(&self) {
        self.registry.shutdown();
    }
}
