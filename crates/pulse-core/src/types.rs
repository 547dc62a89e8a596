use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Workspace ──

/// Lifecycle status of a workspace, derived from its session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    /// No session, or the last one was stopped by the user.
    #[default]
    Idle,
    /// A session process is alive.
    Running,
    /// The last session failed to spawn or exited non-zero / by signal.
    Error,
    /// The last session exited with code 0.
    Completed,
}

impl WorkspaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceStatus::Idle => "idle",
            WorkspaceStatus::Running => "running",
            WorkspaceStatus::Error => "error",
            WorkspaceStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project folder bound to one provider. Snapshots of this record are what
/// observers receive; the registry owns the live copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub status: WorkspaceStatus,
    pub provider: Provider,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_changes: Option<Vec<FileChange>>,
}

impl Workspace {
    /// Fresh idle workspace with a newly allocated id. Inputs are assumed
    /// validated by the caller.
    pub fn new(path: PathBuf, name: String, provider: Provider) -> Self {
        Self {
            id: new_workspace_id(),
            name,
            path,
            status: WorkspaceStatus::Idle,
            provider,
            created_at: now_rfc3339(),
            last_activity: None,
            git_branch: None,
            file_changes: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(now_rfc3339());
    }
}

// ── File changes ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Staged,
    Unstaged,
}

/// One entry of the working-tree status. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub status: StageState,
}

// ── Helpers ──

/// Allocate a workspace id. ULIDs are never reused within or across runs.
pub fn new_workspace_id() -> String {
    format!("ws_{}", ulid::Ulid::new().to_string().to_lowercase())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
