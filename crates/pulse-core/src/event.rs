use crate::types::Workspace;
use serde::Serialize;

/// What observers see. Serialized as tagged JSON (`"type": "terminal_output"`, ...).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// A workspace's status or attached data changed. Carries a full snapshot.
    WorkspaceUpdated { workspace: Workspace },
    WorkspaceRemoved { workspace_id: String },
    /// A chunk of session output (ANSI-stripped) or a status notice.
    TerminalOutput {
        workspace_id: String,
        text: String,
        is_error: bool,
    },
    SessionLaunched {
        workspace_id: String,
        pid: Option<u32>,
    },
}

impl SupervisorEvent {
    pub fn workspace_id(&self) -> &str {
        match self {
            SupervisorEvent::WorkspaceUpdated { workspace } => &workspace.id,
            SupervisorEvent::WorkspaceRemoved { workspace_id }
            | SupervisorEvent::TerminalOutput { workspace_id, .. }
            | SupervisorEvent::SessionLaunched { workspace_id, .. } => workspace_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            SupervisorEvent::WorkspaceUpdated { .. } => "workspace_updated",
            SupervisorEvent::WorkspaceRemoved { .. } => "workspace_removed",
            SupervisorEvent::TerminalOutput { .. } => "terminal_output",
            SupervisorEvent::SessionLaunched { .. } => "session_launched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_output_serializes_tagged() {
        let ev = SupervisorEvent::TerminalOutput {
            workspace_id: "ws_1".into(),
            text: "hello".into(),
            is_error: true,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "terminal_output");
        assert_eq!(json["workspace_id"], "ws_1");
        assert_eq!(json["is_error"], true);
        assert_eq!(ev.workspace_id(), "ws_1");
    }
}
