use thiserror::Error;

/// Every failure the supervisor can report. Each one is scoped to a single
/// workspace; none of them is fatal to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// Bad input to a create/configure call.
    #[error("{0}")]
    Validation(String),

    #[error("workspace not found: {0}")]
    NotFound(String),

    #[error("a session is already active for workspace {0}")]
    SessionAlreadyActive(String),

    #[error("no active session for workspace {0}")]
    NoActiveSession(String),

    /// The external process could not be launched (missing executable,
    /// missing helper interpreter, permission denied, ...).
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The external process terminated with a non-zero code or a signal.
    #[error("{}", describe_exit(*code, *signal))]
    ProcessExit {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl SupervisorError {
    pub fn spawn(program: impl Into<String>, reason: impl ToString) -> Self {
        SupervisorError::Spawn {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable kind, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::Validation(_) => "validation",
            SupervisorError::NotFound(_) => "not_found",
            SupervisorError::SessionAlreadyActive(_) => "session_already_active",
            SupervisorError::NoActiveSession(_) => "no_active_session",
            SupervisorError::Spawn { .. } => "spawn",
            SupervisorError::ProcessExit { .. } => "process_exit",
        }
    }
}

fn describe_exit(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("process exited with code {code}"),
        (None, Some(signal)) => format!("process terminated by signal {signal}"),
        (None, None) => "process terminated abnormally".to_string(),
    }
}
