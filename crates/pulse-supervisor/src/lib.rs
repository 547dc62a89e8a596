//! The workspace process supervisor.
//!
//! [`WorkspaceRegistry`] owns every workspace and at most one live session
//! process per workspace. [`CommandRouter`] decides what a line of user input
//! means, [`HostShell`] runs one-shot commands, [`GitReader`] reads branch and
//! working-tree status, and [`OutputBroadcaster`] fans events out to observers.
//! [`PulseApi`] is the request/response surface a frontend talks to.

pub mod api;
pub mod availability;
pub mod broadcast;
pub mod config;
pub mod exec;
pub mod output;
pub mod registry;
pub mod router;
pub mod session;
pub mod vcs;

pub use api::PulseApi;
pub use availability::{check_tool_availability, Availability};
pub use broadcast::OutputBroadcaster;
pub use config::SupervisorConfig;
pub use exec::{CommandExecutor, HostShell, ShellOutput};
pub use registry::WorkspaceRegistry;
pub use router::{CommandOutcome, CommandRouter, Route};
pub use session::SessionState;
pub use vcs::GitReader;

pub use pulse_core::{
    ChangeType, FileChange, Provider, StageState, SupervisorError, SupervisorEvent, Workspace,
    WorkspaceStatus,
};
