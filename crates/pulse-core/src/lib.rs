pub mod error;
pub mod event;
pub mod provider;
pub mod types;

pub use error::SupervisorError;
pub use event::SupervisorEvent;
pub use provider::{BinaryOverrides, CustomTool, LaunchSpec, LaunchStrategy, Provider};
pub use types::*;
