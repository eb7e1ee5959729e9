//! Container runtime seam.
//!
//! Everything the pipeline asks of the container runtime goes through
//! [`ContainerRuntime`]. [`DockerCompose`] shells out to the Docker CLI; tests
//! substitute a scripted implementation.

pub mod command;
pub mod docker;

use std::path::Path;

use async_trait::async_trait;

pub use command::{run_command, CommandOutput};
pub use docker::DockerCompose;

use crate::config::VersionBinding;
use crate::error::Result;

/// Result of asking a service or process to stop
///
/// Stopping something that is already down is an expected no-op, not a failure,
/// so callers can tell an idempotent stop apart from a real problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
    Failed(String),
}

impl StopOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopOutcome::Failed(_))
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build (or pull) the image for `service` pinned by `binding`
    async fn build(&self, service: &str, binding: &VersionBinding) -> Result<()>;

    /// Start `service` detached
    async fn start(&self, service: &str, binding: &VersionBinding) -> Result<()>;

    /// Stop `service`
    async fn stop(&self, service: &str) -> StopOutcome;

    /// Whether the container named `target` is up
    async fn is_running(&self, target: &str) -> Result<bool>;

    /// Run `argv` inside `target`; with `detach` the call returns once the process is launched
    async fn exec(&self, target: &str, argv: &[String], detach: bool) -> Result<CommandOutput>;

    /// Copy `remote` out of `target` into the host path `local`
    async fn copy_from(&self, target: &str, remote: &str, local: &Path) -> Result<()>;
}
