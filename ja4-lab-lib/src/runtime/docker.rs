use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::command::{check, render, run_command, CommandOutput};
use super::{ContainerRuntime, StopOutcome};
use crate::config::{TimeoutConfig, VersionBinding};
use crate::error::Result;

const DOCKER: &str = "docker";

/// [`ContainerRuntime`] backed by the Docker CLI and a compose project
///
/// Services are addressed through `docker compose`; capture targets are
/// addressed by container name (compose files set `container_name`).
#[derive(Debug, Clone)]
pub struct DockerCompose {
    project_root: PathBuf,
    command_timeout: Duration,
    build_timeout: Duration,
}

impl DockerCompose {
    pub fn new(project_root: impl Into<PathBuf>, timeouts: &TimeoutConfig) -> Self {
        Self {
            project_root: project_root.into(),
            command_timeout: timeouts.command(),
            build_timeout: timeouts.build(),
        }
    }

    async fn docker(
        &self,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        run_command(DOCKER, args, Some(&self.project_root), env, timeout).await
    }

    async fn docker_checked(
        &self,
        args: Vec<String>,
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let output = self.docker(&args, env, timeout).await?;
        check(render(DOCKER, &args), output)
    }
}

fn compose(args: &[&str]) -> Vec<String> {
    std::iter::once("compose").chain(args.iter().copied()).map(String::from).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn build(&self, service: &str, binding: &VersionBinding) -> Result<()> {
        let args = if binding.build_args.is_empty() {
            compose(&["pull", service])
        } else {
            let mut args = compose(&["build", "--no-cache"]);
            for (key, value) in &binding.build_args {
                args.push("--build-arg".to_string());
                args.push(format!("{key}={value}"));
            }
            args.push(service.to_string());
            args
        };
        info!(service, command = %render(DOCKER, &args), "building service");
        self.docker_checked(args, &binding.env, self.build_timeout).await?;
        Ok(())
    }

    async fn start(&self, service: &str, binding: &VersionBinding) -> Result<()> {
        let args = compose(&["up", "-d", service]);
        self.docker_checked(args, &binding.env, self.command_timeout).await?;
        Ok(())
    }

    async fn stop(&self, service: &str) -> StopOutcome {
        let args = compose(&["stop", service]);
        match self.docker(&args, &[], self.command_timeout).await {
            Ok(out) if out.success() => StopOutcome::Stopped,
            Ok(out) => {
                let stderr = out.stderr.to_lowercase();
                if stderr.contains("no such service") || stderr.contains("not running") {
                    StopOutcome::NotRunning
                } else {
                    StopOutcome::Failed(out.stderr.trim().to_string())
                }
            }
            Err(e) => StopOutcome::Failed(e.to_string()),
        }
    }

    async fn is_running(&self, target: &str) -> Result<bool> {
        let args: Vec<String> = ["ps", "-q", "--filter"]
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(format!("name=^{target}$")))
            .collect();
        let out = self.docker_checked(args, &[], self.command_timeout).await?;
        let running = !out.stdout.trim().is_empty();
        debug!(container = target, running, "container liveness");
        Ok(running)
    }

    async fn exec(&self, target: &str, argv: &[String], detach: bool) -> Result<CommandOutput> {
        let mut args = vec!["exec".to_string()];
        if detach {
            args.push("-d".to_string());
        }
        args.push(target.to_string());
        args.extend(argv.iter().cloned());
        self.docker(&args, &[], self.command_timeout).await
    }

    async fn copy_from(&self, target: &str, remote: &str, local: &Path) -> Result<()> {
        if let Some(dir) = local.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let args = vec![
            "cp".to_string(),
            format!("{target}:{remote}"),
            local.display().to_string(),
        ];
        if let Err(e) = self.docker_checked(args, &[], self.command_timeout).await {
            warn!(container = target, remote, error = %e, "docker cp failed");
            return Err(e);
        }
        Ok(())
    }
}
