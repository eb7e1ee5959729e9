use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::session::{ArtifactName, CaptureSession, CaptureState, SessionFile};
use crate::config::CaptureConfig;
use crate::error::{LabError, Result};
use crate::runtime::{ContainerRuntime, StopOutcome};

/// Why a single target did not take part in a start or stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub reason: String,
}

impl std::fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct StartReport {
    pub session: CaptureSession,
    /// Targets that were reachable but on which tcpdump did not start
    pub failed: Vec<TargetFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectReport {
    /// Artifact name of the collected session, `None` when nothing was recorded
    pub name: Option<String>,
    /// Non-empty capture files now on the host
    pub artifacts: Vec<PathBuf>,
    pub failed: Vec<TargetFailure>,
    /// Nothing to stop: the recorded session was already collected, or none exists
    pub already_collected: bool,
}

impl CollectReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Starts and stops tcpdump on a set of containers
///
/// Per-target work is fanned out concurrently and joined before returning.
/// The current session is persisted in `<captures_dir>/.current_capture`.
pub struct CaptureManager {
    runtime: Arc<dyn ContainerRuntime>,
    captures_dir: PathBuf,
    remote_dir: String,
    port: u16,
    install_command: Option<Vec<String>>,
    settle: Duration,
    session_file: SessionFile,
}

impl CaptureManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        captures_dir: impl Into<PathBuf>,
        capture: &CaptureConfig,
        settle: Duration,
    ) -> Self {
        let captures_dir = captures_dir.into();
        Self {
            runtime,
            session_file: SessionFile::in_dir(&captures_dir),
            captures_dir,
            remote_dir: capture.remote_dir.trim_end_matches('/').to_string(),
            port: capture.port,
            install_command: capture.install_command.clone(),
            settle,
        }
    }

    pub fn captures_dir(&self) -> &Path {
        &self.captures_dir
    }

    /// The session recorded on disk, if any
    pub fn current_session(&self) -> Option<CaptureSession> {
        self.session_file.load()
    }

    /// State of the recorded session; [`CaptureState::Idle`] when none was ever started
    pub fn state(&self) -> CaptureState {
        self.current_session().map_or(CaptureState::Idle, |s| s.state)
    }

    /// Host path of `name` captured on `target`
    pub fn local_artifact(&self, target: &str, name: &str) -> PathBuf {
        self.captures_dir.join(target).join(name)
    }

    fn remote_artifact(&self, name: &str) -> String {
        format!("{}/{name}", self.remote_dir)
    }

    /// Start capturing TLS traffic on every target
    ///
    /// Fails fast when any target is unreachable. Any tcpdump left over from an
    /// earlier session is interrupted first. Targets that fail to start are
    /// reported in [`StartReport::failed`]; the call fails only when none started.
    pub async fn start(
        &self,
        targets: &[String],
        interface: &str,
        name: &ArtifactName,
    ) -> Result<StartReport> {
        if targets.is_empty() {
            return Err(LabError::CaptureUnavailable("no capture targets".into()));
        }
        let name = name.resolve(Utc::now())?;

        let liveness = join_all(targets.iter().map(|t| self.runtime.is_running(t))).await;
        let unreachable: Vec<String> = targets
            .iter()
            .zip(liveness)
            .filter_map(|(target, alive)| match alive {
                Ok(true) => None,
                Ok(false) => Some(format!("{target} (not running)")),
                Err(e) => Some(format!("{target} ({e})")),
            })
            .collect();
        if !unreachable.is_empty() {
            return Err(LabError::CaptureUnavailable(format!(
                "unreachable targets: {}",
                unreachable.join(", ")
            )));
        }

        std::fs::create_dir_all(&self.captures_dir)?;
        info!(artifact = %name, interface, targets = ?targets, "starting packet capture");

        let outcomes =
            join_all(targets.iter().map(|t| self.start_on(t, interface, &name))).await;

        let mut started = Vec::new();
        let mut failed = Vec::new();
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(()) => started.push(target.clone()),
                Err(e) => {
                    warn!(container = %target, error = %e, "capture did not start");
                    failed.push(TargetFailure { target: target.clone(), reason: e.to_string() });
                }
            }
        }

        if started.is_empty() {
            let reasons: Vec<String> = failed.iter().map(ToString::to_string).collect();
            return Err(LabError::CaptureUnavailable(format!(
                "capture failed on every target: {}",
                reasons.join("; ")
            )));
        }

        let session = CaptureSession {
            name,
            interface: interface.to_string(),
            targets: started,
            state: CaptureState::Running,
            started_at: Utc::now(),
        };
        self.session_file.save(&session)?;
        info!(
            artifact = %session.name,
            started = ?session.targets,
            failed = failed.len(),
            "capture running"
        );

        Ok(StartReport { session, failed })
    }

    async fn start_on(&self, target: &str, interface: &str, name: &str) -> Result<()> {
        self.ensure_capture_tool(target).await?;

        match self.interrupt_capture(target).await {
            StopOutcome::Stopped => debug!(container = target, "stopped stale tcpdump"),
            StopOutcome::NotRunning => {}
            StopOutcome::Failed(reason) => {
                warn!(container = target, %reason, "could not stop stale tcpdump")
            }
        }

        let argv: Vec<String> = vec![
            "tcpdump".into(),
            "-i".into(),
            interface.into(),
            "-w".into(),
            self.remote_artifact(name),
            "tcp".into(),
            "and".into(),
            "port".into(),
            self.port.to_string(),
        ];
        let out = self.runtime.exec(target, &argv, true).await?;
        if !out.success() {
            return Err(LabError::ToolInvocationFailed {
                command: format!("{target}: {}", argv.join(" ")),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        debug!(container = target, remote = %self.remote_artifact(name), "tcpdump started");
        Ok(())
    }

    /// Make sure tcpdump exists in `target`, installing it when an install command is configured
    pub async fn ensure_capture_tool(&self, target: &str) -> Result<()> {
        let argv = ["which".to_string(), "tcpdump".to_string()];
        let which = self.runtime.exec(target, &argv, false).await?;
        if which.success() {
            return Ok(());
        }

        let Some(install) = &self.install_command else {
            return Err(LabError::CaptureUnavailable(format!("tcpdump not found in {target}")));
        };

        info!(container = target, command = %install.join(" "), "installing tcpdump");
        let out = self.runtime.exec(target, install, false).await?;
        if !out.success() {
            return Err(LabError::CaptureUnavailable(format!(
                "failed to install tcpdump in {target}: {}",
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Send SIGINT to tcpdump in `target`
    async fn interrupt_capture(&self, target: &str) -> StopOutcome {
        let argv: Vec<String> = vec!["pkill".into(), "-INT".into(), "tcpdump".into()];
        match self.runtime.exec(target, &argv, false).await {
            Ok(out) if out.success() => StopOutcome::Stopped,
            // pkill exits 1 when no process matched
            Ok(out) if out.code == Some(1) => StopOutcome::NotRunning,
            Ok(out) => StopOutcome::Failed(out.stderr.trim().to_string()),
            Err(e) => StopOutcome::Failed(e.to_string()),
        }
    }

    /// Stop capturing and copy the artifacts to the host
    ///
    /// `targets` defaults to the targets of the recorded session when empty.
    /// Calling this with no active session is a no-op that leaves previously
    /// collected artifacts untouched. Fails when no target yields a non-empty artifact.
    pub async fn stop(&self, targets: &[String]) -> Result<CollectReport> {
        let Some(mut session) = self.session_file.load() else {
            info!("no capture session recorded, nothing to stop");
            return Ok(CollectReport { already_collected: true, ..CollectReport::default() });
        };

        if !session.is_active() {
            info!(artifact = %session.name, state = ?session.state, "capture already collected");
            return Ok(CollectReport {
                name: Some(session.name),
                already_collected: true,
                ..CollectReport::default()
            });
        }

        let targets: Vec<String> =
            if targets.is_empty() { session.targets.clone() } else { targets.to_vec() };
        if targets.is_empty() {
            return Err(LabError::CaptureUnavailable(format!(
                "no targets known for capture {}",
                session.name
            )));
        }

        info!(artifact = %session.name, targets = ?targets, "stopping packet capture");
        let outcomes = join_all(targets.iter().map(|t| self.interrupt_capture(t))).await;
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                StopOutcome::Stopped => debug!(container = %target, "tcpdump interrupted"),
                StopOutcome::NotRunning => {
                    warn!(container = %target, "tcpdump was not running")
                }
                StopOutcome::Failed(reason) => {
                    warn!(container = %target, %reason, "failed to interrupt tcpdump")
                }
            }
        }

        session.state = CaptureState::Stopped;
        session.targets = targets.clone();
        self.session_file.save(&session)?;

        // Give tcpdump time to flush buffered packets
        tokio::time::sleep(self.settle).await;

        let retrievals = join_all(targets.iter().map(|t| self.retrieve(t, &session.name))).await;

        let mut report = CollectReport { name: Some(session.name.clone()), ..Default::default() };
        for (target, retrieval) in targets.iter().zip(retrievals) {
            match retrieval {
                Ok(path) => report.artifacts.push(path),
                Err(e) => {
                    warn!(container = %target, error = %e, "artifact retrieval failed");
                    report
                        .failed
                        .push(TargetFailure { target: target.clone(), reason: e.to_string() });
                }
            }
        }

        if report.artifacts.is_empty() {
            let reasons: Vec<String> = report.failed.iter().map(ToString::to_string).collect();
            return Err(LabError::CaptureUnavailable(format!(
                "no artifact retrieved for {}: {}",
                session.name,
                reasons.join("; ")
            )));
        }

        session.state = CaptureState::Collected;
        self.session_file.save(&session)?;
        info!(artifact = %session.name, collected = report.artifacts.len(), "capture collected");

        Ok(report)
    }

    async fn retrieve(&self, target: &str, name: &str) -> Result<PathBuf> {
        let local = self.local_artifact(target, name);
        self.runtime.copy_from(target, &self.remote_artifact(name), &local).await?;

        let size = tokio::fs::metadata(&local)
            .await
            .map_err(|e| {
                LabError::CaptureUnavailable(format!("{} missing after copy: {e}", local.display()))
            })?
            .len();
        if size == 0 {
            return Err(LabError::CaptureUnavailable(format!("{} is empty", local.display())));
        }

        info!(container = target, path = %local.display(), bytes = size, "artifact retrieved");
        Ok(local)
    }
}
