use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::health::wait_healthy;
use super::phase::TrialPhase;
use super::traffic::TrafficDriver;
use crate::capture::{ArtifactName, CaptureManager};
use crate::config::{LabConfig, ProxyDefinition};
use crate::error::{LabError, Result};
use crate::extraction::SignatureExtractor;
use crate::results::{TestResult, TrialStatus};
use crate::runtime::{ContainerRuntime, StopOutcome};

/// Knobs of a trial that do not depend on the proxy
#[derive(Debug, Clone)]
pub struct TrialSettings {
    pub interface: String,
    /// Capture targets used when the proxy does not name its own
    pub capture_targets: Vec<String>,
    pub urls: Vec<String>,
    pub health_timeout: Duration,
    pub health_interval: Duration,
    pub attempt_timeout: Duration,
    pub capture_warmup: Duration,
    pub traffic_drain: Duration,
}

impl TrialSettings {
    pub fn from_config(config: &LabConfig) -> Self {
        Self {
            interface: config.capture.interface.clone(),
            capture_targets: config.capture.targets.clone(),
            urls: config.traffic.urls.clone(),
            health_timeout: config.timeout.health(),
            health_interval: config.timeout.health_interval(),
            attempt_timeout: config.timeout.request(),
            capture_warmup: config.timeout.capture_warmup(),
            traffic_drain: config.timeout.traffic_drain(),
        }
    }
}

/// Why a trial stopped early
struct Abort {
    phase: TrialPhase,
    status: TrialStatus,
    reason: String,
}

impl Abort {
    fn failed(phase: TrialPhase, reason: impl ToString) -> Self {
        Self { phase, status: TrialStatus::Failed, reason: reason.to_string() }
    }

    fn error(phase: TrialPhase, reason: impl ToString) -> Self {
        Self { phase, status: TrialStatus::Error, reason: reason.to_string() }
    }
}

/// Drives one proxy version through build, start, capture, traffic and extraction
pub struct ProxyController {
    runtime: Arc<dyn ContainerRuntime>,
    capture: CaptureManager,
    traffic: Arc<dyn TrafficDriver>,
    extractor: Option<SignatureExtractor>,
    settings: TrialSettings,
}

impl ProxyController {
    /// `extractor` is `None` when no fingerprint tool could be resolved; trials then
    /// still run but end in `error` at the extraction step
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        capture: CaptureManager,
        traffic: Arc<dyn TrafficDriver>,
        extractor: Option<SignatureExtractor>,
        settings: TrialSettings,
    ) -> Self {
        Self { runtime, capture, traffic, extractor, settings }
    }

    /// Materialize `version` into the proxy's image
    pub async fn build(&self, proxy: &ProxyDefinition, version: &str) -> Result<()> {
        let binding = proxy.bind_version(version);
        info!(proxy = %proxy.id, version, "building proxy image");
        self.runtime.build(proxy.service(), &binding).await
    }

    pub async fn health_check(&self, proxy: &ProxyDefinition, limit: Duration) -> Result<()> {
        wait_healthy(
            self.runtime.as_ref(),
            proxy,
            limit,
            self.settings.health_interval,
            self.settings.attempt_timeout,
        )
        .await
    }

    /// Run one trial; the proxy container is stopped on every path
    pub async fn run_trial(&self, proxy: &ProxyDefinition, version: &str) -> TestResult {
        let mut result = TestResult::new(&proxy.id, version);
        info!(proxy = %proxy.id, version, "trial started");

        if let Err(abort) = self.exercise(proxy, version, &mut result).await {
            warn!(
                proxy = %proxy.id,
                version,
                phase = %abort.phase,
                reason = %abort.reason,
                "trial aborted"
            );
            result.status = abort.status;
            result.errors.push(abort.phase.annotate(&abort.reason));
        }

        match self.runtime.stop(proxy.service()).await {
            StopOutcome::Stopped => debug!(proxy = %proxy.id, "proxy stopped"),
            StopOutcome::NotRunning => debug!(proxy = %proxy.id, "proxy was not running"),
            StopOutcome::Failed(reason) => {
                warn!(proxy = %proxy.id, %reason, "failed to stop proxy");
                result.errors.push(TrialPhase::Stopping.annotate(reason));
            }
        }

        info!(
            proxy = %proxy.id,
            version,
            status = %result.status,
            signatures = result.ja4_signatures.len(),
            errors = result.errors.len(),
            "trial finished"
        );
        result
    }

    async fn exercise(
        &self,
        proxy: &ProxyDefinition,
        version: &str,
        result: &mut TestResult,
    ) -> std::result::Result<(), Abort> {
        self.build(proxy, version)
            .await
            .map_err(|e| Abort::failed(TrialPhase::Building, e))?;

        let binding = proxy.bind_version(version);
        self.runtime
            .start(proxy.service(), &binding)
            .await
            .map_err(|e| Abort::error(TrialPhase::Starting, e))?;

        self.health_check(proxy, self.settings.health_timeout)
            .await
            .map_err(|e| Abort::failed(TrialPhase::HealthChecking, e))?;

        let targets = proxy.capture_targets(&self.settings.capture_targets);
        let name = ArtifactName::Explicit(format!(
            "{}_{}_{}",
            proxy.id,
            version,
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let started = self
            .capture
            .start(&targets, &self.settings.interface, &name)
            .await
            .map_err(|e| Abort::error(TrialPhase::Capturing, e))?;
        result
            .errors
            .extend(started.failed.iter().map(|f| TrialPhase::Capturing.annotate(f)));

        tokio::time::sleep(self.settings.capture_warmup).await;

        let outcomes = self.traffic.drive(proxy.port, &self.settings.urls).await;
        let mut delivered = 0usize;
        for outcome in &outcomes {
            match &outcome.error {
                None => delivered += 1,
                Some(e) => result
                    .errors
                    .push(TrialPhase::ServingTraffic.annotate(format!("{}: {e}", outcome.url))),
            }
        }

        tokio::time::sleep(self.settings.traffic_drain).await;
        let collected = self.capture.stop(&started.session.targets).await;

        if !outcomes.is_empty() && delivered == 0 {
            return Err(Abort::failed(
                TrialPhase::ServingTraffic,
                format!("all {} test requests failed", outcomes.len()),
            ));
        }

        let collected = collected.map_err(|e| Abort::error(TrialPhase::Capturing, e))?;
        result
            .errors
            .extend(collected.failed.iter().map(|f| TrialPhase::Capturing.annotate(f)));

        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| Abort::error(TrialPhase::Extracting, LabError::ToolNotFound))?;
        let report = extractor.extract(&collected.artifacts).await;
        result.errors.extend(report.failures.iter().map(|f| {
            TrialPhase::Extracting.annotate(format!("{}: {}", f.artifact.display(), f.reason))
        }));
        if report.records.is_empty() {
            warn!(proxy = %proxy.id, version, "no JA4 signatures extracted");
        }
        result.ja4_signatures = report.records;

        Ok(())
    }
}
