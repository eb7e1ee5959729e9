use std::sync::Arc;

use tracing::{error, info, warn};

use super::controller::{ProxyController, TrialSettings};
use super::traffic::TrafficDriver;
use crate::capture::CaptureManager;
use crate::config::{LabConfig, ProxyDefinition};
use crate::error::{LabError, Result};
use crate::extraction::SignatureExtractor;
use crate::results::{ResultStore, TestResult, TrialStatus};
use crate::runtime::ContainerRuntime;

/// A proxy and the versions it declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyVersions {
    pub id: String,
    pub name: String,
    pub versions: Vec<String>,
}

/// Tally of a suite run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    pub signatures: usize,
}

impl SuiteSummary {
    fn record(&mut self, result: &TestResult) {
        self.total += 1;
        self.signatures += result.ja4_signatures.len();
        match result.status {
            TrialStatus::Success => self.succeeded += 1,
            TrialStatus::Failed => self.failed += 1,
            TrialStatus::Error => self.errored += 1,
        }
    }
}

/// Runs trials one at a time and persists each result as soon as it is known
pub struct SuiteRunner {
    proxies: Vec<ProxyDefinition>,
    controller: ProxyController,
    store: ResultStore,
}

impl SuiteRunner {
    pub fn new(proxies: Vec<ProxyDefinition>, controller: ProxyController, store: ResultStore) -> Self {
        Self { proxies, controller, store }
    }

    /// Wire a runner from configuration
    ///
    /// A missing fingerprint tool is not fatal here: trials still run and
    /// record the problem in their results.
    pub async fn from_config(
        config: &LabConfig,
        runtime: Arc<dyn ContainerRuntime>,
        traffic: Arc<dyn TrafficDriver>,
    ) -> Self {
        let extractor = match SignatureExtractor::discover(
            &config.extraction,
            config.manifest_file(),
            config.timeout.command(),
        )
        .await
        {
            Ok(extractor) => Some(extractor),
            Err(e) => {
                warn!(error = %e, "signature extraction unavailable");
                None
            }
        };

        let capture = CaptureManager::new(
            runtime.clone(),
            config.captures_dir(),
            &config.capture,
            config.timeout.settle(),
        );
        let controller = ProxyController::new(
            runtime,
            capture,
            traffic,
            extractor,
            TrialSettings::from_config(config),
        );
        let store = ResultStore::load(config.results_file());
        Self::new(config.proxies.clone(), controller, store)
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn list_versions(&self) -> Vec<ProxyVersions> {
        self.proxies
            .iter()
            .map(|p| ProxyVersions { id: p.id.clone(), name: p.name.clone(), versions: p.versions.clone() })
            .collect()
    }

    /// Every proxy at every declared version, in declaration order
    ///
    /// A failing trial is recorded and the suite moves on; only a failure to
    /// persist results stops it.
    pub async fn run_suite(&mut self) -> Result<SuiteSummary> {
        let mut summary = SuiteSummary::default();
        let plan: Vec<(usize, String)> = self
            .proxies
            .iter()
            .enumerate()
            .flat_map(|(i, p)| p.versions.iter().map(move |v| (i, v.clone())))
            .collect();
        info!(trials = plan.len(), "starting test suite");

        for (index, version) in plan {
            let proxy = &self.proxies[index];
            let result = self.controller.run_trial(proxy, &version).await;
            summary.record(&result);
            self.persist(result)?;
        }

        if summary.total > 0 && summary.signatures == 0 {
            warn!(trials = summary.total, "suite finished without a single JA4 signature");
        }
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            errored = summary.errored,
            signatures = summary.signatures,
            "test suite finished"
        );
        Ok(summary)
    }

    /// Run and persist one trial after checking the pair is declared
    pub async fn run_single(&mut self, proxy_id: &str, version: &str) -> Result<TestResult> {
        let proxy = self
            .proxies
            .iter()
            .find(|p| p.id == proxy_id)
            .ok_or_else(|| LabError::UnknownProxy(proxy_id.to_string()))?;
        if !proxy.has_version(version) {
            return Err(LabError::UnknownVersion {
                proxy: proxy_id.to_string(),
                version: version.to_string(),
            });
        }

        let result = self.controller.run_trial(proxy, version).await;
        self.persist(result.clone())?;
        Ok(result)
    }

    fn persist(&mut self, result: TestResult) -> Result<()> {
        let (proxy, version) = (result.proxy_id.clone(), result.version.clone());
        self.store.append(result).map_err(|e| {
            error!(%proxy, %version, error = %e, "failed to persist trial result");
            e
        })
    }
}
