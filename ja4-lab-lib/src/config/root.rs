use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::capture::{CaptureConfig, ExtractionConfig, TrafficConfig};
use super::proxy::ProxyDefinition;
use super::telemetry::LoggingConfig;
use super::timeout::TimeoutConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct LabConfig {
    /// Directory holding the compose project; runtime commands run from here
    /// Default: "."
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Host directory receiving capture files
    /// Relative paths resolve against `project_root`
    /// Default: "captures"
    #[serde(default = "default_captures_dir")]
    pub captures_dir: PathBuf,
    /// Results store file
    /// Default: "captures/proxy_signatures.json"
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
    /// Manifest sidecar attached to every signature record
    /// Default: "captures/manifest.json"
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
    /// Output of a standalone extraction run
    /// Default: "captures/ja4_results.json"
    #[serde(default = "default_ja4_results_file")]
    pub ja4_results_file: PathBuf,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Packet capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Test traffic configuration
    #[serde(default)]
    pub traffic: TrafficConfig,
    /// Fingerprint tool configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Proxies under test, tested in declaration order
    #[serde(default)]
    pub proxies: Vec<ProxyDefinition>,
}

impl LabConfig {
    pub fn captures_dir(&self) -> PathBuf {
        self.resolve(&self.captures_dir)
    }

    pub fn results_file(&self) -> PathBuf {
        self.resolve(&self.results_file)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.resolve(&self.manifest_file)
    }

    pub fn ja4_results_file(&self) -> PathBuf {
        self.resolve(&self.ja4_results_file)
    }

    pub fn proxy(&self, id: &str) -> Option<&ProxyDefinition> {
        self.proxies.iter().find(|p| p.id == id)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_captures_dir() -> PathBuf {
    PathBuf::from("captures")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("captures/proxy_signatures.json")
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from("captures/manifest.json")
}

fn default_ja4_results_file() -> PathBuf {
    PathBuf::from("captures/ja4_results.json")
}
