use serde::Deserialize;
use std::path::PathBuf;

/// Packet capture configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Interface tcpdump listens on inside each target
    /// Default: "any"
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Directory inside the targets where tcpdump writes capture files
    /// Default: "/captures"
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
    /// TLS port the capture filter is scoped to
    /// Default: 443
    #[serde(default = "default_port")]
    pub port: u16,
    /// Containers to capture on when neither the command line nor the proxy names any
    /// Default: empty (the proxy's own service)
    #[serde(default)]
    pub targets: Vec<String>,
    /// Command used to install tcpdump inside a target that lacks it (optional)
    /// Example: ["apk", "add", "tcpdump"]
    #[serde(default)]
    pub install_command: Option<Vec<String>>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            remote_dir: default_remote_dir(),
            port: default_port(),
            targets: Vec::new(),
            install_command: None,
        }
    }
}

/// Test traffic configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrafficConfig {
    /// URLs requested through the proxy during every trial
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,
    /// Accept the interception CA without installing it in the client trust store
    /// Default: true
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self { urls: default_urls(), accept_invalid_certs: true }
    }
}

/// Fingerprint tool configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Explicit path to the JA4 tool (optional)
    /// Skips PATH discovery when set; a `.py` path is run through `python`
    #[serde(default)]
    pub tool: Option<PathBuf>,
    /// Interpreter for script-form tools
    /// Default: "python3"
    #[serde(default = "default_python")]
    pub python: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { tool: None, python: default_python() }
    }
}

fn default_interface() -> String {
    "any".to_string()
}

fn default_remote_dir() -> String {
    "/captures".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_urls() -> Vec<String> {
    vec![
        "https://www.google.com".to_string(),
        "https://www.cloudflare.com".to_string(),
        "https://httpbin.org/get".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_python() -> String {
    "python3".to_string()
}
