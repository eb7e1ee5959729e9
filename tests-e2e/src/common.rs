//! E2E test helpers and common utilities

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ja4_lab_lib::config::{load_from_path, LabConfig};
use ja4_lab_lib::runtime::{ContainerRuntime, DockerCompose};

/// Default lab configuration, relative to this crate
pub const DEFAULT_CONFIG: &str = "../config/lab.toml";

/// Default timeout for waiting for a proxy port to accept connections
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between two connection attempts in [`wait_for_port`]
pub const PORT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Load the lab configuration named by `E2E_CONFIG`, or [`DEFAULT_CONFIG`]
///
/// `E2E_PROJECT_ROOT` overrides the compose project directory.
pub fn load_config() -> Result<LabConfig, Box<dyn std::error::Error + Send + Sync>> {
    let path = std::env::var_os("E2E_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG));
    let mut config = load_from_path(&path)?;
    if let Some(root) = std::env::var_os("E2E_PROJECT_ROOT") {
        config.project_root = PathBuf::from(root);
    }
    Ok(config)
}

/// Docker-backed runtime for `config`
pub fn docker(config: &LabConfig) -> Arc<dyn ContainerRuntime> {
    Arc::new(DockerCompose::new(&config.project_root, &config.timeout))
}

/// Helper to wait for a proxy port on localhost to accept TCP connections
///
/// Retries every [`PORT_POLL_INTERVAL`]; returns `true` if the port opens before `timeout` elapses.
pub async fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return true;
        }
        if tokio::time::Instant::now() + PORT_POLL_INTERVAL > deadline {
            return false;
        }
        tokio::time::sleep(PORT_POLL_INTERVAL).await;
    }
}

/// Send one HTTPS request through the proxy listening on `port`
pub async fn request_through(
    port: u16,
    url: &str,
) -> Result<reqwest::StatusCode, Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::all(format!("http://127.0.0.1:{port}"))?)
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
    Ok(client.get(url).send().await?.status())
}
