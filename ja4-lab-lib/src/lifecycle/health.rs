use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::{HealthCheck, ProxyDefinition};
use crate::error::{LabError, Result};
use crate::runtime::ContainerRuntime;

/// Evaluate the proxy's health predicate once
///
/// Each attempt is bounded by `attempt_timeout`; any error counts as unhealthy.
pub async fn check_health(
    runtime: &dyn ContainerRuntime,
    proxy: &ProxyDefinition,
    attempt_timeout: Duration,
) -> bool {
    match &proxy.health {
        HealthCheck::Running => match runtime.is_running(proxy.service()).await {
            Ok(up) => up,
            Err(e) => {
                debug!(proxy = %proxy.id, error = %e, "liveness check failed");
                false
            }
        },
        HealthCheck::Tcp => {
            let addr = ("127.0.0.1", proxy.port);
            matches!(tokio::time::timeout(attempt_timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
        }
        HealthCheck::Http { path } => http_check(proxy.port, path, attempt_timeout).await,
    }
}

async fn http_check(port: u16, path: &str, attempt_timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().no_proxy().timeout(attempt_timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build health check client");
            return false;
        }
    };
    let url = format!("http://127.0.0.1:{port}{path}");
    match client.get(&url).send().await {
        Ok(resp) => resp.status().as_u16() < 500,
        Err(e) => {
            debug!(%url, error = %e, "http health check failed");
            false
        }
    }
}

/// Poll the health predicate every `interval` until it holds or `limit` elapses
pub async fn wait_healthy(
    runtime: &dyn ContainerRuntime,
    proxy: &ProxyDefinition,
    limit: Duration,
    interval: Duration,
    attempt_timeout: Duration,
) -> Result<()> {
    let polling = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if check_health(runtime, proxy, attempt_timeout).await {
                return attempt;
            }
            debug!(proxy = %proxy.id, attempt, "proxy not healthy yet");
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(limit, polling).await {
        Ok(attempts) => {
            info!(proxy = %proxy.id, attempts, "proxy healthy");
            Ok(())
        }
        Err(_) => {
            warn!(proxy = %proxy.id, secs = limit.as_secs(), "proxy never became healthy");
            Err(LabError::HealthCheckTimeout { proxy: proxy.id.clone(), secs: limit.as_secs() })
        }
    }
}
