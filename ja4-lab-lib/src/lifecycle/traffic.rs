use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::TrafficConfig;

/// Result of one test request sent through the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn ok(url: impl Into<String>, status: u16) -> Self {
        Self { url: url.into(), status: Some(status), error: None }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self { url: url.into(), status: None, error: Some(error.into()) }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends the test battery through a proxy listening on localhost
#[async_trait]
pub trait TrafficDriver: Send + Sync {
    async fn drive(&self, port: u16, urls: &[String]) -> Vec<RequestOutcome>;
}

/// [`TrafficDriver`] backed by `reqwest`, routing every request through `http://127.0.0.1:<port>`
#[derive(Debug, Clone)]
pub struct ProxyTrafficDriver {
    request_timeout: Duration,
    accept_invalid_certs: bool,
}

impl ProxyTrafficDriver {
    pub fn new(traffic: &TrafficConfig, request_timeout: Duration) -> Self {
        Self { request_timeout, accept_invalid_certs: traffic.accept_invalid_certs }
    }

    fn client(&self, port: u16) -> reqwest::Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(format!("http://127.0.0.1:{port}"))?;
        reqwest::Client::builder()
            .proxy(proxy)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .timeout(self.request_timeout)
            .build()
    }
}

#[async_trait]
impl TrafficDriver for ProxyTrafficDriver {
    async fn drive(&self, port: u16, urls: &[String]) -> Vec<RequestOutcome> {
        let client = match self.client(port) {
            Ok(client) => client,
            Err(e) => {
                warn!(port, error = %e, "failed to build proxied client");
                return urls.iter().map(|u| RequestOutcome::failed(u, e.to_string())).collect();
            }
        };

        let mut outcomes = Vec::with_capacity(urls.len());
        for url in urls {
            let outcome = match client.get(url).send().await {
                Ok(resp) => {
                    debug!(%url, status = resp.status().as_u16(), "request through proxy");
                    RequestOutcome::ok(url, resp.status().as_u16())
                }
                Err(e) => {
                    warn!(%url, error = %e, "request through proxy failed");
                    RequestOutcome::failed(url, e.to_string())
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
