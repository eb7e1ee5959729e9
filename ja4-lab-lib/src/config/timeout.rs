use serde::Deserialize;
use std::time::Duration;

/// Timeout configuration
/// Every external call made by the pipeline is bounded by one of these values
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// Upper bound for a single container runtime or tool command, in seconds
    /// Default: 60
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,
    /// Upper bound for an image build or pull, in seconds
    /// Builds compile proxies from source and may take a while
    /// Default: 900 (15 minutes)
    #[serde(default = "default_build_secs")]
    pub build_secs: u64,
    /// How long to wait for a proxy to become healthy, in seconds
    /// Default: 60
    #[serde(default = "default_health_secs")]
    pub health_secs: u64,
    /// Delay between two health checks, in seconds
    /// Default: 5
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    /// Pause after stopping tcpdump so buffered packets reach the capture file, in seconds
    /// Default: 2
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Pause between starting capture and sending the first request, in seconds
    /// Default: 5
    #[serde(default = "default_capture_warmup_secs")]
    pub capture_warmup_secs: u64,
    /// Per-request timeout for test traffic, in seconds
    /// Default: 10
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
    /// Pause after the last request before capture is stopped, in seconds
    /// Default: 5
    #[serde(default = "default_traffic_drain_secs")]
    pub traffic_drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: default_command_secs(),
            build_secs: default_build_secs(),
            health_secs: default_health_secs(),
            health_interval_secs: default_health_interval_secs(),
            settle_secs: default_settle_secs(),
            capture_warmup_secs: default_capture_warmup_secs(),
            request_secs: default_request_secs(),
            traffic_drain_secs: default_traffic_drain_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn capture_warmup(&self) -> Duration {
        Duration::from_secs(self.capture_warmup_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn traffic_drain(&self) -> Duration {
        Duration::from_secs(self.traffic_drain_secs)
    }
}

fn default_command_secs() -> u64 {
    60
}

fn default_build_secs() -> u64 {
    900
}

fn default_health_secs() -> u64 {
    60
}

fn default_health_interval_secs() -> u64 {
    5
}

fn default_settle_secs() -> u64 {
    2
}

fn default_capture_warmup_secs() -> u64 {
    5
}

fn default_request_secs() -> u64 {
    10
}

fn default_traffic_drain_secs() -> u64 {
    5
}
