mod capture;
mod loader;
mod proxy;
mod root;
mod telemetry;
mod timeout;

pub use capture::{CaptureConfig, ExtractionConfig, TrafficConfig};
pub use loader::{load_from_path, load_from_str, validate_config};
pub use proxy::{BuildStrategy, HealthCheck, ProxyDefinition, VersionBinding};
pub use root::LabConfig;
pub use telemetry::LoggingConfig;
pub use timeout::TimeoutConfig;
