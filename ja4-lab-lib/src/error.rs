use thiserror::Error;

/// Errors that can occur while driving the evaluation pipeline
#[derive(Error, Debug)]
pub enum LabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JA4 tool not found (looked for `ja4`, `ja4.py` on PATH and ./ja4.py)")]
    ToolNotFound,

    #[error("health check timeout for {proxy} after {secs}s")]
    HealthCheckTimeout { proxy: String, secs: u64 },

    #[error("invalid capture artifact name `{0}`: must be a plain file name")]
    InvalidArtifactName(String),

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("command `{command}` failed with exit code {code:?}: {stderr}")]
    ToolInvocationFailed { command: String, code: Option<i32>, stderr: String },

    #[error("command `{command}` timed out after {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    #[error("unknown proxy: {0}")]
    UnknownProxy(String),

    #[error("unknown version {version} for proxy {proxy}")]
    UnknownVersion { proxy: String, version: String },
}

pub type Result<T> = std::result::Result<T, LabError>;
