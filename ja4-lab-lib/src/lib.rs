#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod error;
pub mod extraction;
pub mod lifecycle;
pub mod results;
pub mod runtime;
pub mod telemetry;

pub use capture::{ArtifactName, CaptureManager, CaptureSession, CaptureState};
pub use config::{load_from_path, LabConfig, ProxyDefinition};
pub use error::{LabError, Result};
pub use extraction::{SignatureExtractor, SignatureRecord};
pub use lifecycle::{ProxyController, ProxyTrafficDriver, SuiteRunner, TrafficDriver};
pub use results::{ResultStore, TestResult, TrialStatus};
pub use runtime::{ContainerRuntime, DockerCompose, StopOutcome};
pub use telemetry::init_tracing;
