//! Capture session management.
//!
//! [`CaptureManager`] drives tcpdump inside one or more containers: it starts a
//! session (interrupting stale ones), stops it, waits for buffered packets to
//! be flushed and copies each target's artifact to the host capture directory.

pub mod manager;
pub mod session;

pub use manager::{CaptureManager, CollectReport, StartReport, TargetFailure};
pub use session::{auto_name, ArtifactName, CaptureSession, CaptureState, SessionFile, AUTO_NAME};
