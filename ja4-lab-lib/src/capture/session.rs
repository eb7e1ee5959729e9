use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LabError, Result};

/// Literal accepted in place of a file name to request a timestamped one
pub const AUTO_NAME: &str = "auto";

const CAPTURE_EXTENSIONS: [&str; 2] = [".pcap", ".pcapng"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Running,
    Stopped,
    Collected,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Running => "running",
            CaptureState::Stopped => "stopped",
            CaptureState::Collected => "collected",
        }
    }
}

/// Requested capture artifact name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactName {
    Explicit(String),
    Auto,
}

impl ArtifactName {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case(AUTO_NAME) {
            ArtifactName::Auto
        } else {
            ArtifactName::Explicit(raw.to_string())
        }
    }

    /// Concrete file name; `.pcap` is appended when the name has no capture extension
    ///
    /// Explicit names must be a single path component: separators, `.` and
    /// `..` are rejected so the artifact stays inside the captures directory.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<String> {
        match self {
            ArtifactName::Auto => Ok(auto_name(now)),
            ArtifactName::Explicit(name) => {
                if !is_plain_file_name(name) {
                    return Err(LabError::InvalidArtifactName(name.clone()));
                }
                if CAPTURE_EXTENSIONS.iter().any(|ext| name.to_lowercase().ends_with(ext)) {
                    Ok(name.clone())
                } else {
                    Ok(format!("{name}.pcap"))
                }
            }
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// `capture_YYYYMMDD_HHMMSS.pcap`
pub fn auto_name(at: DateTime<Utc>) -> String {
    format!("capture_{}.pcap", at.format("%Y%m%d_%H%M%S"))
}

/// One capture run across a set of targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSession {
    /// Artifact file name, shared by every target
    pub name: String,
    pub interface: String,
    /// Targets on which tcpdump was started
    pub targets: Vec<String>,
    pub state: CaptureState,
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    pub fn is_active(&self) -> bool {
        matches!(self.state, CaptureState::Running | CaptureState::Stopped)
    }
}

/// Sidecar file recording the current session, so a later `stop` (possibly from
/// another process) knows which artifact to collect
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub const FILE_NAME: &'static str = ".current_capture";

    pub fn in_dir(captures_dir: &Path) -> Self {
        Self { path: captures_dir.join(Self::FILE_NAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the recorded session
    ///
    /// A sidecar holding only a file name (older format) is read as a running
    /// session with unknown targets.
    pub fn load(&self) -> Option<CaptureSession> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no capture session recorded");
                return None;
            }
        };

        match serde_json::from_str::<CaptureSession>(&text) {
            Ok(session) => Some(session),
            Err(_) => {
                let name = text.trim();
                if name.is_empty() || name.contains('{') || name.contains('\n') {
                    warn!(path = %self.path.display(), "unreadable capture session file");
                    return None;
                }
                Some(CaptureSession {
                    name: name.to_string(),
                    interface: String::new(),
                    targets: Vec::new(),
                    state: CaptureState::Running,
                    started_at: Utc::now(),
                })
            }
        }
    }

    pub fn save(&self, session: &CaptureSession) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(session)?)?;
        Ok(())
    }
}
