use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::decoder::{DecodeStats, JsonStreamDecoder};
use super::manifest::load_manifest;
use super::record::{SignatureRecord, ToolSession};
use super::tool::{detect_style, locate_tool, InvocationStyle, ToolCommand};
use crate::config::ExtractionConfig;
use crate::error::{LabError, Result};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub artifact: PathBuf,
    pub reason: String,
}

/// Outcome of one extraction batch
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Annotated records, grouped by artifact in the order artifacts were given
    pub records: Vec<SignatureRecord>,
    /// Artifacts the tool could not process; they contribute no records
    pub failures: Vec<ArtifactFailure>,
    /// Output fragments that could not be decoded into a session
    pub malformed: usize,
}

/// Runs the JA4 tool over capture artifacts and turns its output into [`SignatureRecord`]s
#[derive(Debug, Clone)]
pub struct SignatureExtractor {
    tool: ToolCommand,
    style: InvocationStyle,
    manifest_path: PathBuf,
    timeout: Duration,
}

impl SignatureExtractor {
    pub fn new(
        tool: ToolCommand,
        style: InvocationStyle,
        manifest_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self { tool, style, manifest_path: manifest_path.into(), timeout }
    }

    /// Resolve the tool (explicit path or discovery) and detect its calling convention
    pub async fn discover(
        config: &ExtractionConfig,
        manifest_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let tool = match &config.tool {
            Some(path) => {
                if !path.exists() {
                    warn!(path = %path.display(), "configured ja4 tool does not exist");
                    return Err(LabError::ToolNotFound);
                }
                ToolCommand::from_path(path, &config.python)
            }
            None => locate_tool(&config.python)?,
        };
        let style = detect_style(&tool, timeout).await;
        info!(tool = %tool, ?style, "ja4 tool ready");
        Ok(Self::new(tool, style, manifest_path, timeout))
    }

    /// Extract and annotate sessions from every artifact
    ///
    /// A failing artifact is logged and skipped. The manifest is read once, so
    /// every record of the batch carries the same manifest object.
    pub async fn extract(&self, artifacts: &[PathBuf]) -> ExtractionReport {
        let manifest = load_manifest(&self.manifest_path);
        let mut report = ExtractionReport::default();

        for artifact in artifacts {
            let base_name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| artifact.display().to_string());
            info!(artifact = %base_name, "parsing JA4 sessions");

            let (sessions, stats) = match self.run_tool(artifact).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(artifact = %artifact.display(), error = %e, "ja4 parse failed");
                    report
                        .failures
                        .push(ArtifactFailure { artifact: artifact.clone(), reason: e.to_string() });
                    continue;
                }
            };
            report.malformed += stats.malformed;

            debug!(artifact = %base_name, sessions = sessions.len(), "sessions decoded");
            report.records.extend(annotate(sessions, artifact, &manifest));
        }

        info!(
            artifacts = artifacts.len(),
            records = report.records.len(),
            failures = report.failures.len(),
            malformed = report.malformed,
            "extraction finished"
        );
        report
    }

    /// Run the tool over one artifact, decoding stdout while it is produced
    async fn run_tool(&self, artifact: &Path) -> Result<(Vec<ToolSession>, DecodeStats)> {
        let args = self.tool.args_for(self.style, artifact);
        let rendered = format!("{} {}", self.tool.program, args.join(" "));

        let mut child = Command::new(&self.tool.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut decoder = JsonStreamDecoder::new();
        let mut values = Vec::new();

        let run = async {
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| LabError::Io(std::io::Error::other("tool stdout not captured")))?;
            let stderr = child.stderr.take();
            let stderr_task = tokio::spawn(async move {
                let mut text = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut text).await;
                }
                text
            });

            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                values.extend(decoder.feed(&chunk[..n]));
            }

            let status = child.wait().await?;
            let stderr = stderr_task.await.unwrap_or_default();
            Ok::<_, LabError>((status, stderr))
        };

        let (status, stderr) = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LabError::CommandTimeout {
                    command: rendered,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !status.success() {
            return Err(LabError::ToolInvocationFailed {
                command: rendered,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let mut stats = decoder.finish();
        let sessions = into_sessions(values, &mut stats);
        Ok((sessions, stats))
    }
}

/// Turn decoded values into sessions; top-level arrays are flattened
///
/// Every object becomes a session. Scalars count as malformed.
pub fn into_sessions(values: Vec<Value>, stats: &mut DecodeStats) -> Vec<ToolSession> {
    let mut sessions = Vec::new();
    let mut pending: Vec<Value> = values.into_iter().rev().collect();

    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items.into_iter().rev()),
            Value::Object(map) => sessions.push(ToolSession::from_map(map)),
            other => {
                debug!(value = %other, "tool output is not a session object");
                stats.malformed += 1;
            }
        }
    }

    sessions
}

fn modified_utc(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified).trunc_subsecs(0))
}

/// List capture files (`.pcap`, `.pcapng`) under `dir`, recursively, sorted by path
pub fn discover_artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut dirs = vec![dir.to_path_buf()];

    while let Some(current) = dirs.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            } else if is_capture_file(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "pcap" || ext == "pcapng"
        })
        .unwrap_or(false)
}

/// Write annotated records as a pretty JSON array
pub fn write_ja4_results(path: &Path, records: &[SignatureRecord]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_vec_pretty(records)?)?;
    info!(path = %path.display(), records = records.len(), "JA4 results written");
    Ok(())
}

/// Attach provenance to the sessions read from one artifact
pub fn annotate(
    sessions: Vec<ToolSession>,
    artifact: &Path,
    manifest: &Map<String, Value>,
) -> Vec<SignatureRecord> {
    let parsed_at_utc = Utc::now().trunc_subsecs(0);
    let capture_file_mtime_utc = modified_utc(artifact);
    let source_pcap = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.display().to_string());
    sessions
        .into_iter()
        .map(|session| SignatureRecord {
            session,
            source_pcap: source_pcap.clone(),
            source_pcap_path: artifact.display().to_string(),
            parsed_at_utc,
            capture_file_mtime_utc,
            manifest: manifest.clone(),
        })
        .collect()
}
