//! Shared test doubles: a scripted container runtime, canned traffic and a fake ja4 tool

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ja4_lab_lib::config::{BuildStrategy, HealthCheck, ProxyDefinition, VersionBinding};
use ja4_lab_lib::error::{LabError, Result};
use ja4_lab_lib::extraction::ToolCommand;
use ja4_lab_lib::lifecycle::{RequestOutcome, TrafficDriver, TrialSettings};
use ja4_lab_lib::runtime::{CommandOutput, ContainerRuntime, StopOutcome};

pub type TestResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub const FAKE_PCAP: &[u8] = b"\xd4\xc3\xb2\xa1fake-packets";

#[derive(Default)]
struct State {
    running: HashSet<String>,
    /// Remote path tcpdump is writing to, per target
    capturing: HashMap<String, String>,
    /// Remote files that exist inside each target
    files: HashSet<(String, String)>,
    calls: Vec<String>,
}

/// In-memory [`ContainerRuntime`] that models containers and tcpdump processes
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    failing_builds: HashSet<String>,
    failing_starts: HashSet<String>,
    unhealthy_versions: HashSet<String>,
    empty_captures: HashSet<String>,
    missing_tcpdump: HashSet<String>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Containers already up before the test starts
    pub fn with_running(self, targets: &[&str]) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.running.extend(targets.iter().map(|t| t.to_string()));
        }
        self
    }

    /// Starting the service at `version` leaves it down
    pub fn unhealthy(mut self, version: &str) -> Self {
        self.unhealthy_versions.insert(version.to_string());
        self
    }

    pub fn failing_build(mut self, version: &str) -> Self {
        self.failing_builds.insert(version.to_string());
        self
    }

    /// `start` at `version` exits non-zero
    pub fn failing_start(mut self, version: &str) -> Self {
        self.failing_starts.insert(version.to_string());
        self
    }

    /// tcpdump on `target` writes nothing
    pub fn empty_capture(mut self, target: &str) -> Self {
        self.empty_captures.insert(target.to_string());
        self
    }

    pub fn without_tcpdump(mut self, target: &str) -> Self {
        self.missing_tcpdump.insert(target.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn is_capturing(&self, target: &str) -> bool {
        self.state.lock().map(|s| s.capturing.contains_key(target)).unwrap_or(false)
    }

    fn log(&self, call: String) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }

    fn version_of(binding: &VersionBinding) -> Option<&str> {
        binding.build_args.iter().chain(binding.env.iter()).map(|(_, v)| v.as_str()).next()
    }
}

fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput { code: Some(code), stdout: stdout.to_string(), stderr: stderr.to_string() }
}

fn poisoned() -> LabError {
    LabError::Io(std::io::Error::other("fake runtime state poisoned"))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build(&self, service: &str, binding: &VersionBinding) -> Result<()> {
        self.log(format!("build {service}"));
        match Self::version_of(binding) {
            Some(version) if self.failing_builds.contains(version) => {
                Err(LabError::ToolInvocationFailed {
                    command: format!("docker compose build {service}"),
                    code: Some(1),
                    stderr: format!("version {version} does not exist"),
                })
            }
            _ => Ok(()),
        }
    }

    async fn start(&self, service: &str, binding: &VersionBinding) -> Result<()> {
        self.log(format!("start {service}"));
        if let Some(version) = Self::version_of(binding).filter(|v| self.failing_starts.contains(*v)) {
            return Err(LabError::ToolInvocationFailed {
                command: format!("docker compose up -d {service}"),
                code: Some(1),
                stderr: format!("pull access denied for {service}:{version}"),
            });
        }
        let healthy =
            Self::version_of(binding).map_or(true, |v| !self.unhealthy_versions.contains(v));
        if healthy {
            self.state.lock().map_err(|_| poisoned())?.running.insert(service.to_string());
        }
        Ok(())
    }

    async fn stop(&self, service: &str) -> StopOutcome {
        self.log(format!("stop {service}"));
        match self.state.lock() {
            Ok(mut state) => {
                if state.running.remove(service) {
                    state.capturing.remove(service);
                    StopOutcome::Stopped
                } else {
                    StopOutcome::NotRunning
                }
            }
            Err(_) => StopOutcome::Failed("state poisoned".into()),
        }
    }

    async fn is_running(&self, target: &str) -> Result<bool> {
        Ok(self.state.lock().map_err(|_| poisoned())?.running.contains(target))
    }

    async fn exec(&self, target: &str, argv: &[String], detach: bool) -> Result<CommandOutput> {
        self.log(format!("exec {target} {}", argv.join(" ")));
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if !state.running.contains(target) {
            return Ok(output(1, "", &format!("container {target} is not running")));
        }

        match argv.first().map(String::as_str) {
            Some("which") if self.missing_tcpdump.contains(target) => Ok(output(1, "", "")),
            Some("which") => Ok(output(0, "/usr/bin/tcpdump\n", "")),
            Some("pkill") => match state.capturing.remove(target) {
                Some(remote) => {
                    if !self.empty_captures.contains(target) {
                        state.files.insert((target.to_string(), remote));
                    }
                    Ok(output(0, "", ""))
                }
                None => Ok(output(1, "", "")),
            },
            Some("tcpdump") if detach => {
                let remote = argv
                    .iter()
                    .position(|a| a == "-w")
                    .and_then(|i| argv.get(i + 1))
                    .cloned()
                    .unwrap_or_default();
                state.capturing.insert(target.to_string(), remote);
                Ok(output(0, "", ""))
            }
            _ => Ok(output(127, "", "unknown command")),
        }
    }

    async fn copy_from(&self, target: &str, remote: &str, local: &Path) -> Result<()> {
        self.log(format!("copy {target}:{remote}"));
        let exists = self
            .state
            .lock()
            .map_err(|_| poisoned())?
            .files
            .contains(&(target.to_string(), remote.to_string()));

        if let Some(dir) = local.parent() {
            fs::create_dir_all(dir)?;
        }
        if self.empty_captures.contains(target) {
            fs::write(local, b"")?;
            return Ok(());
        }
        if !exists {
            return Err(LabError::ToolInvocationFailed {
                command: format!("docker cp {target}:{remote}"),
                code: Some(1),
                stderr: format!("Could not find the file {remote} in container {target}"),
            });
        }
        fs::write(local, FAKE_PCAP)?;
        Ok(())
    }
}

/// Answers every request with a canned outcome
pub struct FakeTraffic {
    fail: bool,
    seen: Mutex<Vec<u16>>,
}

impl FakeTraffic {
    pub fn ok() -> Self {
        Self { fail: false, seen: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, seen: Mutex::new(Vec::new()) }
    }

    pub fn ports(&self) -> Vec<u16> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TrafficDriver for FakeTraffic {
    async fn drive(&self, port: u16, urls: &[String]) -> Vec<RequestOutcome> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(port);
        }
        urls.iter()
            .map(|url| {
                if self.fail {
                    RequestOutcome::failed(url, "connection refused")
                } else {
                    RequestOutcome::ok(url, 200)
                }
            })
            .collect()
    }
}

pub fn squid(versions: &[&str]) -> ProxyDefinition {
    ProxyDefinition {
        id: "squid".to_string(),
        name: "Squid".to_string(),
        versions: versions.iter().map(|v| v.to_string()).collect(),
        port: 3128,
        service: None,
        capture_targets: None,
        health: HealthCheck::Running,
        build: BuildStrategy::Dockerfile { version_arg: "SQUID_VERSION".to_string() },
    }
}

/// Trial settings scaled down to milliseconds
pub fn fast_settings() -> TrialSettings {
    TrialSettings {
        interface: "any".to_string(),
        capture_targets: Vec::new(),
        urls: vec!["https://www.google.com".to_string(), "https://httpbin.org/get".to_string()],
        health_timeout: Duration::from_millis(200),
        health_interval: Duration::from_millis(20),
        attempt_timeout: Duration::from_millis(100),
        capture_warmup: Duration::from_millis(5),
        traffic_drain: Duration::from_millis(5),
    }
}

pub const SETTLE: Duration = Duration::from_millis(10);

/// Script standing in for the Python ja4 tool
///
/// Prints its usage line on `--help`, fails on artifacts whose name contains
/// `bad`, and otherwise emits two sessions without reliable line breaks.
pub const FAKE_JA4: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then
  echo "usage: ja4.py [-h] [-J] [-v] pcap"
  exit 0
fi
case "$1" in
  *bad*) echo "error: not a capture file" >&2; exit 3 ;;
esac
printf 'ja4 parsing %s\n' "$1"
printf '{"stream": 0, "src": "172.18.0.3", "domain": "www.google.com",\n  "JA4": "t13d1516h2_8daaf6152771_02713d6af862"}{"stream": 1,'
printf ' "domain": "httpbin.org", "JA4": "t13d1516h2_8daaf6152771_b186095e22b6",\n'
printf ' "JA4_r": "t13d1516h2_002f,0035_0005,000a"}\n{"stream": 2, "JA4": }\n'
"#;

/// Write [`FAKE_JA4`] into `dir` and return a command running it through `sh`
pub fn fake_tool(dir: &Path) -> std::io::Result<ToolCommand> {
    let path = dir.join("ja4.py");
    fs::write(&path, FAKE_JA4)?;
    Ok(ToolCommand { program: "sh".to_string(), prefix: vec![path.display().to_string()] })
}

pub fn write_capture(path: &Path) -> std::io::Result<PathBuf> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, FAKE_PCAP)?;
    Ok(path.to_path_buf())
}
