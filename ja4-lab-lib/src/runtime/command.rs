use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{LabError, Result};

/// Captured result of a finished external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Description of a command to run, rendered for logs and errors
pub fn render<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Run a command to completion, bounded by `timeout`
///
/// A non-zero exit is returned as `Ok` so callers can classify it; only spawn
/// failures and timeouts are errors here. Use [`CommandOutput::success`] or
/// [`check`] to turn a non-zero exit into [`LabError::ToolInvocationFailed`].
pub async fn run_command<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    cwd: Option<&Path>,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<CommandOutput> {
    let rendered = render(program, args);
    debug!(command = %rendered, "running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(LabError::CommandTimeout { command: rendered, secs: timeout.as_secs() })
        }
    };

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Turn a non-zero exit into an error carrying the command line and stderr
pub fn check(command: String, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(LabError::ToolInvocationFailed {
            command,
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}
