use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{LabError, Result};
use crate::runtime::run_command;

const BINARY_NAME: &str = "ja4";
const SCRIPT_NAME: &str = "ja4.py";
const SCRIPT_USAGE_MARKER: &str = "usage: ja4.py";
const SUBCOMMAND: &str = "parse-pcap";

/// How capture paths are passed to the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStyle {
    /// `ja4.py <pcap> --json`
    Direct,
    /// `ja4 parse-pcap <pcap> --json`
    Subcommand,
}

/// A resolved fingerprint tool: program plus the arguments that precede every invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub prefix: Vec<String>,
}

impl ToolCommand {
    pub fn binary(path: &Path) -> Self {
        Self { program: path.display().to_string(), prefix: Vec::new() }
    }

    pub fn script(python: &str, path: &Path) -> Self {
        Self { program: python.to_string(), prefix: vec![path.display().to_string()] }
    }

    /// Wrap an explicitly configured path, running `.py` files through `python`
    pub fn from_path(path: &Path, python: &str) -> Self {
        if path.extension().is_some_and(|ext| ext == "py") {
            Self::script(python, path)
        } else {
            Self::binary(path)
        }
    }

    /// Full argument list for extracting `artifact`
    pub fn args_for(&self, style: InvocationStyle, artifact: &Path) -> Vec<String> {
        let mut args = self.prefix.clone();
        if style == InvocationStyle::Subcommand {
            args.push(SUBCOMMAND.to_string());
        }
        args.push(artifact.display().to_string());
        args.push("--json".to_string());
        args
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.prefix {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Resolve the tool from the process `PATH` and working directory
pub fn locate_tool(python: &str) -> Result<ToolCommand> {
    let cwd = env::current_dir()?;
    locate_tool_in(env::var_os("PATH").as_deref(), &cwd, python)
}

/// Resolve the tool: `ja4` on the search path, then `ja4.py` on the search path,
/// then `ja4.py` in `working_dir`
pub fn locate_tool_in(
    search_path: Option<&OsStr>,
    working_dir: &Path,
    python: &str,
) -> Result<ToolCommand> {
    let dirs: Vec<PathBuf> = search_path.map(|p| env::split_paths(p).collect()).unwrap_or_default();

    if let Some(path) = find_executable(&dirs, BINARY_NAME) {
        info!(path = %path.display(), "found ja4 binary");
        return Ok(ToolCommand::binary(&path));
    }
    if let Some(path) = find_executable(&dirs, SCRIPT_NAME) {
        info!(path = %path.display(), "found ja4.py on PATH");
        return Ok(ToolCommand::script(python, &path));
    }
    let local = working_dir.join(SCRIPT_NAME);
    if local.is_file() {
        info!(path = %local.display(), "found ja4.py in working directory");
        return Ok(ToolCommand::script(python, &local));
    }

    Err(LabError::ToolNotFound)
}

fn find_executable(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter().map(|dir| dir.join(name)).find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run `--help` to tell the two calling conventions apart
///
/// The Python tool identifies itself in its usage line and takes the capture
/// path directly; anything else, including a failed `--help` run, gets the subcommand form.
pub async fn detect_style(tool: &ToolCommand, timeout: Duration) -> InvocationStyle {
    let mut args = tool.prefix.clone();
    args.push("--help".to_string());

    match run_command(&tool.program, &args, None, &[], timeout).await {
        Ok(out) => {
            let help = format!("{}{}", out.stdout, out.stderr);
            if help.contains(SCRIPT_USAGE_MARKER) {
                debug!(tool = %tool, "ja4 tool takes capture paths directly");
                InvocationStyle::Direct
            } else {
                debug!(tool = %tool, "ja4 tool uses the parse-pcap subcommand");
                InvocationStyle::Subcommand
            }
        }
        Err(e) => {
            warn!(tool = %tool, error = %e, "could not run ja4 --help, assuming parse-pcap");
            InvocationStyle::Subcommand
        }
    }
}
