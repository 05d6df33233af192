//! External command execution.

use crate::error::{ExtTestError, Result};
use crate::telemetry::{STDERR_TARGET, STDOUT_TARGET};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Captured result of a successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Rendered command line.
    pub command: String,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Run `program args...` in `cwd` with exactly the variables in `env`.
///
/// A non-zero exit becomes [`ExtTestError::CommandFailed`]. When `timeout` is
/// set the child is killed once it expires.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let start = Instant::now();
    let command = render_command(program, args);
    debug!(command = %command, cwd = %cwd.display(), "Running command");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtTestError::ToolNotFound(program.to_string()),
            _ => ExtTestError::Io(e),
        })?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ExtTestError::CommandTimedOut {
                command: command.clone(),
                secs: limit.as_secs(),
            })??,
        None => child.wait_with_output().await?,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    for line in stdout.lines() {
        debug!(target: STDOUT_TARGET, stream = "stdout", "{line}");
    }
    for line in stderr.lines() {
        debug!(target: STDERR_TARGET, stream = "stderr", "{line}");
    }

    if !output.status.success() {
        return Err(ExtTestError::CommandFailed {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(CommandOutput {
        command,
        stdout,
        stderr,
        duration_ms,
    })
}

fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
