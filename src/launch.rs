//! Process launching for remote commands.
//!
//! Spawns argument vectors produced by [`crate::command::split_command_line`]
//! with all three stdio streams piped. stdout and stderr are merged into one
//! combined stream downstream (by the output pump on the streaming path, by
//! concatenation on the buffered path); provenance is intentionally dropped.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::command::split_command_line;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("child process stdio pipe missing")]
    MissingPipe,

    #[error("failed to wait for child: {0}")]
    Wait(#[from] std::io::Error),
}

/// A freshly spawned process with all three stdio pipes taken out of the
/// child handle, ready to be handed to the per-session tasks.
pub struct LaunchedProcess {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Start a process for `command_line`.
///
/// Working directory resolution: the caller-supplied `cwd` wins, then
/// `fallback_root` (the active project root, when known), otherwise the
/// child inherits the server's own working directory.
///
/// Spawning is synchronous and fails fast when the executable cannot be
/// resolved; it never waits for output. The child is killed on drop as a
/// backstop, but every normal path reaps it explicitly.
pub fn launch(
    command_line: &str,
    cwd: Option<&str>,
    fallback_root: Option<&Path>,
) -> Result<LaunchedProcess, LaunchError> {
    let args = split_command_line(command_line);
    let Some((program, rest)) = args.split_first() else {
        return Err(LaunchError::EmptyCommand);
    };

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    } else if let Some(root) = fallback_root {
        cmd.current_dir(root);
    }

    let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        command: program.clone(),
        source,
    })?;
    let stdin = child.stdin.take().ok_or(LaunchError::MissingPipe)?;
    let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe)?;
    let stderr = child.stderr.take().ok_or(LaunchError::MissingPipe)?;

    Ok(LaunchedProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Run a command to completion, buffering its combined output.
///
/// Used by the synchronous REST path; the streaming terminal never goes
/// through here. stdin is closed immediately. Both pipes are drained
/// concurrently so a child filling one cannot deadlock against the other.
/// Returns the combined output (stdout then stderr) and the exit code,
/// `-1` when the OS reports none.
pub async fn run_buffered(
    command_line: &str,
    cwd: Option<&str>,
    fallback_root: Option<&Path>,
) -> Result<(String, i32), LaunchError> {
    let LaunchedProcess {
        mut child,
        stdin,
        mut stdout,
        mut stderr,
    } = launch(command_line, cwd, fallback_root)?;
    drop(stdin);

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let (stdout_read, stderr_read) = tokio::join!(
        stdout.read_to_end(&mut stdout_buf),
        stderr.read_to_end(&mut stderr_buf),
    );
    if let Err(e) = stdout_read {
        tracing::debug!(error = %e, "stdout read ended with error");
    }
    if let Err(e) = stderr_read {
        tracing::debug!(error = %e, "stderr read ended with error");
    }

    let status = child.wait().await?;

    let mut output = String::from_utf8_lossy(&stdout_buf).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr_buf));
    Ok((output, status.code().unwrap_or(-1)))
}
