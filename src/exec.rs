//! Command execution with streamed output
//!
//! Dependency-manager exports and local installs run through here. Output is
//! forwarded to the logger line by line as it is produced, not buffered to
//! completion, so long-running installs stay observable. The full combined
//! output is still collected for error reporting.

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PackError, Result};

/// Run a command, streaming stdout/stderr to the logger. Returns the combined
/// output; a non-zero exit becomes [`PackError::CommandFailure`].
pub async fn run_streamed(
    program: &str,
    args: &[&str],
    cwd: &Path,
    envs: &[(String, String)],
) -> Result<String> {
    let rendered = render(program, args);
    debug!(command = %rendered, cwd = %cwd.display(), "Running command");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        command.env(key, value);
    }

    let mut child = command.spawn()?;
    let stdout_task = tokio::spawn(stream_lines(child.stdout.take(), program.to_string()));
    let stderr_task = tokio::spawn(stream_lines(child.stderr.take(), program.to_string()));

    let status = child.wait().await?;
    let (stdout_lines, stderr_lines) = tokio::join!(stdout_task, stderr_task);
    let mut lines = stdout_lines.unwrap_or_default();
    lines.extend(stderr_lines.unwrap_or_default());
    let combined = lines.join("\n");

    if !status.success() {
        return Err(PackError::CommandFailure {
            command: rendered,
            status: status.code().unwrap_or(-1),
            output: combined,
        });
    }
    Ok(combined)
}

/// Run a command and capture stdout without streaming (for version probes
/// and exports that write to stdout). Stderr is folded into the failure
/// output on a non-zero exit.
pub async fn run_capture(program: &str, args: &[&str], cwd: &Path) -> Result<String> {
    let rendered = render(program, args);
    debug!(command = %rendered, "Capturing command output");

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(PackError::CommandFailure {
            command: rendered,
            status: output.status.code().unwrap_or(-1),
            output: combined,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn stream_lines<R>(reader: Option<R>, program: String) -> Vec<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut collected = Vec::new();
    if let Some(reader) = reader {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "packbox::exec", program = %program, "{}", line);
            collected.push(line);
        }
    }
    collected
}

fn render(program: &str, args: &[&str]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cwd() -> PathBuf {
        std::env::temp_dir()
    }

    #[tokio::test]
    async fn test_run_streamed_collects_output() {
        let output = run_streamed("sh", &["-c", "echo one; echo two >&2"], &cwd(), &[])
            .await
            .unwrap();
        assert!(output.contains("one"));
        assert!(output.contains("two"));
    }

    #[tokio::test]
    async fn test_run_streamed_failure_carries_output() {
        let err = run_streamed("sh", &["-c", "echo boom; exit 3"], &cwd(), &[])
            .await
            .unwrap_err();
        match err {
            PackError::CommandFailure {
                status, output, ..
            } => {
                assert_eq!(status, 3);
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_capture() {
        let output = run_capture("sh", &["-c", "echo captured"], &cwd())
            .await
            .unwrap();
        assert_eq!(output.trim(), "captured");
    }

    #[tokio::test]
    async fn test_env_passthrough() {
        let envs = vec![("PACKBOX_TEST_VAR".to_string(), "42".to_string())];
        let output = run_streamed("sh", &["-c", "echo $PACKBOX_TEST_VAR"], &cwd(), &envs)
            .await
            .unwrap();
        assert!(output.contains("42"));
    }
}
