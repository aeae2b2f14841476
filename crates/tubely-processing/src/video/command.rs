//! Running external tools with captured output and a hard timeout.

use crate::error::ProcessingError;
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Reject binary paths containing shell metacharacters or traversal.
pub(crate) fn validate_tool_path(path: &str) -> Result<(), ProcessingError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.is_empty() || path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProcessingError::InvalidToolPath(format!(
            "path contains dangerous characters: {:?}",
            path
        )));
    }

    if path.contains("..") {
        return Err(ProcessingError::InvalidToolPath(format!(
            "path contains directory traversal: {:?}",
            path
        )));
    }

    if !path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\')
    {
        return Err(ProcessingError::InvalidToolPath(format!(
            "path contains unsafe characters: {:?}",
            path
        )));
    }

    Ok(())
}

/// Why a tool run did not produce a usable result.
#[derive(Debug)]
pub(crate) struct ToolFailure {
    pub message: String,
    pub stderr: Option<String>,
}

/// Run `program` to completion and return its output if it exited with status 0.
///
/// The child is killed when the timeout elapses or when the returned future
/// is dropped.
pub(crate) async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<Output, ToolFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ToolFailure {
                message: format!("failed to execute {}: {}", program, e),
                stderr: None,
            })
        }
        Err(_) => {
            return Err(ToolFailure {
                message: format!("{} timed out after {}s", program, timeout.as_secs()),
                stderr: None,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ToolFailure {
            message: format!("{} exited with {}", program, output.status),
            stderr: Some(stderr),
        });
    }

    Ok(output)
}
