//! Command execution for the skerry agent.
//!
//! Commands are tokenized with shell-words rather than handed to a shell,
//! so quoting works without opening the door to shell injection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Maximum output size in bytes (1 MB).
/// Prevents memory exhaustion from commands with huge output.
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Result of a completed (or failed-to-start) command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// Result for a command that never ran.
    fn failure(message: impl std::fmt::Display) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Failed to execute command: {message}"),
            exit_code: 1,
        }
    }
}

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str("\n... [output truncated]");
    truncated
}

/// Run a command inside `workdir` and capture its output.
///
/// A non-zero exit code is a normal result, not an error. Commands that
/// cannot be tokenized or spawned report exit code 1 with the reason on
/// stderr, so callers always get a result to inspect.
pub async fn run_command(command: &str, workdir: &Path) -> ExecResult {
    debug!(command = %command, "executing command");

    let argv = match shell_words::split(command) {
        Ok(argv) => argv,
        Err(e) => {
            warn!(error = %e, command = %command, "command did not tokenize");
            return ExecResult::failure(e);
        }
    };
    let Some((program, args)) = argv.split_first() else {
        warn!("empty command");
        return ExecResult::failure("empty command");
    };

    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(workdir)
        .output()
        .await;

    match output {
        Ok(out) => {
            let exit_code = out.status.code().unwrap_or(-1);
            let stdout = truncate_output(
                String::from_utf8_lossy(&out.stdout).into_owned(),
                MAX_OUTPUT_SIZE,
            );
            let stderr = truncate_output(
                String::from_utf8_lossy(&out.stderr).into_owned(),
                MAX_OUTPUT_SIZE,
            );
            debug!(
                exit_code = exit_code,
                stdout_len = stdout.len(),
                stderr_len = stderr.len(),
                "command completed"
            );
            trace!(stdout = %stdout, stderr = %stderr, "command output");
            ExecResult {
                stdout,
                stderr,
                exit_code,
            }
        }
        Err(e) => {
            warn!(error = %e, command = %command, "command failed to spawn");
            ExecResult::failure(e)
        }
    }
}
