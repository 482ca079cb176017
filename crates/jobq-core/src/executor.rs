//! Shell command execution (spec §4.2). Boundary concern: the Executor
//! never touches the Store.

use std::process::Stdio;
use std::time::Duration;

use tracing::warn;

use crate::process_group;

/// Bound on captured stdout+stderr kept for `last_error` (spec §4.2, §9).
pub const OUTPUT_TRUNCATE_BYTES: usize = 4 * 1024;

/// Result of running a job's command.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Short diagnostic for `last_error`: exit code + truncated output.
    pub fn diagnostic(&self) -> String {
        let code_desc = match self.exit_code {
            Some(code) => format!("rc={code}"),
            None => "rc=unknown".to_string(),
        };
        let prefix = if self.timed_out {
            format!("{code_desc} timed_out=true")
        } else {
            code_desc
        };
        if self.output.is_empty() {
            prefix
        } else {
            format!("{prefix}: {}", truncate(&self.output, OUTPUT_TRUNCATE_BYTES))
        }
    }
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &s[..end])
}

/// Runs `command` in a subshell, capturing merged stdout/stderr and
/// enforcing `timeout`. A failure to spawn the shell itself (e.g. `sh`
/// missing) is reported as a synthetic non-zero exit rather than an `Err`,
/// so the worker always has an [`ExecutionResult`] to hand to the retry
/// policy (spec §4.2).
pub async fn execute(command: &str, timeout: Duration) -> ExecutionResult {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Make the shell its own process group leader so a timeout can kill the
    // whole group, not just the direct `sh` pid — otherwise a pipeline
    // (`cmd1 | cmd2`) or a backgrounded grandchild (`sleep 100 &`) survives
    // `kill_on_drop`'s single SIGKILL as an orphan (spec §4.2).
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| process_group::set_process_group());
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(error = %err, "failed to spawn shell");
            return ExecutionResult {
                exit_code: Some(127),
                output: format!("failed to spawn shell: {err}"),
                timed_out: false,
            };
        }
    };
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            ExecutionResult {
                exit_code: output.status.code(),
                output: combined,
                timed_out: false,
            }
        }
        Ok(Err(err)) => ExecutionResult {
            exit_code: None,
            output: format!("failed to wait on child: {err}"),
            timed_out: false,
        },
        Err(_) => {
            if let Some(pid) = pid {
                if let Err(err) = process_group::kill_process_group_by_pid(pid) {
                    warn!(pid, error = %err, "failed to kill timed-out process group");
                }
            }
            ExecutionResult {
                exit_code: None,
                output: "execution timed out".to_string(),
                timed_out: true,
            }
        }
    }
}
