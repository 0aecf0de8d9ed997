//! Bounded execution of external tools.

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// How an external tool run ended.
#[derive(Debug)]
pub enum ToolOutcome {
    Finished(Output),
    /// The time limit expired and the child was killed.
    TimedOut,
}

/// Run `cmd` to completion, killing it if it outlives `limit`.
///
/// stdin is closed; stdout and stderr are captured.
pub async fn run_bounded(mut cmd: Command, limit: Duration) -> io::Result<ToolOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = format!("{:?}", cmd.as_std().get_program());
    let child = cmd.spawn()?;
    debug!(program = %program, pid = ?child.id(), "Spawned external tool");

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => Ok(ToolOutcome::Finished(output?)),
        Err(_) => {
            // Dropping the wait future drops the child, which kills it.
            warn!(program = %program, timeout_secs = limit.as_secs_f64(), "External tool timed out");
            Ok(ToolOutcome::TimedOut)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_of_finished_command() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        match run_bounded(cmd, Duration::from_secs(10)).await.unwrap() {
            ToolOutcome::Finished(output) => {
                assert_eq!(output.status.code(), Some(3));
                assert_eq!(output.stdout, b"out\n");
                assert_eq!(output.stderr, b"err\n");
            }
            ToolOutcome::TimedOut => panic!("should not time out"),
        }
    }

    #[tokio::test]
    async fn kills_command_past_its_limit() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let outcome = run_bounded(cmd, Duration::from_millis(100)).await.unwrap();
        assert!(matches!(outcome, ToolOutcome::TimedOut));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-program-poboys");
        assert!(run_bounded(cmd, Duration::from_secs(1)).await.is_err());
    }
}
