//! Supervised external process execution.
//!
//! Spawns a command, feeds it a request body on stdin, drains stdout and
//! stderr concurrently, and enforces a hard wall-clock deadline around the
//! wait and the drains. A child still running at the deadline is killed and
//! reaped; pipes held open past it by a grandchild are abandoned.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use answerline_shared::{AnswerlineError, Result};

/// Captured result of a process that exited on its own.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was ended by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run `argv` to completion or until `hard_timeout` elapses.
///
/// Returns [`AnswerlineError::Timeout`] if the child had to be killed and
/// [`AnswerlineError::Process`] if it could not be spawned or awaited.
pub async fn run_supervised(
    argv: &[String],
    stdin_body: Option<Vec<u8>>,
    hard_timeout: Duration,
) -> Result<ProcessOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| AnswerlineError::validation("process command is empty"))?;

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .stdin(if stdin_body.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AnswerlineError::Process(format!("failed to spawn `{program}`: {e}")))?;

    debug!(program = %program, pid = ?child.id(), "process spawned");

    // Written from a task so a child that never reads stdin cannot stall the deadline.
    let stdin_task = match (child.stdin.take(), stdin_body) {
        (Some(mut stdin), Some(body)) => Some(tokio::spawn(async move {
            let _ = stdin.write_all(&body).await;
            let _ = stdin.shutdown().await;
        })),
        _ => None,
    };

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| AnswerlineError::Process("missing stdout pipe".into()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| AnswerlineError::Process("missing stderr pipe".into()))?;

    let mut stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        buf
    });
    let mut stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let status = match tokio::time::timeout(hard_timeout, child.wait()).await {
        Ok(result) => {
            result.map_err(|e| AnswerlineError::Process(format!("failed to wait for `{program}`: {e}")))?
        }
        Err(_) => {
            warn!(
                program = %program,
                timeout_ms = hard_timeout.as_millis(),
                "process exceeded hard deadline, killing"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "kill failed");
            }
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            if let Some(task) = stdin_task {
                task.abort();
            }
            return Err(AnswerlineError::Timeout(hard_timeout));
        }
    };

    if let Some(task) = stdin_task {
        task.abort();
    }

    // A background child can keep the pipes open after the direct child exits.
    let remaining = hard_timeout.saturating_sub(start.elapsed());
    let drained = tokio::time::timeout(remaining, async {
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (stdout, stderr)
    })
    .await;
    let (stdout, stderr) = match drained {
        Ok(pipes) => pipes,
        Err(_) => {
            warn!(
                program = %program,
                timeout_ms = hard_timeout.as_millis(),
                "output pipes still open at hard deadline, abandoning"
            );
            stdout_task.abort();
            stderr_task.abort();
            return Err(AnswerlineError::Timeout(hard_timeout));
        }
    };

    let output = ProcessOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        elapsed: start.elapsed(),
    };

    debug!(
        program = %program,
        exit_code = ?output.code,
        stdout_bytes = stdout.len(),
        duration_ms = output.elapsed.as_millis(),
        "process exited"
    );

    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "process-test".into()]
    }

    #[tokio::test]
    async fn captures_stdout_stderr_and_code() {
        let output = run_supervised(
            &sh("printf out; printf err >&2; exit 3"),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
    }

    #[tokio::test]
    async fn feeds_stdin_body() {
        let output = run_supervised(
            &sh("cat"),
            Some(b"request body".to_vec()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout, "request body");
    }

    #[tokio::test]
    async fn kills_process_at_hard_deadline() {
        let start = Instant::now();
        let err = run_supervised(&sh("exec sleep 30"), None, Duration::from_millis(300))
            .await
            .unwrap_err();

        assert!(matches!(err, AnswerlineError::Timeout(d) if d == Duration::from_millis(300)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn background_child_holding_pipes_hits_deadline() {
        let start = Instant::now();
        let err = run_supervised(&sh("sleep 8 & printf x; exit 0"), None, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AnswerlineError::Timeout(d) if d == Duration::from_secs(1)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_program_is_process_error() {
        let argv = vec!["answerline-no-such-program".to_string()];
        let err = run_supervised(&argv, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerlineError::Process(_)));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = run_supervised(&[], None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerlineError::Validation { .. }));
    }
}
