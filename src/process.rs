//! Subprocess execution with merged output streaming
//!
//! Runs one download-tool invocation, merging stdout and stderr into a
//! single ordered line stream, and polls cooperatively for scheduler
//! stops and job cancellation between reads. The child process never
//! outlives a call: every return path has either awaited a natural exit
//! or killed and reaped the child.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Result};

/// Interval at which the runner re-checks stop/cancel flags and child
/// liveness while no output is arriving
pub(crate) const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How one tool invocation ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// The process exited on its own
    Completed {
        /// Process exit code (-1 when the process died to a signal)
        exit_code: i32,
        /// Last non-empty output line across both streams
        last_line: String,
    },
    /// The process was killed after a scheduler stop, a job cancel, or a
    /// stream read error; no exit code is reported
    Interrupted,
}

/// Flags the runner polls while the child is alive
pub(crate) struct RunHooks {
    /// Scheduler-level running intent; cleared by stop()
    pub(crate) scheduler_running: Arc<AtomicBool>,
    /// Per-job cancellation
    pub(crate) cancel: CancellationToken,
}

impl RunHooks {
    fn interrupted(&self) -> bool {
        !self.scheduler_running.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }
}

enum StreamItem {
    Line(String),
    ReadError(std::io::Error),
}

/// Splits a byte stream into lines
///
/// A line ends at `\n`, or at `\r` not immediately preceded by `\n`, so
/// progress bars that rewrite their line with bare `\r` stream as
/// individual lines. Emitted lines carry no terminator bytes; a `\r`
/// that is part of a `\n\r` sequence is dropped as a stray.
struct LineAssembler {
    buf: Vec<u8>,
    prev: u8,
}

impl LineAssembler {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            prev: 0,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8], mut emit: impl FnMut(String)) {
        for &byte in bytes {
            if byte == b'\n' || (byte == b'\r' && self.prev != b'\n') {
                emit(String::from_utf8_lossy(&self.buf).into_owned());
                self.buf.clear();
            } else if byte != b'\r' {
                self.buf.push(byte);
            }
            self.prev = byte;
        }
    }

    /// Trailing unterminated fragment at EOF, if any
    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

/// Reads one pipe to EOF, shipping assembled non-empty lines
async fn pump_stream<R>(mut reader: R, tx: mpsc::UnboundedSender<StreamItem>)
where
    R: AsyncRead + Unpin,
{
    let mut assembler = LineAssembler::new();
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                assembler.push_bytes(&chunk[..n], |line| {
                    if !line.is_empty() {
                        let _ = tx.send(StreamItem::Line(line));
                    }
                });
            }
            Err(error) => {
                let _ = tx.send(StreamItem::ReadError(error));
                return;
            }
        }
    }

    if let Some(rest) = assembler.finish() {
        let _ = tx.send(StreamItem::Line(rest));
    }
}

async fn kill_and_reap(child: &mut Child) {
    // Killing an already-exited child reports an error; only worth a debug line
    if let Err(error) = child.start_kill() {
        tracing::debug!(error = %error, "failed to signal child process");
    }
    if let Err(error) = child.wait().await {
        tracing::debug!(error = %error, "failed to reap child process");
    }
}

/// Run one tool invocation, streaming merged output line by line
///
/// `on_line` receives every non-empty line as it is assembled, in stream
/// order. Returns [`RunOutcome::Interrupted`] when the run was cut short
/// by a stop, a cancel, or a read error; `Err` only when the process
/// could not be spawned or reaped.
pub(crate) async fn run_streaming(
    program: &Path,
    args: &[String],
    hooks: &RunHooks,
    mut on_line: impl FnMut(&str),
) -> Result<RunOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DownloadError::SpawnFailed {
            program: program.to_path_buf(),
            source,
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_stream(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_stream(stderr, tx.clone()));
    }
    // The channel closes when both pump tasks finish
    drop(tx);

    let mut last_line = String::new();
    let mut poll = tokio::time::interval(OUTPUT_POLL_INTERVAL);

    let status = loop {
        if hooks.interrupted() {
            kill_and_reap(&mut child).await;
            return Ok(RunOutcome::Interrupted);
        }

        tokio::select! {
            item = rx.recv() => match item {
                Some(StreamItem::Line(line)) => {
                    on_line(&line);
                    last_line = line;
                }
                Some(StreamItem::ReadError(error)) => {
                    tracing::info!(error = %error, "output stream read failed, interrupting download");
                    kill_and_reap(&mut child).await;
                    return Ok(RunOutcome::Interrupted);
                }
                None => break child.wait().await?,
            },
            _ = poll.tick() => {
                // An exited child can leave its pipes held open by
                // grandchildren; liveness must be checked independently
                // of EOF
                if let Some(status) = child.try_wait()? {
                    while let Ok(item) = rx.try_recv() {
                        if let StreamItem::Line(line) = item {
                            on_line(&line);
                            last_line = line;
                        }
                    }
                    break status;
                }
            }
        }
    };

    // A stop that raced the natural exit still reports as an interruption
    if hooks.interrupted() {
        return Ok(RunOutcome::Interrupted);
    }

    Ok(RunOutcome::Completed {
        exit_code: status.code().unwrap_or(-1),
        last_line,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn collect_lines(input: &[&[u8]]) -> Vec<String> {
        let mut assembler = LineAssembler::new();
        let mut lines = Vec::new();
        for chunk in input {
            assembler.push_bytes(chunk, |line| lines.push(line));
        }
        if let Some(rest) = assembler.finish() {
            lines.push(rest);
        }
        lines
    }

    // --- LineAssembler ---

    #[test]
    fn newline_terminates_lines() {
        assert_eq!(collect_lines(&[b"one\ntwo\n"]), vec!["one", "two"]);
    }

    #[test]
    fn bare_carriage_return_terminates_lines() {
        assert_eq!(
            collect_lines(&[b"10%\r20%\r30%\n"]),
            vec!["10%", "20%", "30%"],
            "progress bars rewrite with bare \\r and must stream as separate lines"
        );
    }

    #[test]
    fn crlf_yields_one_line_and_one_empty() {
        // \r terminates, then \n terminates the now-empty buffer
        assert_eq!(collect_lines(&[b"done\r\n"]), vec!["done", ""]);
    }

    #[test]
    fn carriage_return_after_newline_is_not_a_terminator() {
        assert_eq!(
            collect_lines(&[b"a\n\rb\n"]),
            vec!["a", "b"],
            "a \\r directly after \\n is a stray, not a boundary"
        );
    }

    #[test]
    fn terminator_split_across_chunks() {
        assert_eq!(
            collect_lines(&[b"par", b"tial\nnext", b"\n"]),
            vec!["partial", "next"]
        );
    }

    #[test]
    fn trailing_fragment_is_flushed_at_eof() {
        assert_eq!(collect_lines(&[b"no newline"]), vec!["no newline"]);
    }

    #[test]
    fn lines_carry_no_terminator_bytes() {
        for line in collect_lines(&[b"x\r", b"y\n"]) {
            assert!(
                !line.contains('\r') && !line.contains('\n'),
                "line {line:?} must not contain terminator bytes"
            );
        }
    }

    // --- run_streaming against real processes ---

    fn test_hooks() -> RunHooks {
        RunHooks {
            scheduler_running: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
        }
    }

    fn sh_args(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn completed_run_reports_exit_code_and_last_nonempty_line() {
        let hooks = test_hooks();
        let mut lines = Vec::new();

        let outcome = run_streaming(
            Path::new("/bin/sh"),
            &sh_args("printf 'one\\ntwo\\n\\n'; exit 3"),
            &hooks,
            |line| lines.push(line.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                exit_code: 3,
                last_line: "two".into()
            },
            "last_line must skip the trailing empty line"
        );
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_lines_are_merged_into_the_stream() {
        let hooks = test_hooks();
        let mut lines = Vec::new();

        let outcome = run_streaming(
            Path::new("/bin/sh"),
            &sh_args("echo out; echo err 1>&2"),
            &hooks,
            |line| lines.push(line.to_string()),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, RunOutcome::Completed { exit_code: 0, .. }));
        assert!(lines.contains(&"out".to_string()), "stdout line missing: {lines:?}");
        assert!(lines.contains(&"err".to_string()), "stderr line missing: {lines:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn carriage_return_progress_streams_line_by_line() {
        let hooks = test_hooks();
        let mut lines = Vec::new();

        run_streaming(
            Path::new("/bin/sh"),
            &sh_args("printf 'a\\rb\\rc\\n'"),
            &hooks,
            |line| lines.push(line.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_token_kills_a_long_running_process() {
        let hooks = test_hooks();
        let cancel = hooks.cancel.clone();
        let args = sh_args("sleep 30");

        let start = std::time::Instant::now();
        let (outcome, ()) = tokio::join!(
            run_streaming(Path::new("/bin/sh"), &args, &hooks, |_| {}),
            async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                cancel.cancel();
            }
        );

        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "cancel must kill the process within the poll interval, not wait out the sleep"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scheduler_stop_interrupts_a_running_process() {
        let hooks = test_hooks();
        let running = hooks.scheduler_running.clone();
        let args = sh_args("sleep 30");

        let start = std::time::Instant::now();
        let (outcome, ()) = tokio::join!(
            run_streaming(Path::new("/bin/sh"), &args, &hooks, |_| {}),
            async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                running.store(false, Ordering::SeqCst);
            }
        );

        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pre_cancelled_hooks_never_report_completion() {
        let hooks = test_hooks();
        hooks.cancel.cancel();

        let outcome = run_streaming(
            Path::new("/bin/sh"),
            &sh_args("echo never"),
            &hooks,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Interrupted,
            "a cancel observed before the first loop iteration must interrupt"
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error_not_an_interruption() {
        let hooks = test_hooks();
        let missing = PathBuf::from("/nonexistent/media-dl-test-binary");

        let result = run_streaming(&missing, &[], &hooks, |_| {}).await;

        match result {
            Err(crate::error::Error::Download(DownloadError::SpawnFailed { program, .. })) => {
                assert_eq!(program, missing);
            }
            other => panic!("expected SpawnFailed, got {other:?}"),
        }
    }
}
