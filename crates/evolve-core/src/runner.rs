//! External process execution with live output capture.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::pin;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::log::LogLevel;

/// Exit code reported when the process could not be started or awaited.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// How long output is still read after the child itself has exited.
pub const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Where an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    Stdout,
    Stderr,
    /// Emitted by the runner itself (launch, exit, cancellation)
    Runner,
}

/// One line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub channel: OutputChannel,
    pub level: LogLevel,
    pub text: String,
}

impl OutputLine {
    pub fn runner(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            channel: OutputChannel::Runner,
            level,
            text: text.into(),
        }
    }
}

/// Final status of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// 0 = success. Signal terminations report -1.
    pub exit_code: i32,
    pub cancelled: bool,
}

impl ProcessOutcome {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            cancelled: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.cancelled
    }
}

/// Trigger side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observing side of a cancellation signal. Dropping the handle never cancels.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        CancelHandle::new().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Runs an external program, streaming its combined output.
///
/// Every line must be sent on `lines` as soon as it is read, in the order the
/// child produced it. Launch failures are reported as an ERROR line plus a
/// non-zero outcome, never as a panic or a silent success.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn execute(
        &self,
        argv: &[String],
        working_dir: &Path,
        lines: mpsc::Sender<OutputLine>,
        cancel: CancelSignal,
    ) -> ProcessOutcome;
}

/// `ProcessRunner` backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    /// Tag stderr lines as ERROR
    pub stderr_as_error: bool,
}

impl TokioProcessRunner {
    pub fn new(stderr_as_error: bool) -> Self {
        Self { stderr_as_error }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn execute(
        &self,
        argv: &[String],
        working_dir: &Path,
        lines: mpsc::Sender<OutputLine>,
        mut cancel: CancelSignal,
    ) -> ProcessOutcome {
        let Some((program, args)) = argv.split_first() else {
            let _ = lines
                .send(OutputLine::runner(LogLevel::Error, "Empty command"))
                .await;
            return ProcessOutcome::exited(LAUNCH_FAILURE_EXIT_CODE);
        };

        let _ = lines
            .send(OutputLine::runner(
                LogLevel::Info,
                format!("Running: {}", argv.join(" ")),
            ))
            .await;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so cancellation reaches forked workers too
        #[cfg(unix)]
        command.process_group(0);
        let spawned = command.spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch {}: {}", program, e);
                let _ = lines
                    .send(OutputLine::runner(
                        LogLevel::Error,
                        format!("Failed to launch {program}: {e}"),
                    ))
                    .await;
                return ProcessOutcome::exited(LAUNCH_FAILURE_EXIT_CODE);
            }
        };
        debug!(pid = ?child.id(), "Spawned {}", program);

        let stderr_level = if self.stderr_as_error {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let drain_stdout = forward_lines(
            child.stdout.take(),
            OutputChannel::Stdout,
            LogLevel::Info,
            lines.clone(),
        );
        let drain_stderr = forward_lines(
            child.stderr.take(),
            OutputChannel::Stderr,
            stderr_level,
            lines.clone(),
        );

        let wait = async {
            tokio::select! {
                status = child.wait() => status.map(|s| (s, false)),
                _ = cancel.cancelled() => {
                    warn!("Cancelling {}", program);
                    kill_process_tree(&mut child, program);
                    child.wait().await.map(|s| (s, true))
                }
            }
        };
        let drains = async {
            tokio::join!(drain_stdout, drain_stderr);
        };

        let mut wait = pin!(wait);
        let mut drains = pin!(drains);
        let mut drained = false;
        let status = loop {
            tokio::select! {
                status = &mut wait => break status,
                () = &mut drains, if !drained => drained = true,
            }
        };
        // A surviving descendant can hold the pipes open past the child's exit
        if !drained && timeout(DRAIN_GRACE, drains).await.is_err() {
            warn!(
                "{} exited but its output pipes stayed open; stopped reading after {:?}",
                program, DRAIN_GRACE
            );
        }

        let outcome = match status {
            Ok((status, cancelled)) => ProcessOutcome {
                exit_code: status.code().unwrap_or(-1),
                cancelled,
            },
            Err(e) => {
                let _ = lines
                    .send(OutputLine::runner(
                        LogLevel::Error,
                        format!("Failed waiting for {program}: {e}"),
                    ))
                    .await;
                return ProcessOutcome::exited(LAUNCH_FAILURE_EXIT_CODE);
            }
        };

        let closing = if outcome.cancelled {
            OutputLine::runner(LogLevel::Error, format!("{program} was cancelled"))
        } else {
            OutputLine::runner(
                LogLevel::Info,
                format!("{program} exited with code {}", outcome.exit_code),
            )
        };
        let _ = lines.send(closing).await;
        outcome
    }
}

/// Kill the child's whole process group, falling back to the child alone.
fn kill_process_tree(child: &mut Child, program: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => warn!("Failed to kill process group of {}: {}", program, e),
        }
    }
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill {}: {}", program, e);
    }
}

/// Send each line of `reader` until EOF.
///
/// Keeps draining after the receiver is gone so the child never blocks on a
/// full pipe. Carriage-return redraws (progress bars) collapse to the last
/// segment.
async fn forward_lines<R>(
    reader: Option<R>,
    channel: OutputChannel,
    level: LogLevel,
    tx: mpsc::Sender<OutputLine>,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(raw)) => {
                let text = String::from_utf8_lossy(&raw);
                let text = text
                    .split('\r')
                    .filter(|s| !s.is_empty())
                    .last()
                    .unwrap_or_default()
                    .to_string();
                if tx.is_closed() {
                    continue;
                }
                let _ = tx
                    .send(OutputLine {
                        channel,
                        level,
                        text,
                    })
                    .await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading {:?}: {}", channel, e);
                break;
            }
        }
    }
}
