//! Bounded execution of external tools.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::foundation::error::{ToonsyncError, ToonsyncResult};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }
}

/// Why [`run_with_timeout`] could not produce a [`ProcessOutput`].
#[derive(Debug)]
pub enum ProcessError {
    /// The program could not be started; `NotFound` means it is not installed.
    Spawn(std::io::Error),
    /// Still running at the deadline; the child was killed and reaped.
    TimedOut(Duration),
    /// The run was interrupted; the child was killed and reaped.
    Cancelled,
    Wait(std::io::Error),
}

impl ProcessError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Map into the crate error, naming `what` was being run.
    pub fn into_error(self, what: &str, as_err: fn(String) -> ToonsyncError) -> ToonsyncError {
        match self {
            Self::Spawn(e) => as_err(format!("failed to start {what} ({:?}): {e}", e.kind())),
            Self::TimedOut(d) => {
                ToonsyncError::timeout(format!("{what} did not finish within {:.1}s", d.as_secs_f64()))
            }
            Self::Cancelled => ToonsyncError::Cancelled,
            Self::Wait(e) => as_err(format!("failed to wait for {what}: {e}")),
        }
    }
}

/// Run `cmd` to completion or until `timeout` elapses.
///
/// stdout and stderr are drained on helper threads so a chatty child cannot block on a full
/// pipe. stdin is closed.
pub fn run_with_timeout(cmd: Command, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
    run_cancellable(cmd, timeout, &CancellationToken::new())
}

/// [`run_with_timeout`] that also kills the child as soon as `cancel` fires.
pub fn run_cancellable(
    mut cmd: Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    tracing::debug!(program = ?cmd.get_program(), ?timeout, "spawning");
    let mut child = cmd.spawn().map_err(ProcessError::Spawn)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = wait_child(&mut child, timeout, cancel).inspect_err(|e| {
        if !matches!(e, ProcessError::Wait(_)) {
            tracing::warn!(program = ?cmd.get_program(), "child killed: {e:?}");
        }
    })?;

    Ok(ProcessOutput {
        status,
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
    })
}

/// Poll `child` until it exits, `timeout` elapses or `cancel` fires. In the last two cases
/// the child is killed and reaped before returning.
pub(crate) fn wait_child(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ExitStatus, ProcessError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if cancel.is_cancelled() => {
                kill_and_reap(child);
                return Err(ProcessError::Cancelled);
            }
            Ok(None) if Instant::now() >= deadline => {
                kill_and_reap(child);
                return Err(ProcessError::TimedOut(timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(ProcessError::Wait(e)),
        }
    }
}

pub(crate) fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut r: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = r.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Shorthand used by callers that only care about the crate error.
pub(crate) fn run_checked(
    cmd: Command,
    timeout: Duration,
    cancel: &CancellationToken,
    what: &str,
    as_err: fn(String) -> ToonsyncError,
) -> ToonsyncResult<ProcessOutput> {
    run_cancellable(cmd, timeout, cancel).map_err(|e| e.into_error(what, as_err))
}

/// `cmd` as a single POSIX shell line, arguments quoted where needed.
pub fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|a| shell_quote(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
