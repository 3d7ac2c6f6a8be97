//! Combining a video artifact and a waveform through the external encoder.
//!
//! The muxer never touches its inputs: whatever happens, the raw video and the waveform stay
//! on disk so a failed mux still leaves usable partial results.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::encode::ensure_parent_dir;
use crate::process::{ProcessError, run_cancellable};

/// Why a mux did not produce its output.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MuxFailure {
    /// The encoder binary could not be started.
    EncoderMissing { detail: String },
    NonZeroExit { code: Option<i32>, stderr: String },
    TimedOut { seconds: u64 },
    /// Exit status was zero but the output file is not there.
    MissingOutput,
    /// The output location could not be prepared, or names one of the inputs.
    Io { detail: String },
    /// The run was interrupted and the encoder killed.
    Cancelled,
}

impl std::fmt::Display for MuxFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EncoderMissing { detail } => write!(f, "encoder unavailable: {detail}"),
            Self::NonZeroExit { code, stderr } => match code {
                Some(c) => write!(f, "encoder exited with code {c}: {stderr}"),
                None => write!(f, "encoder terminated by signal: {stderr}"),
            },
            Self::TimedOut { seconds } => write!(f, "encoder timed out after {seconds}s"),
            Self::MissingOutput => write!(f, "encoder reported success but wrote no output"),
            Self::Io { detail } => write!(f, "cannot write mux output: {detail}"),
            Self::Cancelled => write!(f, "interrupted"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxOutcome {
    Muxed { path: PathBuf },
    Failed { reason: MuxFailure },
}

impl MuxOutcome {
    pub fn is_muxed(&self) -> bool {
        matches!(self, Self::Muxed { .. })
    }
}

/// External encoder invocation with a hard deadline.
#[derive(Clone, Debug)]
pub struct Muxer {
    pub program: OsString,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl Muxer {
    pub fn new(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn ffmpeg(timeout: Duration) -> Self {
        Self::new("ffmpeg", timeout)
    }

    /// Kill the encoder when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy the video stream, encode the waveform to AAC, stop at the shorter input.
    #[tracing::instrument(skip(self), fields(program = ?self.program))]
    pub fn mux(&self, video: &Path, audio: &Path, out: &Path) -> MuxOutcome {
        self.run(self.mux_command(video, audio, out), &[video, audio], out)
    }

    /// Loop a still image over the waveform. Used when there is no animated video.
    #[tracing::instrument(skip(self), fields(program = ?self.program))]
    pub fn mux_still(&self, image: &Path, audio: &Path, out: &Path) -> MuxOutcome {
        self.run(self.mux_still_command(image, audio, out), &[image, audio], out)
    }

    /// The command [`Muxer::mux`] runs.
    pub fn mux_command(&self, video: &Path, audio: &Path, out: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-shortest", "-c:v", "copy", "-c:a", "aac"])
            .arg(out);
        cmd
    }

    /// The command [`Muxer::mux_still`] runs.
    pub fn mux_still_command(&self, image: &Path, audio: &Path, out: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-y", "-loop", "1", "-i"])
            .arg(image)
            .arg("-i")
            .arg(audio)
            .args([
                "-c:v",
                "libx264",
                "-tune",
                "stillimage",
                "-c:a",
                "aac",
                "-b:a",
                "192k",
                "-pix_fmt",
                "yuv420p",
                "-vf",
                "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                "-shortest",
            ])
            .arg(out);
        cmd
    }

    fn run(&self, cmd: Command, inputs: &[&Path], out: &Path) -> MuxOutcome {
        if let Err(detail) = prepare_output(inputs, out) {
            tracing::warn!(%detail, "mux output not writable");
            return MuxOutcome::Failed {
                reason: MuxFailure::Io { detail },
            };
        }
        let outcome = match run_cancellable(cmd, self.timeout, &self.cancel) {
            Ok(output) if output.success() => {
                if out.is_file() {
                    MuxOutcome::Muxed {
                        path: out.to_path_buf(),
                    }
                } else {
                    MuxOutcome::Failed {
                        reason: MuxFailure::MissingOutput,
                    }
                }
            }
            Ok(output) => MuxOutcome::Failed {
                reason: MuxFailure::NonZeroExit {
                    code: output.status.code(),
                    stderr: last_lines(&output.stderr_lossy(), 5),
                },
            },
            Err(ProcessError::TimedOut(d)) => MuxOutcome::Failed {
                reason: MuxFailure::TimedOut {
                    seconds: d.as_secs(),
                },
            },
            Err(ProcessError::Spawn(e)) => MuxOutcome::Failed {
                reason: MuxFailure::EncoderMissing {
                    detail: e.to_string(),
                },
            },
            Err(ProcessError::Cancelled) => MuxOutcome::Failed {
                reason: MuxFailure::Cancelled,
            },
            Err(ProcessError::Wait(e)) => MuxOutcome::Failed {
                reason: MuxFailure::Io {
                    detail: format!("waiting for the encoder: {e}"),
                },
            },
        };
        match &outcome {
            MuxOutcome::Muxed { path } => tracing::info!(out = %path.display(), "muxed"),
            MuxOutcome::Failed { reason } => tracing::warn!(%reason, "mux failed"),
        }
        outcome
    }
}

/// Create the parent directory and clear a stale `out`, so only a fresh file counts as output.
fn prepare_output(inputs: &[&Path], out: &Path) -> Result<(), String> {
    if inputs.iter().any(|i| same_file(i, out)) {
        return Err(format!("'{}' is also an input", out.display()));
    }
    ensure_parent_dir(out).map_err(|e| e.to_string())?;
    match std::fs::remove_file(out) {
        Ok(()) => {
            tracing::debug!(out = %out.display(), "removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("cannot replace '{}': {e}", out.display())),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn last_lines(s: &str, n: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = PathBuf::from("target/mux_test").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_encoder_leaves_inputs_untouched() {
        let dir = scratch("missing");
        let video = dir.join("in.avi");
        let audio = dir.join("in.wav");
        std::fs::write(&video, b"video-bytes").unwrap();
        std::fs::write(&audio, b"audio-bytes").unwrap();
        let out = dir.join("out.mp4");
        let _ = std::fs::remove_file(&out);

        let muxer = Muxer::new("definitely-not-an-encoder", Duration::from_secs(5));
        let outcome = muxer.mux(&video, &audio, &out);
        assert!(matches!(
            outcome,
            MuxOutcome::Failed {
                reason: MuxFailure::EncoderMissing { .. }
            }
        ));
        assert_eq!(std::fs::read(&video).unwrap(), b"video-bytes");
        assert_eq!(std::fs::read(&audio).unwrap(), b"audio-bytes");
        assert!(!out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_without_output_is_a_failure() {
        let dir = scratch("silent");
        let out = dir.join("never.mp4");
        let _ = std::fs::remove_file(&out);
        let muxer = Muxer::new("true", Duration::from_secs(5));
        let outcome = muxer.mux(&dir.join("a"), &dir.join("b"), &out);
        assert_eq!(
            outcome,
            MuxOutcome::Failed {
                reason: MuxFailure::MissingOutput
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported_with_code() {
        let dir = scratch("fails");
        let muxer = Muxer::new("false", Duration::from_secs(5));
        let outcome = muxer.mux(&dir.join("a"), &dir.join("b"), &dir.join("c.mp4"));
        assert!(matches!(
            outcome,
            MuxOutcome::Failed {
                reason: MuxFailure::NonZeroExit { code: Some(1), .. }
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn stale_output_does_not_count_as_success() {
        let dir = scratch("stale");
        let out = dir.join("old.mp4");
        std::fs::write(&out, b"from an earlier run").unwrap();
        let muxer = Muxer::new("true", Duration::from_secs(5));
        let outcome = muxer.mux(&dir.join("a"), &dir.join("b"), &out);
        assert_eq!(
            outcome,
            MuxOutcome::Failed {
                reason: MuxFailure::MissingOutput
            }
        );
        assert!(!out.exists());
    }

    #[test]
    fn output_naming_an_input_is_refused() {
        let dir = scratch("same");
        let video = dir.join("clip.avi");
        std::fs::write(&video, b"video-bytes").unwrap();
        let muxer = Muxer::new("definitely-not-an-encoder", Duration::from_secs(5));
        let outcome = muxer.mux(&video, &dir.join("a.wav"), &video);
        assert!(matches!(
            outcome,
            MuxOutcome::Failed {
                reason: MuxFailure::Io { .. }
            }
        ));
        assert_eq!(std::fs::read(&video).unwrap(), b"video-bytes");
    }

    #[test]
    fn unwritable_output_dir_is_an_io_failure() {
        let dir = scratch("blocked");
        // a regular file where the parent directory should be
        let blocker = dir.join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let muxer = Muxer::new("definitely-not-an-encoder", Duration::from_secs(5));
        let outcome = muxer.mux(&dir.join("a"), &dir.join("b"), &blocker.join("out.mp4"));
        match outcome {
            MuxOutcome::Failed {
                reason: reason @ MuxFailure::Io { .. },
            } => assert!(reason.to_string().starts_with("cannot write mux output")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cancelled_muxer_never_starts_the_encoder() {
        let dir = scratch("cancelled");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let muxer = Muxer::new("definitely-not-an-encoder", Duration::from_secs(5)).with_cancel(cancel);
        let outcome = muxer.mux(&dir.join("a"), &dir.join("b"), &dir.join("c.mp4"));
        assert_eq!(
            outcome,
            MuxOutcome::Failed {
                reason: MuxFailure::Cancelled
            }
        );
    }

    #[test]
    fn mux_command_lists_inputs_then_output() {
        let muxer = Muxer::ffmpeg(Duration::from_secs(5));
        let cmd = muxer.mux_command(Path::new("r/ana.avi"), Path::new("r/ana.wav"), Path::new("r/ana_final.mp4"));
        assert_eq!(
            crate::process::command_line(&cmd),
            "ffmpeg -y -i r/ana.avi -i r/ana.wav -shortest -c:v copy -c:a aac r/ana_final.mp4"
        );
    }

    #[test]
    fn last_lines_keeps_the_tail() {
        assert_eq!(last_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(last_lines("a", 5), "a");
    }
}
