use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Frame, FrameIndex};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::process::{ProcessError, kill_and_reap, wait_child};

/// Options for [`FfmpegSink`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    /// Encoder executable, `ffmpeg` unless overridden.
    pub program: String,
    /// How long `end` waits for the encoder to finish after the last frame.
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            program: "ffmpeg".to_owned(),
            timeout: Duration::from_secs(120),
            cancel: CancellationToken::new(),
        }
    }
}

/// Spawns the system `ffmpeg` and streams raw RGBA frames to its stdin.
///
/// When `SinkConfig.audio` names a waveform file it is muxed in with `-shortest`.
/// Dropping an unfinished sink kills the encoder.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
        }
    }

    /// Kill an unfinished encoder and reset. Whatever it wrote stays on disk.
    pub fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            kill_and_reap(&mut child);
            tracing::debug!(program = %self.opts.program, "encoder aborted");
        }
        self.stderr_drain = None;
        self.cfg = None;
    }

    fn build_command(&self, cfg: &SinkConfig) -> Command {
        let mut cmd = Command::new(&self.opts.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.opts.overwrite { "-y" } else { "-n" });
        cmd.args(encoder_args(cfg));
        cmd.arg(&self.opts.out_path);
        cmd
    }
}

/// Arguments between the overwrite flag and the output path.
fn encoder_args(cfg: &SinkConfig) -> Vec<String> {
    let mut args: Vec<String> = [
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    args.push(format!("{}x{}", cfg.width, cfg.height));
    args.extend(["-r".to_owned(), cfg.fps.to_string()]);
    args.extend(["-i".to_owned(), "pipe:0".to_owned()]);

    if let Some(audio) = cfg.audio.as_ref() {
        args.extend(["-i".to_owned(), audio.display().to_string()]);
    }

    // yuv420p needs even dimensions.
    if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
        args.extend([
            "-vf".to_owned(),
            "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_owned(),
        ]);
    }
    args.extend(
        ["-c:v", "libx264", "-pix_fmt", "yuv420p"]
            .into_iter()
            .map(str::to_owned),
    );
    if cfg.audio.is_some() {
        args.extend(["-c:a", "aac", "-shortest"].into_iter().map(str::to_owned));
    } else {
        args.push("-an".to_owned());
    }
    args.extend(["-movflags".to_owned(), "+faststart".to_owned()]);
    args
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ToonsyncResult<()> {
        cfg.validate()?;
        if let Some(audio) = cfg.audio.as_ref()
            && !audio.exists()
        {
            return Err(ToonsyncError::validation(format!(
                "audio input '{}' does not exist",
                audio.display()
            )));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ToonsyncError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        let mut child = self.build_command(&cfg).spawn().map_err(|e| {
            ToonsyncError::encoder(format!(
                "failed to spawn {} (is it installed and on PATH?): {e}",
                self.opts.program
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToonsyncError::encoder("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToonsyncError::encoder("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> ToonsyncResult<()> {
        if self.opts.cancel.is_cancelled() {
            self.abort();
            return Err(ToonsyncError::Cancelled);
        }
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ToonsyncError::evaluation("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(ToonsyncError::evaluation(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ToonsyncError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ToonsyncError::evaluation("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            ToonsyncError::encoder(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> ToonsyncResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ToonsyncError::evaluation("ffmpeg sink not started"))?;

        let status = match wait_child(&mut child, self.opts.timeout, &self.opts.cancel) {
            Ok(status) => status,
            Err(e) => {
                // The drain thread may outlive a killed child's grandchildren; leave it detached.
                self.stderr_drain = None;
                self.cfg = None;
                return Err(match e {
                    ProcessError::TimedOut(d) => ToonsyncError::encoder(format!(
                        "{} did not finish within {:.1}s",
                        self.opts.program,
                        d.as_secs_f64()
                    )),
                    other => other.into_error(&self.opts.program, ToonsyncError::Encoder),
                });
            }
        };
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ToonsyncError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ToonsyncError::encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ToonsyncError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        self.cfg = None;
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ToonsyncResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return `true` when `name` resolves to an executable on `PATH`.
///
/// Does not run the tool; some tools exit non-zero for every version flag.
pub fn is_tool_on_path(name: &str) -> bool {
    which::which(name).is_ok()
}
