use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{BackendJob, BackendOutcome, LipSyncBackend};
use crate::encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig, is_tool_on_path};
use crate::face::MouthLocation;
use crate::filter::{darken_region, erode_region};
use crate::foundation::core::{FaceBox, Frame, FrameIndex};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::speech::wav_envelope;
use crate::status::{Stage, Status, StatusSink};

/// Loudness above which the mouth is drawn open.
const OPEN_THRESHOLD: f32 = 0.3;
const MAX_ERODE: u32 = 5;
const INTERIOR_DARKEN: f32 = 0.8;

/// Loudness-driven mouth region effect, encoded straight to the final video.
///
/// Writes no intermediate file; the waveform goes in as a second `ffmpeg` input.
pub struct EnvelopeBackend {
    program: String,
    timeout: Duration,
}

impl EnvelopeBackend {
    /// `timeout` bounds the encoder's finish after the last frame.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// The frame for loudness `intensity` in `[0, 1]`.
    pub fn frame_for(base: &Frame, region: FaceBox, intensity: f32) -> Frame {
        let mut out = base.clone();
        if intensity > OPEN_THRESHOLD {
            let kernel = ((10.0 * intensity) as u32).min(MAX_ERODE);
            erode_region(&mut out, region, kernel);
            darken_region(&mut out, region, INTERIOR_DARKEN);
        }
        out
    }
}

/// Deletes a half-written output unless the encode finished.
struct PartialOutputGuard(Option<PathBuf>);

impl PartialOutputGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for PartialOutputGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take()
            && std::fs::remove_file(&path).is_ok()
        {
            tracing::debug!(path = %path.display(), "removed partial output");
        }
    }
}

/// Lower 40% of the face box grown by a fifth on each side, or the polygon bounds without a
/// face box. Clamped into the image.
pub fn mouth_region(location: &MouthLocation, width: u32, height: u32) -> Option<FaceBox> {
    let region = match location.face {
        Some(face) => {
            let grown = face.expand(0.2).clamp_to(width, height);
            let top = (f64::from(grown.height) * 0.6) as i32;
            FaceBox::new(grown.x, grown.y + top, grown.width, grown.height - top)
        }
        None => location.polygon.bounding_box()?,
    }
    .clamp_to(width, height);
    (!region.is_empty()).then_some(region)
}

impl LipSyncBackend for EnvelopeBackend {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn is_available(&self) -> bool {
        is_tool_on_path(&self.program)
    }

    fn render(
        &self,
        job: &BackendJob<'_>,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<BackendOutcome> {
        let (w, h) = job.frame.dimensions();
        let region = mouth_region(job.location, w, h)
            .ok_or_else(|| ToonsyncError::evaluation("mouth region is empty"))?;
        let envelope = wav_envelope(job.audio, job.fps, job.frames_count)?;

        status.emit(Status::Stage(Stage::Animating));
        let out = job.layout.final_path();
        let mut opts = FfmpegSinkOpts::new(&out);
        opts.program = self.program.clone();
        opts.timeout = self.timeout;
        opts.cancel = job.cancel.clone();
        // Declared before the sink so the encoder is reaped before the file goes.
        let mut guard = PartialOutputGuard(Some(out.clone()));
        let mut sink = FfmpegSink::new(opts);
        sink.begin(SinkConfig::new(w, h, job.fps).with_audio(job.audio))?;

        let total = envelope.len() as u64;
        for (i, &intensity) in envelope.iter().enumerate() {
            let frame = Self::frame_for(job.frame, region, intensity);
            sink.push_frame(FrameIndex(i as u64), &frame)?;
            let done = i as u64 + 1;
            if done % 25 == 0 || done == total {
                status.emit(Status::Progress { done, total });
            }
        }
        sink.end()?;
        guard.disarm();
        tracing::info!(path = %out.display(), frames = total, "envelope video written");

        Ok(BackendOutcome::Muxed {
            video: out,
            raw_video: None,
        })
    }
}
