use crate::backend::{BackendJob, BackendOutcome, LipSyncBackend};
use crate::encode::{AviSink, CancellableSink};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::mux::{MuxFailure, MuxOutcome, Muxer};
use crate::status::{Stage, Status, StatusSink};

/// Polygon animation into the raw AVI, then an external mux.
///
/// Needs nothing but the crate itself up to the mux step, so it is always available.
pub struct PolygonBackend {
    muxer: Muxer,
}

impl PolygonBackend {
    pub fn new(muxer: Muxer) -> Self {
        Self { muxer }
    }
}

impl LipSyncBackend for PolygonBackend {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn render(
        &self,
        job: &BackendJob<'_>,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<BackendOutcome> {
        let raw = job.layout.raw_video_path();
        status.emit(Status::Stage(Stage::Animating));
        let mut sink = CancellableSink::new(AviSink::new(&raw), job.cancel.clone());
        job.animator.render(
            job.frame,
            &job.location.polygon,
            job.frames_count,
            job.fps,
            &mut sink,
            status,
        )?;
        tracing::info!(path = %raw.display(), frames = job.frames_count, "raw video written");

        status.emit(Status::Stage(Stage::Muxing));
        let out = job.layout.final_path();
        let muxer = self.muxer.clone().with_cancel(job.cancel.clone());
        Ok(match muxer.mux(&raw, job.audio, &out) {
            MuxOutcome::Muxed { path } => BackendOutcome::Muxed {
                video: path,
                raw_video: Some(raw),
            },
            MuxOutcome::Failed {
                reason: MuxFailure::Cancelled,
            } => return Err(ToonsyncError::Cancelled),
            MuxOutcome::Failed { reason } => {
                status.emit(Status::Warning(format!("mux failed: {reason}")));
                BackendOutcome::Unmuxed {
                    raw_video: raw,
                    audio: job.audio.to_path_buf(),
                    reason,
                }
            }
        })
    }
}
