use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::foundation::core::{Frame, FrameIndex};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// Configuration handed to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    /// Integer frames per second.
    pub fps: u32,
    /// Waveform to encode alongside the frames, for sinks that take audio.
    pub audio: Option<PathBuf>,
}

impl SinkConfig {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: impl Into<PathBuf>) -> Self {
        self.audio = Some(audio.into());
        self
    }

    pub(crate) fn validate(&self) -> ToonsyncResult<()> {
        if self.fps == 0 {
            return Err(ToonsyncError::validation("fps must be non-zero"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ToonsyncError::validation(
                "sink width/height must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Consumer of frames in output order.
///
/// `push_frame` is called with strictly increasing [`FrameIndex`] values between one
/// `begin` and one `end`.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> ToonsyncResult<()>;
    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> ToonsyncResult<()>;
    fn end(&mut self) -> ToonsyncResult<()>;
}

/// Keeps every frame in memory. Used by tests and previews.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, Frame)>,
    ended: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[(FrameIndex, Frame)] {
        &self.frames
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ToonsyncResult<()> {
        cfg.validate()?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> ToonsyncResult<()> {
        if self.cfg.is_none() {
            return Err(ToonsyncError::evaluation("in-memory sink not started"));
        }
        if let Some((last, _)) = self.frames.last()
            && idx <= *last
        {
            return Err(ToonsyncError::evaluation(
                "in-memory sink received out-of-order frame index",
            ));
        }
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> ToonsyncResult<()> {
        self.ended = true;
        Ok(())
    }
}

/// Forwards to `inner` until `cancel` fires, then refuses every further frame.
pub struct CancellableSink<S> {
    inner: S,
    cancel: CancellationToken,
}

impl<S: FrameSink> CancellableSink<S> {
    pub fn new(inner: S, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn check(&self) -> ToonsyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(ToonsyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<S: FrameSink> FrameSink for CancellableSink<S> {
    fn begin(&mut self, cfg: SinkConfig) -> ToonsyncResult<()> {
        self.check()?;
        self.inner.begin(cfg)
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> ToonsyncResult<()> {
        self.check()?;
        self.inner.push_frame(idx, frame)
    }

    fn end(&mut self) -> ToonsyncResult<()> {
        self.check()?;
        self.inner.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_rejects_out_of_order_frames() {
        let mut sink = InMemorySink::new();
        sink.begin(SinkConfig::new(2, 2, 10)).unwrap();
        let f = Frame::new(2, 2, [0, 0, 0, 255]).unwrap();
        sink.push_frame(FrameIndex(0), &f).unwrap();
        sink.push_frame(FrameIndex(1), &f).unwrap();
        assert!(sink.push_frame(FrameIndex(1), &f).is_err());
        sink.end().unwrap();
        assert_eq!(sink.frames().len(), 2);
        assert!(sink.is_ended());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut sink = InMemorySink::new();
        assert!(sink.begin(SinkConfig::new(2, 2, 0)).is_err());
    }

    #[test]
    fn cancellable_sink_stops_forwarding_once_cancelled() {
        let cancel = CancellationToken::new();
        let mut sink = CancellableSink::new(InMemorySink::new(), cancel.clone());
        sink.begin(SinkConfig::new(2, 2, 10)).unwrap();
        let f = Frame::new(2, 2, [0, 0, 0, 255]).unwrap();
        sink.push_frame(FrameIndex(0), &f).unwrap();
        cancel.cancel();
        assert!(matches!(
            sink.push_frame(FrameIndex(1), &f),
            Err(ToonsyncError::Cancelled)
        ));
        assert!(sink.end().is_err());
        let inner = sink.into_inner();
        assert_eq!(inner.frames().len(), 1);
        assert!(!inner.is_ended());
    }
}
