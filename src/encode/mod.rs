//! Frame sinks.
//!
//! Sinks consume animated frames in order. [`AviSink`] needs nothing outside the crate and
//! produces the raw video artifact; [`FfmpegSink`] streams into the system `ffmpeg`.

/// MJPEG AVI container writer.
pub mod avi;
/// `ffmpeg`-based sink and tool lookups.
pub mod ffmpeg;
/// Sink trait and the in-memory sink.
pub mod sink;

pub use avi::{AviSink, AviWriter};
pub use ffmpeg::{FfmpegSink, FfmpegSinkOpts, ensure_parent_dir, is_ffmpeg_on_path, is_tool_on_path};
pub use sink::{CancellableSink, FrameSink, InMemorySink, SinkConfig};
