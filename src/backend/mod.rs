//! Interchangeable lip-sync back ends.
//!
//! Every back end takes the same [`BackendJob`] and either produces the final muxed video or
//! leaves behind the artifacts it managed to write. The pipeline asks each back end in
//! [`backend_chain`] order whether it is available and falls through on errors.

mod envelope;
mod polygon;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

pub use envelope::{EnvelopeBackend, mouth_region};
pub use polygon::PolygonBackend;

use crate::animate::Animator;
use crate::face::MouthLocation;
use crate::foundation::core::Frame;
use crate::foundation::error::ToonsyncResult;
use crate::mux::{MuxFailure, Muxer};
use crate::pipeline::OutputLayout;
use crate::status::StatusSink;

/// Everything a back end needs for one run.
pub struct BackendJob<'a> {
    /// The filtered still every frame starts from.
    pub frame: &'a Frame,
    pub location: &'a MouthLocation,
    pub audio: &'a Path,
    pub layout: &'a OutputLayout,
    pub fps: u32,
    pub frames_count: u64,
    pub animator: Animator,
    /// Checked between frames; child encoders are killed when it fires.
    pub cancel: &'a CancellationToken,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendOutcome {
    Muxed {
        video: PathBuf,
        /// Intermediate video kept on disk, if the back end wrote one.
        raw_video: Option<PathBuf>,
    },
    /// Animation finished but the mux did not; both inputs are kept.
    Unmuxed {
        raw_video: PathBuf,
        audio: PathBuf,
        reason: MuxFailure,
    },
}

pub trait LipSyncBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap capability check run before `render`.
    fn is_available(&self) -> bool;

    fn render(
        &self,
        job: &BackendJob<'_>,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<BackendOutcome>;
}

/// User preference between back ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    #[default]
    Auto,
    Polygon,
    Envelope,
}

impl std::str::FromStr for BackendChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "polygon" => Ok(Self::Polygon),
            "envelope" => Ok(Self::Envelope),
            other => Err(format!(
                "unknown backend '{other}' (expected auto, polygon or envelope)"
            )),
        }
    }
}

/// Back ends to try for `choice`, preferred first. The polygon back end always closes the
/// list.
pub fn backend_chain(choice: BackendChoice, mux: &Muxer) -> Vec<Box<dyn LipSyncBackend>> {
    let mut chain: Vec<Box<dyn LipSyncBackend>> = Vec::new();
    if choice == BackendChoice::Envelope {
        chain.push(Box::new(EnvelopeBackend::new(
            mux.program.to_string_lossy(),
            mux.timeout,
        )));
    }
    chain.push(Box::new(PolygonBackend::new(mux.clone())));
    chain
}
