//! Toonsync turns a still portrait and a line of text into a short talking-head clip.
//!
//! A run goes through a fixed sequence of stages, each leaving an artifact in the results
//! directory:
//!
//! - cartoon filter over the photo ([`filter::cartoonize`]),
//! - mouth polygon from landmarks or a face-box heuristic ([`face::LocatorChain`]),
//! - speech waveform ([`speech::SpeechSynthesizer`]),
//! - animated raw video ([`animate::Animator`] into [`encode::AviSink`]),
//! - final video muxed by the external encoder ([`mux::Muxer`]).
//!
//! [`Pipeline`] drives the stages; [`status::spawn_run`] runs it on a worker thread.
#![forbid(unsafe_code)]

mod foundation;

pub mod animate;
pub mod backend;
pub mod batch;
pub mod config;
pub mod doctor;
pub mod encode;
pub mod face;
pub mod filter;
pub mod mux;
pub mod picture;
pub mod pipeline;
pub mod process;
pub(crate) mod render;
pub mod speech;
pub mod status;

pub use crate::foundation::core::{FaceBox, Frame, FrameIndex, PointI};
pub use crate::foundation::error::{ToonsyncError, ToonsyncResult};

pub use crate::config::PipelineConfig;
pub use crate::pipeline::{OutputLayout, Pipeline, RunOutcome, RunReport, RunRequest};
pub use crate::status::{RunHandle, Status, StatusSink, spawn_run};
