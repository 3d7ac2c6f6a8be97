//! Progress reporting and the background worker.
//!
//! A run executes on one worker thread. The worker only talks to the caller through a
//! [`StatusSink`]; the caller keeps its own state and reads events off a channel.

use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use tokio_util::sync::CancellationToken;

use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::pipeline::{Pipeline, RunReport, RunRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loading,
    Cartoon,
    Locating,
    Speech,
    Animating,
    Muxing,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Loading => "loading image",
            Self::Cartoon => "applying cartoon filter",
            Self::Locating => "locating mouth",
            Self::Speech => "synthesizing speech",
            Self::Animating => "animating frames",
            Self::Muxing => "muxing audio and video",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    Stage(Stage),
    /// Frames written so far out of the total.
    Progress { done: u64, total: u64 },
    Warning(String),
}

pub trait StatusSink: Send + Sync {
    fn emit(&self, status: Status);
}

/// Drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn emit(&self, _status: Status) {}
}

/// Forwards events over an mpsc channel. A hung-up receiver is ignored.
#[derive(Clone, Debug)]
pub struct ChannelStatus {
    tx: Sender<Status>,
}

impl ChannelStatus {
    pub fn new(tx: Sender<Status>) -> Self {
        Self { tx }
    }
}

impl StatusSink for ChannelStatus {
    fn emit(&self, status: Status) {
        let _ = self.tx.send(status);
    }
}

/// Keeps every event, for tests.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    events: Mutex<Vec<Status>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Status> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|s| match s {
                Status::Stage(st) => Some(st),
                _ => None,
            })
            .collect()
    }
}

impl StatusSink for RecordingStatus {
    fn emit(&self, status: Status) {
        if let Ok(mut e) = self.events.lock() {
            e.push(status);
        }
    }
}

/// A run in progress on its worker thread.
pub struct RunHandle {
    events: Receiver<Status>,
    worker: JoinHandle<ToonsyncResult<RunReport>>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn events(&self) -> &Receiver<Status> {
        &self.events
    }

    /// Ask the worker to stop. [`RunHandle::join`] then returns [`ToonsyncError::Cancelled`]
    /// unless the run had already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker and return its result.
    pub fn join(self) -> ToonsyncResult<RunReport> {
        self.worker
            .join()
            .map_err(|_| ToonsyncError::evaluation("pipeline worker panicked"))?
    }
}

/// Start `request` on a new worker thread.
///
/// The returned receiver disconnects once the worker has finished, so draining
/// [`RunHandle::events`] with a blocking loop terminates.
pub fn spawn_run(pipeline: Pipeline, request: RunRequest) -> RunHandle {
    let (tx, rx) = channel();
    let cancel = pipeline.cancel_token();
    let worker = std::thread::spawn(move || {
        let status = ChannelStatus::new(tx);
        pipeline.run(&request, &status)
    });
    RunHandle {
        events: rx,
        worker,
        cancel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_status_keeps_order() {
        let rec = RecordingStatus::new();
        rec.emit(Status::Stage(Stage::Loading));
        rec.emit(Status::Progress { done: 1, total: 2 });
        rec.emit(Status::Stage(Stage::Done));
        assert_eq!(rec.events().len(), 3);
        assert_eq!(rec.stages(), vec![Stage::Loading, Stage::Done]);
    }

    #[test]
    fn channel_status_survives_dropped_receiver() {
        let (tx, rx) = channel();
        let status = ChannelStatus::new(tx);
        status.emit(Status::Warning("first".into()));
        assert_eq!(rx.recv().unwrap(), Status::Warning("first".into()));
        drop(rx);
        status.emit(Status::Warning("ignored".into()));
    }
}
