//! One run from photo and text to the final video.
//!
//! Artifacts appear in a fixed order: cartoon image, waveform, raw video, muxed output. Each
//! is written before the next stage starts, so a failure late in the run leaves the earlier
//! ones behind.
//!
//! A run checks its cancellation token between stages and between frames. Child processes are
//! killed when it fires and the run ends with [`ToonsyncError::Cancelled`].

mod layout;
mod report;

use std::path::{Path, PathBuf};
use std::process::Command;

use tokio_util::sync::CancellationToken;

pub use layout::{OutputLayout, sanitize_base_name};
pub use report::{RunOutcome, RunReport};

use crate::animate::Animator;
use crate::backend::{BackendJob, BackendOutcome, backend_chain};
use crate::config::PipelineConfig;
use crate::face::LocatorChain;
use crate::filter::cartoonize;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::mux::{MuxFailure, MuxOutcome, Muxer};
use crate::process::command_line;
use crate::picture::{load_frame, save_jpeg};
use crate::speech::{SpeechSynthesizer, select_synthesizer, wav_duration_sec};
use crate::status::{Stage, Status, StatusSink};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    pub image: PathBuf,
    pub text: String,
    /// Artifact base name; defaults to the image file stem.
    pub base_name: Option<String>,
    /// Final video path; defaults to `<results>/<base>_final.mp4`.
    pub output: Option<PathBuf>,
    /// Stop after speech. `image` is not read.
    pub audio_only: bool,
}

impl RunRequest {
    pub fn new(image: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            text: text.into(),
            base_name: None,
            output: None,
            audio_only: false,
        }
    }

    /// Speech only, written as `<results>/<base_name>.wav`.
    pub fn audio_only(text: impl Into<String>, base_name: impl Into<String>) -> Self {
        Self {
            base_name: Some(base_name.into()),
            audio_only: true,
            ..Self::new(PathBuf::new(), text)
        }
    }

    pub fn base_name(&self) -> String {
        self.base_name.clone().unwrap_or_else(|| {
            self.image
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

/// Frames needed to cover `duration_sec` at `fps`, at least one.
pub fn frame_count_for(duration_sec: f64, fps: u32) -> u64 {
    let n = (duration_sec.max(0.0) * f64::from(fps)).ceil();
    (n as u64).max(1)
}

pub struct Pipeline {
    config: PipelineConfig,
    locator: LocatorChain,
    synthesizer: Box<dyn SpeechSynthesizer>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Looks up a speech engine and builds the locator chain.
    pub fn new(config: PipelineConfig) -> ToonsyncResult<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();
        let locator = LocatorChain::from_config(&config.locator);
        let synthesizer = select_synthesizer(&config.speech, &cancel);
        Ok(Self {
            config,
            locator,
            synthesizer,
            cancel,
        })
    }

    pub fn with_synthesizer(mut self, synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_locator(mut self, locator: LocatorChain) -> Self {
        self.locator = locator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn speech_engine(&self) -> &str {
        self.synthesizer.name()
    }

    /// Cancelling the returned token interrupts the current and every later run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn muxer(&self) -> Muxer {
        Muxer::new(&self.config.encoder, self.config.encoder_timeout())
            .with_cancel(self.cancel.clone())
    }

    fn checkpoint(&self) -> ToonsyncResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ToonsyncError::Cancelled);
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(image = %request.image.display()))]
    pub fn run(&self, request: &RunRequest, status: &dyn StatusSink) -> ToonsyncResult<RunReport> {
        let result = if request.audio_only {
            self.run_audio_only(request, status)
        } else {
            self.run_stages(request, status)
        };
        match result {
            // whatever failed after the token fired failed because of it
            Err(_) if self.cancel.is_cancelled() => {
                tracing::warn!("run interrupted");
                Err(ToonsyncError::Cancelled)
            }
            other => other,
        }
    }

    fn layout(&self, request: &RunRequest) -> OutputLayout {
        OutputLayout::new(
            &self.config.results_dir,
            &request.base_name(),
            request.output.clone(),
        )
    }

    fn speak(
        &self,
        request: &RunRequest,
        layout: &OutputLayout,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<(PathBuf, f64)> {
        status.emit(Status::Stage(Stage::Speech));
        let audio = layout.audio_path();
        self.synthesizer
            .synthesize(&request.text, &self.config.speech.voice, &audio)?;
        let duration = wav_duration_sec(&audio)?;
        tracing::info!(
            path = %audio.display(),
            duration,
            engine = self.synthesizer.name(),
            "speech written"
        );
        self.checkpoint()?;
        Ok((audio, duration))
    }

    fn run_audio_only(
        &self,
        request: &RunRequest,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<RunReport> {
        self.checkpoint()?;
        let layout = self.layout(request);
        let (audio, duration) = self.speak(request, &layout, status)?;
        let mut report = RunReport::new(
            None,
            audio.clone(),
            self.config.fps,
            duration,
            self.synthesizer.name(),
        );
        report.outcome = RunOutcome::AudioOnly;
        report.artifacts.push(audio);
        status.emit(Status::Stage(Stage::Done));
        Ok(report)
    }

    fn run_stages(
        &self,
        request: &RunRequest,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<RunReport> {
        let cfg = &self.config;
        let layout = self.layout(request);
        self.checkpoint()?;

        status.emit(Status::Stage(Stage::Loading));
        let photo = load_frame(&request.image)?;
        tracing::info!(width = photo.width, height = photo.height, "image loaded");

        status.emit(Status::Stage(Stage::Cartoon));
        let cartoon = cartoonize(&photo, &cfg.cartoon)?;
        let cartoon_path = layout.cartoon_path();
        save_jpeg(&cartoon, &cartoon_path, cfg.jpeg_quality)?;
        tracing::info!(path = %cartoon_path.display(), "cartoon written");
        self.checkpoint()?;

        // Faces are easier to find before the ink lines go on.
        status.emit(Status::Stage(Stage::Locating));
        let location = self.locator.locate(&photo);
        if location.is_none() && !cfg.still_fallback {
            return Err(ToonsyncError::NoFace);
        }
        self.checkpoint()?;

        let (audio, duration) = self.speak(request, &layout, status)?;

        let frames = cfg
            .frames_count
            .unwrap_or_else(|| frame_count_for(duration, cfg.fps));
        let mut report = RunReport {
            frames,
            strategy: location.as_ref().map(|l| l.strategy),
            artifacts: vec![cartoon_path.clone(), audio.clone()],
            ..RunReport::new(
                Some(cartoon_path.clone()),
                audio.clone(),
                cfg.fps,
                duration,
                self.synthesizer.name(),
            )
        };

        let Some(location) = location else {
            tracing::warn!("no face found, muxing the still cartoon");
            status.emit(Status::Warning("no face found, using the still image".into()));
            status.emit(Status::Stage(Stage::Muxing));
            report.frames = 0;
            let muxer = self.muxer();
            let out = layout.final_path();
            match muxer.mux_still(&cartoon_path, &audio, &out) {
                MuxOutcome::Muxed { path } => {
                    report.outcome = RunOutcome::StillFallback;
                    report.artifacts.push(path.clone());
                    report.final_video = Some(path);
                    report.message = Some(ToonsyncError::NoFace.to_string());
                }
                MuxOutcome::Failed {
                    reason: MuxFailure::Cancelled,
                } => return Err(ToonsyncError::Cancelled),
                MuxOutcome::Failed { reason } => {
                    report.message = Some(format!("no face detected; {reason}"));
                    let cmd = muxer.mux_still_command(&cartoon_path, &audio, &out);
                    self.finish_partial(&mut report, &layout, &cmd)?;
                }
            }
            status.emit(Status::Stage(Stage::Done));
            return Ok(report);
        };

        let job = BackendJob {
            frame: &cartoon,
            location: &location,
            audio: &audio,
            layout: &layout,
            fps: cfg.fps,
            frames_count: frames,
            animator: Animator::new(cfg.aperture_profile(), cfg.style),
            cancel: &self.cancel,
        };

        let mut last_err = None;
        let mut outcome = None;
        for backend in backend_chain(cfg.backend, &self.muxer()) {
            self.checkpoint()?;
            if !backend.is_available() {
                tracing::debug!(backend = backend.name(), "backend unavailable, skipping");
                continue;
            }
            match backend.render(&job, status) {
                Ok(o) => {
                    report.backend = Some(backend.name().to_owned());
                    outcome = Some(o);
                    break;
                }
                Err(ToonsyncError::Cancelled) => return Err(ToonsyncError::Cancelled),
                Err(e) => {
                    tracing::warn!(backend = backend.name(), "backend failed: {e}");
                    status.emit(Status::Warning(format!("{} backend failed: {e}", backend.name())));
                    last_err = Some(e);
                }
            }
        }
        let outcome = match (outcome, last_err) {
            (Some(o), _) => o,
            (None, Some(e)) => return Err(e),
            (None, None) => return Err(ToonsyncError::evaluation("no lip-sync backend available")),
        };

        match outcome {
            BackendOutcome::Muxed { video, raw_video } => {
                report.outcome = RunOutcome::Complete;
                report.artifacts.extend(raw_video.iter().cloned());
                report.artifacts.push(video.clone());
                report.final_video = Some(video);
                report.raw_video = raw_video;
            }
            BackendOutcome::Unmuxed {
                raw_video,
                audio,
                reason,
            } => {
                report.message = Some(reason.to_string());
                let cmd = self
                    .muxer()
                    .mux_command(&raw_video, &audio, &layout.final_path());
                report.artifacts.push(raw_video.clone());
                report.raw_video = Some(raw_video);
                self.finish_partial(&mut report, &layout, &cmd)?;
            }
        }
        status.emit(Status::Stage(Stage::Done));
        Ok(report)
    }

    /// Record how to finish the mux by hand and write the report next to the artifacts.
    fn finish_partial(
        &self,
        report: &mut RunReport,
        layout: &OutputLayout,
        mux: &Command,
    ) -> ToonsyncResult<()> {
        let line = command_line(mux);
        let script = layout.mux_script_path();
        write_mux_script(&script, &line)?;
        report.mux_command = Some(line);
        report.mux_script = Some(script);
        report.write_json(&layout.report_path())?;
        tracing::warn!(report = %layout.report_path().display(), "run finished without final video");
        Ok(())
    }
}

fn write_mux_script(path: &Path, line: &str) -> ToonsyncResult<()> {
    use anyhow::Context as _;

    std::fs::write(path, format!("#!/bin/sh\nset -e\n{line}\n"))
        .with_context(|| format!("write mux script '{}'", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("make '{}' executable", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_rounds_up_and_never_hits_zero() {
        assert_eq!(frame_count_for(1.5, 20), 30);
        assert_eq!(frame_count_for(1.51, 20), 31);
        assert_eq!(frame_count_for(0.0, 25), 1);
        assert_eq!(frame_count_for(-3.0, 25), 1);
    }

    #[test]
    fn base_name_defaults_to_image_stem() {
        let req = RunRequest::new("fotos/ana.png", "hola");
        assert_eq!(req.base_name(), "ana");
        let named = RunRequest {
            base_name: Some("otro".into()),
            ..req
        };
        assert_eq!(named.base_name(), "otro");
    }

    #[test]
    fn audio_only_request_names_the_waveform() {
        let req = RunRequest::audio_only("hola", "saludo");
        assert!(req.audio_only);
        assert_eq!(req.base_name(), "saludo");
        assert_eq!(req.image, PathBuf::new());
    }
}
