use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::encode::ensure_parent_dir;
use crate::face::LocatorStrategy;
use crate::foundation::error::ToonsyncResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Final video written.
    Complete,
    /// The final video does not exist; cartoon and waveform do, and `mux_command` finishes
    /// the job by hand. The raw video exists too, except after a face-less run with the still
    /// fallback, where there is none and `raw_video` is `None`.
    Partial,
    /// No face was found; the final video is the still cartoon over the waveform.
    StillFallback,
    /// Only the waveform was requested and written.
    AudioOnly,
}

/// What a run produced.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// `None` for audio-only runs.
    pub cartoon: Option<PathBuf>,
    pub audio: PathBuf,
    pub raw_video: Option<PathBuf>,
    pub final_video: Option<PathBuf>,
    pub frames: u64,
    pub fps: u32,
    pub audio_duration_sec: f64,
    pub strategy: Option<LocatorStrategy>,
    pub backend: Option<String>,
    pub speech_engine: String,
    /// Why the run is not complete, when it is not.
    pub message: Option<String>,
    /// Files written by the run, in the order they were written.
    pub artifacts: Vec<PathBuf>,
    /// Encoder command that would produce the missing final video.
    pub mux_command: Option<String>,
    /// Shell script holding `mux_command`.
    pub mux_script: Option<PathBuf>,
}

impl RunReport {
    /// A partial report with nothing rendered yet.
    pub fn new(
        cartoon: Option<PathBuf>,
        audio: PathBuf,
        fps: u32,
        audio_duration_sec: f64,
        speech_engine: &str,
    ) -> Self {
        Self {
            outcome: RunOutcome::Partial,
            cartoon,
            audio,
            raw_video: None,
            final_video: None,
            frames: 0,
            fps,
            audio_duration_sec,
            strategy: None,
            backend: None,
            speech_engine: speech_engine.to_owned(),
            message: None,
            artifacts: Vec::new(),
            mux_command: None,
            mux_script: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Complete
    }

    pub fn write_json(&self, path: &Path) -> ToonsyncResult<()> {
        ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(self).context("serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("write run report '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_json_uses_snake_case_outcomes() {
        let mut report = RunReport::new(None, PathBuf::from("r/a.wav"), 25, 1.0, "tone");
        report.outcome = RunOutcome::AudioOnly;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "audio_only");
        assert!(json["cartoon"].is_null());
        assert!(!report.is_complete());
    }
}
