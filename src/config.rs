use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::animate::{ApertureProfile, MouthStyle};
use crate::backend::BackendChoice;
use crate::face::LocatorConfig;
use crate::filter::CartoonParams;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::speech::SpeechConfig;

/// Every tunable of a run. Missing JSON fields take their defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving every artifact.
    pub results_dir: PathBuf,
    pub fps: u32,
    /// Fixed frame count. When absent the count follows the audio duration.
    pub frames_count: Option<u64>,
    pub cartoon: CartoonParams,
    pub style: MouthStyle,
    /// Overrides the profile paired with `style`.
    pub aperture: Option<ApertureProfile>,
    pub speech: SpeechConfig,
    pub locator: LocatorConfig,
    pub backend: BackendChoice,
    /// Muxer executable.
    pub encoder: String,
    pub encoder_timeout_secs: u64,
    /// Without a face, mux the cartoon still over the audio instead of failing.
    pub still_fallback: bool,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("resultados"),
            fps: 20,
            frames_count: None,
            cartoon: CartoonParams::default(),
            style: MouthStyle::default(),
            aperture: None,
            speech: SpeechConfig::default(),
            locator: LocatorConfig::default(),
            backend: BackendChoice::default(),
            encoder: "ffmpeg".to_owned(),
            encoder_timeout_secs: 120,
            still_fallback: false,
            jpeg_quality: 95,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> ToonsyncResult<Self> {
        let cfg: Self = serde_json::from_str(s).context("parse pipeline config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> ToonsyncResult<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> ToonsyncResult<()> {
        if self.fps == 0 || self.fps > 120 {
            return Err(ToonsyncError::validation("fps must be in 1..=120"));
        }
        if self.frames_count == Some(0) {
            return Err(ToonsyncError::validation("frames_count must be at least 1"));
        }
        if self.encoder.trim().is_empty() {
            return Err(ToonsyncError::validation("encoder program must not be empty"));
        }
        self.cartoon.validate()?;
        self.style.validate()?;
        self.aperture_profile().validate()?;
        self.speech.voice.validate()
    }

    pub fn aperture_profile(&self) -> ApertureProfile {
        self.aperture.unwrap_or_else(|| self.style.default_profile())
    }

    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_timeout_secs.max(1))
    }
}
