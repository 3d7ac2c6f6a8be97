//! Text to waveform.
//!
//! An installed `espeak-ng`/`espeak` is preferred. Without one the built-in
//! [`ToneSynthesizer`] writes a voiced-sounding tone track with the same timing, which keeps
//! the rest of the pipeline usable offline.

mod command;
mod tone;
mod wav;

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use command::CommandSynthesizer;
pub use tone::ToneSynthesizer;
pub use wav::{wav_duration_sec, wav_envelope};

use crate::encode::is_tool_on_path;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// Accepted speaking rates, words per minute.
pub const RATE_RANGE: std::ops::RangeInclusive<u32> = 50..=300;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub rate_wpm: u32,
    /// Linear gain in `[0, 1]`.
    pub volume: f32,
    /// Engine-specific voice name, e.g. `es` for espeak.
    pub voice: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate_wpm: 150,
            volume: 0.9,
            voice: None,
        }
    }
}

impl VoiceSettings {
    pub fn validate(&self) -> ToonsyncResult<()> {
        if !RATE_RANGE.contains(&self.rate_wpm) {
            return Err(ToonsyncError::validation(format!(
                "speech rate {} outside {}..={} words per minute",
                self.rate_wpm,
                RATE_RANGE.start(),
                RATE_RANGE.end()
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ToonsyncError::validation("speech volume must be in [0, 1]"));
        }
        Ok(())
    }
}

pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Write `text` spoken with `voice` as a WAV file at `out`.
    fn synthesize(&self, text: &str, voice: &VoiceSettings, out: &Path) -> ToonsyncResult<()>;
}

/// Which synthesizer [`select_synthesizer`] should return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechEngine {
    /// First installed command engine, else the tone fallback.
    #[default]
    Auto,
    EspeakNg,
    Espeak,
    Tone,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub engine: SpeechEngine,
    pub voice: VoiceSettings,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: SpeechEngine::Auto,
            voice: VoiceSettings::default(),
            timeout_secs: 60,
        }
    }
}

impl SpeechConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

const COMMAND_ENGINES: [&str; 2] = ["espeak-ng", "espeak"];

/// Pick a synthesizer for `cfg`. A requested engine that is not installed degrades to the
/// tone fallback with a warning. A command engine is killed when `cancel` fires.
pub fn select_synthesizer(
    cfg: &SpeechConfig,
    cancel: &CancellationToken,
) -> Box<dyn SpeechSynthesizer> {
    let wanted: &[&str] = match cfg.engine {
        SpeechEngine::Tone => return Box::new(ToneSynthesizer::default()),
        SpeechEngine::Auto => &COMMAND_ENGINES,
        SpeechEngine::EspeakNg => &COMMAND_ENGINES[..1],
        SpeechEngine::Espeak => &COMMAND_ENGINES[1..],
    };
    for program in wanted {
        if is_tool_on_path(program) {
            tracing::debug!(program, "speech engine found");
            return Box::new(
                CommandSynthesizer::new(*program, cfg.timeout()).with_cancel(cancel.clone()),
            );
        }
    }
    if cfg.engine == SpeechEngine::Auto {
        tracing::debug!("no speech engine installed, using tone synthesizer");
    } else {
        tracing::warn!(engine = ?cfg.engine, "speech engine not installed, using tone synthesizer");
    }
    Box::new(ToneSynthesizer::default())
}

pub(crate) fn check_text(text: &str) -> ToonsyncResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ToonsyncError::validation("text to speak is empty"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_voice() {
        let v = VoiceSettings::default();
        assert_eq!(v.rate_wpm, 150);
        assert!((v.volume - 0.9).abs() < 1e-6);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn out_of_range_rate_is_rejected() {
        let v = VoiceSettings {
            rate_wpm: 20,
            ..VoiceSettings::default()
        };
        assert!(v.validate().is_err());
    }

    #[test]
    fn tone_engine_is_always_available() {
        let cfg = SpeechConfig {
            engine: SpeechEngine::Tone,
            ..SpeechConfig::default()
        };
        assert_eq!(select_synthesizer(&cfg, &CancellationToken::new()).name(), "tone");
    }

    #[test]
    fn blank_text_is_validation_error() {
        assert!(matches!(check_text("  \n"), Err(ToonsyncError::Validation(_))));
        assert_eq!(check_text(" hola ").unwrap(), "hola");
    }

    #[test]
    fn engine_names_parse_from_config() {
        let cfg: SpeechConfig = serde_json::from_str(r#"{"engine": "espeak-ng"}"#).unwrap();
        assert_eq!(cfg.engine, SpeechEngine::EspeakNg);
        assert_eq!(cfg.voice, VoiceSettings::default());
    }
}
