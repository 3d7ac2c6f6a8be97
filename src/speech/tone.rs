use std::path::Path;

use anyhow::Context as _;

use crate::encode::ensure_parent_dir;
use crate::foundation::error::ToonsyncResult;
use crate::speech::{SpeechSynthesizer, VoiceSettings, check_text};

pub const TONE_SAMPLE_RATE: u32 = 22_050;

/// Silence appended after the last word, seconds.
const TAIL_SEC: f64 = 0.3;
/// Fraction of a word slot that is voiced.
const VOICED: f64 = 0.8;

/// Offline stand-in for a speech engine.
///
/// Each word gets one slot of `60 / rate_wpm` seconds, split into one tone burst per vowel
/// group. Pitch depends only on the text, so the output is byte-for-byte reproducible.
#[derive(Clone, Copy, Debug)]
pub struct ToneSynthesizer {
    pub sample_rate: u32,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: TONE_SAMPLE_RATE,
        }
    }
}

impl ToneSynthesizer {
    /// Mono samples in `[-1, 1]`.
    pub fn render(&self, text: &str, voice: &VoiceSettings) -> Vec<f32> {
        let sr = f64::from(self.sample_rate);
        let words: Vec<&str> = text.split_whitespace().collect();
        let slot = 60.0 / f64::from(voice.rate_wpm.max(1));
        let total = words.len() as f64 * slot + TAIL_SEC;
        let mut samples = vec![0f32; (total * sr).ceil() as usize];
        let gain = f64::from(voice.volume.clamp(0.0, 1.0));

        for (wi, word) in words.iter().enumerate() {
            let groups = vowel_groups(word);
            let burst = slot * VOICED / groups as f64;
            let word_seed = seed(word);
            for g in 0..groups {
                let t0 = wi as f64 * slot + g as f64 * burst;
                let pitch = 110.0 + ((word_seed >> (g % 8 * 4)) & 0x3f) as f64;
                let start = (t0 * sr) as usize;
                let len = (burst * 0.85 * sr) as usize;
                for n in 0..len {
                    let Some(s) = samples.get_mut(start + n) else {
                        break;
                    };
                    let t = n as f64 / sr;
                    let env = (std::f64::consts::PI * n as f64 / len as f64).sin();
                    let phase = std::f64::consts::TAU * pitch * t;
                    let v = 0.6 * phase.sin() + 0.3 * (2.0 * phase).sin() + 0.1 * (3.0 * phase).sin();
                    *s = (gain * env * v) as f32;
                }
            }
        }
        samples
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    #[tracing::instrument(skip(self, text, voice))]
    fn synthesize(&self, text: &str, voice: &VoiceSettings, out: &Path) -> ToonsyncResult<()> {
        let text = check_text(text)?;
        voice.validate()?;
        ensure_parent_dir(out)?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(out, spec)
            .with_context(|| format!("create wav '{}'", out.display()))?;
        for sample in self.render(text, voice) {
            let v = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(v).context("write wav sample")?;
        }
        writer.finalize().context("finalize wav")?;
        Ok(())
    }
}

fn vowel_groups(word: &str) -> usize {
    let mut groups = 0;
    let mut in_vowel = false;
    for c in word.chars() {
        let v = is_vowel(c);
        if v && !in_vowel {
            groups += 1;
        }
        in_vowel = v;
    }
    groups.max(1)
}

fn is_vowel(c: char) -> bool {
    matches!(
        c.to_lowercase().next().unwrap_or(c),
        'a' | 'e' | 'i' | 'o' | 'u' | 'y' | 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ü'
    )
}

/// FNV-1a over the word bytes.
fn seed(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
