use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{ToonsyncError, ToonsyncResult};

fn open(path: &Path) -> ToonsyncResult<hound::WavReader<std::io::BufReader<std::fs::File>>> {
    hound::WavReader::open(path)
        .with_context(|| format!("open wav '{}'", path.display()))
        .map_err(Into::into)
}

/// Length of a WAV file in seconds.
pub fn wav_duration_sec(path: &Path) -> ToonsyncResult<f64> {
    let reader = open(path)?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Err(ToonsyncError::speech("wav sample rate is zero"));
    }
    Ok(f64::from(reader.duration()) / f64::from(rate))
}

/// Per-frame loudness in `[0, 1]`: RMS of each `1 / fps` window, divided by the loudest window.
///
/// Always `frames` values long; windows past the end of the audio are silent.
pub fn wav_envelope(path: &Path, fps: u32, frames: u64) -> ToonsyncResult<Vec<f32>> {
    if fps == 0 {
        return Err(ToonsyncError::validation("fps must be non-zero"));
    }
    let mut reader = open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("read wav samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("read wav samples")?
        }
    };
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect();

    let rate = u64::from(spec.sample_rate);
    let fps = u64::from(fps);
    let mut env: Vec<f32> = (0..frames)
        .map(|i| {
            let start = (i * rate / fps) as usize;
            let end = ((i + 1) * rate / fps) as usize;
            let window = mono.get(start..end.min(mono.len())).unwrap_or(&[]);
            if window.is_empty() {
                0.0
            } else {
                (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
            }
        })
        .collect();

    let peak = env.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 {
        for v in &mut env {
            *v /= peak;
        }
    }
    Ok(env)
}
