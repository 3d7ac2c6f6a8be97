//! End-to-end runs through the real encoder. Skipped when `ffmpeg` is not installed.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use toonsync::backend::BackendChoice;
use toonsync::mux::{MuxOutcome, Muxer};
use toonsync::speech::{SpeechConfig, SpeechEngine, SpeechSynthesizer, ToneSynthesizer, VoiceSettings};
use toonsync::status::NullStatus;
use toonsync::{Pipeline, PipelineConfig, RunOutcome, RunRequest};

fn ffmpeg_available() -> bool {
    tool_runs("ffmpeg")
}

fn tool_runs(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn fresh_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn tone_config(results: &Path) -> PipelineConfig {
    PipelineConfig {
        results_dir: results.to_path_buf(),
        speech: SpeechConfig {
            engine: SpeechEngine::Tone,
            ..SpeechConfig::default()
        },
        ..PipelineConfig::default()
    }
}

fn portrait(dir: &Path) -> PathBuf {
    let path = dir.join("ana.png");
    let frame = toonsync::picture::sample_portrait(320, 240).unwrap();
    toonsync::picture::save_png(&frame, &path).unwrap();
    path
}

#[test]
fn polygon_backend_produces_final_video() {
    if !ffmpeg_available() {
        return;
    }
    let dir = fresh_dir("media_polygon");
    let image = portrait(&dir);
    let results = dir.join("resultados");
    let report = Pipeline::new(tone_config(&results))
        .unwrap()
        .run(&RunRequest::new(&image, "Hola mundo"), &NullStatus)
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Complete);
    let video = report.final_video.unwrap();
    assert_eq!(video, results.join("ana_final.mp4"));
    assert!(std::fs::metadata(&video).unwrap().len() > 0);
    // raw artifacts survive the mux
    assert!(results.join("ana.avi").is_file());
    assert!(results.join("ana.wav").is_file());
    assert!(!results.join("ana_report.json").exists());
}

#[test]
fn envelope_backend_encodes_directly() {
    if !ffmpeg_available() {
        return;
    }
    let dir = fresh_dir("media_envelope");
    let image = portrait(&dir);
    let results = dir.join("resultados");
    let cfg = PipelineConfig {
        backend: BackendChoice::Envelope,
        ..tone_config(&results)
    };
    let report = Pipeline::new(cfg)
        .unwrap()
        .run(&RunRequest::new(&image, "Hola mundo"), &NullStatus)
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.backend.as_deref(), Some("envelope"));
    assert!(report.raw_video.is_none());
    assert!(report.final_video.unwrap().is_file());
}

#[test]
fn still_fallback_muxes_the_cartoon() {
    if !ffmpeg_available() {
        return;
    }
    let dir = fresh_dir("media_still");
    let image = dir.join("gris.png");
    let gray = toonsync::Frame::new(161, 121, [128, 128, 128, 255]).unwrap();
    toonsync::picture::save_png(&gray, &image).unwrap();
    let results = dir.join("resultados");
    let cfg = PipelineConfig {
        still_fallback: true,
        ..tone_config(&results)
    };
    let report = Pipeline::new(cfg)
        .unwrap()
        .run(&RunRequest::new(&image, "Hola"), &NullStatus)
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::StillFallback);
    assert!(report.final_video.unwrap().is_file());
}

#[test]
fn muxer_never_modifies_inputs() {
    if !ffmpeg_available() {
        return;
    }
    let dir = fresh_dir("media_mux_inputs");
    let audio = dir.join("voz.wav");
    ToneSynthesizer::default()
        .synthesize("uno dos", &VoiceSettings::default(), &audio)
        .unwrap();
    let still = dir.join("still.jpg");
    let frame = toonsync::picture::sample_portrait(64, 48).unwrap();
    toonsync::picture::save_jpeg(&frame, &still, 90).unwrap();
    let before = (std::fs::read(&audio).unwrap(), std::fs::read(&still).unwrap());

    let out = dir.join("still.mp4");
    let outcome = Muxer::ffmpeg(Duration::from_secs(60)).mux_still(&still, &audio, &out);
    assert!(matches!(outcome, MuxOutcome::Muxed { .. }));
    assert_eq!(std::fs::read(&audio).unwrap(), before.0);
    assert_eq!(std::fs::read(&still).unwrap(), before.1);
}

/// Container duration in seconds as reported by `ffprobe`.
fn ffprobe_duration(path: &Path) -> f64 {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).trim().parse().unwrap()
}

#[test]
fn fixed_thirty_frames_at_twenty_fps_last_one_and_a_half_seconds() {
    if !ffmpeg_available() || !tool_runs("ffprobe") {
        return;
    }
    let dir = fresh_dir("media_fixed_frames");
    let image = dir.join("ana.png");
    let frame = toonsync::picture::sample_portrait(640, 480).unwrap();
    toonsync::picture::save_png(&frame, &image).unwrap();
    let results = dir.join("resultados");
    let cfg = PipelineConfig {
        fps: 20,
        frames_count: Some(30),
        ..tone_config(&results)
    };
    let report = Pipeline::new(cfg)
        .unwrap()
        .run(&RunRequest::new(&image, "Hola, soy Ana"), &NullStatus)
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.frames, 30);
    let raw = results.join("ana.avi");
    let seconds = ffprobe_duration(&raw);
    assert!((seconds - 1.5).abs() < 0.05, "raw video lasts {seconds}s");
    assert_eq!(
        report.artifacts,
        [
            results.join("ana_cartoon.jpg"),
            results.join("ana.wav"),
            raw,
            results.join("ana_final.mp4"),
        ]
    );
    assert!(report.mux_command.is_none());
}
