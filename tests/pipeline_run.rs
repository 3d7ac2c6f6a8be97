use std::path::{Path, PathBuf};

use toonsync::pipeline::frame_count_for;
use toonsync::speech::{SpeechConfig, SpeechEngine};
use toonsync::status::{RecordingStatus, Stage, Status, StatusSink};
use toonsync::{Pipeline, PipelineConfig, RunOutcome, RunRequest, ToonsyncError};

fn fresh_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn offline_config(results: &Path) -> PipelineConfig {
    PipelineConfig {
        results_dir: results.to_path_buf(),
        speech: SpeechConfig {
            engine: SpeechEngine::Tone,
            ..SpeechConfig::default()
        },
        encoder: "definitely-not-an-encoder".to_owned(),
        ..PipelineConfig::default()
    }
}

fn write_portrait(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let frame = toonsync::picture::sample_portrait(320, 240).unwrap();
    toonsync::picture::save_png(&frame, &path).unwrap();
    path
}

fn avi_total_frames(path: &Path) -> u32 {
    let bytes = std::fs::read(path).unwrap();
    u32::from_le_bytes([bytes[48], bytes[49], bytes[50], bytes[51]])
}

#[test]
fn missing_encoder_ends_partial_with_every_artifact_kept() {
    let dir = fresh_dir("pipeline_partial");
    let image = write_portrait(&dir, "ana.png");
    let results = dir.join("resultados");
    let pipeline = Pipeline::new(offline_config(&results)).unwrap();
    let status = RecordingStatus::new();

    let report = pipeline
        .run(&RunRequest::new(&image, "Hola, soy Ana"), &status)
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Partial);
    assert_eq!(report.speech_engine, "tone");
    assert_eq!(report.backend.as_deref(), Some("polygon"));
    assert!(report.final_video.is_none());
    assert!(report.message.as_deref().unwrap().contains("encoder unavailable"));

    assert!(report.cartoon.as_deref().unwrap().is_file());
    assert!(report.audio.is_file());
    let raw = report.raw_video.clone().unwrap();
    assert_eq!(raw, results.join("ana.avi"));
    assert_eq!(
        report.artifacts,
        [
            results.join("ana_cartoon.jpg"),
            results.join("ana.wav"),
            results.join("ana.avi"),
        ]
    );
    let mux = report.mux_command.as_deref().unwrap();
    assert!(mux.starts_with("definitely-not-an-encoder -y -i "));
    assert!(mux.ends_with(&results.join("ana_final.mp4").display().to_string()));
    let script = std::fs::read_to_string(results.join("ana_mux.sh")).unwrap();
    assert!(script.starts_with("#!/bin/sh"));
    assert!(script.contains(mux));
    assert_eq!(
        report.frames,
        frame_count_for(report.audio_duration_sec, report.fps)
    );
    assert_eq!(u64::from(avi_total_frames(&raw)), report.frames);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(results.join("ana_report.json")).unwrap())
            .unwrap();
    assert_eq!(json["outcome"], "partial");
    assert_eq!(json["strategy"], "heuristic");

    assert_eq!(
        status.stages(),
        vec![
            Stage::Loading,
            Stage::Cartoon,
            Stage::Locating,
            Stage::Speech,
            Stage::Animating,
            Stage::Muxing,
            Stage::Done,
        ]
    );
}

#[test]
fn fixed_frame_count_overrides_audio_length() {
    let dir = fresh_dir("pipeline_fixed_frames");
    let image = write_portrait(&dir, "foto.png");
    let results = dir.join("out");
    let cfg = PipelineConfig {
        fps: 20,
        frames_count: Some(30),
        ..offline_config(&results)
    };
    let report = Pipeline::new(cfg)
        .unwrap()
        .run(
            &RunRequest {
                base_name: Some("fijo".into()),
                ..RunRequest::new(&image, "uno dos tres cuatro cinco seis siete")
            },
            &toonsync::status::NullStatus,
        )
        .unwrap();
    assert_eq!(report.frames, 30);
    assert_eq!(avi_total_frames(&results.join("fijo.avi")), 30);
}

#[test]
fn no_face_stops_before_any_video() {
    let dir = fresh_dir("pipeline_no_face");
    let image = dir.join("gris.png");
    let gray = toonsync::Frame::new(160, 120, [128, 128, 128, 255]).unwrap();
    toonsync::picture::save_png(&gray, &image).unwrap();
    let results = dir.join("resultados");

    let err = Pipeline::new(offline_config(&results))
        .unwrap()
        .run(&RunRequest::new(&image, "Hola"), &toonsync::status::NullStatus)
        .unwrap_err();
    assert!(matches!(err, ToonsyncError::NoFace));
    assert!(results.join("gris_cartoon.jpg").is_file());
    assert!(!results.join("gris.wav").exists());
    assert!(!results.join("gris.avi").exists());
}

#[test]
fn no_face_with_still_fallback_and_no_encoder_reports_partial() {
    let dir = fresh_dir("pipeline_still_fallback");
    let image = dir.join("gris.png");
    let gray = toonsync::Frame::new(160, 120, [128, 128, 128, 255]).unwrap();
    toonsync::picture::save_png(&gray, &image).unwrap();
    let results = dir.join("resultados");
    let cfg = PipelineConfig {
        still_fallback: true,
        ..offline_config(&results)
    };

    let report = Pipeline::new(cfg)
        .unwrap()
        .run(&RunRequest::new(&image, "Hola"), &toonsync::status::NullStatus)
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Partial);
    assert!(report.strategy.is_none());
    // the still fallback never renders a raw video
    assert!(report.raw_video.is_none());
    assert_eq!(
        report.artifacts,
        [results.join("gris_cartoon.jpg"), results.join("gris.wav")]
    );
    let mux = report.mux_command.as_deref().unwrap();
    assert!(mux.contains("-loop 1 -i"));
    assert!(mux.contains(&results.join("gris_cartoon.jpg").display().to_string()));
    assert!(results.join("gris.wav").is_file());
    assert!(results.join("gris_report.json").is_file());
    assert!(results.join("gris_mux.sh").is_file());
}

#[test]
fn unreadable_image_is_input_error() {
    let dir = fresh_dir("pipeline_bad_image");
    let image = dir.join("roto.jpg");
    std::fs::write(&image, b"not a jpeg").unwrap();
    let err = Pipeline::new(offline_config(&dir.join("r")))
        .unwrap()
        .run(&RunRequest::new(&image, "Hola"), &toonsync::status::NullStatus)
        .unwrap_err();
    assert!(matches!(err, ToonsyncError::Input(_)));
}

#[test]
fn spawned_run_streams_events_and_joins() {
    let dir = fresh_dir("pipeline_spawned");
    let image = write_portrait(&dir, "hilo.png");
    let pipeline = Pipeline::new(offline_config(&dir.join("resultados"))).unwrap();

    let handle = toonsync::spawn_run(pipeline, RunRequest::new(&image, "Hola desde un hilo"));
    let events: Vec<toonsync::Status> = handle.events().iter().collect();
    let report = handle.join().unwrap();

    assert_eq!(report.outcome, RunOutcome::Partial);
    assert_eq!(
        events.first(),
        Some(&toonsync::Status::Stage(Stage::Loading))
    );
    assert_eq!(events.last(), Some(&toonsync::Status::Stage(Stage::Done)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, toonsync::Status::Progress { done, total } if done == total))
    );
}

#[test]
fn batch_runs_every_image_and_survives_failures() {
    let dir = fresh_dir("pipeline_batch");
    let photos = dir.join("fotos");
    std::fs::create_dir_all(&photos).unwrap();
    write_portrait(&photos, "ana.png");
    write_portrait(&photos, "luis.png");
    std::fs::write(photos.join("roto.jpg"), b"garbage").unwrap();

    let pipeline = Pipeline::new(offline_config(&dir.join("resultados"))).unwrap();
    let items = toonsync::batch::run_batch(
        &pipeline,
        &photos,
        "Hola, soy {name}",
        &toonsync::status::NullStatus,
    )
    .unwrap();

    assert_eq!(items.len(), 3);
    assert!(items[0].result.is_ok());
    assert!(items[1].result.is_ok());
    assert!(items[2].result.is_err());
    assert!(dir.join("resultados").join("luis.avi").is_file());
}

#[test]
fn audio_only_run_stops_after_speech() {
    let dir = fresh_dir("pipeline_audio_only");
    let results = dir.join("resultados");
    let status = RecordingStatus::new();
    let report = Pipeline::new(offline_config(&results))
        .unwrap()
        .run(&RunRequest::audio_only("Solo la voz", "voz"), &status)
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::AudioOnly);
    assert_eq!(report.audio, results.join("voz.wav"));
    assert!(report.audio.is_file());
    assert!(report.audio_duration_sec > 0.0);
    assert!(report.cartoon.is_none());
    assert_eq!(report.artifacts, [results.join("voz.wav")]);
    assert_eq!(status.stages(), vec![Stage::Speech, Stage::Done]);
    assert!(!results.join("voz_report.json").exists());
}

/// Fires the token as soon as `stage` starts.
struct CancelAt {
    stage: Stage,
    token: tokio_util::sync::CancellationToken,
}

impl StatusSink for CancelAt {
    fn emit(&self, status: Status) {
        if status == Status::Stage(self.stage) {
            self.token.cancel();
        }
    }
}

#[test]
fn cancelling_mid_run_stops_before_the_mux() {
    let dir = fresh_dir("pipeline_cancelled");
    let image = write_portrait(&dir, "ana.png");
    let results = dir.join("resultados");
    let pipeline = Pipeline::new(offline_config(&results)).unwrap();
    let status = CancelAt {
        stage: Stage::Animating,
        token: pipeline.cancel_token(),
    };

    let err = pipeline
        .run(&RunRequest::new(&image, "Hola, soy Ana"), &status)
        .unwrap_err();
    assert!(matches!(err, ToonsyncError::Cancelled));
    assert!(pipeline.is_cancelled());
    // earlier artifacts stay, nothing after the interrupt is written
    assert!(results.join("ana.wav").is_file());
    assert!(!results.join("ana_report.json").exists());
    assert!(!results.join("ana_mux.sh").exists());
}

#[test]
fn cancelled_pipeline_refuses_new_runs() {
    let dir = fresh_dir("pipeline_cancelled_before");
    let image = write_portrait(&dir, "ana.png");
    let results = dir.join("resultados");
    let pipeline = Pipeline::new(offline_config(&results)).unwrap();
    pipeline.cancel_token().cancel();

    let err = pipeline
        .run(&RunRequest::new(&image, "Hola"), &toonsync::status::NullStatus)
        .unwrap_err();
    assert!(matches!(err, ToonsyncError::Cancelled));
    assert!(!results.join("ana_cartoon.jpg").exists());

    let photos = dir.join("fotos");
    std::fs::create_dir_all(&photos).unwrap();
    write_portrait(&photos, "luis.png");
    let batch = toonsync::batch::run_batch(&pipeline, &photos, "Hola", &toonsync::status::NullStatus);
    assert!(matches!(batch, Err(ToonsyncError::Cancelled)));
}

#[test]
fn run_handle_cancel_interrupts_the_worker() {
    let dir = fresh_dir("pipeline_handle_cancel");
    let image = write_portrait(&dir, "hilo.png");
    let cfg = PipelineConfig {
        frames_count: Some(1_000_000),
        ..offline_config(&dir.join("resultados"))
    };
    let pipeline = Pipeline::new(cfg).unwrap();

    let handle = toonsync::spawn_run(pipeline, RunRequest::new(&image, "Hola"));
    for event in handle.events() {
        if event == Status::Stage(Stage::Animating) {
            handle.cancel();
        }
    }
    assert!(matches!(handle.join(), Err(ToonsyncError::Cancelled)));
}
