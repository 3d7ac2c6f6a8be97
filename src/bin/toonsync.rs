use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use toonsync::animate::MouthStyle;
use toonsync::backend::BackendChoice;
use toonsync::status::{NullStatus, Stage};
use toonsync::{PipelineConfig, RunOutcome, RunReport, RunRequest, Status};

const TEST_TEXT: &str = "Hola, soy un avatar animado. Esta es una prueba de la línea de comandos.";
const TEST_OUTPUT: &str = "test_cli_output.mp4";
const TEST_IMAGE_NAME: &str = "test_cli_sample.png";

#[derive(Parser, Debug)]
#[command(
    name = "toonsync",
    version,
    about = "Cartoon talking-head video from a photo and a line of text"
)]
struct Cli {
    /// Input photo.
    #[arg(long = "imagen", visible_alias = "image")]
    imagen: Option<PathBuf>,

    /// Text to speak.
    #[arg(long = "texto", visible_alias = "text")]
    texto: Option<String>,

    /// Final video path.
    #[arg(long = "salida", visible_alias = "out")]
    salida: Option<PathBuf>,

    /// Run the bundled sample portrait with a fixed sentence.
    #[arg(long)]
    test: bool,

    /// Only synthesize the speech; no image is needed.
    #[arg(long = "solo-audio", visible_alias = "audio-only")]
    solo_audio: bool,

    /// Base name of the artifacts (defaults to the image file stem).
    #[arg(long = "nombre", visible_alias = "name")]
    nombre: Option<String>,

    /// Process every photo in a directory; `{name}` in the text becomes the file stem.
    #[arg(long = "lote", visible_alias = "batch")]
    lote: Option<PathBuf>,

    /// Results directory.
    #[arg(long)]
    results: Option<PathBuf>,

    /// Pipeline configuration JSON; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    fps: Option<u32>,

    /// Fixed frame count instead of following the audio length.
    #[arg(long)]
    frames: Option<u64>,

    /// Speaking rate, words per minute.
    #[arg(long)]
    rate: Option<u32>,

    /// Speech engine voice name.
    #[arg(long)]
    voice: Option<String>,

    /// Face-mesh landmark JSON for the photo.
    #[arg(long)]
    landmarks: Option<PathBuf>,

    #[arg(long, value_enum)]
    style: Option<StyleArg>,

    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Without a face, mux the still cartoon over the speech.
    #[arg(long)]
    still_fallback: bool,

    /// Report available tools and exit.
    #[arg(long)]
    doctor: bool,

    /// More logging (-v, -vv).
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Errors only.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StyleArg {
    Fill,
    Blend,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Auto,
    Polygon,
    Envelope,
}

impl From<BackendArg> for BackendChoice {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Auto => Self::Auto,
            BackendArg::Polygon => Self::Polygon,
            BackendArg::Envelope => Self::Envelope,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("toonsync={level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match cli.config.as_deref() {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = cli.results.clone() {
        cfg.results_dir = dir;
    }
    if let Some(fps) = cli.fps {
        cfg.fps = fps;
    }
    if cli.frames.is_some() {
        cfg.frames_count = cli.frames;
    }
    if let Some(rate) = cli.rate {
        cfg.speech.voice.rate_wpm = rate;
    }
    if cli.voice.is_some() {
        cfg.speech.voice.voice = cli.voice.clone();
    }
    if cli.landmarks.is_some() {
        cfg.locator.landmarks = cli.landmarks.clone();
    }
    if let Some(style) = cli.style {
        cfg.style = match style {
            StyleArg::Fill => MouthStyle::FILL,
            StyleArg::Blend => MouthStyle::BLEND,
        };
        cfg.aperture = None;
    }
    if let Some(b) = cli.backend {
        cfg.backend = b.into();
    }
    if cli.still_fallback {
        cfg.still_fallback = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = build_config(&cli)?;

    if cli.doctor {
        println!("{}", toonsync::doctor::inspect_environment(&cfg));
        return Ok(());
    }

    if let Some(dir) = cli.lote.as_deref() {
        let text = cli
            .texto
            .as_deref()
            .context("--texto is required with --lote")?;
        let pipeline = toonsync::Pipeline::new(cfg)?;
        install_interrupt_handler(pipeline.cancel_token());
        let items = toonsync::batch::run_batch(&pipeline, dir, text, &NullStatus)?;
        let failed = items.iter().filter(|i| i.result.is_err()).count();
        for item in &items {
            match &item.result {
                Ok(report) => println!("{}: {}", item.image.display(), summary(report)),
                Err(e) => println!("{}: error: {e}", item.image.display()),
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} of {} images failed", items.len());
        }
        return Ok(());
    }

    let request = if cli.solo_audio {
        let text = cli
            .texto
            .clone()
            .context("--texto is required with --solo-audio")?;
        let base = cli.nombre.clone().unwrap_or_else(|| {
            cli.imagen
                .as_deref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audio".to_owned())
        });
        RunRequest::audio_only(text, base)
    } else if cli.test {
        let image = cfg.results_dir.join(TEST_IMAGE_NAME);
        let sample = toonsync::picture::sample_portrait(640, 480)?;
        toonsync::picture::save_png(&sample, &image)?;
        let output = cli
            .salida
            .clone()
            .unwrap_or_else(|| cfg.results_dir.join(TEST_OUTPUT));
        RunRequest {
            base_name: Some(cli.nombre.clone().unwrap_or_else(|| "test_cli".to_owned())),
            output: Some(output),
            ..RunRequest::new(image, TEST_TEXT)
        }
    } else {
        let image = cli
            .imagen
            .clone()
            .context("--imagen is required (or use --test, --lote, --doctor)")?;
        let text = cli
            .texto
            .clone()
            .context("--texto is required (or use --test, --lote, --doctor)")?;
        RunRequest {
            base_name: cli.nombre.clone(),
            output: cli.salida.clone(),
            ..RunRequest::new(image, text)
        }
    };

    let pipeline = toonsync::Pipeline::new(cfg)?;
    install_interrupt_handler(pipeline.cancel_token());
    let handle = toonsync::spawn_run(pipeline, request);
    for event in handle.events() {
        match event {
            Status::Stage(Stage::Done) => {}
            Status::Stage(stage) => tracing::info!("{stage}"),
            Status::Progress { done, total } => tracing::debug!(done, total, "frames"),
            Status::Warning(w) => tracing::warn!("{w}"),
        }
    }
    let report = handle.join()?;
    println!("{}", summary(&report));
    Ok(())
}

/// Cancel `cancel` on Ctrl-C. The run kills its child processes and fails with "interrupted".
fn install_interrupt_handler(cancel: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("toonsync-signal".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!("interrupt handler unavailable: {e}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received Ctrl+C, shutting down...");
                    cancel.cancel();
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!("interrupt handler unavailable: {e}");
    }
}

fn summary(report: &RunReport) -> String {
    match report.outcome {
        RunOutcome::AudioOnly => format!("audio: {}", report.audio.display()),
        RunOutcome::Complete | RunOutcome::StillFallback => format!(
            "video: {}",
            report
                .final_video
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        ),
        RunOutcome::Partial => format!(
            "partial: audio {} video {} ({}); finish with {}",
            report.audio.display(),
            report
                .raw_video
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_owned()),
            report.message.as_deref().unwrap_or("mux failed"),
            report
                .mux_script
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "ffmpeg".to_owned())
        ),
    }
}
