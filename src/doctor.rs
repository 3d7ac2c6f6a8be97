//! Environment report behind `--doctor`.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::encode::{is_ffmpeg_on_path, is_tool_on_path};
use crate::speech::select_synthesizer;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub found: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct EnvironmentReport {
    pub tools: Vec<ToolStatus>,
    /// `ffmpeg -version` ran successfully.
    pub encoder_runs: bool,
    pub results_dir: PathBuf,
    pub results_dir_writable: bool,
    pub speech_engine: String,
}

impl EnvironmentReport {
    pub fn can_mux(&self) -> bool {
        self.encoder_runs
    }
}

impl std::fmt::Display for EnvironmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for t in &self.tools {
            writeln!(f, "{:<10} {}", t.name, if t.found { "found" } else { "missing" })?;
        }
        writeln!(
            f,
            "{:<10} {}",
            "encoder",
            if self.encoder_runs { "ok" } else { "unusable, runs end partial" }
        )?;
        writeln!(
            f,
            "{:<10} {} ({})",
            "results",
            self.results_dir.display(),
            if self.results_dir_writable { "writable" } else { "not writable" }
        )?;
        write!(f, "{:<10} {}", "speech", self.speech_engine)
    }
}

const TOOLS: [&str; 4] = ["ffmpeg", "ffprobe", "espeak-ng", "espeak"];

pub fn inspect_environment(config: &PipelineConfig) -> EnvironmentReport {
    let tools = TOOLS
        .iter()
        .map(|name| ToolStatus {
            name: (*name).to_owned(),
            found: is_tool_on_path(name),
        })
        .collect();
    let report = EnvironmentReport {
        tools,
        encoder_runs: is_ffmpeg_on_path(),
        results_dir: config.results_dir.clone(),
        results_dir_writable: dir_is_writable(&config.results_dir),
        speech_engine: select_synthesizer(&config.speech, &CancellationToken::new())
            .name()
            .to_owned(),
    };
    tracing::debug!(?report, "environment inspected");
    report
}

fn dir_is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".toonsync_write_check");
    let ok = std::fs::write(&marker, b"ok").is_ok();
    let _ = std::fs::remove_file(&marker);
    ok
}
