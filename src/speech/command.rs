use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::encode::ensure_parent_dir;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::process::run_checked;
use crate::speech::{SpeechSynthesizer, VoiceSettings, check_text};

/// An espeak-compatible command line engine.
#[derive(Clone, Debug)]
pub struct CommandSynthesizer {
    program: String,
    timeout: Duration,
    cancel: CancellationToken,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Kill the engine when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn command(&self, text: &str, voice: &VoiceSettings, out: &Path) -> Command {
        // espeak amplitude runs 0..=200 with 100 as normal.
        let amplitude = (voice.volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        let mut cmd = Command::new(&self.program);
        cmd.arg("-w")
            .arg(out)
            .args(["-s", &voice.rate_wpm.to_string()])
            .args(["-a", &amplitude.to_string()]);
        if let Some(v) = voice.voice.as_deref() {
            cmd.args(["-v", v]);
        }
        // Text starting with '-' is not an option.
        cmd.arg("--").arg(text);
        cmd
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn name(&self) -> &str {
        &self.program
    }

    #[tracing::instrument(skip(self, text, voice), fields(program = %self.program))]
    fn synthesize(&self, text: &str, voice: &VoiceSettings, out: &Path) -> ToonsyncResult<()> {
        let text = check_text(text)?;
        voice.validate()?;
        ensure_parent_dir(out)?;

        let output = run_checked(
            self.command(text, voice, out),
            self.timeout,
            &self.cancel,
            &self.program,
            ToonsyncError::Speech,
        )?;
        if !output.success() {
            return Err(ToonsyncError::speech(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                output.stderr_lossy()
            )));
        }
        if !out.is_file() {
            return Err(ToonsyncError::speech(format!(
                "{} finished but '{}' was not written",
                self.program,
                out.display()
            )));
        }
        Ok(())
    }
}
