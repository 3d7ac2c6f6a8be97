use std::path::{Path, PathBuf};

/// File names of every artifact of one run, all inside the results directory except an
/// explicit final-output override.
///
/// An existing file with the same name is overwritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    results_dir: PathBuf,
    base: String,
    final_override: Option<PathBuf>,
}

impl OutputLayout {
    pub fn new(
        results_dir: impl Into<PathBuf>,
        base_name: &str,
        final_override: Option<PathBuf>,
    ) -> Self {
        Self {
            results_dir: results_dir.into(),
            base: sanitize_base_name(base_name),
            final_override,
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn cartoon_path(&self) -> PathBuf {
        self.file(&format!("{}_cartoon.jpg", self.base))
    }

    pub fn audio_path(&self) -> PathBuf {
        self.file(&format!("{}.wav", self.base))
    }

    pub fn raw_video_path(&self) -> PathBuf {
        self.file(&format!("{}.avi", self.base))
    }

    pub fn final_path(&self) -> PathBuf {
        self.final_override
            .clone()
            .unwrap_or_else(|| self.file(&format!("{}_final.mp4", self.base)))
    }

    pub fn report_path(&self) -> PathBuf {
        self.file(&format!("{}_report.json", self.base))
    }

    /// Shell script that finishes an interrupted mux.
    pub fn mux_script_path(&self) -> PathBuf {
        self.file(&format!("{}_mux.sh", self.base))
    }

    fn file(&self, name: &str) -> PathBuf {
        self.results_dir.join(name)
    }
}

/// Keep letters, digits, `-` and `_`; everything else becomes `_`.
pub fn sanitize_base_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "avatar".to_owned()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_follow_the_base() {
        let l = OutputLayout::new("resultados", "ana", None);
        assert_eq!(l.cartoon_path(), Path::new("resultados/ana_cartoon.jpg"));
        assert_eq!(l.audio_path(), Path::new("resultados/ana.wav"));
        assert_eq!(l.raw_video_path(), Path::new("resultados/ana.avi"));
        assert_eq!(l.final_path(), Path::new("resultados/ana_final.mp4"));
        assert_eq!(l.report_path(), Path::new("resultados/ana_report.json"));
        assert_eq!(l.mux_script_path(), Path::new("resultados/ana_mux.sh"));
    }

    #[test]
    fn final_override_only_moves_the_final_video() {
        let l = OutputLayout::new("out", "x", Some(PathBuf::from("elsewhere/v.mp4")));
        assert_eq!(l.final_path(), Path::new("elsewhere/v.mp4"));
        assert_eq!(l.audio_path(), Path::new("out/x.wav"));
    }

    #[test]
    fn base_names_are_sanitized() {
        assert_eq!(sanitize_base_name("mi foto/../x"), "mi_foto____x");
        assert_eq!(sanitize_base_name("José-1"), "José-1");
        assert_eq!(sanitize_base_name(" ./ "), "avatar");
    }
}
