//! Many photos, one text template.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::pipeline::{Pipeline, RunReport, RunRequest};
use crate::status::{Status, StatusSink};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Photos directly inside `dir`, sorted by path.
pub fn collect_images(dir: &Path) -> ToonsyncResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ToonsyncError::input(format!("cannot read directory '{}': {e}", dir.display())))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("list directory '{}'", dir.display()))?
            .path();
        let is_image = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
        if is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Replace every `{name}` in `template` with `name`.
pub fn personalize(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

pub struct BatchItem {
    pub image: PathBuf,
    pub result: ToonsyncResult<RunReport>,
}

/// Run every photo in `dir` through `pipeline`. A failing photo does not stop the batch; an
/// interrupt does, with [`ToonsyncError::Cancelled`].
#[tracing::instrument(skip(pipeline, text_template, status), fields(dir = %dir.display()))]
pub fn run_batch(
    pipeline: &Pipeline,
    dir: &Path,
    text_template: &str,
    status: &dyn StatusSink,
) -> ToonsyncResult<Vec<BatchItem>> {
    let images = collect_images(dir)?;
    tracing::info!(count = images.len(), "batch started");
    let mut items = Vec::with_capacity(images.len());
    for image in images {
        if pipeline.is_cancelled() {
            return Err(ToonsyncError::Cancelled);
        }
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let request = RunRequest {
            base_name: Some(stem.clone()),
            ..RunRequest::new(image.clone(), personalize(text_template, &stem))
        };
        let result = pipeline.run(&request, status);
        if matches!(result, Err(ToonsyncError::Cancelled)) {
            tracing::warn!(done = items.len(), "batch interrupted");
            return Err(ToonsyncError::Cancelled);
        }
        if let Err(e) = &result {
            tracing::warn!(image = %image.display(), "batch item failed: {e}");
            status.emit(Status::Warning(format!("{}: {e}", image.display())));
        }
        items.push(BatchItem { image, result });
    }
    Ok(items)
}
