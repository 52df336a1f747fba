use indicatif::{ProgressBar, ProgressStyle};

use crate::sync::batcher::FileOutcome;
use crate::sync::engine::Progress;

const TEMPLATE: &str = "Uploading |{bar:50.cyan/blue}| {percent}% {bytes}/{total_bytes} ({eta}) {msg}";

/// Terminal bar driven by the engine's progress callback.
#[derive(Clone)]
pub struct UploadProgressBar {
    bar: ProgressBar,
}

impl UploadProgressBar {
    pub fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        Self::style(&bar);
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    fn style(bar: &ProgressBar) {
        match ProgressStyle::with_template(TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(err) => tracing::debug!(error = %err, "progress template rejected"),
        }
    }

    pub fn update(&self, progress: &Progress, outcome: &FileOutcome) {
        if self.bar.length() != Some(progress.total_bytes) {
            self.bar.set_length(progress.total_bytes);
        }
        self.bar.set_position(progress.processed_bytes);
        let name = outcome
            .local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(format!(
            "{}/{} {name}",
            progress.files_done, progress.files_total
        ));
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}
