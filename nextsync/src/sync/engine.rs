use std::path::{Path, PathBuf};

use super::batcher::{BatchLimits, FileDescriptor, FileOutcome, SubmitReport, UploadBatcher};
use super::bucket::{DateBucketResolver, Granularity};
use super::error::SyncError;
use super::paths::normalize_remote;
use super::remote::RemoteFs;
use super::tree::{RemoteTree, scan_remote_tree};
use crate::media::MetadataSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub uploaded_bytes: u64,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    pub files_done: usize,
    pub files_total: usize,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<FileOutcome>,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

pub type ProgressObserver = Box<dyn Fn(&Progress, &FileOutcome) + Send + Sync>;

pub struct SyncEngine<R, M> {
    remote: R,
    metadata: M,
    limits: BatchLimits,
    observer: Option<ProgressObserver>,
}

impl<R: RemoteFs, M: MetadataSource> SyncEngine<R, M> {
    pub fn new(remote: R, metadata: M, limits: BatchLimits) -> Self {
        Self {
            remote,
            metadata,
            limits,
            observer: None,
        }
    }

    pub fn with_progress(
        mut self,
        observer: impl Fn(&Progress, &FileOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub async fn run(
        &self,
        files: &[PathBuf],
        remote_root: &str,
        granularity: Option<Granularity>,
    ) -> Result<SyncReport, SyncError> {
        let root = normalize_remote(remote_root)?;
        let mut tree = scan_remote_tree(&self.remote, &root).await;
        tracing::debug!("remote tree:\n{}", tree.render());
        Ok(self.run_with_tree(&mut tree, files, granularity).await)
    }

    pub async fn run_with_tree(
        &self,
        tree: &mut RemoteTree,
        files: &[PathBuf],
        granularity: Option<Granularity>,
    ) -> SyncReport {
        let mut sizes = Vec::with_capacity(files.len());
        for path in files {
            sizes.push(tokio::fs::metadata(path).await.map(|meta| meta.len()));
        }
        let total_bytes = sizes
            .iter()
            .filter_map(|size| size.as_ref().ok())
            .sum::<u64>();

        let mut tracker = Tracker {
            observer: self.observer.as_ref(),
            progress: Progress {
                total_bytes,
                files_total: files.len(),
                ..Progress::default()
            },
            outcomes: Vec::with_capacity(files.len()),
        };
        tracing::info!(
            files = files.len(),
            bytes = total_bytes,
            root = tree.name(),
            "starting upload"
        );

        let resolver = DateBucketResolver::new(&self.remote, &self.metadata);
        let mut batcher = UploadBatcher::new(&self.remote, self.limits);
        for (index, (path, size)) in files.iter().zip(sizes).enumerate() {
            let is_last = index + 1 == files.len();
            let size = match size {
                Ok(size) => size,
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "cannot stat local file");
                    tracker.record(unresolved(path, SyncError::local(path, err)));
                    continue;
                }
            };

            let resolution = resolver.resolve(tree, path, granularity).await;
            let file = match FileDescriptor::new(
                path.clone(),
                resolution.destination,
                resolution.timestamps,
                size,
            ) {
                Ok(file) => file,
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "cannot name remote file");
                    tracker.record(unresolved(path, err.into()));
                    continue;
                }
            };
            tracing::debug!(
                path = %file.local_path.display(),
                remote = %file.remote_path(),
                bytes = file.size,
                "uploading"
            );
            tracker.record_all(batcher.submit(file, is_last).await);
        }
        tracker.record_all(batcher.finish().await);

        let report = SyncReport {
            outcomes: tracker.outcomes,
            uploaded_bytes: tracker.progress.uploaded_bytes,
            total_bytes,
        };
        tracing::info!(
            uploaded = report.succeeded(),
            failed = report.failed(),
            bytes = report.uploaded_bytes,
            "upload finished"
        );
        report
    }
}

struct Tracker<'a> {
    observer: Option<&'a ProgressObserver>,
    progress: Progress,
    outcomes: Vec<FileOutcome>,
}

impl Tracker<'_> {
    fn record_all(&mut self, report: SubmitReport) {
        for outcome in report.settled {
            self.record(outcome);
        }
    }

    fn record(&mut self, outcome: FileOutcome) {
        self.progress.files_done += 1;
        self.progress.processed_bytes += outcome.size;
        if outcome.is_success() {
            self.progress.uploaded_bytes += outcome.size;
        }
        if let Some(observer) = self.observer {
            observer(&self.progress, &outcome);
        }
        self.outcomes.push(outcome);
    }
}

fn unresolved(path: &Path, error: SyncError) -> FileOutcome {
    FileOutcome {
        local_path: path.to_path_buf(),
        remote_path: None,
        size: 0,
        result: Err(error),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
