use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use nextsync_core::{BulkEntry, NextcloudError};

use super::error::SyncError;
use super::paths::{PathError, file_name_of, join_remote};
use super::remote::RemoteFs;
use crate::media::Timestamps;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_000_000;
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 50_000_000;
pub const DEFAULT_STREAM_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_file_size: u64,
    pub flush_threshold: u64,
    pub stream_concurrency: usize,
}

impl BatchLimits {
    fn stream_width(&self) -> usize {
        self.stream_concurrency.max(1)
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            stream_concurrency: DEFAULT_STREAM_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub local_path: PathBuf,
    pub remote_parent: String,
    pub file_name: String,
    pub created: Option<i64>,
    pub modified: Option<i64>,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(
        local_path: impl Into<PathBuf>,
        remote_parent: impl Into<String>,
        timestamps: Timestamps,
        size: u64,
    ) -> Result<Self, PathError> {
        let local_path = local_path.into();
        let file_name = file_name_of(&local_path)?;
        Ok(Self {
            local_path,
            remote_parent: remote_parent.into(),
            file_name,
            created: timestamps.created,
            modified: timestamps.modified,
            size,
        })
    }

    pub fn remote_path(&self) -> String {
        join_remote(&self.remote_parent, &self.file_name)
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub local_path: PathBuf,
    pub remote_path: Option<String>,
    pub size: u64,
    pub result: Result<(), SyncError>,
}

impl FileOutcome {
    pub fn uploaded(file: &FileDescriptor) -> Self {
        Self {
            local_path: file.local_path.clone(),
            remote_path: Some(file.remote_path()),
            size: file.size,
            result: Ok(()),
        }
    }

    pub fn failed(file: &FileDescriptor, error: SyncError) -> Self {
        Self {
            local_path: file.local_path.clone(),
            remote_path: Some(file.remote_path()),
            size: file.size,
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct SubmitReport {
    pub settled: Vec<FileOutcome>,
}

impl SubmitReport {
    pub fn first_error(&self) -> Option<&SyncError> {
        self.settled
            .iter()
            .find_map(|outcome| outcome.result.as_ref().err())
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

pub struct UploadBatcher<'a, R: ?Sized> {
    remote: &'a R,
    limits: BatchLimits,
    pending: Vec<FileDescriptor>,
    pending_bytes: u64,
    streaming: Vec<FileDescriptor>,
}

impl<'a, R: RemoteFs + ?Sized> UploadBatcher<'a, R> {
    pub fn new(remote: &'a R, limits: BatchLimits) -> Self {
        Self {
            remote,
            limits,
            pending: Vec::new(),
            pending_bytes: 0,
            streaming: Vec::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }

    pub fn streaming_len(&self) -> usize {
        self.streaming.len()
    }

    pub async fn submit(&mut self, file: FileDescriptor, is_last: bool) -> SubmitReport {
        if file.size <= self.limits.max_file_size {
            self.pending_bytes += file.size;
            self.pending.push(file);
        } else {
            self.streaming.push(file);
        }

        let mut settled = Vec::new();
        if self.pending_bytes >= self.limits.flush_threshold || is_last {
            settled.extend(self.flush().await);
        }
        if self.streaming.len() >= self.limits.stream_width() || is_last {
            settled.extend(self.stream_queued().await);
        }
        SubmitReport { settled }
    }

    pub async fn finish(&mut self) -> SubmitReport {
        let mut settled = self.flush().await;
        settled.extend(self.stream_queued().await);
        SubmitReport { settled }
    }

    async fn stream_queued(&mut self) -> Vec<FileOutcome> {
        let queued = std::mem::take(&mut self.streaming);
        if queued.is_empty() {
            return Vec::new();
        }
        let width = self.limits.stream_width();
        tracing::debug!(files = queued.len(), width, "streaming queued files");
        let this: &Self = self;
        stream::iter(queued)
            .map(|file| this.stream(file))
            .buffered(width)
            .collect()
            .await
    }

    async fn flush(&mut self) -> Vec<FileOutcome> {
        let batch = std::mem::take(&mut self.pending);
        let batch_bytes = std::mem::take(&mut self.pending_bytes);
        if batch.is_empty() {
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        let mut entries = Vec::with_capacity(batch.len());
        let mut sent = Vec::with_capacity(batch.len());
        for file in batch {
            match tokio::fs::read(&file.local_path).await {
                Ok(content) => {
                    let mtime = file
                        .modified
                        .or(file.created)
                        .unwrap_or_else(|| chrono::Utc::now().timestamp());
                    entries.push(BulkEntry::new(file.remote_path(), mtime, content));
                    sent.push(file);
                }
                Err(err) => {
                    tracing::error!(path = %file.local_path.display(), error = %err, "cannot read queued file");
                    let error = SyncError::local(&file.local_path, err);
                    outcomes.push(FileOutcome::failed(&file, error));
                }
            }
        }
        if entries.is_empty() {
            return outcomes;
        }

        let batch_size = entries.len();
        match self.remote.upload_bulk(&entries).await {
            Ok(()) => {
                tracing::info!(files = batch_size, bytes = batch_bytes, "bulk upload finished");
                outcomes.extend(sent.iter().map(FileOutcome::uploaded));
            }
            Err(err) => {
                tracing::error!(files = batch_size, error = %err, "bulk upload failed");
                let source = Arc::new(err);
                outcomes.extend(sent.iter().map(|file| {
                    FileOutcome::failed(
                        file,
                        SyncError::BatchFailed {
                            batch_size,
                            source: Arc::clone(&source),
                        },
                    )
                }));
            }
        }
        outcomes
    }

    async fn stream(&self, file: FileDescriptor) -> FileOutcome {
        let remote_path = file.remote_path();
        let result = self
            .remote
            .upload_stream(&file.local_path, &remote_path, file.created, file.modified)
            .await;
        match result {
            Ok(()) => {
                tracing::info!(path = %remote_path, bytes = file.size, "uploaded");
                FileOutcome::uploaded(&file)
            }
            Err(NextcloudError::Io(err)) => {
                tracing::error!(path = %file.local_path.display(), error = %err, "cannot read file");
                let error = SyncError::local(&file.local_path, err);
                FileOutcome::failed(&file, error)
            }
            Err(err) => {
                tracing::error!(path = %remote_path, error = %err, "upload failed");
                FileOutcome::failed(&file, err.into())
            }
        }
    }
}
