use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use nextsync_core::{BulkEntry, NextcloudError, StatusCode};

use super::remote::RemoteFs;
use crate::media::{MetadataSource, Timestamps};

type ErrorFactory = Box<dyn Fn() -> NextcloudError + Send + Sync>;

pub(crate) fn api_error(code: u16) -> NextcloudError {
    NextcloudError::Api {
        status: StatusCode::from_u16(code).unwrap(),
        body: String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List(String),
    CreateFolder(String),
    UploadStream(String),
    UploadBulk(Vec<String>),
}

struct Failure {
    remaining: usize,
    make: ErrorFactory,
}

impl Failure {
    fn next(&mut self) -> Option<NextcloudError> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some((self.make)())
    }
}

#[derive(Default)]
pub(crate) struct RecordingRemote {
    calls: Mutex<Vec<Call>>,
    listings: Mutex<HashMap<String, BTreeMap<String, bool>>>,
    list_failures: Mutex<HashMap<String, VecDeque<NextcloudError>>>,
    create_failures: Mutex<HashMap<String, Failure>>,
    stream_failures: Mutex<HashMap<String, Failure>>,
    bulk_failures: Mutex<Option<Failure>>,
}

impl RecordingRemote {
    pub(crate) fn set_listing(&self, path: &str, entries: &[(&str, bool)]) {
        let listing = entries
            .iter()
            .map(|(name, is_dir)| (name.to_string(), *is_dir))
            .collect();
        self.listings
            .lock()
            .unwrap()
            .insert(path.to_string(), listing);
    }

    pub(crate) fn fail_list(&self, path: &str, err: NextcloudError) {
        self.list_failures
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(err);
    }

    pub(crate) fn fail_create_times(
        &self,
        path: &str,
        times: usize,
        make: impl Fn() -> NextcloudError + Send + Sync + 'static,
    ) {
        self.create_failures.lock().unwrap().insert(
            path.to_string(),
            Failure {
                remaining: times,
                make: Box::new(make),
            },
        );
    }

    pub(crate) fn fail_stream(
        &self,
        remote_path: &str,
        make: impl Fn() -> NextcloudError + Send + Sync + 'static,
    ) {
        self.stream_failures.lock().unwrap().insert(
            remote_path.to_string(),
            Failure {
                remaining: usize::MAX,
                make: Box::new(make),
            },
        );
    }

    pub(crate) fn fail_bulk_times(
        &self,
        times: usize,
        make: impl Fn() -> NextcloudError + Send + Sync + 'static,
    ) {
        *self.bulk_failures.lock().unwrap() = Some(Failure {
            remaining: times,
            make: Box::new(make),
        });
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    pub(crate) fn created_folders(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateFolder(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn bulk_batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadBulk(paths) => Some(paths),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn streamed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadStream(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteFs for RecordingRemote {
    async fn list(&self, path: &str) -> Result<BTreeMap<String, bool>, NextcloudError> {
        self.record(Call::List(path.to_string()));
        if let Some(err) = self
            .list_failures
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_folder(&self, path: &str) -> Result<(), NextcloudError> {
        self.record(Call::CreateFolder(path.to_string()));
        match self
            .create_failures
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(Failure::next)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn upload_stream(
        &self,
        source: &Path,
        remote_path: &str,
        _ctime: Option<i64>,
        _mtime: Option<i64>,
    ) -> Result<(), NextcloudError> {
        self.record(Call::UploadStream(remote_path.to_string()));
        if let Some(err) = self
            .stream_failures
            .lock()
            .unwrap()
            .get_mut(remote_path)
            .and_then(Failure::next)
        {
            return Err(err);
        }
        tokio::fs::metadata(source).await?;
        Ok(())
    }

    async fn upload_bulk(&self, entries: &[BulkEntry]) -> Result<(), NextcloudError> {
        self.record(Call::UploadBulk(
            entries
                .iter()
                .map(|entry| entry.remote_path.clone())
                .collect(),
        ));
        match self.bulk_failures.lock().unwrap().as_mut().and_then(Failure::next) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FixedMetadata {
    timestamps: HashMap<PathBuf, Timestamps>,
}

impl FixedMetadata {
    pub(crate) fn with(mut self, path: impl Into<PathBuf>, modified: i64) -> Self {
        self.timestamps.insert(
            path.into(),
            Timestamps {
                created: Some(modified),
                modified: Some(modified),
            },
        );
        self
    }
}

#[async_trait]
impl MetadataSource for FixedMetadata {
    async fn timestamps(&self, path: &Path) -> Timestamps {
        self.timestamps.get(path).copied().unwrap_or_default()
    }
}
