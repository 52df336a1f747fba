use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use nextsync_core::{BulkEntry, NextcloudClient, NextcloudError};

use super::backoff::Backoff;

#[async_trait]
pub trait RemoteFs: Send + Sync {
    async fn list(&self, path: &str) -> Result<BTreeMap<String, bool>, NextcloudError>;

    async fn create_folder(&self, path: &str) -> Result<(), NextcloudError>;

    async fn upload_stream(
        &self,
        source: &Path,
        remote_path: &str,
        ctime: Option<i64>,
        mtime: Option<i64>,
    ) -> Result<(), NextcloudError>;

    async fn upload_bulk(&self, entries: &[BulkEntry]) -> Result<(), NextcloudError>;
}

#[async_trait]
impl RemoteFs for NextcloudClient {
    async fn list(&self, path: &str) -> Result<BTreeMap<String, bool>, NextcloudError> {
        self.list_folder(path).await
    }

    async fn create_folder(&self, path: &str) -> Result<(), NextcloudError> {
        NextcloudClient::create_folder(self, path).await
    }

    async fn upload_stream(
        &self,
        source: &Path,
        remote_path: &str,
        ctime: Option<i64>,
        mtime: Option<i64>,
    ) -> Result<(), NextcloudError> {
        self.upload_file(source, remote_path, ctime, mtime).await
    }

    async fn upload_bulk(&self, entries: &[BulkEntry]) -> Result<(), NextcloudError> {
        NextcloudClient::upload_bulk(self, entries).await
    }
}

#[async_trait]
impl<T: RemoteFs + ?Sized> RemoteFs for &T {
    async fn list(&self, path: &str) -> Result<BTreeMap<String, bool>, NextcloudError> {
        (**self).list(path).await
    }

    async fn create_folder(&self, path: &str) -> Result<(), NextcloudError> {
        (**self).create_folder(path).await
    }

    async fn upload_stream(
        &self,
        source: &Path,
        remote_path: &str,
        ctime: Option<i64>,
        mtime: Option<i64>,
    ) -> Result<(), NextcloudError> {
        (**self)
            .upload_stream(source, remote_path, ctime, mtime)
            .await
    }

    async fn upload_bulk(&self, entries: &[BulkEntry]) -> Result<(), NextcloudError> {
        (**self).upload_bulk(entries).await
    }
}

pub struct Retrying<R> {
    inner: R,
    backoff: Backoff,
    max_retries: u32,
}

impl<R: RemoteFs> Retrying<R> {
    pub fn new(inner: R, max_retries: u32) -> Self {
        Self {
            inner,
            backoff: Backoff::default(),
            max_retries,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn attempt<T, F, Fut>(
        &self,
        operation: &'static str,
        path: &str,
        mut call: F,
    ) -> Result<T, NextcloudError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, NextcloudError>> + Send,
        T: Send,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<R: RemoteFs> RemoteFs for Retrying<R> {
    async fn list(&self, path: &str) -> Result<BTreeMap<String, bool>, NextcloudError> {
        self.attempt("list", path, || self.inner.list(path)).await
    }

    async fn create_folder(&self, path: &str) -> Result<(), NextcloudError> {
        self.attempt("create_folder", path, || self.inner.create_folder(path))
            .await
    }

    async fn upload_stream(
        &self,
        source: &Path,
        remote_path: &str,
        ctime: Option<i64>,
        mtime: Option<i64>,
    ) -> Result<(), NextcloudError> {
        self.attempt("upload_stream", remote_path, || {
            self.inner.upload_stream(source, remote_path, ctime, mtime)
        })
        .await
    }

    async fn upload_bulk(&self, entries: &[BulkEntry]) -> Result<(), NextcloudError> {
        let label = entries
            .first()
            .map(|entry| entry.remote_path.as_str())
            .unwrap_or_default();
        self.attempt("upload_bulk", label, || self.inner.upload_bulk(entries))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::{Call, RecordingRemote, api_error};

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let remote = RecordingRemote::default();
        remote.fail_create_times("/Photos/2023", 2, || api_error(503));
        let retrying = Retrying::new(&remote, 3).with_backoff(Backoff::immediate());

        retrying.create_folder("/Photos/2023").await.unwrap();

        assert_eq!(remote.count(|call| matches!(call, Call::CreateFolder(_))), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let remote = RecordingRemote::default();
        remote.fail_create_times("/Photos/2023", 10, || api_error(503));
        let retrying = Retrying::new(&remote, 2).with_backoff(Backoff::immediate());

        let err = retrying.create_folder("/Photos/2023").await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(remote.count(|call| matches!(call, Call::CreateFolder(_))), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let remote = RecordingRemote::default();
        remote.fail_create_times("/Photos/2023", 10, || api_error(403));
        let retrying = Retrying::new(&remote, 5).with_backoff(Backoff::immediate());

        assert!(retrying.create_folder("/Photos/2023").await.is_err());
        assert_eq!(remote.count(|call| matches!(call, Call::CreateFolder(_))), 1);
    }
}
