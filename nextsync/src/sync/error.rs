use std::path::PathBuf;
use std::sync::Arc;

use nextsync_core::NextcloudError;
use thiserror::Error;

use super::paths::PathError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote error: {0}")]
    Remote(#[from] NextcloudError),
    #[error("bulk upload of {batch_size} files failed: {source}")]
    BatchFailed {
        batch_size: usize,
        source: Arc<NextcloudError>,
    },
    #[error("local io error for {}: {source}", path.display())]
    Local {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

impl SyncError {
    pub fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Local {
            path: path.into(),
            source,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}
