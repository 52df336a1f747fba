use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sync::batcher::{
    BatchLimits, DEFAULT_FLUSH_THRESHOLD, DEFAULT_MAX_FILE_SIZE, DEFAULT_STREAM_CONCURRENCY,
};

const DEFAULT_MAX_RETRIES: u64 = 3;
const DEFAULT_EXIFTOOL: &str = "exiftool";
const DEFAULT_LOG_FILE: &str = "process.log";
const STDERR_LOG: &str = "-";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Connection and tuning settings, read from the environment (and `.env`).
#[derive(Clone)]
pub struct SyncConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub limits: BatchLimits,
    pub max_retries: u32,
    pub exiftool: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("limits", &self.limits)
            .field("max_retries", &self.max_retries)
            .field("exiftool", &self.exiftool)
            .field("log_file", &self.log_file)
            .finish()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let server_url = required("SERVER_URL")?;
        let username = required("NC_USERNAME")?;
        let password = lookup("PASSWORD")
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing("PASSWORD"))?;

        let limits = BatchLimits {
            max_file_size: read_u64(&lookup, "NEXTSYNC_BULK_MAX_FILE_BYTES", DEFAULT_MAX_FILE_SIZE),
            flush_threshold: read_u64(&lookup, "NEXTSYNC_BULK_FLUSH_BYTES", DEFAULT_FLUSH_THRESHOLD),
            stream_concurrency: usize::try_from(read_u64(
                &lookup,
                "NEXTSYNC_UPLOAD_CONCURRENCY",
                DEFAULT_STREAM_CONCURRENCY as u64,
            ))
            .unwrap_or(DEFAULT_STREAM_CONCURRENCY),
        };
        let max_retries = u32::try_from(read_u64(&lookup, "NEXTSYNC_MAX_RETRIES", DEFAULT_MAX_RETRIES))
            .unwrap_or(u32::MAX);
        let home = dirs::home_dir();
        let exiftool = lookup("NEXTSYNC_EXIFTOOL")
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_path(&value, home.as_deref()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXIFTOOL));
        // "-" keeps logs on stderr
        let log_file = match lookup("NEXTSYNC_LOG_FILE").filter(|value| !value.trim().is_empty()) {
            Some(value) if value.trim() == STDERR_LOG => None,
            Some(value) => Some(expand_path(&value, home.as_deref())),
            None => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        };

        Ok(Self {
            server_url,
            username,
            password,
            limits,
            max_retries,
            exiftool,
            log_file,
        })
    }
}

/// Expands a leading `~` against the home directory.
pub fn resolve_local_path(value: &str) -> PathBuf {
    expand_path(value, dirs::home_dir().as_deref())
}

fn expand_path(value: &str, home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) => expand_with_home(value, home),
        None => PathBuf::from(value),
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
