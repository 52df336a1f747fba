use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use tokio::process::Command;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Creation and modification time of a media file, in unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created: Option<i64>,
    pub modified: Option<i64>,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn timestamps(&self, path: &Path) -> Timestamps;
}

#[async_trait]
impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    async fn timestamps(&self, path: &Path) -> Timestamps {
        (**self).timestamps(path).await
    }
}

/// Reads capture dates with `exiftool`, falling back to filesystem times
/// when the tool is missing or the file carries no usable tags.
#[derive(Debug, Clone)]
pub struct ExifToolExtractor {
    program: PathBuf,
}

impl Default for ExifToolExtractor {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExifRecord {
    date_time_original: Option<String>,
    create_date: Option<String>,
    modify_date: Option<String>,
}

impl ExifToolExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run_exiftool(&self, path: &Path) -> Option<Timestamps> {
        let output = Command::new(&self.program)
            .arg("-j")
            .arg("-m")
            .arg("-d")
            .arg(EXIF_DATE_FORMAT)
            .arg("-DateTimeOriginal")
            .arg("-CreateDate")
            .arg("-ModifyDate")
            .arg(path)
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!(program = %self.program.display(), error = %err, "exiftool unavailable");
                return None;
            }
        };
        if !output.status.success() {
            tracing::debug!(
                path = %path.display(),
                status = %output.status,
                "exiftool reported no metadata"
            );
            return None;
        }
        parse_exiftool_json(&output.stdout).filter(|stamps| stamps.modified.is_some())
    }
}

#[async_trait]
impl MetadataSource for ExifToolExtractor {
    async fn timestamps(&self, path: &Path) -> Timestamps {
        if let Some(stamps) = self.run_exiftool(path).await {
            return stamps;
        }
        match filesystem_timestamps(path).await {
            Ok(stamps) => stamps,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "cannot read file times");
                Timestamps::default()
            }
        }
    }
}

/// Capture time wins over the generic modify date so bucketing follows when
/// the picture was taken.
fn parse_exiftool_json(stdout: &[u8]) -> Option<Timestamps> {
    let records: Vec<ExifRecord> = serde_json::from_slice(stdout).ok()?;
    let record = records.into_iter().next()?;
    let original = parse_exif_date(record.date_time_original.as_deref());
    let create = parse_exif_date(record.create_date.as_deref());
    let modify = parse_exif_date(record.modify_date.as_deref());
    Some(Timestamps {
        created: original.or(create),
        modified: original.or(create).or(modify),
    })
}

fn parse_exif_date(value: Option<&str>) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(value?.trim(), EXIF_DATE_FORMAT).ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|date| date.timestamp())
}

async fn filesystem_timestamps(path: &Path) -> std::io::Result<Timestamps> {
    let metadata = tokio::fs::metadata(path).await?;
    let modified = metadata.modified().ok().and_then(unix_seconds);
    let created = metadata
        .created()
        .ok()
        .and_then(unix_seconds)
        .or(modified);
    Ok(Timestamps { created, modified })
}

fn unix_seconds(time: SystemTime) -> Option<i64> {
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}
