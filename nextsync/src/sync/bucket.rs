use std::path::Path;

use chrono::{Datelike, Local, TimeZone};

use super::paths::{join_relative, join_remote};
use super::remote::RemoteFs;
use super::tree::RemoteTree;
use crate::media::{MetadataSource, Timestamps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum Granularity {
    Year,
    Month,
    Day,
}

impl Granularity {
    fn next(self) -> Option<Self> {
        match self {
            Granularity::Year => Some(Granularity::Month),
            Granularity::Month => Some(Granularity::Day),
            Granularity::Day => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub destination: String,
    pub timestamps: Timestamps,
}

struct BucketDate {
    year: String,
    month: String,
    day: String,
}

impl BucketDate {
    fn from_unix(secs: i64) -> Option<Self> {
        let date = Local.timestamp_opt(secs, 0).single()?;
        Some(Self {
            year: format!("{:04}", date.year()),
            month: format!("{:02}", date.month()),
            day: format!("{:02}", date.day()),
        })
    }

    fn segment(&self, level: Granularity) -> &str {
        match level {
            Granularity::Year => &self.year,
            Granularity::Month => &self.month,
            Granularity::Day => &self.day,
        }
    }
}

#[derive(Clone, Copy)]
enum Step {
    Pending(Granularity),
    Resolved(Granularity),
}

pub struct DateBucketResolver<'a, R: ?Sized, M: ?Sized> {
    remote: &'a R,
    metadata: &'a M,
}

impl<'a, R, M> DateBucketResolver<'a, R, M>
where
    R: RemoteFs + ?Sized,
    M: MetadataSource + ?Sized,
{
    pub fn new(remote: &'a R, metadata: &'a M) -> Self {
        Self { remote, metadata }
    }

    // On a failed MKCOL the deepest folder resolved so far is returned.
    pub async fn resolve(
        &self,
        tree: &mut RemoteTree,
        local_path: &Path,
        granularity: Option<Granularity>,
    ) -> Resolution {
        let timestamps = self.metadata.timestamps(local_path).await;
        let root = tree.name().to_string();

        let Some(granularity) = granularity else {
            return Resolution {
                destination: root,
                timestamps,
            };
        };
        let Some(date) = timestamps.modified.and_then(BucketDate::from_unix) else {
            tracing::warn!(
                path = %local_path.display(),
                "no modification time, uploading to remote root"
            );
            return Resolution {
                destination: root,
                timestamps,
            };
        };

        let mut relative = String::new();
        let mut step = Step::Pending(Granularity::Year);
        loop {
            match step {
                Step::Pending(level) => {
                    let segment = date.segment(level);
                    let candidate = join_relative(&relative, segment);
                    if !tree.has_descendant(&candidate)
                        && !self.create_bucket(tree, &root, &relative, segment).await
                    {
                        break;
                    }
                    relative = candidate;
                    step = Step::Resolved(level);
                }
                Step::Resolved(level) => match level.next() {
                    Some(next) if next <= granularity => step = Step::Pending(next),
                    _ => break,
                },
            }
        }

        let destination = if relative.is_empty() {
            root
        } else {
            join_remote(&root, &relative)
        };
        Resolution {
            destination,
            timestamps,
        }
    }

    async fn create_bucket(
        &self,
        tree: &mut RemoteTree,
        root: &str,
        parent: &str,
        segment: &str,
    ) -> bool {
        let absolute = join_remote(root, &join_relative(parent, segment));
        match self.remote.create_folder(&absolute).await {
            Ok(()) => tracing::debug!(path = %absolute, "created bucket folder"),
            Err(err) if err.is_already_exists() => {
                tracing::debug!(path = %absolute, "bucket folder already exists");
            }
            Err(err) => {
                tracing::error!(path = %absolute, error = %err, "failed to create bucket folder");
                return false;
            }
        }
        tree.add_child(RemoteTree::new(segment), parent);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::{Call, FixedMetadata, RecordingRemote, api_error};

    fn march_fifth() -> i64 {
        Local
            .with_ymd_and_hms(2023, 3, 5, 12, 0, 0)
            .unwrap()
            .timestamp()
    }

    #[tokio::test]
    async fn creates_each_level_once_for_same_day() {
        let remote = RecordingRemote::default();
        let metadata = FixedMetadata::default()
            .with("/media/a.jpg", march_fifth())
            .with("/media/b.jpg", march_fifth() + 60);
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");

        let a = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Day))
            .await;
        let b = resolver
            .resolve(&mut tree, Path::new("/media/b.jpg"), Some(Granularity::Day))
            .await;

        assert_eq!(a.destination, "/Photos/2023/03/05");
        assert_eq!(b.destination, "/Photos/2023/03/05");
        assert_eq!(a.timestamps.modified, Some(march_fifth()));
        assert_eq!(
            remote.created_folders(),
            vec!["/Photos/2023", "/Photos/2023/03", "/Photos/2023/03/05"]
        );
        assert!(tree.has_descendant("2023/03/05"));
    }

    #[tokio::test]
    async fn stops_at_configured_granularity() {
        let remote = RecordingRemote::default();
        let metadata = FixedMetadata::default().with("/media/a.jpg", march_fifth());
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/");

        let year = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Year))
            .await;

        assert_eq!(year.destination, "/2023");
        assert_eq!(remote.created_folders(), vec!["/2023"]);
    }

    #[tokio::test]
    async fn reuses_cached_folders() {
        let remote = RecordingRemote::default();
        let metadata = FixedMetadata::default().with("/media/a.jpg", march_fifth());
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");
        tree.add_child(RemoteTree::new("2023"), "");

        let resolution = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Month))
            .await;

        assert_eq!(resolution.destination, "/Photos/2023/03");
        assert_eq!(remote.created_folders(), vec!["/Photos/2023/03"]);
    }

    #[tokio::test]
    async fn missing_timestamp_goes_to_root() {
        let remote = RecordingRemote::default();
        let metadata = FixedMetadata::default();
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");

        let resolution = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Day))
            .await;

        assert_eq!(resolution.destination, "/Photos");
        assert_eq!(resolution.timestamps, Timestamps::default());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn flat_mode_keeps_timestamps_without_buckets() {
        let remote = RecordingRemote::default();
        let metadata = FixedMetadata::default().with("/media/a.jpg", march_fifth());
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");

        let resolution = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), None)
            .await;

        assert_eq!(resolution.destination, "/Photos");
        assert_eq!(resolution.timestamps.modified, Some(march_fifth()));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_creation_returns_partial_path() {
        let remote = RecordingRemote::default();
        remote.fail_create_times("/Photos/2023/03", 1, || api_error(403));
        let metadata = FixedMetadata::default().with("/media/a.jpg", march_fifth());
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");

        let resolution = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Day))
            .await;

        assert_eq!(resolution.destination, "/Photos/2023");
        assert!(tree.has_descendant("2023"));
        assert!(!tree.has_descendant("2023/03"));
        assert_eq!(remote.count(|call| matches!(call, Call::CreateFolder(_))), 2);
    }

    #[tokio::test]
    async fn failed_year_creation_returns_root() {
        let remote = RecordingRemote::default();
        remote.fail_create_times("/Photos/2023", 1, || api_error(500));
        let metadata = FixedMetadata::default().with("/media/a.jpg", march_fifth());
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");

        let resolution = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Month))
            .await;

        assert_eq!(resolution.destination, "/Photos");
    }

    #[tokio::test]
    async fn existing_remote_folder_counts_as_created() {
        let remote = RecordingRemote::default();
        remote.fail_create_times("/Photos/2023", 1, || api_error(405));
        let metadata = FixedMetadata::default().with("/media/a.jpg", march_fifth());
        let resolver = DateBucketResolver::new(&remote, &metadata);
        let mut tree = RemoteTree::new("/Photos");

        let resolution = resolver
            .resolve(&mut tree, Path::new("/media/a.jpg"), Some(Granularity::Month))
            .await;

        assert_eq!(resolution.destination, "/Photos/2023/03");
        assert!(tree.has_descendant("2023/03"));
    }
}
