use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum LocalScanError {
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, LocalScanError> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(LocalScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    tracing::debug!(root = %root.display(), files = files.len(), "local files collected");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_files_recursively_in_name_order() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("trip/day2")).unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("trip/day2/c.mp4"), b"c").unwrap();

        let files = collect_files(dir.path()).unwrap();

        let relative: Vec<_> = files
            .iter()
            .map(|path| path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.jpg"),
                PathBuf::from("b.jpg"),
                PathBuf::from("trip/day2/c.mp4"),
            ]
        );
    }

    #[test]
    fn rejects_regular_file_as_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"a").unwrap();

        assert!(matches!(
            collect_files(&file),
            Err(LocalScanError::NotADirectory(_))
        ));
        assert!(matches!(
            collect_files(&dir.path().join("missing")),
            Err(LocalScanError::Io(_))
        ));
    }
}
