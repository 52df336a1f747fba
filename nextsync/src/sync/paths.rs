use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote path contains unsupported component: {0}")]
    UnsupportedComponent(String),
    #[error("local path has no usable file name: {}", .0.display())]
    InvalidFileName(PathBuf),
}

pub fn normalize_remote(path: &str) -> Result<String, PathError> {
    let mut out = String::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(PathError::UnsupportedComponent(segment.to_string()));
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

pub fn join_remote(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

pub fn join_relative(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}/{segment}")
    }
}

pub fn file_name_of(local_path: &Path) -> Result<String, PathError> {
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PathError::InvalidFileName(local_path.to_path_buf()))
}
