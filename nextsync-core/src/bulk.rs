//! Body encoding for the Nextcloud bulk upload endpoint.
//!
//! The endpoint takes a `multipart/related` body where every part carries its
//! own path, mtime, md5 digest and length as header lines:
//!
//! ```text
//! --<boundary>\r\n
//! X-File-Path: /Photos/2023/03/a.jpg\r\n
//! X-OC-Mtime: 1678000000\r\n
//! X-File-Md5: <hex digest>\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n raw bytes>\r\n
//! --<boundary>--\r\n
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;

const BOUNDARY_PREFIX: &str = "boundary_";
const BOUNDARY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkEntry {
    pub remote_path: String,
    pub mtime: i64,
    pub md5: String,
    pub size: u64,
    pub content: Vec<u8>,
}

impl BulkEntry {
    pub fn new(remote_path: impl Into<String>, mtime: i64, content: Vec<u8>) -> Self {
        Self {
            remote_path: remote_path.into(),
            mtime,
            md5: format!("{:x}", md5::compute(&content)),
            size: content.len() as u64,
            content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkFileStatus {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
}

pub fn random_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect();
    format!("{BOUNDARY_PREFIX}{token}")
}

pub fn encode_body(entries: &[BulkEntry], boundary: &str) -> Vec<u8> {
    let capacity = entries
        .iter()
        .map(|entry| entry.content.len() + entry.remote_path.len() + 160)
        .sum::<usize>()
        + boundary.len()
        + 8;
    let mut body = Vec::with_capacity(capacity);
    for entry in entries {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("X-File-Path: {}\r\n", entry.remote_path).as_bytes());
        body.extend_from_slice(format!("X-OC-Mtime: {}\r\n", entry.mtime).as_bytes());
        body.extend_from_slice(format!("X-File-Md5: {}\r\n", entry.md5).as_bytes());
        body.extend_from_slice(format!("Content-Length: {}\r\n", entry.size).as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&entry.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

pub(crate) fn rejected_paths(response_body: &str) -> Vec<String> {
    let statuses: BTreeMap<String, BulkFileStatus> = match serde_json::from_str(response_body) {
        Ok(statuses) => statuses,
        Err(err) => {
            tracing::debug!(error = %err, "bulk response is not a status map");
            return Vec::new();
        }
    };
    statuses
        .into_iter()
        .filter(|(_, status)| status.error)
        .map(|(path, status)| match status.message {
            Some(message) => format!("{path} ({message})"),
            None => path,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_carries_md5_and_size() {
        let entry = BulkEntry::new("/Photos/a.txt", 1, b"hello world".to_vec());
        assert_eq!(entry.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(entry.size, 11);
    }

    #[test]
    fn encodes_parts_and_closing_boundary() {
        let entries = vec![
            BulkEntry::new("/P/a.txt", 100, b"abc".to_vec()),
            BulkEntry::new("/P/b.txt", 200, Vec::new()),
        ];
        let body = encode_body(&entries, "XYZ");
        let expected = format!(
            "--XYZ\r\nX-File-Path: /P/a.txt\r\nX-OC-Mtime: 100\r\nX-File-Md5: {}\r\nContent-Length: 3\r\n\r\nabc\r\n\
             --XYZ\r\nX-File-Path: /P/b.txt\r\nX-OC-Mtime: 200\r\nX-File-Md5: d41d8cd98f00b204e9800998ecf8427e\r\nContent-Length: 0\r\n\r\n\r\n\
             --XYZ--\r\n",
            entries[0].md5
        );
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    #[test]
    fn boundary_is_random_token() {
        let first = random_boundary();
        let second = random_boundary();
        assert!(first.starts_with(BOUNDARY_PREFIX));
        assert_eq!(first.len(), BOUNDARY_PREFIX.len() + BOUNDARY_LEN);
        assert_ne!(first, second);
    }

    #[test]
    fn collects_rejected_paths_from_status_map() {
        let body = r#"{
            "/P/a.txt": {"error": false, "etag": "abc"},
            "/P/b.txt": {"error": true, "message": "Quota exceeded"},
            "/P/c.txt": {"error": true}
        }"#;
        assert_eq!(
            rejected_paths(body),
            vec!["/P/b.txt (Quota exceeded)".to_string(), "/P/c.txt".to_string()]
        );
    }

    #[test]
    fn non_json_response_has_no_rejections() {
        assert!(rejected_paths("").is_empty());
        assert!(rejected_paths("<html></html>").is_empty());
    }
}
