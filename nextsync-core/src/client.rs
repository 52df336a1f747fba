use std::collections::BTreeMap;
use std::path::Path;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, Method, RequestBuilder, StatusCode};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::bulk::{self, BulkEntry};
use crate::propfind;

const DAV_FILES_SEGMENTS: [&str; 3] = ["remote.php", "dav", "files"];
const DAV_BULK_SEGMENTS: [&str; 3] = ["remote.php", "dav", "bulk"];
const MAINTENANCE_MARKER: &str = "Maintenance mode";

const PROPFIND_BODY: &str = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname />
    <d:resourcetype />
  </d:prop>
</d:propfind>"#;

#[derive(Debug, Error)]
pub enum NextcloudError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid http method: {0}")]
    Method(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed multistatus response: {0}")]
    Xml(String),
    #[error("bulk upload rejected {} file(s): {}", .rejected.len(), .rejected.join(", "))]
    BulkRejected { rejected: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Online,
    Maintenance,
}

#[derive(Clone)]
pub struct NextcloudClient {
    http: Client,
    server_url: Url,
    dav_root: Url,
    username: String,
    password: String,
}

impl NextcloudClient {
    pub fn new(
        server_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, NextcloudError> {
        let username = username.into();
        let server_url = Url::parse(server_url)?;
        let mut dav_root = server_url.clone();
        {
            let mut segments = dav_root
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments
                .pop_if_empty()
                .extend(DAV_FILES_SEGMENTS)
                .push(&username);
        }
        Ok(Self {
            http: Client::new(),
            server_url,
            dav_root,
            username,
            password: password.into(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn server_status(&self) -> Result<ServerStatus, NextcloudError> {
        let response = self.http.get(self.server_url.clone()).send().await?;
        let status = response.status();
        if status != StatusCode::SERVICE_UNAVAILABLE && status != StatusCode::INTERNAL_SERVER_ERROR
        {
            return Ok(ServerStatus::Online);
        }
        let body = response.text().await.unwrap_or_default();
        if body.contains(MAINTENANCE_MARKER) {
            Ok(ServerStatus::Maintenance)
        } else {
            Err(NextcloudError::Api { status, body })
        }
    }

    pub async fn list_folder(&self, path: &str) -> Result<BTreeMap<String, bool>, NextcloudError> {
        let url = self.dav_url(path)?;
        let response = self
            .authed(self.http.request(dav_method("PROPFIND")?, url))
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        let body = Self::ensure_success(response).await?.text().await?;
        let entries = propfind::parse_multistatus(&body)?;
        Ok(entries
            .into_iter()
            .skip(1)
            .map(|entry| (entry.name, entry.is_collection))
            .collect())
    }

    pub async fn exists_folder(&self, path: &str) -> Result<bool, NextcloudError> {
        match self.list_folder(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn create_folder(&self, path: &str) -> Result<(), NextcloudError> {
        let url = self.dav_url(path)?;
        let response = self
            .authed(self.http.request(dav_method("MKCOL")?, url))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    pub async fn upload_file(
        &self,
        source: &Path,
        remote_path: &str,
        ctime: Option<i64>,
        mtime: Option<i64>,
    ) -> Result<(), NextcloudError> {
        let url = self.dav_url(remote_path)?;
        let file = tokio::fs::File::open(source).await?;
        let body = Body::wrap_stream(ReaderStream::new(file));
        let mut request = self.authed(self.http.put(url)).body(body);
        if let Some(mtime) = mtime {
            request = request.header("X-OC-MTime", mtime.to_string());
        }
        if let Some(ctime) = ctime {
            request = request.header("X-OC-CTime", ctime.to_string());
        }
        let response = request.send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    pub async fn upload_bulk(&self, entries: &[BulkEntry]) -> Result<(), NextcloudError> {
        if entries.is_empty() {
            return Ok(());
        }
        let boundary = bulk::random_boundary();
        let body = bulk::encode_body(entries, &boundary);
        let url = self.bulk_url()?;
        let response = self
            .authed(self.http.post(url))
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;
        let text = Self::ensure_success(response).await?.text().await?;
        let rejected = bulk::rejected_paths(&text);
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(NextcloudError::BulkRejected { rejected })
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    fn dav_url(&self, path: &str) -> Result<Url, NextcloudError> {
        let mut url = self.dav_root.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn bulk_url(&self) -> Result<Url, NextcloudError> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(DAV_BULK_SEGMENTS);
        Ok(url)
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, NextcloudError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NextcloudError::Api { status, body })
        }
    }
}

impl NextcloudError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            NextcloudError::Api { status, .. } => Some(*status),
            NextcloudError::Request(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    // MKCOL answers 405 when the collection is already there.
    pub fn is_already_exists(&self) -> bool {
        self.status() == Some(StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            NextcloudError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            NextcloudError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::LOCKED | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn dav_method(name: &str) -> Result<Method, NextcloudError> {
    Method::from_bytes(name.as_bytes()).map_err(|err| NextcloudError::Method(err.to_string()))
}
