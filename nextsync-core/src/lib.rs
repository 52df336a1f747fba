mod bulk;
mod client;
mod propfind;

pub use bulk::{BulkEntry, encode_body as encode_bulk_body, random_boundary};
pub use client::{ApiErrorClass, NextcloudClient, NextcloudError, ServerStatus};
pub use propfind::{DavEntry, parse_multistatus};
pub use reqwest::StatusCode;
