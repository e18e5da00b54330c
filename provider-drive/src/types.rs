//! Drive API response types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// MIME type the provider assigns to folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file resource as returned by the Drive API.
///
/// Fields beyond `id` are optional because responses only carry what the
/// request's `fields` projection asked for.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub mime_type: Option<String>,

    /// File size in bytes; the API encodes it as a decimal string.
    pub size: Option<String>,

    pub md5_checksum: Option<String>,

    /// Creation time (RFC 3339)
    pub created_time: Option<String>,

    /// Modification time (RFC 3339)
    pub modified_time: Option<String>,

    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_time.as_deref().and_then(parse_timestamp)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_time.as_deref().and_then(parse_timestamp)
    }
}

fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `files.list` response page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    pub next_page_token: Option<String>,
}
