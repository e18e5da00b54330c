//! Drive file and folder operations.
//!
//! Name-scoped operations (`upload_file`, `download_file`, `lookup_file`,
//! `delete_named_file`) resolve a folder by name and work on files inside
//! it; id-based primitives (`delete_file`, `fetch_file_content`) act
//! directly. All of them issue their HTTP through the credential's call
//! engine, so token expiry mid-operation is recovered transparently.

use bytes::Bytes;
use tracing::{debug, info, instrument};

use bridge_http::{HttpMethod, HttpResponse};
use core_account::{ApiRequest, Credential};

use crate::error::{Result, StorageError};
use crate::types::{DriveFile, FilesListResponse, FOLDER_MIME_TYPE};

const FILES_PATH: &str = "/drive/v3/files";
const UPLOAD_PATH: &str = "/upload/drive/v3/files";

/// Fields requested for file resources.
const FILE_FIELDS: &str = "id,name,mimeType,size,md5Checksum,createdTime,modifiedTime,trashed";

/// Results per page; the provider's maximum.
const MAX_PAGE_SIZE: u32 = 1000;

const MULTIPART_BOUNDARY: &str = "cloud_account_upload";

/// Transport timeout for content transfers, which move real bytes.
const TRANSFER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Folder scope and content type for name-based file operations.
#[derive(Debug, Clone)]
pub struct FileNameOptions {
    pub cloud_folder_name: String,
    pub mime_type: String,
}

/// What to search for.
#[derive(Debug, Clone)]
pub enum SearchItem {
    Folder,
    File {
        mime_type: String,
        /// Restrict the search to this folder when present.
        parent_folder_id: Option<String>,
    },
}

/// A downloaded file with the checksum the provider stores for it.
#[derive(Debug)]
pub struct FileDownload {
    pub data: Bytes,
    pub checksum: String,
}

/// Drive operations bound to one credential.
///
/// The storage owns its [`Credential`]; like the credential itself it is
/// meant to live for a single logical operation chain.
pub struct DriveStorage {
    creds: Credential,
}

impl DriveStorage {
    pub fn new(creds: Credential) -> Self {
        Self { creds }
    }

    pub fn credential(&self) -> &Credential {
        &self.creds
    }

    pub fn credential_mut(&mut self) -> &mut Credential {
        &mut self.creds
    }

    pub fn into_credential(self) -> Credential {
        self.creds
    }

    /// List files, following pagination to the end.
    #[instrument(skip(self))]
    pub async fn list_files(&mut self, query: Option<&str>) -> Result<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = format!(
                "pageSize={}&fields=nextPageToken,files({})",
                MAX_PAGE_SIZE, FILE_FIELDS
            );
            if let Some(query) = query {
                params.push_str(&format!("&q={}", urlencoding::encode(query)));
            }
            if let Some(token) = &page_token {
                params.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let response = self
                .creds
                .api_call(ApiRequest::new(HttpMethod::Get, FILES_PATH).url_params(params))
                .await?;
            if !response.is_success() {
                return Err(api_failure(&response));
            }

            let page: FilesListResponse = response
                .json()
                .map_err(|e| StorageError::Parse(e.to_string()))?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(count = files.len(), "listed drive files");
        Ok(files)
    }

    /// Search for a single item by name. Absence is `Ok(None)`.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn search(&mut self, item: SearchItem, name: &str) -> Result<Option<DriveFile>> {
        let query = search_query(&item, name);
        let params = format!(
            "q={}&fields=files({})",
            urlencoding::encode(&query),
            FILE_FIELDS
        );

        let response = self
            .creds
            .api_call(ApiRequest::new(HttpMethod::Get, FILES_PATH).url_params(params))
            .await?;
        if !response.is_success() {
            return Err(api_failure(&response));
        }

        let list: FilesListResponse = response
            .json()
            .map_err(|e| StorageError::Parse(e.to_string()))?;

        let found = list.files.into_iter().next();
        debug!(found = found.is_some(), "search completed");
        Ok(found)
    }

    /// Create a folder at the drive root, returning its id.
    #[instrument(skip(self))]
    pub async fn create_folder(&mut self, name: &str) -> Result<String> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        let body = Bytes::from(
            serde_json::to_vec(&metadata).map_err(|e| StorageError::Parse(e.to_string()))?,
        );

        let response = self
            .creds
            .api_call(
                ApiRequest::new(HttpMethod::Post, FILES_PATH)
                    .url_params("fields=id")
                    .header("Content-Type", "application/json; charset=UTF-8")
                    .body(body),
            )
            .await?;
        if !response.is_success() {
            return Err(api_failure(&response));
        }

        let created: DriveFile = response
            .json()
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        info!(folder_id = %created.id, "created folder");
        Ok(created.id)
    }

    /// Resolve a root folder by name, creating it when absent. Idempotent:
    /// an existing folder's id is returned as-is.
    #[instrument(skip(self))]
    pub async fn create_folder_if_absent(&mut self, name: &str) -> Result<String> {
        if let Some(existing) = self.search(SearchItem::Folder, name).await? {
            debug!(folder_id = %existing.id, "folder already present");
            return Ok(existing.id);
        }
        self.create_folder(name).await
    }

    /// Delete a file or folder by id.
    #[instrument(skip(self), fields(file_id = %file_id))]
    pub async fn delete_file(&mut self, file_id: &str) -> Result<()> {
        let path = format!("{}/{}", FILES_PATH, urlencoding::encode(file_id));
        let response = self
            .creds
            .api_call(ApiRequest::new(HttpMethod::Delete, path))
            .await?;

        match response.status {
            200 | 204 => Ok(()),
            404 => Err(StorageError::FileNotFound),
            _ => Err(api_failure(&response)),
        }
    }

    /// Delete a file by name within the scoped folder.
    #[instrument(skip(self, options), fields(name = %cloud_file_name))]
    pub async fn delete_named_file(
        &mut self,
        cloud_file_name: &str,
        options: &FileNameOptions,
    ) -> Result<()> {
        let file = self
            .resolve_named_file(cloud_file_name, options)
            .await?
            .ok_or(StorageError::FileNotFound)?;
        self.delete_file(&file.id).await
    }

    /// Upload file contents under the scoped folder, returning the checksum
    /// the provider computed for the stored bytes.
    ///
    /// The folder is created when missing. Uploading a name that already
    /// exists in the folder fails with [`StorageError::AlreadyUploaded`]
    /// before any bytes are sent.
    #[instrument(skip(self, data, options), fields(name = %cloud_file_name, bytes = data.len()))]
    pub async fn upload_file(
        &mut self,
        cloud_file_name: &str,
        data: &[u8],
        options: &FileNameOptions,
    ) -> Result<String> {
        let folder_id = self
            .create_folder_if_absent(&options.cloud_folder_name)
            .await?;

        let existing = self
            .search(
                SearchItem::File {
                    mime_type: options.mime_type.clone(),
                    parent_folder_id: Some(folder_id.clone()),
                },
                cloud_file_name,
            )
            .await?;
        if existing.is_some() {
            info!("upload rejected, file already present");
            return Err(StorageError::AlreadyUploaded);
        }

        let metadata = serde_json::json!({
            "name": cloud_file_name,
            "mimeType": options.mime_type,
            "parents": [folder_id],
        });
        let body = multipart_related(&metadata, &options.mime_type, data);

        let response = self
            .creds
            .api_call(
                ApiRequest::new(HttpMethod::Post, UPLOAD_PATH)
                    .url_params(format!("uploadType=multipart&fields={}", FILE_FIELDS))
                    .header(
                        "Content-Type",
                        format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                    )
                    .body(body)
                    .timeout(TRANSFER_TIMEOUT),
            )
            .await?;
        if !response.is_success() {
            return Err(api_failure(&response));
        }

        let uploaded: DriveFile = response
            .json()
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        info!(file_id = %uploaded.id, "upload completed");

        uploaded.md5_checksum.ok_or(StorageError::MissingChecksum)
    }

    /// Download a named file from the scoped folder.
    #[instrument(skip(self, options), fields(name = %cloud_file_name))]
    pub async fn download_file(
        &mut self,
        cloud_file_name: &str,
        options: &FileNameOptions,
    ) -> Result<FileDownload> {
        let file = self
            .resolve_named_file(cloud_file_name, options)
            .await?
            .ok_or(StorageError::FileNotFound)?;

        let checksum = file.md5_checksum.ok_or(StorageError::MissingChecksum)?;
        let data = self.fetch_file_content(&file.id).await?;

        Ok(FileDownload { data, checksum })
    }

    /// Whether a named file exists in the scoped folder.
    #[instrument(skip(self, options), fields(name = %cloud_file_name))]
    pub async fn lookup_file(
        &mut self,
        cloud_file_name: &str,
        options: &FileNameOptions,
    ) -> Result<bool> {
        let found = self.resolve_named_file(cloud_file_name, options).await?;
        Ok(found.is_some())
    }

    /// Fetch a file's raw contents by id. Suitable for small files — the
    /// whole body is buffered.
    #[instrument(skip(self), fields(file_id = %file_id))]
    pub async fn fetch_file_content(&mut self, file_id: &str) -> Result<Bytes> {
        let path = format!("{}/{}", FILES_PATH, urlencoding::encode(file_id));
        let response = self
            .creds
            .api_call(
                ApiRequest::new(HttpMethod::Get, path)
                    .url_params("alt=media")
                    .timeout(TRANSFER_TIMEOUT),
            )
            .await?;

        match response.status {
            200 => {
                info!(bytes = response.body.len(), "downloaded file content");
                Ok(response.body)
            }
            404 => Err(StorageError::FileNotFound),
            _ => Err(api_failure(&response)),
        }
    }

    /// Folder lookup then file lookup; `None` when either is missing.
    async fn resolve_named_file(
        &mut self,
        cloud_file_name: &str,
        options: &FileNameOptions,
    ) -> Result<Option<DriveFile>> {
        let Some(folder) = self
            .search(SearchItem::Folder, &options.cloud_folder_name)
            .await?
        else {
            debug!(folder = %options.cloud_folder_name, "scoped folder not present");
            return Ok(None);
        };

        self.search(
            SearchItem::File {
                mime_type: options.mime_type.clone(),
                parent_folder_id: Some(folder.id),
            },
            cloud_file_name,
        )
        .await
    }
}

/// Escape a value for embedding in a single-quoted query term.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn search_query(item: &SearchItem, name: &str) -> String {
    let mut query = format!("name='{}' and trashed=false", escape_query_value(name));
    match item {
        SearchItem::Folder => {
            query.push_str(&format!(" and mimeType='{}'", FOLDER_MIME_TYPE));
        }
        SearchItem::File {
            mime_type,
            parent_folder_id,
        } => {
            query.push_str(&format!(
                " and mimeType='{}'",
                escape_query_value(mime_type)
            ));
            if let Some(parent) = parent_folder_id {
                query.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
            }
        }
    }
    query
}

fn multipart_related(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Bytes {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            MULTIPART_BOUNDARY, metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{}\r\nContent-Type: {}\r\n\r\n", MULTIPART_BOUNDARY, mime_type).as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--", MULTIPART_BOUNDARY).as_bytes());
    Bytes::from(body)
}

fn api_failure(response: &HttpResponse) -> StorageError {
    StorageError::Api {
        status: response.status,
        message: response
            .text()
            .unwrap_or_else(|_| "<non-text body>".to_string()),
    }
}
