//! Files service for the Drive API.
//!
//! Covers the calls the node dispatches: listing folder children, metadata
//! reads, downloads, exports, uploads (metadata-only, media and multipart),
//! deletion and change-notification channels.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::client::{encode_segment, RequestExecutor};
use crate::errors::{NodeError, NodeResult};
use crate::media;
use crate::transport::{HttpMethod, MultipartBody, RequestBody};
use crate::types::{Channel, CreateFileRequest, DriveFile, FileList, MediaContent, FILE_FIELDS};

/// Service for file operations.
pub struct FilesService {
    executor: Arc<RequestExecutor>,
}

impl FilesService {
    /// Creates a new files service.
    pub(crate) fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// Lists the direct children of a folder.
    pub async fn list_children(&self, folder_id: &str) -> NodeResult<FileList> {
        let query = format!("'{}' in parents", escape_query_literal(folder_id));
        let fields = format!("files({})", FILE_FIELDS);
        let url = self
            .executor
            .build_url("files", &[("q", &query), ("fields", &fields)])?;

        self.executor
            .execute_json(HttpMethod::Get, url, RequestBody::Empty)
            .await
    }

    /// Gets file metadata restricted to `fields`.
    pub async fn get_metadata(&self, file_id: &str, fields: &str) -> NodeResult<DriveFile> {
        let url = self.file_url(file_id, &[("fields", fields)])?;
        self.executor
            .execute_json(HttpMethod::Get, url, RequestBody::Empty)
            .await
    }

    /// Gets every metadata field of a file as raw JSON.
    pub async fn get_metadata_value(&self, file_id: &str) -> NodeResult<Value> {
        let url = self.file_url(file_id, &[("fields", "*")])?;
        self.executor
            .execute_json(HttpMethod::Get, url, RequestBody::Empty)
            .await
    }

    /// Downloads the raw content of a (non-native) file.
    pub async fn download(&self, file_id: &str) -> NodeResult<Bytes> {
        let url = self.file_url(file_id, &[("alt", "media")])?;
        self.executor.execute_download(url).await
    }

    /// Exports a native document to `mime_type`.
    pub async fn export(&self, file_id: &str, mime_type: &str) -> NodeResult<Bytes> {
        let path = format!("files/{}/export", encode_segment(file_id));
        let url = self.executor.build_url(&path, &[("mimeType", mime_type)])?;
        self.executor.execute_download(url).await
    }

    /// Reads a file as text, exporting native documents and downloading
    /// everything else. Invalid UTF-8 is replaced.
    pub async fn read_as_text(&self, file_id: &str) -> NodeResult<String> {
        let file = self.get_metadata(file_id, "mimeType").await?;
        let mime_type = file.mime_type.unwrap_or_default();

        let bytes = if media::is_native(&mime_type) {
            self.export(file_id, media::export_mime_for(&mime_type))
                .await?
        } else {
            self.download(file_id).await?
        };

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Creates a file, uploading `content` with it when present.
    pub async fn create(
        &self,
        request: CreateFileRequest,
        content: Option<MediaContent>,
    ) -> NodeResult<DriveFile> {
        let metadata = serde_json::to_value(&request)
            .map_err(|e| NodeError::remote(format!("Failed to serialize request: {}", e)))?;

        match content {
            None => {
                let url = self.executor.build_url("files", &[("fields", FILE_FIELDS)])?;
                self.executor
                    .execute_json(HttpMethod::Post, url, RequestBody::Json(metadata))
                    .await
            }
            Some(content) => {
                let url = self.executor.build_upload_url(
                    "files",
                    &[("uploadType", "multipart"), ("fields", FILE_FIELDS)],
                )?;
                let body = multipart(&metadata, content)?;
                self.executor
                    .execute_json(HttpMethod::Post, url, RequestBody::Multipart(body))
                    .await
            }
        }
    }

    /// Replaces a file's content, then applies `metadata` if it is non-empty.
    pub async fn update_media(
        &self,
        file_id: &str,
        metadata: &Map<String, Value>,
        content: MediaContent,
        fields: &str,
    ) -> NodeResult<DriveFile> {
        let path = format!("files/{}", encode_segment(file_id));
        let url = self
            .executor
            .build_upload_url(&path, &[("uploadType", "media"), ("fields", fields)])?;

        let updated: DriveFile = self
            .executor
            .execute_json(
                HttpMethod::Patch,
                url,
                RequestBody::Bytes {
                    data: content.data,
                    content_type: content.mime_type,
                },
            )
            .await?;

        if metadata.is_empty() {
            return Ok(updated);
        }

        let url = self.file_url(file_id, &[("fields", fields)])?;
        self.executor
            .execute_json(
                HttpMethod::Patch,
                url,
                RequestBody::Json(Value::Object(metadata.clone())),
            )
            .await
    }

    /// Replaces a file's content and metadata in one multipart request.
    pub async fn update_multipart(
        &self,
        file_id: &str,
        metadata: &Map<String, Value>,
        content: MediaContent,
        fields: &str,
    ) -> NodeResult<DriveFile> {
        let path = format!("files/{}", encode_segment(file_id));
        let url = self
            .executor
            .build_upload_url(&path, &[("uploadType", "multipart"), ("fields", fields)])?;

        let body = multipart(&Value::Object(metadata.clone()), content)?;
        self.executor
            .execute_json(HttpMethod::Patch, url, RequestBody::Multipart(body))
            .await
    }

    /// Permanently deletes a file.
    pub async fn delete(&self, file_id: &str) -> NodeResult<()> {
        let url = self.file_url(file_id, &[])?;
        self.executor
            .execute_raw(HttpMethod::Delete, url, RequestBody::Empty)
            .await?;
        Ok(())
    }

    /// Registers a change-notification channel for a file.
    pub async fn watch(&self, file_id: &str, channel: Value) -> NodeResult<Channel> {
        let path = format!("files/{}/watch", encode_segment(file_id));
        let url = self.executor.build_url(&path, &[])?;
        self.executor
            .execute_json(HttpMethod::Post, url, RequestBody::Json(channel))
            .await
    }

    fn file_url(&self, file_id: &str, query: &[(&str, &str)]) -> NodeResult<url::Url> {
        let path = format!("files/{}", encode_segment(file_id));
        self.executor.build_url(&path, query)
    }
}

fn multipart(metadata: &Value, content: MediaContent) -> NodeResult<MultipartBody> {
    let metadata = serde_json::to_vec(metadata)
        .map_err(|e| NodeError::remote(format!("Failed to serialize metadata: {}", e)))?;
    Ok(MultipartBody::new(
        Bytes::from(metadata),
        content.data,
        content.mime_type,
    ))
}

/// Escapes a value for use inside a quoted query string literal.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
