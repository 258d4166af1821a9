//! Drive resource types.
//!
//! Only the fields the node reads are typed; everything else the API returns
//! is kept in `extra` so it survives into output payloads unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields requested for listed and created files.
pub const FILE_FIELDS: &str = "id, name, mimeType, parents";

/// Fields requested when metadata is reported around an update.
pub const UPDATE_FIELDS: &str = "id, name, mimeType, parents, description, modifiedTime";

/// A file or folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// File name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Parent folder IDs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,

    /// Any other field returned by the API.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// File list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    /// Next page token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    /// List of files.
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// Metadata sent when creating a file.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    /// File name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Parent folder IDs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

/// File content to upload.
#[derive(Debug, Clone)]
pub struct MediaContent {
    /// Raw bytes.
    pub data: bytes::Bytes,

    /// MIME type of the bytes.
    pub mime_type: String,
}

/// Channel for push notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Resource kind (always "api#channel").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Channel ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resource ID being watched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Resource URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_uri: Option<String>,

    /// Expiration time (milliseconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,

    /// Any other field returned by the API.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
