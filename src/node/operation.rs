//! Drive operations: validation, dispatch and result shaping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::errors::{NodeError, NodeResult};
use crate::media::{self, ContentHandling};
use crate::services::FilesService;
use crate::types::{Channel, CreateFileRequest, DriveFile, FileList, MediaContent, UPDATE_FIELDS};

/// Folder listed when none is given.
pub const ROOT_FOLDER: &str = "root";

/// The operations a Drive node can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// List folder children.
    List,
    /// Download a binary file.
    Get,
    /// Export a native document as text.
    Export,
    /// Create a file.
    Create,
    /// Replace a file's content (and metadata).
    Update,
    /// Delete a file.
    Delete,
    /// Watch a file for changes.
    Watch,
}

impl OperationKind {
    /// Name used in configuration and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Get => "get",
            OperationKind::Export => "export",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Watch => "watch",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(OperationKind::List),
            "get" => Ok(OperationKind::Get),
            "export" => Ok(OperationKind::Export),
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            "watch" => Ok(OperationKind::Watch),
            other => Err(NodeError::InvalidOperation(other.to_string())),
        }
    }
}

/// How an update uploads the new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// Content only; metadata is patched separately.
    Media,
    /// Content and metadata in one request.
    Multipart,
}

impl FromStr for UploadStrategy {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(UploadStrategy::Media),
            "multipart" => Ok(UploadStrategy::Multipart),
            other => Err(NodeError::InvalidUploadType(other.to_string())),
        }
    }
}

/// Resolved, not yet validated operation parameters.
#[derive(Debug, Clone, Default)]
pub struct OperationParams {
    /// Operation name.
    pub operation: Option<String>,
    /// Folder to list or create in.
    pub folder_id: Option<String>,
    /// Target file.
    pub file_id: Option<String>,
    /// File name for create and update.
    pub file_name: Option<String>,
    /// Content to upload.
    pub content: Option<Bytes>,
    /// Metadata for update: a JSON object or its text.
    pub metadata: Option<Value>,
    /// `media` or `multipart`.
    pub upload_type: Option<String>,
    /// Channel parameters for watch.
    pub channel: Option<Value>,
}

/// A validated operation, ready to run.
#[derive(Debug, Clone)]
pub enum DriveOperation {
    /// List a folder.
    List {
        /// Folder ID.
        folder_id: String,
    },
    /// Download a file.
    Get {
        /// File ID.
        file_id: String,
    },
    /// Export a native document.
    Export {
        /// File ID.
        file_id: String,
    },
    /// Create a file.
    Create {
        /// Parent folder.
        folder_id: Option<String>,
        /// File name.
        file_name: Option<String>,
        /// Initial content.
        content: Option<Bytes>,
    },
    /// Update a file.
    Update {
        /// File ID.
        file_id: String,
        /// Resource body: name plus parsed metadata.
        metadata: Map<String, Value>,
        /// New content.
        content: Bytes,
        /// MIME type of the new content.
        mime_type: String,
        /// Upload strategy.
        strategy: UploadStrategy,
    },
    /// Delete a file.
    Delete {
        /// File ID.
        file_id: String,
    },
    /// Watch a file.
    Watch {
        /// File ID.
        file_id: String,
        /// Channel parameters.
        channel: Value,
    },
}

impl DriveOperation {
    /// Validates parameters. Never touches the network.
    pub fn from_params(params: OperationParams) -> NodeResult<Self> {
        let kind: OperationKind = params
            .operation
            .as_deref()
            .unwrap_or_default()
            .parse()?;

        let file_id = || {
            params
                .file_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| NodeError::missing_required("fileId", kind.as_str()))
        };

        Ok(match kind {
            OperationKind::List => DriveOperation::List {
                folder_id: params
                    .folder_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| ROOT_FOLDER.to_string()),
            },
            OperationKind::Get => DriveOperation::Get { file_id: file_id()? },
            OperationKind::Export => DriveOperation::Export { file_id: file_id()? },
            OperationKind::Delete => DriveOperation::Delete { file_id: file_id()? },
            OperationKind::Watch => DriveOperation::Watch {
                file_id: file_id()?,
                channel: params
                    .channel
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            },
            OperationKind::Create => DriveOperation::Create {
                folder_id: params.folder_id.clone().filter(|id| !id.is_empty()),
                file_name: params.file_name.clone().filter(|n| !n.is_empty()),
                content: params.content.clone().filter(|c| !c.is_empty()),
            },
            OperationKind::Update => {
                let file_id = file_id()?;
                let strategy: UploadStrategy = params
                    .upload_type
                    .as_deref()
                    .unwrap_or_default()
                    .parse()?;
                let file_name = params.file_name.clone().unwrap_or_default();

                let mut metadata = Map::new();
                if !file_name.is_empty() {
                    metadata.insert("name".into(), Value::String(file_name.clone()));
                }
                metadata.extend(parse_metadata(params.metadata.as_ref())?);

                DriveOperation::Update {
                    file_id,
                    metadata,
                    content: params.content.clone().unwrap_or_default(),
                    mime_type: media::infer_from_file_name(&file_name),
                    strategy,
                }
            }
        })
    }

    /// The operation's kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            DriveOperation::List { .. } => OperationKind::List,
            DriveOperation::Get { .. } => OperationKind::Get,
            DriveOperation::Export { .. } => OperationKind::Export,
            DriveOperation::Create { .. } => OperationKind::Create,
            DriveOperation::Update { .. } => OperationKind::Update,
            DriveOperation::Delete { .. } => OperationKind::Delete,
            DriveOperation::Watch { .. } => OperationKind::Watch,
        }
    }

    /// Runs the operation against the Drive API.
    pub async fn execute(&self, files: &FilesService) -> NodeResult<OperationOutput> {
        match self {
            DriveOperation::List { folder_id } => {
                Ok(OperationOutput::List(files.list_children(folder_id).await?))
            }
            DriveOperation::Get { file_id } => {
                let file = files.get_metadata(file_id, "mimeType, name").await?;
                let mime_type = file.mime_type.unwrap_or_default();
                if media::is_native(&mime_type) {
                    return Err(NodeError::UnsupportedExport {
                        file_id: file_id.clone(),
                        mime_type,
                    });
                }
                Ok(OperationOutput::Content(files.download(file_id).await?))
            }
            DriveOperation::Export { file_id } => {
                let file = files.get_metadata(file_id, "mimeType").await?;
                let export_mime = media::export_mime_for(file.mime_type.as_deref().unwrap_or_default());
                let bytes = files.export(file_id, export_mime).await?;
                Ok(OperationOutput::Exported(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))
            }
            DriveOperation::Create {
                folder_id,
                file_name,
                content,
            } => {
                let request = CreateFileRequest {
                    name: file_name.clone(),
                    parents: folder_id.iter().cloned().collect(),
                };
                let upload = content.as_ref().map(|data| MediaContent {
                    data: data.clone(),
                    mime_type: media::infer_from_file_name(file_name.as_deref().unwrap_or_default()),
                });

                let metadata = files.create(request, upload).await?;
                let content = created_content(files, &metadata).await?;
                Ok(OperationOutput::Created { metadata, content })
            }
            DriveOperation::Update {
                file_id,
                metadata,
                content,
                mime_type,
                strategy,
            } => {
                let upload = MediaContent {
                    data: content.clone(),
                    mime_type: mime_type.clone(),
                };
                let new_content = String::from_utf8_lossy(content).into_owned();

                match strategy {
                    UploadStrategy::Media => {
                        let previous_content = files.read_as_text(file_id).await?;
                        files
                            .update_media(file_id, metadata, upload, UPDATE_FIELDS)
                            .await?;
                        Ok(OperationOutput::Updated {
                            previous_content,
                            new_content,
                            metadata: None,
                        })
                    }
                    UploadStrategy::Multipart => {
                        let previous_metadata = files.get_metadata(file_id, UPDATE_FIELDS).await?;
                        let previous_content = files.read_as_text(file_id).await?;
                        let new_metadata = files
                            .update_multipart(file_id, metadata, upload, UPDATE_FIELDS)
                            .await?;
                        Ok(OperationOutput::Updated {
                            previous_content,
                            new_content,
                            metadata: Some(MetadataChange {
                                previous: previous_metadata,
                                new: new_metadata,
                            }),
                        })
                    }
                }
            }
            DriveOperation::Delete { file_id } => {
                let file = files.get_metadata(file_id, "name").await?;
                files.delete(file_id).await?;
                Ok(OperationOutput::Deleted {
                    file_id: file_id.clone(),
                    file_name: file.name,
                })
            }
            DriveOperation::Watch { file_id, channel } => {
                Ok(OperationOutput::Watch(files.watch(file_id, channel.clone()).await?))
            }
        }
    }
}

/// Parses update metadata; it must be a JSON object or the text of one.
fn parse_metadata(metadata: Option<&Value>) -> NodeResult<Map<String, Value>> {
    let parsed = match metadata {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(Map::new()),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text)
            .map_err(|e| NodeError::InvalidMetadataJson(e.to_string()))?,
        Some(other) => other.clone(),
    };

    match parsed {
        Value::Object(map) => Ok(map),
        other => Err(NodeError::InvalidMetadataJson(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

async fn created_content(files: &FilesService, file: &DriveFile) -> NodeResult<Option<String>> {
    let Some(file_id) = file.id.as_deref() else {
        return Ok(None);
    };
    let mime_type = file.mime_type.as_deref().unwrap_or_default();

    let content = match media::content_handling(mime_type) {
        ContentHandling::Export => {
            let bytes = files.export(file_id, media::export_mime_for(mime_type)).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        ContentHandling::InlineText => {
            let bytes = files.download(file_id).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        ContentHandling::Placeholder => file.name.clone().unwrap_or_else(|| file_id.to_string()),
    };
    Ok(Some(content))
}

/// Metadata before and after a multipart update.
#[derive(Debug, Clone)]
pub struct MetadataChange {
    /// Metadata fetched before the update.
    pub previous: DriveFile,
    /// Metadata returned by the update.
    pub new: DriveFile,
}

/// Result of a successful operation.
#[derive(Debug, Clone)]
pub enum OperationOutput {
    /// Folder listing.
    List(FileList),
    /// Raw file bytes.
    Content(Bytes),
    /// Exported text.
    Exported(String),
    /// Created file.
    Created {
        /// Created file metadata.
        metadata: DriveFile,
        /// Text content or placeholder.
        content: Option<String>,
    },
    /// Updated file.
    Updated {
        /// Content before the update.
        previous_content: String,
        /// Content that was uploaded.
        new_content: String,
        /// Metadata change, for multipart updates.
        metadata: Option<MetadataChange>,
    },
    /// Deleted file.
    Deleted {
        /// File ID.
        file_id: String,
        /// Name the file had.
        file_name: Option<String>,
    },
    /// Registered channel.
    Watch(Channel),
}

impl OperationOutput {
    /// Shapes the result into the outbound message payload.
    pub fn into_payload(self) -> Value {
        match self {
            OperationOutput::List(list) => json!({ "files": list.files }),
            OperationOutput::Content(bytes) => json!({
                "content": STANDARD.encode(&bytes),
                "contentEncoding": "base64",
            }),
            OperationOutput::Exported(text) => json!({ "content": text }),
            OperationOutput::Created { metadata, content } => {
                let mut payload = json!({ "metadata": metadata });
                if let Some(content) = content {
                    payload["content"] = Value::String(content);
                }
                payload
            }
            OperationOutput::Updated {
                previous_content,
                new_content,
                metadata,
            } => {
                let mut payload = json!({
                    "previousContent": previous_content,
                    "newContent": new_content,
                });
                if let Some(change) = metadata {
                    payload["previousMetadata"] = json!(change.previous);
                    payload["newMetadata"] = json!(change.new);
                }
                payload
            }
            OperationOutput::Deleted { file_id, file_name } => json!({
                "success": true,
                "fileId": file_id,
                "fileName": file_name,
            }),
            OperationOutput::Watch(channel) => json!({ "watch": channel }),
        }
    }
}
