//! The Drive node: turns inbound flow messages into Drive operations.

mod message;
mod operation;
mod property;

pub use message::{is_truthy, value_to_bytes, value_to_string, NodeMessage};
pub use operation::{
    DriveOperation, MetadataChange, OperationKind, OperationOutput, OperationParams,
    UploadStrategy, ROOT_FOLDER,
};
pub use property::{FlowContext, MemoryFlowContext, PropertyType, TypedProperty};

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::{CredentialNode, TokenEndpointClient};
use crate::client::DriveClient;
use crate::config::DriveApiConfig;
use crate::credentials::TokenStore;
use crate::errors::{NodeError, NodeResult};
use crate::resilience::{RetryConfig, RetryExecutor};
use crate::transport::HttpTransport;

/// Static configuration of a Drive node, as saved by the host editor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawDriveNodeConfig")]
pub struct DriveNodeConfig {
    /// Node identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Identity of the credentials node to authenticate with.
    pub google_credentials: String,
    /// Configured operation, used when the message names none.
    pub operation: Option<String>,
    /// Folder ID property.
    pub folder_id: TypedProperty,
    /// File ID property.
    pub file_id: TypedProperty,
    /// File name property.
    pub file_name: TypedProperty,
    /// Content property.
    pub content: TypedProperty,
    /// Metadata property.
    pub metadata: TypedProperty,
    /// Upload type property.
    pub upload_type: TypedProperty,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawDriveNodeConfig {
    id: String,
    name: String,
    google_credentials: String,
    operation: String,
    folder_id: String,
    folder_id_type: PropertyType,
    file_id: String,
    file_id_type: PropertyType,
    file_name: String,
    file_name_type: PropertyType,
    content: String,
    content_type: PropertyType,
    metadata: String,
    metadata_type: PropertyType,
    upload_type: String,
    upload_type_type: PropertyType,
}

impl From<RawDriveNodeConfig> for DriveNodeConfig {
    fn from(raw: RawDriveNodeConfig) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            google_credentials: raw.google_credentials,
            operation: Some(raw.operation).filter(|op| !op.is_empty()),
            folder_id: TypedProperty::new(raw.folder_id, raw.folder_id_type),
            file_id: TypedProperty::new(raw.file_id, raw.file_id_type),
            file_name: TypedProperty::new(raw.file_name, raw.file_name_type),
            content: TypedProperty::new(raw.content, raw.content_type),
            metadata: TypedProperty::new(raw.metadata, raw.metadata_type),
            upload_type: TypedProperty::new(raw.upload_type, raw.upload_type_type),
        }
    }
}

/// Status shown on the node in the host editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// An operation is running.
    Processing,
    /// The last operation succeeded.
    Success,
    /// The last operation failed.
    Error(String),
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Processing => f.write_str("processing"),
            NodeStatus::Success => f.write_str("success"),
            NodeStatus::Error(_) => f.write_str("error"),
        }
    }
}

/// Receives node status changes.
pub trait StatusReporter: Send + Sync {
    /// Called on every status change.
    fn report(&self, node_id: &str, status: &NodeStatus);
}

/// Status reporter that writes status changes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn report(&self, node_id: &str, status: &NodeStatus) {
        match status {
            NodeStatus::Error(message) => {
                tracing::debug!(node_id, status = %status, message = %message, "Node status")
            }
            _ => tracing::debug!(node_id, status = %status, "Node status"),
        }
    }
}

/// A Drive node instance.
pub struct DriveNode {
    config: DriveNodeConfig,
    credentials: Arc<CredentialNode>,
    api: DriveApiConfig,
    transport: Arc<dyn HttpTransport>,
    retry: RetryExecutor,
    context: Arc<dyn FlowContext>,
    status: Arc<dyn StatusReporter>,
}

impl DriveNode {
    /// Creates a node authenticating through `credentials`.
    pub fn new(
        config: DriveNodeConfig,
        credentials: Arc<CredentialNode>,
        api: DriveApiConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            credentials,
            api,
            transport,
            retry: RetryExecutor::new(RetryConfig::default()),
            context: Arc::new(MemoryFlowContext::new()),
            status: Arc::new(TracingStatusReporter),
        }
    }

    /// Creates a node attached to the credentials record its configuration
    /// names.
    pub fn attach(
        config: DriveNodeConfig,
        store: Arc<TokenStore>,
        token_client: TokenEndpointClient,
        api: DriveApiConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> NodeResult<Self> {
        if config.google_credentials.is_empty() {
            error!(node_id = %config.id, "Google Drive configuration node is not set");
            return Err(NodeError::configuration(
                "Google Drive configuration node is not set",
            ));
        }

        let credentials = Arc::new(CredentialNode::attach(
            config.google_credentials.clone(),
            store,
            token_client,
        ));
        info!(node_id = %config.id, "Google Drive node initialized");
        Ok(Self::new(config, credentials, api, transport))
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the flow context typed properties resolve against.
    pub fn with_context(mut self, context: Arc<dyn FlowContext>) -> Self {
        self.context = context;
        self
    }

    /// Replaces the status reporter.
    pub fn with_status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    /// Node configuration.
    pub fn config(&self) -> &DriveNodeConfig {
        &self.config
    }

    /// Collects operation parameters for one message.
    ///
    /// The operation comes from the message first, then the configuration.
    /// Every other parameter comes from its configured property first, then
    /// from the message field of the same name.
    pub fn resolve_params(&self, msg: &NodeMessage) -> OperationParams {
        let context = self.context.as_ref();
        let resolve = |property: &TypedProperty, field: &str| -> Option<Value> {
            property
                .resolve(msg, context)
                .filter(is_truthy)
                .or_else(|| msg.get(field).filter(|v| is_truthy(v)).cloned())
        };
        let text = |property: &TypedProperty, field: &str| {
            resolve(property, field).as_ref().and_then(value_to_string)
        };

        let operation = msg
            .get("operation")
            .and_then(value_to_string)
            .or_else(|| self.config.operation.clone());

        let content = resolve(&self.config.content, "content")
            .or_else(|| msg.get("media").filter(|v| is_truthy(v)).cloned())
            .as_ref()
            .and_then(value_to_bytes);

        OperationParams {
            operation,
            folder_id: text(&self.config.folder_id, "folderId"),
            file_id: text(&self.config.file_id, "fileId"),
            file_name: text(&self.config.file_name, "fileName"),
            content,
            metadata: resolve(&self.config.metadata, "metadata"),
            upload_type: text(&self.config.upload_type, "uploadType"),
            channel: msg.payload().cloned(),
        }
    }

    /// Handles one inbound message and returns the outbound one.
    ///
    /// Parameter errors fail immediately. Remote failures are retried with
    /// backoff, each attempt with a freshly obtained access token.
    pub async fn handle_input(&self, mut msg: NodeMessage) -> NodeResult<NodeMessage> {
        let params = self.resolve_params(&msg);
        self.set_status(NodeStatus::Processing);

        let operation = DriveOperation::from_params(params).map_err(|e| self.fail(e))?;
        let kind = operation.kind();

        let this = self;
        let op = &operation;
        let output = self
            .retry
            .execute(move || async move {
                let credentials = this.credentials.get_authenticated_client().await?;
                let client = DriveClient::new(this.api.clone(), this.transport.clone(), credentials);
                op.execute(&client.files()).await
            })
            .await
            .map_err(|e| self.fail(e))?;

        msg.set_payload(output.into_payload());
        self.set_status(NodeStatus::Success);
        info!(node_id = %self.config.id, operation = %kind, "Operation successful");
        Ok(msg)
    }

    fn fail(&self, err: NodeError) -> NodeError {
        error!(
            node_id = %self.config.id,
            error_code = err.error_code(),
            error = %err,
            "Drive operation failed"
        );
        self.set_status(NodeStatus::Error(err.to_string()));
        err
    }

    fn set_status(&self, status: NodeStatus) {
        self.status.report(&self.config.id, &status);
    }
}
