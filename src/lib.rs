//! Google Drive node for flow-based automation hosts.
//!
//! A flow node that authenticates against Google Drive with OAuth2 and runs
//! file operations on behalf of inbound messages.
//!
//! # Features
//!
//! - **Authorization**: CSRF-protected consent handshake served over HTTP
//! - **Credentials**: per-node token records, refreshed on expiry under a lock
//! - **Operations**: list, get, export, create, update, delete and watch
//! - **Resilience**: exponential backoff around every remote operation
//! - **Admin endpoints**: file content and metadata lookups for the editor
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use integrations_google_drive_node::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TokenStore::in_memory());
//! let endpoints = OAuthEndpoints::google()?;
//! let token_client = TokenEndpointClient::new(reqwest::Client::new(), endpoints.token_url.clone());
//!
//! let config: DriveNodeConfig = serde_json::from_value(json!({
//!     "id": "drive-1",
//!     "googleCredentials": "creds-1",
//!     "operation": "list",
//! }))?;
//! let node = DriveNode::attach(
//!     config,
//!     store,
//!     token_client,
//!     DriveApiConfig::builder().build()?,
//!     Arc::new(ReqwestTransport::with_default_client()?),
//! )?;
//!
//! let out = node.handle_input(NodeMessage::new()).await?;
//! println!("{:?}", out.payload());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod media;
pub mod node;
pub mod resilience;
pub mod services;
pub mod transport;
pub mod types;

pub use auth::{AccessToken, AuthenticatedClient, AuthorizationFlow, CredentialNode};
pub use client::DriveClient;
pub use config::{DriveApiConfig, DriveApiConfigBuilder};
pub use errors::{NodeError, NodeResult};
pub use node::{DriveNode, DriveNodeConfig, NodeMessage};

/// Prelude module with commonly used types and traits.
///
/// ```no_run
/// use integrations_google_drive_node::prelude::*;
/// ```
pub mod prelude {
    // Node
    pub use crate::node::{
        DriveNode, DriveNodeConfig, DriveOperation, FlowContext, MemoryFlowContext,
        NodeMessage, NodeStatus, OperationKind, StatusReporter,
    };

    // Client
    pub use crate::client::DriveClient;
    pub use crate::services::FilesService;
    pub use crate::transport::{HttpTransport, ReqwestTransport};

    // Configuration
    pub use crate::config::{
        AdminConfig, CredentialsNodeConfig, DriveApiConfig, DriveApiConfigBuilder,
        OAuthEndpoints,
    };

    // Authentication
    pub use crate::auth::{
        AccessToken, AuthenticatedClient, AuthorizationFlow, CredentialNode,
        TokenEndpointClient,
    };
    pub use crate::credentials::{
        CredentialRecord, CredentialStore, FileCredentialStore, InMemoryCredentialStore,
        TokenStore,
    };

    // Resilience
    pub use crate::resilience::{RetryConfig, RetryExecutor};

    // Errors
    pub use crate::errors::{NodeError, NodeResult};
}
