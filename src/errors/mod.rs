//! Error types for the Google Drive node.
//!
//! Every failure the node can surface maps to one [`NodeError`] variant. The
//! variants split into two groups: validation errors, raised before any
//! remote call is made and never retried, and remote-phase errors, which go
//! through the retry wrapper.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Top-level error type for the Google Drive node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A request to the authorization endpoints lacked a required parameter.
    #[error("Missing parameters: {0}")]
    MissingParameter(String),

    /// No usable credential record exists for the node.
    #[error("Missing credentials for node {node_id}")]
    MissingCredentials {
        /// Node identity the lookup was made for.
        node_id: String,
    },

    /// The CSRF component of the callback state did not match the stored token.
    #[error("CSRF token mismatch for node {node_id}")]
    CsrfMismatch {
        /// Node identity taken from the callback state.
        node_id: String,
    },

    /// Exchanging the authorization code for tokens failed.
    #[error("Could not receive tokens: {0}")]
    AuthExchangeFailure(String),

    /// Refreshing an expired access token failed.
    #[error("Authentication unavailable for node {node_id}: {reason}")]
    AuthenticationUnavailable {
        /// Node identity whose refresh failed.
        node_id: String,
        /// Provider or transport failure description.
        reason: String,
    },

    /// An operation was invoked without a parameter it requires.
    #[error("Missing required parameter: {parameter} for operation '{operation}'")]
    MissingRequiredParameter {
        /// Name of the missing parameter.
        parameter: &'static str,
        /// Operation that requires it.
        operation: String,
    },

    /// A provider-native document was requested as raw bytes.
    #[error("Google Workspace documents must be exported using the export operation. (file {file_id}, type {mime_type})")]
    UnsupportedExport {
        /// File that was requested.
        file_id: String,
        /// Native MIME type of the file.
        mime_type: String,
    },

    /// The metadata parameter was not a JSON object.
    #[error("Invalid metadata JSON provided: {0}")]
    InvalidMetadataJson(String),

    /// The upload type was neither `media` nor `multipart`.
    #[error("Invalid or missing upload type: '{0}'")]
    InvalidUploadType(String),

    /// The operation name is not one the node supports.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The remote API answered with an error or could not be reached.
    #[error("Remote API failure{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RemoteApi {
        /// HTTP status returned by the API, if a response was received.
        status: Option<u16>,
        /// Google error reason, e.g. `notFound` or `rateLimitExceeded`.
        reason: Option<String>,
        /// Human readable message.
        message: String,
    },

    /// Every retry attempt failed.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total number of attempts made, the initial call included.
        attempts: u32,
        /// Error returned by the final attempt.
        #[source]
        last_error: Box<NodeError>,
    },

    /// Reading or writing the credential store failed.
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NodeError {
    /// Creates a remote API error without a status code.
    pub fn remote(message: impl Into<String>) -> Self {
        NodeError::RemoteApi {
            status: None,
            reason: None,
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        NodeError::Storage(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        NodeError::Configuration(message.into())
    }

    /// Creates a missing-required-parameter error.
    pub fn missing_required(parameter: &'static str, operation: impl Into<String>) -> Self {
        NodeError::MissingRequiredParameter {
            parameter,
            operation: operation.into(),
        }
    }

    /// Returns true for errors raised before any remote call.
    ///
    /// These are surfaced immediately and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            NodeError::MissingParameter(_)
                | NodeError::MissingRequiredParameter { .. }
                | NodeError::InvalidMetadataJson(_)
                | NodeError::InvalidUploadType(_)
                | NodeError::InvalidOperation(_)
                | NodeError::Configuration(_)
        )
    }

    /// Returns the HTTP status the admin surface answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::MissingParameter(_)
            | NodeError::MissingRequiredParameter { .. }
            | NodeError::UnsupportedExport { .. }
            | NodeError::InvalidMetadataJson(_)
            | NodeError::InvalidUploadType(_)
            | NodeError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            NodeError::MissingCredentials { .. }
            | NodeError::CsrfMismatch { .. }
            | NodeError::AuthenticationUnavailable { .. } => StatusCode::UNAUTHORIZED,
            NodeError::AuthExchangeFailure(_) => StatusCode::BAD_GATEWAY,
            NodeError::RemoteApi { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            NodeError::RetryExhausted { last_error, .. } => last_error.status_code(),
            NodeError::Storage(_) | NodeError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a stable machine-readable code for the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            NodeError::MissingParameter(_) => "missing_parameter",
            NodeError::MissingCredentials { .. } => "missing_credentials",
            NodeError::CsrfMismatch { .. } => "csrf_mismatch",
            NodeError::AuthExchangeFailure(_) => "auth_exchange_failure",
            NodeError::AuthenticationUnavailable { .. } => "authentication_unavailable",
            NodeError::MissingRequiredParameter { .. } => "missing_required_parameter",
            NodeError::UnsupportedExport { .. } => "unsupported_export",
            NodeError::InvalidMetadataJson(_) => "invalid_metadata_json",
            NodeError::InvalidUploadType(_) => "invalid_upload_type",
            NodeError::InvalidOperation(_) => "invalid_operation",
            NodeError::RemoteApi { .. } => "remote_api_failure",
            NodeError::RetryExhausted { .. } => "retry_exhausted",
            NodeError::Storage(_) => "storage_error",
            NodeError::Configuration(_) => "configuration_error",
        }
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

impl From<TransportError> for NodeError {
    fn from(err: TransportError) -> Self {
        NodeError::remote(err.to_string())
    }
}
