//! Administrative HTTP surface.
//!
//! | Route                      | Purpose                                    |
//! |----------------------------|--------------------------------------------|
//! | `GET /auth`                | start the consent handshake (302)          |
//! | `GET /auth/callback`       | finish it and store the tokens             |
//! | `GET /fetch-file-content`  | file content as text, for the editor       |
//! | `GET /fetch-file-metadata` | full file metadata, for the editor         |

use axum::extract::{Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::{
    AuthorizationFlow, AuthorizationRequest, CallbackRequest, CredentialNode, TokenEndpointClient,
};
use crate::client::DriveClient;
use crate::config::{DriveApiConfig, OAuthEndpoints};
use crate::credentials::TokenStore;
use crate::errors::NodeError;
use crate::services::FilesService;
use crate::transport::HttpTransport;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    flow: Arc<AuthorizationFlow>,
    store: Arc<TokenStore>,
    token_client: TokenEndpointClient,
    api: DriveApiConfig,
    transport: Arc<dyn HttpTransport>,
}

impl AdminState {
    /// Creates the admin state.
    pub fn new(
        store: Arc<TokenStore>,
        endpoints: OAuthEndpoints,
        http: reqwest::Client,
        api: DriveApiConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let token_client = TokenEndpointClient::new(http, endpoints.token_url.clone());
        let flow = AuthorizationFlow::new(store.clone(), endpoints, token_client.clone());
        Self {
            flow: Arc::new(flow),
            store,
            token_client,
            api,
            transport,
        }
    }

    async fn files_for(&self, query: FileQuery) -> Result<(FilesService, String), FileRejection> {
        let (Some(file_id), Some(credentials_id)) = (
            query.file_id.filter(|id| !id.is_empty()),
            query.credentials_id.filter(|id| !id.is_empty()),
        ) else {
            return Err(FileRejection::MissingParameters);
        };

        if !self
            .store
            .exists(&credentials_id)
            .await
            .map_err(FileRejection::Failed)?
        {
            warn!(credentials_id = %credentials_id, "Unknown credentials node");
            return Err(FileRejection::MissingParameters);
        }

        let node = CredentialNode::attach(
            credentials_id,
            self.store.clone(),
            self.token_client.clone(),
        );
        let credentials = node
            .get_authenticated_client()
            .await
            .map_err(FileRejection::Failed)?;

        let client = DriveClient::new(self.api.clone(), self.transport.clone(), credentials);
        Ok((client.files(), file_id))
    }
}

/// Builds the admin router.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/auth", get(authorize))
        .route("/auth/callback", get(callback))
        .route("/fetch-file-content", get(fetch_file_content))
        .route("/fetch-file-metadata", get(fetch_file_metadata))
        .with_state(state)
}

async fn authorize(
    State(state): State<AdminState>,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    match state.flow.initiate(request).await {
        Ok(redirect) => (
            StatusCode::FOUND,
            [
                (LOCATION, redirect.location.to_string()),
                (SET_COOKIE, redirect.csrf_cookie()),
            ],
        )
            .into_response(),
        Err(NodeError::MissingParameter(_)) => {
            (StatusCode::BAD_REQUEST, "Missing parameters").into_response()
        }
        Err(e) => plain_failure(e),
    }
}

async fn callback(
    State(state): State<AdminState>,
    Query(request): Query<CallbackRequest>,
) -> Response {
    match state.flow.callback(request).await {
        Ok(outcome) => (StatusCode::OK, outcome.message()).into_response(),
        Err(NodeError::MissingParameter(_)) => {
            (StatusCode::BAD_REQUEST, "Missing parameters").into_response()
        }
        Err(NodeError::MissingCredentials { .. }) => {
            (StatusCode::UNAUTHORIZED, "Missing credentials").into_response()
        }
        Err(NodeError::CsrfMismatch { .. }) => {
            (StatusCode::UNAUTHORIZED, "CSRF token mismatch").into_response()
        }
        Err(e) => plain_failure(e),
    }
}

fn plain_failure(err: NodeError) -> Response {
    error!(error = %err, "Authorization request failed");
    (err.status_code(), err.to_string()).into_response()
}

/// Query parameters of the file endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileQuery {
    file_id: Option<String>,
    credentials_id: Option<String>,
}

enum FileRejection {
    MissingParameters,
    Failed(NodeError),
}

impl FileRejection {
    fn into_response(self, context: &str) -> Response {
        match self {
            FileRejection::MissingParameters => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing fileId or credentialsId" })),
            )
                .into_response(),
            FileRejection::Failed(err) => {
                error!(error = %err, "{}", context);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": format!("{}: {}", context, err) })),
                )
                    .into_response()
            }
        }
    }
}

async fn fetch_file_content(
    State(state): State<AdminState>,
    Query(query): Query<FileQuery>,
) -> Response {
    const CONTEXT: &str = "Error fetching file content";

    let (files, file_id) = match state.files_for(query).await {
        Ok(found) => found,
        Err(rejection) => return rejection.into_response(CONTEXT),
    };

    match files.read_as_text(&file_id).await {
        Ok(content) => Json(json!({ "fileContent": content })).into_response(),
        Err(e) => FileRejection::Failed(e).into_response(CONTEXT),
    }
}

async fn fetch_file_metadata(
    State(state): State<AdminState>,
    Query(query): Query<FileQuery>,
) -> Response {
    const CONTEXT: &str = "Error fetching file metadata";

    let (files, file_id) = match state.files_for(query).await {
        Ok(found) => found,
        Err(rejection) => return rejection.into_response(CONTEXT),
    };

    match files.get_metadata_value(&file_id).await {
        Ok(metadata) => Json(json!({ "fileMetadata": metadata })).into_response(),
        Err(e) => FileRejection::Failed(e).into_response(CONTEXT),
    }
}
