//! Request executor with auth and error handling.

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::auth::AuthenticatedClient;
use crate::config::DriveApiConfig;
use crate::errors::{NodeError, NodeResult};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody};

/// Characters escaped when a value is used as one URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Encodes a value for use as a single path segment.
pub fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Sends authenticated requests and maps API errors.
pub struct RequestExecutor {
    config: DriveApiConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: AuthenticatedClient,
}

impl RequestExecutor {
    /// Creates a new request executor.
    pub fn new(
        config: DriveApiConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: AuthenticatedClient,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
        }
    }

    /// Builds a metadata API URL from a relative path and query pairs.
    pub fn build_url(&self, path: &str, query: &[(&str, &str)]) -> NodeResult<Url> {
        Self::join(&self.config.base_url, path, query)
    }

    /// Builds an upload URL from a relative path and query pairs.
    pub fn build_upload_url(&self, path: &str, query: &[(&str, &str)]) -> NodeResult<Url> {
        Self::join(&self.config.upload_url, path, query)
    }

    fn join(base: &Url, path: &str, query: &[(&str, &str)]) -> NodeResult<Url> {
        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|e| NodeError::remote(format!("Invalid URL for '{}': {}", path, e)))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn headers(&self) -> NodeResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&self.credentials.token().authorization_header())
            .map_err(|e| NodeError::remote(format!("Invalid auth header: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .map_err(|e| NodeError::configuration(format!("Invalid user agent: {}", e)))?,
        );
        Ok(headers)
    }

    fn request(&self, method: HttpMethod, url: Url, body: RequestBody) -> NodeResult<HttpRequest> {
        let mut request = HttpRequest::new(method, url).with_body(body);
        request.headers = self.headers()?;
        request.timeout = Some(self.config.timeout);
        Ok(request)
    }

    /// Executes a request and deserializes the JSON response.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: Url,
        body: RequestBody,
    ) -> NodeResult<T> {
        let response = self.execute_raw(method, url, body).await?;

        serde_json::from_slice(&response)
            .map_err(|e| NodeError::remote(format!("Failed to deserialize response: {}", e)))
    }

    /// Executes a request and returns the buffered body.
    pub async fn execute_raw(
        &self,
        method: HttpMethod,
        url: Url,
        body: RequestBody,
    ) -> NodeResult<Bytes> {
        debug!(
            node_id = self.credentials.node_id(),
            method = ?method,
            path = url.path(),
            "Sending Drive API request"
        );

        let request = self.request(method, url, body)?;
        let response = self.transport.send(request).await?;

        if !response.status.is_success() {
            return Err(handle_error_response(response));
        }

        Ok(response.body)
    }

    /// Executes a GET request and reads the streamed body to completion.
    pub async fn execute_download(&self, url: Url) -> NodeResult<Bytes> {
        debug!(
            node_id = self.credentials.node_id(),
            path = url.path(),
            "Downloading Drive content"
        );

        let request = self.request(HttpMethod::Get, url, RequestBody::Empty)?;
        let response = self.transport.send_streaming(request).await?;

        if !response.status.is_success() {
            let body = response.body.collect_bytes().await?;
            return Err(handle_error_response(HttpResponse::new(
                response.status,
                response.headers,
                body,
            )));
        }

        Ok(response.body.collect_bytes().await?)
    }

    /// Credentials the executor authenticates with.
    pub fn credentials(&self) -> &AuthenticatedClient {
        &self.credentials
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

/// Maps an unsuccessful API response to a remote API error.
pub(crate) fn handle_error_response(response: HttpResponse) -> NodeError {
    let status = response.status;

    let (message, reason) = match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(parsed) => {
            let reason = parsed
                .error
                .errors
                .into_iter()
                .find_map(|item| item.reason);
            (parsed.error.message, reason)
        }
        Err(_) => (
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&response.body)
            ),
            None,
        ),
    };

    NodeError::RemoteApi {
        status: Some(status.as_u16()),
        reason,
        message,
    }
}
