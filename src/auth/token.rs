//! Provider token endpoint.

use chrono::{Duration, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::credentials::TokenGrant;

/// Token response from the authorization server.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Refresh token, issued on code exchange and occasionally on refresh.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Converts the response into a grant with an absolute expiry.
    ///
    /// Fails when `expires_in` does not fit a calendar date.
    pub fn into_grant(self) -> Result<TokenGrant, TokenEndpointError> {
        let expiry_date = match self.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        TokenEndpointError::InvalidResponse(format!(
                            "expires_in out of range: {secs}"
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(TokenGrant {
            access_token: SecretString::new(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::new),
            expiry_date,
            token_type: self.token_type,
            scope: self.scope,
        })
    }
}

/// Errors returned by the token endpoint client.
#[derive(Debug, Error)]
pub enum TokenEndpointError {
    /// The endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Transport(String),

    /// The provider rejected the request.
    #[error("Token endpoint returned {status}: {error}{}", description.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Rejected {
        /// HTTP status.
        status: u16,
        /// OAuth2 error code, e.g. `invalid_grant`.
        error: String,
        /// Provider supplied description.
        description: Option<String>,
    },

    /// The response could not be parsed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Serialize)]
struct CodeExchangeForm<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Serialize)]
struct RefreshForm<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Client for the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenEndpointClient {
    http: Client,
    token_url: Url,
}

impl TokenEndpointClient {
    /// Creates a client posting to `token_url`.
    pub fn new(http: Client, token_url: Url) -> Self {
        Self { http, token_url }
    }

    /// Token endpoint URL.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &SecretString,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, TokenEndpointError> {
        let form = CodeExchangeForm {
            grant_type: "authorization_code",
            code,
            redirect_uri,
            client_id,
            client_secret: client_secret.expose_secret(),
        };
        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| TokenEndpointError::InvalidResponse(e.to_string()))?;

        debug!(client_id, "Exchanging authorization code");
        self.post_form(body).await
    }

    /// Obtains a new access token from a refresh token.
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &SecretString,
        refresh_token: &SecretString,
    ) -> Result<TokenGrant, TokenEndpointError> {
        let form = RefreshForm {
            grant_type: "refresh_token",
            refresh_token: refresh_token.expose_secret(),
            client_id,
            client_secret: client_secret.expose_secret(),
        };
        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| TokenEndpointError::InvalidResponse(e.to_string()))?;

        debug!(client_id, "Refreshing access token");
        self.post_form(body).await
    }

    async fn post_form(&self, body: String) -> Result<TokenGrant, TokenEndpointError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        if !status.is_success() {
            let (error, description) = match serde_json::from_slice::<ErrorResponse>(&bytes) {
                Ok(parsed) => (parsed.error, parsed.error_description),
                Err(_) => (
                    "http_error".to_string(),
                    Some(String::from_utf8_lossy(&bytes).into_owned()),
                ),
            };
            return Err(TokenEndpointError::Rejected {
                status: status.as_u16(),
                error,
                description,
            });
        }

        let token: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| TokenEndpointError::InvalidResponse(e.to_string()))?;
        token.into_grant()
    }
}
