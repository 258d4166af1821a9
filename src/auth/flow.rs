//! Authorization code handshake with CSRF protection.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use super::token::TokenEndpointClient;
use crate::config::{parse_scopes, OAuthEndpoints};
use crate::credentials::TokenStore;
use crate::errors::{NodeError, NodeResult};

/// Number of random bytes in a CSRF token.
const CSRF_TOKEN_BYTES: usize = 18;

/// Query parameters of `GET /auth`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// Provider application id.
    pub client_id: Option<String>,
    /// Provider application secret.
    pub client_secret: Option<String>,
    /// Node identity.
    pub id: Option<String>,
    /// Redirect URI the provider sends the user agent back to.
    pub callback: Option<String>,
    /// Requested scopes, comma or space separated.
    pub scopes: Option<String>,
}

/// Query parameters of `GET /auth/callback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackRequest {
    /// Authorization code.
    pub code: Option<String>,
    /// `nodeIdentity:csrfToken`.
    pub state: Option<String>,
    /// Provider error code.
    pub error: Option<String>,
    /// Provider error description.
    pub error_description: Option<String>,
}

/// Result of a successful `initiate`.
#[derive(Debug)]
pub struct AuthorizationRedirect {
    /// Node identity the handshake belongs to.
    pub node_id: String,
    /// Consent page URL.
    pub location: Url,
    /// CSRF token, also embedded in the `state` parameter.
    pub csrf_token: SecretString,
}

impl AuthorizationRedirect {
    /// `Set-Cookie` value carrying the CSRF token.
    pub fn csrf_cookie(&self) -> String {
        format!(
            "csrf={}; Path=/; HttpOnly; SameSite=Lax",
            self.csrf_token.expose_secret()
        )
    }
}

/// Outcome of a callback that did not fail validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Tokens were stored.
    Authorized {
        /// Node identity that was authorized.
        node_id: String,
    },
    /// The provider reported an error instead of a code.
    ProviderError(String),
    /// The code exchange failed; stored tokens were left untouched.
    ExchangeFailed {
        /// Node identity from the state parameter.
        node_id: String,
        /// Failure description, for logs only.
        reason: String,
    },
}

impl CallbackOutcome {
    /// Plain-text message shown to the user agent.
    pub fn message(&self) -> String {
        match self {
            CallbackOutcome::Authorized { .. } => {
                "Authorization successful. You can close this window.".to_string()
            }
            CallbackOutcome::ProviderError(description) => format!("OAuth2 error: {description}"),
            CallbackOutcome::ExchangeFailed { .. } => "Could not receive tokens".to_string(),
        }
    }
}

/// Generates an unguessable URL-safe CSRF token.
pub(crate) fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn required(value: Option<String>, name: &str, missing: &mut Vec<String>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => {
            missing.push(name.to_string());
            String::new()
        }
    }
}

/// The two-step authorization handshake.
pub struct AuthorizationFlow {
    store: Arc<TokenStore>,
    endpoints: OAuthEndpoints,
    token_client: TokenEndpointClient,
}

impl AuthorizationFlow {
    /// Creates the flow over a token store.
    pub fn new(
        store: Arc<TokenStore>,
        endpoints: OAuthEndpoints,
        token_client: TokenEndpointClient,
    ) -> Self {
        Self {
            store,
            endpoints,
            token_client,
        }
    }

    /// Starts a handshake: persists the pending state and returns the consent
    /// page the user agent must be redirected to.
    pub async fn initiate(&self, request: AuthorizationRequest) -> NodeResult<AuthorizationRedirect> {
        let mut missing = Vec::new();
        let client_id = required(request.client_id, "clientId", &mut missing);
        let client_secret = required(request.client_secret, "clientSecret", &mut missing);
        let node_id = required(request.id, "id", &mut missing);
        let callback = required(request.callback, "callback", &mut missing);

        if !missing.is_empty() {
            warn!(missing = ?missing, "Missing parameters in authorization request");
            return Err(NodeError::MissingParameter(missing.join(", ")));
        }

        let scopes = parse_scopes(request.scopes.as_deref().unwrap_or_default());
        let csrf_token = generate_csrf_token();

        let mut location = self.endpoints.authorization_url.clone();
        location
            .query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("response_type", "code")
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", &callback)
            .append_pair("state", &format!("{node_id}:{csrf_token}"));

        let lock = self.store.lock(&node_id).await;
        let mut record = self.store.load(&node_id).await?.unwrap_or_default();
        record.begin_handshake(
            client_id,
            SecretString::new(client_secret),
            callback,
            SecretString::new(csrf_token.clone()),
        );
        self.store.save(&lock, record).await?;

        info!(node_id = %node_id, "Authorization handshake started");
        Ok(AuthorizationRedirect {
            node_id,
            location,
            csrf_token: SecretString::new(csrf_token),
        })
    }

    /// Completes a handshake.
    ///
    /// Validation failures (`MissingParameter`, `MissingCredentials`,
    /// `CsrfMismatch`) are returned as errors and never touch the stored
    /// record. Provider errors and failed exchanges are reported through
    /// [`CallbackOutcome`].
    pub async fn callback(&self, request: CallbackRequest) -> NodeResult<CallbackOutcome> {
        if let Some(provider_error) = request.error.filter(|e| !e.is_empty()) {
            let description = request.error_description.unwrap_or(provider_error);
            warn!(description = %description, "Provider reported an authorization error");
            return Ok(CallbackOutcome::ProviderError(description));
        }

        let state = request
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NodeError::MissingParameter("state".into()))?;
        let code = request
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NodeError::MissingParameter("code".into()))?;

        let (node_id, csrf_token) = state.rsplit_once(':').unwrap_or((state.as_str(), ""));

        if !self.store.exists(node_id).await? {
            error!(node_id, "Missing credentials for authorization callback");
            return Err(NodeError::MissingCredentials {
                node_id: node_id.to_string(),
            });
        }

        let lock = self.store.lock(node_id).await;
        let record = self
            .store
            .load(node_id)
            .await?
            .filter(|r| r.has_client_identity())
            .ok_or_else(|| {
                error!(node_id, "Missing credentials for authorization callback");
                NodeError::MissingCredentials {
                    node_id: node_id.to_string(),
                }
            })?;

        if !record.csrf_matches(csrf_token) {
            error!(node_id, "CSRF token mismatch");
            return Err(NodeError::CsrfMismatch {
                node_id: node_id.to_string(),
            });
        }

        let (Some(client_id), Some(client_secret), Some(redirect_uri)) = (
            record.client_id.as_deref(),
            record.client_secret.as_ref(),
            record.callback.as_deref(),
        ) else {
            return Err(NodeError::MissingCredentials {
                node_id: node_id.to_string(),
            });
        };

        let grant = match self
            .token_client
            .exchange_code(client_id, client_secret, &code, redirect_uri)
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                error!(node_id, error = %e, "Error exchanging code for tokens");
                return Ok(CallbackOutcome::ExchangeFailed {
                    node_id: node_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut updated = record.clone();
        if let Err(e) = updated.complete_handshake(grant) {
            error!(node_id, error = %e, "Token grant rejected");
            return Ok(CallbackOutcome::ExchangeFailed {
                node_id: node_id.to_string(),
                reason: e.to_string(),
            });
        }
        self.store.save(&lock, updated).await?;

        info!(node_id, "Authorization completed");
        Ok(CallbackOutcome::Authorized {
            node_id: node_id.to_string(),
        })
    }
}
