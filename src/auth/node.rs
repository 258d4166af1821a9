//! Credentials node: mints authenticated clients from the stored record.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::flow::AuthorizationRequest;
use super::token::TokenEndpointClient;
use super::AccessToken;
use crate::config::CredentialsNodeConfig;
use crate::credentials::{CredentialRecord, TokenStore};
use crate::errors::{NodeError, NodeResult};

/// Owned, ready-to-use credentials for one call chain.
///
/// Each call to [`CredentialNode::get_authenticated_client`] returns a fresh
/// value; nothing is shared or mutated after it is handed out.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    node_id: String,
    token: AccessToken,
    version: u64,
}

impl AuthenticatedClient {
    /// Creates a client from an already valid token.
    pub fn new(node_id: impl Into<String>, token: AccessToken, version: u64) -> Self {
        Self {
            node_id: node_id.into(),
            token,
            version,
        }
    }

    fn from_record(node_id: &str, record: &CredentialRecord) -> Option<Self> {
        let token = record.access_token.clone()?;
        let token_type = record.token_type.as_deref().unwrap_or("Bearer");
        Some(Self::new(
            node_id,
            AccessToken::new(token, token_type, record.expiry_date),
            record.version,
        ))
    }

    /// Node identity the credentials belong to.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Access token.
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Version of the credential record the token was taken from.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// A configured credentials node.
pub struct CredentialNode {
    node_id: String,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    store: Arc<TokenStore>,
    token_client: TokenEndpointClient,
}

impl CredentialNode {
    /// Creates a node from its static configuration.
    pub fn new(
        config: CredentialsNodeConfig,
        store: Arc<TokenStore>,
        token_client: TokenEndpointClient,
    ) -> Self {
        Self {
            node_id: config.node_id,
            client_id: Some(config.client_id),
            client_secret: Some(config.client_secret),
            redirect_uri: config.redirect_uri,
            scopes: config.scopes,
            store,
            token_client,
        }
    }

    /// Attaches to a node known only through its stored record.
    ///
    /// Refreshes use the client identity saved by the authorization flow.
    pub fn attach(
        node_id: impl Into<String>,
        store: Arc<TokenStore>,
        token_client: TokenEndpointClient,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scopes: Vec::new(),
            store,
            token_client,
        }
    }

    /// Creates the node, makes sure its record exists and schedules the
    /// startup token check.
    pub async fn register(
        config: CredentialsNodeConfig,
        store: Arc<TokenStore>,
        token_client: TokenEndpointClient,
    ) -> NodeResult<Arc<Self>> {
        let node = Arc::new(Self::new(config, store, token_client));
        node.store.ensure_record(&node.node_id).await?;
        info!(node_id = %node.node_id, "Credentials node initialized");
        node.spawn_startup_check();
        Ok(node)
    }

    /// Parameters for starting an authorization with this node's
    /// configured application, redirect URI and scopes.
    ///
    /// Fields the node does not know are left empty, so the flow reports
    /// them as missing.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: self.client_id.clone(),
            client_secret: self
                .client_secret
                .as_ref()
                .map(|secret| secret.expose_secret().clone()),
            id: Some(self.node_id.clone()),
            callback: self.redirect_uri.clone(),
            scopes: (!self.scopes.is_empty()).then(|| self.scopes.join(",")),
        }
    }

    /// Node identity.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns an authenticated client, refreshing the access token first when
    /// it has expired.
    ///
    /// Fails with `MissingCredentials` when the authorization flow has never
    /// completed, and with `AuthenticationUnavailable` when a needed refresh
    /// fails. A failed refresh leaves the stored record untouched.
    pub async fn get_authenticated_client(&self) -> NodeResult<AuthenticatedClient> {
        let lock = self.store.lock(&self.node_id).await;
        let record = self
            .store
            .load(&self.node_id)
            .await?
            .filter(CredentialRecord::has_tokens)
            .ok_or_else(|| {
                error!(node_id = %self.node_id, "Missing credentials");
                NodeError::MissingCredentials {
                    node_id: self.node_id.clone(),
                }
            })?;

        if !record.is_expired_at(Utc::now()) {
            return AuthenticatedClient::from_record(&self.node_id, &record).ok_or_else(|| {
                NodeError::MissingCredentials {
                    node_id: self.node_id.clone(),
                }
            });
        }

        info!(node_id = %self.node_id, "Refreshing access token");

        let client_id = record.client_id.clone().or_else(|| self.client_id.clone());
        let client_secret = record
            .client_secret
            .clone()
            .or_else(|| self.client_secret.clone());
        let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (client_id, client_secret, record.refresh_token.clone())
        else {
            return Err(self.unavailable("no client identity available for refresh"));
        };

        let grant = self
            .token_client
            .refresh(&client_id, &client_secret, &refresh_token)
            .await
            .map_err(|e| {
                error!(node_id = %self.node_id, error = %e, "Error refreshing access token");
                self.unavailable(e.to_string())
            })?;

        let mut updated = record;
        updated.apply_refresh(grant);
        let saved = self.store.save(&lock, updated).await?;

        AuthenticatedClient::from_record(&self.node_id, &saved)
            .ok_or_else(|| self.unavailable("refreshed record has no access token"))
    }

    fn unavailable(&self, reason: impl Into<String>) -> NodeError {
        NodeError::AuthenticationUnavailable {
            node_id: self.node_id.clone(),
            reason: reason.into(),
        }
    }

    /// Best-effort token check; returns true when a client could be minted.
    pub async fn check_on_startup(&self) -> bool {
        match self.get_authenticated_client().await {
            Ok(_) => {
                info!(node_id = %self.node_id, "Tokens are valid");
                true
            }
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "Tokens are missing or invalid");
                false
            }
        }
    }

    /// Runs [`check_on_startup`](Self::check_on_startup) in the background.
    pub fn spawn_startup_check(self: &Arc<Self>) -> JoinHandle<bool> {
        let node = Arc::clone(self);
        tokio::spawn(async move { node.check_on_startup().await })
    }
}
