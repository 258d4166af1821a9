//! Per-node OAuth2 credential state.
//!
//! A [`CredentialRecord`] holds everything one credentials node knows about its
//! provider application and tokens. Records are owned by the [`TokenStore`],
//! which serializes every read-modify-write of a record behind a per-node
//! async mutex so that a refresh and an authorization callback for the same
//! node can never interleave.

mod storage;

pub use storage::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::errors::{NodeError, NodeResult};

/// Tokens issued by the provider's token endpoint.
#[derive(Clone)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: SecretString,
    /// New refresh token, when the provider issued one.
    pub refresh_token: Option<SecretString>,
    /// Absolute expiry of the access token.
    pub expiry_date: Option<DateTime<Utc>>,
    /// Token type, usually `Bearer`.
    pub token_type: String,
    /// Space separated scopes granted.
    pub scope: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token_issued", &self.refresh_token.is_some())
            .field("expiry_date", &self.expiry_date)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth2 credential state for one node identity.
///
/// `Debug` output never contains secret values.
#[derive(Clone, Default)]
pub struct CredentialRecord {
    /// Provider application id.
    pub client_id: Option<String>,
    /// Provider application secret.
    pub client_secret: Option<SecretString>,
    /// Current bearer token.
    pub access_token: Option<SecretString>,
    /// Long-lived refresh token.
    pub refresh_token: Option<SecretString>,
    /// Instant after which `access_token` is stale.
    pub expiry_date: Option<DateTime<Utc>>,
    /// Token type reported by the provider.
    pub token_type: Option<String>,
    /// CSRF token of the pending authorization handshake.
    pub csrf_token: Option<SecretString>,
    /// Redirect URI of the pending authorization handshake.
    pub callback: Option<String>,
    /// Incremented on every persisted mutation.
    pub version: u64,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("client_id", &self.client_id)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry_date", &self.expiry_date)
            .field("token_type", &self.token_type)
            .field("handshake_pending", &self.has_pending_handshake())
            .field("version", &self.version)
            .finish()
    }
}

impl CredentialRecord {
    /// True once an authorization has completed.
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// True when the provider application identity is known.
    pub fn has_client_identity(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// True when an expiry is recorded and `now` is past it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.map(|expiry| now > expiry).unwrap_or(false)
    }

    /// True while an authorization handshake is in flight.
    pub fn has_pending_handshake(&self) -> bool {
        self.csrf_token.is_some() && self.callback.is_some()
    }

    /// Records the start of an authorization handshake.
    ///
    /// Previously issued tokens are kept until the handshake completes.
    pub fn begin_handshake(
        &mut self,
        client_id: String,
        client_secret: SecretString,
        callback: String,
        csrf_token: SecretString,
    ) {
        self.client_id = Some(client_id);
        self.client_secret = Some(client_secret);
        self.callback = Some(callback);
        self.csrf_token = Some(csrf_token);
    }

    /// Compares `candidate` with the pending CSRF token in constant time.
    ///
    /// Returns false when no handshake is pending.
    pub fn csrf_matches(&self, candidate: &str) -> bool {
        match &self.csrf_token {
            Some(expected) => expected
                .expose_secret()
                .as_bytes()
                .ct_eq(candidate.as_bytes())
                .into(),
            None => false,
        }
    }

    /// Applies tokens from a code exchange and clears the handshake state.
    ///
    /// Fails without touching the record when the grant would leave an access
    /// token without a refresh token.
    pub fn complete_handshake(&mut self, grant: TokenGrant) -> NodeResult<()> {
        let refresh_token = grant
            .refresh_token
            .or_else(|| self.refresh_token.clone())
            .ok_or_else(|| {
                NodeError::AuthExchangeFailure("provider did not issue a refresh token".into())
            })?;

        self.access_token = Some(grant.access_token);
        self.refresh_token = Some(refresh_token);
        self.expiry_date = grant.expiry_date;
        self.token_type = Some(grant.token_type);
        self.csrf_token = None;
        self.callback = None;
        Ok(())
    }

    /// Applies tokens from a refresh.
    ///
    /// The refresh token is replaced only when the provider issued a new one.
    pub fn apply_refresh(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        self.expiry_date = grant.expiry_date;
        self.token_type = Some(grant.token_type);
    }

    /// Converts the record into its persisted form.
    pub fn to_stored(&self) -> StoredCredentials {
        fn expose(secret: &Option<SecretString>) -> Option<String> {
            secret.as_ref().map(|s| s.expose_secret().clone())
        }

        StoredCredentials {
            client_id: self.client_id.clone(),
            client_secret: expose(&self.client_secret),
            access_token: expose(&self.access_token),
            refresh_token: expose(&self.refresh_token),
            expiry_date: self.expiry_date,
            token_type: self.token_type.clone(),
            csrf_token: expose(&self.csrf_token),
            callback: self.callback.clone(),
            version: self.version,
        }
    }
}

/// Persisted form of a [`CredentialRecord`], using the host's field names.
///
/// `expiryDate` is stored as milliseconds since the Unix epoch.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    /// Provider application id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Provider application secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Current bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Long-lived refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_date: Option<DateTime<Utc>>,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Pending handshake CSRF token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    /// Pending handshake redirect URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    /// Record version.
    #[serde(default)]
    pub version: u64,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry_date", &self.expiry_date)
            .field("token_type", &self.token_type)
            .field("has_csrf_token", &self.csrf_token.is_some())
            .field("callback", &self.callback)
            .field("version", &self.version)
            .finish()
    }
}

impl From<StoredCredentials> for CredentialRecord {
    fn from(stored: StoredCredentials) -> Self {
        CredentialRecord {
            client_id: stored.client_id,
            client_secret: stored.client_secret.map(SecretString::new),
            access_token: stored.access_token.map(SecretString::new),
            refresh_token: stored.refresh_token.map(SecretString::new),
            expiry_date: stored.expiry_date,
            token_type: stored.token_type,
            csrf_token: stored.csrf_token.map(SecretString::new),
            callback: stored.callback,
            version: stored.version,
        }
    }
}

type GuardMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Exclusive write access to one node's record.
///
/// Obtained from [`TokenStore::lock`]; required by [`TokenStore::save`].
/// Dropping the last lock for a node forgets its mutex.
pub struct RecordLock {
    node_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    guards: Arc<GuardMap>,
}

impl RecordLock {
    /// Node identity this lock covers.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        // Release first so the count below only sees waiters.
        self.guard.take();

        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        if guards
            .get(&self.node_id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            guards.remove(&self.node_id);
        }
    }
}

/// Owner of all credential records.
pub struct TokenStore {
    backend: Arc<dyn CredentialStore>,
    guards: Arc<GuardMap>,
}

impl TokenStore {
    /// Creates a token store over a persistence backend.
    pub fn new(backend: Arc<dyn CredentialStore>) -> Self {
        Self {
            backend,
            guards: Arc::default(),
        }
    }

    /// Creates a token store backed by memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCredentialStore::new()))
    }

    /// Acquires the write lock for a node's record.
    pub async fn lock(&self, node_id: &str) -> RecordLock {
        let mutex = {
            let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
            guards.entry(node_id.to_string()).or_default().clone()
        };

        RecordLock {
            node_id: node_id.to_string(),
            guard: Some(mutex.lock_owned().await),
            guards: self.guards.clone(),
        }
    }

    /// Number of nodes with a live or pending lock.
    pub fn tracked_locks(&self) -> usize {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Loads the record for a node.
    pub async fn load(&self, node_id: &str) -> NodeResult<Option<CredentialRecord>> {
        self.backend.load(node_id).await
    }

    /// Returns true if a record exists for the node.
    pub async fn exists(&self, node_id: &str) -> NodeResult<bool> {
        self.backend.exists(node_id).await
    }

    /// Persists a record under the caller's lock, bumping its version.
    pub async fn save(
        &self,
        lock: &RecordLock,
        mut record: CredentialRecord,
    ) -> NodeResult<CredentialRecord> {
        record.version += 1;
        self.backend.save(&lock.node_id, &record).await?;
        debug!(node_id = %lock.node_id, version = record.version, "Credential record saved");
        Ok(record)
    }

    /// Creates an empty record for the node if none exists yet.
    pub async fn ensure_record(&self, node_id: &str) -> NodeResult<CredentialRecord> {
        let lock = self.lock(node_id).await;
        match self.backend.load(node_id).await? {
            Some(record) => Ok(record),
            None => self.save(&lock, CredentialRecord::default()).await,
        }
    }
}
