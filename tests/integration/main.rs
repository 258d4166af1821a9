//! Integration tests using WireMock
//!
//! A mock server stands in for both the provider's token endpoint and the
//! Drive API, so every test runs the full request/response cycle.

mod admin;
mod credentials;
mod operations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use integrations_google_drive_node::prelude::*;
use integrations_google_drive_node::credentials::TokenGrant;
use integrations_google_drive_node::resilience::Sleeper;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::MockServer;

pub const NODE_ID: &str = "creds-1";

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Drive API settings pointing at the mock server.
pub fn api_config(server: &MockServer) -> DriveApiConfig {
    DriveApiConfig::builder()
        .base_url(format!("{}/drive/v3", server.uri()))
        .upload_url(format!("{}/upload/drive/v3", server.uri()))
        .build()
        .expect("valid api config")
}

pub fn endpoints(server: &MockServer) -> OAuthEndpoints {
    OAuthEndpoints::new(
        "https://accounts.google.com/o/oauth2/v2/auth",
        &format!("{}/token", server.uri()),
    )
    .expect("valid endpoints")
}

pub fn token_client(server: &MockServer) -> TokenEndpointClient {
    TokenEndpointClient::new(
        reqwest::Client::new(),
        Url::parse(&format!("{}/token", server.uri())).expect("valid token url"),
    )
}

pub fn transport() -> Arc<dyn HttpTransport> {
    Arc::new(ReqwestTransport::with_default_client().expect("http client"))
}

/// Stores a fully authorized record for `node_id`.
pub async fn seed_tokens(store: &TokenStore, node_id: &str, expiry: DateTime<Utc>) {
    let lock = store.lock(node_id).await;
    let mut record = CredentialRecord::default();
    record.begin_handshake(
        "client-id".into(),
        SecretString::new("client-secret".into()),
        "http://localhost/auth/callback".into(),
        SecretString::new("csrf".into()),
    );
    record
        .complete_handshake(TokenGrant {
            access_token: SecretString::new("access-1".into()),
            refresh_token: Some(SecretString::new("refresh-1".into())),
            expiry_date: Some(expiry),
            token_type: "Bearer".into(),
            scope: None,
        })
        .expect("grant with refresh token");
    store.save(&lock, record).await.expect("saved");
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Builds a Drive node over `store` whose retries sleep on `sleeper`.
pub fn drive_node(
    server: &MockServer,
    store: Arc<TokenStore>,
    config: Value,
    retry: RetryConfig,
    sleeper: Arc<RecordingSleeper>,
) -> DriveNode {
    let config: DriveNodeConfig = serde_json::from_value(config).expect("node config");
    DriveNode::attach(
        config,
        store,
        token_client(server),
        api_config(server),
        transport(),
    )
    .expect("attached node")
    .with_retry(RetryExecutor::with_sleeper(retry, sleeper))
}

pub fn message(value: Value) -> NodeMessage {
    serde_json::from_value(value).expect("message object")
}
