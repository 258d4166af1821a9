//! Integration tests for token refresh

use super::*;
use chrono::Duration as ChronoDuration;
use integrations_google_drive_node::NodeError;
use secrecy::ExposeSecret;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

fn refresh_response(access_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access_token,
        "expires_in": 3599,
        "token_type": "Bearer",
    }))
}

#[tokio::test]
async fn test_valid_token_is_never_refreshed() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() + ChronoDuration::minutes(30)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(refresh_response("access-2"))
        .expect(0)
        .mount(&server)
        .await;

    let node = CredentialNode::attach(NODE_ID, store.clone(), token_client(&server));
    for _ in 0..3 {
        let client = tokio_test::assert_ok!(node.get_authenticated_client().await);
        assert_eq!(client.token().token.expose_secret(), "access-1");
    }
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once_and_persisted() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() - ChronoDuration::minutes(1)).await;
    let version_before = store.load(NODE_ID).await.unwrap().unwrap().version;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .and(body_string_contains("client_id=client-id"))
        .respond_with(refresh_response("access-2"))
        .expect(1)
        .mount(&server)
        .await;

    let node = CredentialNode::attach(NODE_ID, store.clone(), token_client(&server));
    let client = tokio_test::assert_ok!(node.get_authenticated_client().await);
    assert_eq!(client.token().token.expose_secret(), "access-2");

    let record = store.load(NODE_ID).await.unwrap().unwrap();
    assert_eq!(record.access_token.unwrap().expose_secret(), "access-2");
    assert_eq!(record.refresh_token.unwrap().expose_secret(), "refresh-1");
    assert!(record.expiry_date.unwrap() > Utc::now());
    assert_eq!(record.version, version_before + 1);
    assert_eq!(client.version(), record.version);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() - ChronoDuration::minutes(1)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(refresh_response("access-2").set_delay(std::time::Duration::from_millis(50)))
        .expect(1)
        .mount(&server)
        .await;

    let node = Arc::new(CredentialNode::attach(
        NODE_ID,
        store.clone(),
        token_client(&server),
    ));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let node = node.clone();
            tokio::spawn(async move { node.get_authenticated_client().await })
        })
        .collect();

    for handle in handles {
        let client = handle.await.unwrap().unwrap();
        assert_eq!(client.token().token.expose_secret(), "access-2");
    }
}

#[tokio::test]
async fn test_failed_refresh_is_unavailable() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() - ChronoDuration::minutes(1)).await;
    let before = store.load(NODE_ID).await.unwrap().unwrap().to_stored();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = CredentialNode::attach(NODE_ID, store.clone(), token_client(&server));
    let err = tokio_test::assert_err!(node.get_authenticated_client().await);
    assert!(matches!(err, NodeError::AuthenticationUnavailable { .. }));
    assert_eq!(err.status_code(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(store.load(NODE_ID).await.unwrap().unwrap().to_stored(), before);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let server = setup_mock_server().await;
    let dir = tempfile::tempdir().unwrap();

    {
        let backend = FileCredentialStore::open(dir.path()).await.unwrap();
        let store = TokenStore::new(Arc::new(backend));
        seed_tokens(&store, NODE_ID, Utc::now() + ChronoDuration::hours(1)).await;
    }

    let backend = FileCredentialStore::open(dir.path()).await.unwrap();
    let store = Arc::new(TokenStore::new(Arc::new(backend)));
    let node = CredentialNode::attach(NODE_ID, store, token_client(&server));

    assert!(node.check_on_startup().await);
}
