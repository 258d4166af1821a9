//! Integration tests for the admin HTTP surface

use super::*;
use axum::body::{to_bytes, Body};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use integrations_google_drive_node::admin::{router, AdminState};
use serde_json::json;
use test_case::test_case;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn app(server: &MockServer, store: Arc<TokenStore>) -> Router {
    router(AdminState::new(
        store,
        endpoints(server),
        reqwest::Client::new(),
        api_config(server),
        transport(),
    ))
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn state_param(location: &str) -> String {
    Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

async fn start_handshake(app: Router) -> (String, Response) {
    let response = get(
        app,
        "/auth?clientId=client-id&clientSecret=client-secret&id=creds-1&callback=http%3A%2F%2Flocalhost%2Fauth%2Fcallback",
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    (state_param(&location), response)
}

#[test_case("/auth?clientSecret=s&id=creds-1&callback=http://localhost/cb" ; "no client id")]
#[test_case("/auth?clientId=c&id=creds-1&callback=http://localhost/cb" ; "no client secret")]
#[test_case("/auth?clientId=c&clientSecret=s&callback=http://localhost/cb" ; "no node id")]
#[test_case("/auth?clientId=c&clientSecret=s&id=creds-1" ; "no callback")]
#[test_case("/auth?clientId=&clientSecret=s&id=creds-1&callback=http://localhost/cb" ; "empty client id")]
#[tokio::test]
async fn test_authorize_missing_parameters(uri: &str) {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    let response = get(app(&server, store.clone()), uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Missing parameters");
    assert!(!store.exists(NODE_ID).await.unwrap());
}

#[tokio::test]
async fn test_authorize_redirects_to_consent_page() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    let (state, response) = start_handshake(app(&server, store.clone())).await;

    let location = Url::parse(response.headers()[LOCATION].to_str().unwrap()).unwrap();
    let pairs: std::collections::HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert_eq!(pairs["access_type"], "offline");
    assert_eq!(pairs["prompt"], "consent");
    assert_eq!(pairs["response_type"], "code");
    assert_eq!(pairs["client_id"], "client-id");
    assert_eq!(pairs["redirect_uri"], "http://localhost/auth/callback");
    assert_eq!(pairs["scope"], "https://www.googleapis.com/auth/drive");

    let (node_id, csrf) = state.rsplit_once(':').unwrap();
    assert_eq!(node_id, NODE_ID);
    assert!(csrf.len() >= 24);

    let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("csrf={csrf};")));

    let record = store.load(NODE_ID).await.unwrap().unwrap();
    assert!(record.has_pending_handshake());
    assert!(record.csrf_matches(csrf));
}

#[tokio::test]
async fn test_callback_round_trip_stores_tokens() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (state, _) = start_handshake(app(&server, store.clone())).await;
    let uri = format!(
        "/auth/callback?code=auth-code&state={}",
        urlencode(&state)
    );
    let response = get(app(&server, store.clone()), &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "Authorization successful. You can close this window."
    );

    let record = store.load(NODE_ID).await.unwrap().unwrap();
    assert!(record.access_token.is_some());
    assert!(record.refresh_token.is_some());
    assert!(record.expiry_date.is_some());
    assert!(record.csrf_token.is_none());
    assert!(record.callback.is_none());
}

#[tokio::test]
async fn test_callback_csrf_mismatch_leaves_record() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    start_handshake(app(&server, store.clone())).await;
    let before = store.load(NODE_ID).await.unwrap().unwrap().to_stored();

    let response = get(
        app(&server, store.clone()),
        "/auth/callback?code=auth-code&state=creds-1%3Aforged",
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "CSRF token mismatch");
    assert_eq!(store.load(NODE_ID).await.unwrap().unwrap().to_stored(), before);
}

#[tokio::test]
async fn test_callback_unknown_node_is_unauthorized() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    let response = get(
        app(&server, store.clone()),
        "/auth/callback?code=auth-code&state=nobody%3Acsrf",
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Missing credentials");
    assert!(!store.exists("nobody").await.unwrap());
}

#[tokio::test]
async fn test_callback_exchange_failure_keeps_handshake() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad code",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (state, _) = start_handshake(app(&server, store.clone())).await;
    let before = store.load(NODE_ID).await.unwrap().unwrap().to_stored();

    let uri = format!("/auth/callback?code=bad&state={}", urlencode(&state));
    let response = get(app(&server, store.clone()), &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Could not receive tokens");
    assert_eq!(store.load(NODE_ID).await.unwrap().unwrap().to_stored(), before);
}

#[tokio::test]
async fn test_callback_provider_error() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());

    let response = get(
        app(&server, store.clone()),
        "/auth/callback?error=access_denied",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OAuth2 error: access_denied");
    assert!(!store.exists(NODE_ID).await.unwrap());
}

#[tokio::test]
async fn test_fetch_file_content_exports_native_documents() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() + chrono::Duration::hours(1)).await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/doc-1"))
        .and(query_param("fields", "mimeType"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mimeType": "application/vnd.google-apps.document"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/doc-1/export"))
        .and(query_param("mimeType", "text/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Meeting notes"))
        .expect(1)
        .mount(&server)
        .await;

    let response = get(
        app(&server, store),
        "/fetch-file-content?fileId=doc-1&credentialsId=creds-1",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, json!({"fileContent": "Meeting notes"}));
}

#[tokio::test]
async fn test_fetch_file_metadata_reports_failures() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() + chrono::Duration::hours(1)).await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/ok"))
        .and(query_param("fields", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ok", "name": "report.pdf", "size": "1024"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "File not found: gone."}
        })))
        .mount(&server)
        .await;

    let response = get(
        app(&server, store.clone()),
        "/fetch-file-metadata?fileId=ok&credentialsId=creds-1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["fileMetadata"]["size"], "1024");

    let response = get(
        app(&server, store),
        "/fetch-file-metadata?fileId=gone&credentialsId=creds-1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error fetching file metadata: "));
    assert!(error.contains("File not found: gone."));
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
