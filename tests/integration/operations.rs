//! Integration tests for Drive node operations

use super::*;
use integrations_google_drive_node::NodeError;
use serde_json::json;
use test_case::test_case;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn authorized_store() -> Arc<TokenStore> {
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() + chrono::Duration::hours(1)).await;
    store
}

fn node_for(server: &MockServer, store: Arc<TokenStore>, operation: &str) -> DriveNode {
    drive_node(
        server,
        store,
        json!({
            "id": "drive-1",
            "googleCredentials": NODE_ID,
            "operation": operation,
        }),
        RetryConfig::disabled(),
        Arc::new(RecordingSleeper::default()),
    )
}

#[test_case("get")]
#[test_case("update")]
#[test_case("delete")]
#[test_case("watch")]
#[tokio::test]
async fn test_empty_file_id_fails_before_any_request(operation: &str) {
    let server = setup_mock_server().await;
    let node = node_for(&server, authorized_store().await, operation);

    let msg = message(json!({"fileId": "", "uploadType": "media", "content": "x"}));
    let err = node.handle_input(msg).await.unwrap_err();

    match err {
        NodeError::MissingRequiredParameter {
            parameter,
            operation: op,
        } => {
            assert_eq!(parameter, "fileId");
            assert_eq!(op, operation);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_operation_is_rejected() {
    let server = setup_mock_server().await;
    let node = node_for(&server, authorized_store().await, "list");

    let err = node
        .handle_input(message(json!({"operation": "copy"})))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidOperation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_defaults_to_root_folder() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'root' in parents"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {"id": "a", "name": "a.txt", "mimeType": "text/plain", "parents": ["root"]},
                {"id": "b", "name": "Budget", "mimeType": "application/vnd.google-apps.spreadsheet", "parents": ["root"]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "list");
    let out = node.handle_input(message(json!({"topic": "t"}))).await.unwrap();

    assert_eq!(out.get("topic"), Some(&json!("t")));
    let files = out.payload().unwrap()["files"].as_array().unwrap().clone();
    assert_eq!(files.len(), 2);
    assert_eq!(files[1]["name"], "Budget");
}

#[tokio::test]
async fn test_create_text_file_infers_plain_text() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains(r#""name":"notes.txt""#))
        .and(body_string_contains("Content-Type: text/plain"))
        .and(body_string_contains("hello"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1", "name": "notes.txt", "mimeType": "text/plain", "parents": ["root"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "create");
    let out = node
        .handle_input(message(json!({"fileName": "notes.txt", "content": "hello"})))
        .await
        .unwrap();

    let payload = out.payload().unwrap();
    assert_eq!(payload["metadata"]["name"], "notes.txt");
    assert_eq!(payload["metadata"]["mimeType"], "text/plain");
    assert_eq!(payload["content"], "hello");
}

#[tokio::test]
async fn test_create_binary_file_reports_name() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(body_string_contains("Content-Type: image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "img", "name": "logo.png", "mimeType": "image/png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "create");
    let out = node
        .handle_input(message(json!({
            "fileName": "logo.png",
            "media": {"type": "Buffer", "data": [80, 78, 71]},
        })))
        .await
        .unwrap();

    assert_eq!(out.payload().unwrap()["content"], "logo.png");
}

#[tokio::test]
async fn test_export_spreadsheet_as_csv() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/sheet-1"))
        .and(query_param("fields", "mimeType"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mimeType": "application/vnd.google-apps.spreadsheet"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/sheet-1/export"))
        .and(query_param("mimeType", "text/csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("name,total\nrent,1200\n"))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "export");
    let out = node
        .handle_input(message(json!({"fileId": "sheet-1"})))
        .await
        .unwrap();

    assert_eq!(
        out.payload().unwrap(),
        &json!({"content": "name,total\nrent,1200\n"})
    );
}

#[tokio::test]
async fn test_get_downloads_bytes_as_base64() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/bin"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 159, 146, 150]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/bin"))
        .and(query_param("fields", "mimeType, name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mimeType": "application/octet-stream", "name": "blob.bin"
        })))
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "get");
    let out = node
        .handle_input(message(json!({"fileId": "bin"})))
        .await
        .unwrap();

    assert_eq!(
        out.payload().unwrap(),
        &json!({"content": "AJ+Slg==", "contentEncoding": "base64"})
    );
}

#[tokio::test]
async fn test_get_native_document_requires_export() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mimeType": "application/vnd.google-apps.document", "name": "Doc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "get");
    let err = node
        .handle_input(message(json!({"fileId": "doc"})))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::UnsupportedExport { .. }));
}

#[tokio::test]
async fn test_update_multipart_reports_metadata() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"v":1}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param("fields", "mimeType"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mimeType": "application/json"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param(
            "fields",
            "id, name, mimeType, parents, description, modifiedTime",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1", "name": "data.json", "description": "old"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/f1"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains(r#""description":"new""#))
        .and(body_string_contains("Content-Type: application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1", "name": "data.json", "description": "new"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "update");
    let out = node
        .handle_input(message(json!({
            "fileId": "f1",
            "fileName": "data.json",
            "content": r#"{"v":2}"#,
            "metadata": r#"{"description":"new"}"#,
            "uploadType": "multipart",
        })))
        .await
        .unwrap();

    let payload = out.payload().unwrap();
    assert_eq!(payload["previousContent"], r#"{"v":1}"#);
    assert_eq!(payload["newContent"], r#"{"v":2}"#);
    assert_eq!(payload["previousMetadata"]["description"], "old");
    assert_eq!(payload["newMetadata"]["description"], "new");
}

#[tokio::test]
async fn test_update_rejects_bad_metadata_without_requests() {
    let server = setup_mock_server().await;
    let node = node_for(&server, authorized_store().await, "update");

    let err = node
        .handle_input(message(json!({
            "fileId": "f1",
            "metadata": "{not json",
            "uploadType": "media",
        })))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::InvalidMetadataJson(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_reports_file_name() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/old"))
        .and(query_param("fields", "name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "old.txt"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "delete");
    let out = node
        .handle_input(message(json!({"fileId": "old"})))
        .await
        .unwrap();

    assert_eq!(
        out.payload().unwrap(),
        &json!({"success": true, "fileId": "old", "fileName": "old.txt"})
    );
}

#[tokio::test]
async fn test_watch_sends_payload_as_channel() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/f1/watch"))
        .and(body_string_contains(r#""address":"https://hooks.example.com/drive""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "api#channel",
            "id": "chan-1",
            "resourceId": "res-1",
            "expiration": "1700000000000"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, authorized_store().await, "watch");
    let out = node
        .handle_input(message(json!({
            "fileId": "f1",
            "payload": {"id": "chan-1", "type": "web_hook", "address": "https://hooks.example.com/drive"},
        })))
        .await
        .unwrap();

    let payload = out.payload().unwrap();
    assert_eq!(payload["watch"]["id"], "chan-1");
    assert_eq!(payload["watch"]["resourceId"], "res-1");
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_the_call() {
    let server = setup_mock_server().await;
    let store = Arc::new(TokenStore::in_memory());
    seed_tokens(&store, NODE_ID, Utc::now() - chrono::Duration::minutes(5)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .expect(1)
        .mount(&server)
        .await;

    let node = node_for(&server, store, "list");
    let out = node.handle_input(NodeMessage::new()).await.unwrap();
    assert_eq!(out.payload().unwrap(), &json!({"files": []}));
}
