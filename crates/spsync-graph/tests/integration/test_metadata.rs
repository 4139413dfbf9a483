//! Fingerprint column creation and batched writes

use spsync_core::domain::{Fingerprint, RelativePath};
use spsync_core::ports::{IRemoteLibrary, MetadataWrite};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use crate::common;

fn columns_path() -> String {
    format!("/sites/{}/lists/{}/columns", common::SITE_ID, common::LIST_ID)
}

fn write(p: &str, fill: char) -> MetadataWrite {
    MetadataWrite {
        path: RelativePath::new(p).unwrap(),
        fingerprint: Fingerprint::new(fill.to_string().repeat(32)).unwrap(),
    }
}

#[tokio::test]
async fn test_existing_column_is_not_recreated() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(columns_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ { "name": "Title" }, { "name": "FileHash" } ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(columns_path()))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    assert!(library.try_create_metadata_column().await);
}

#[tokio::test]
async fn test_missing_column_is_created() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(columns_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ { "name": "Title" } ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(columns_path()))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "name": "FileHash"
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(library.try_create_metadata_column().await);
}

#[tokio::test]
async fn test_column_creation_forbidden_degrades() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(columns_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(columns_path()))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    assert!(!library.try_create_metadata_column().await);
}

#[tokio::test]
async fn test_batch_reports_per_item_results() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "responses": [
                { "id": "0", "status": 200, "body": { "FileHash": "a" } },
                { "id": "1", "status": 404, "body": { "error": { "message": "Item not found" } } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let writes = vec![write("a.txt", 'a'), write("b.txt", 'b'), write("c.txt", 'c')];
    let results = library
        .batch_write_metadata(&writes)
        .await
        .expect("batch failed");

    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert_eq!(results[1].error.as_deref(), Some("status 404: Item not found"));
    assert_eq!(results[2].error.as_deref(), Some("no response in batch"));
    assert_eq!(results[2].path.as_str(), "c.txt");
}

#[tokio::test]
async fn test_batch_sends_patch_per_item() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "responses": [ { "id": "0", "status": 200 } ]
        })))
        .mount(&server)
        .await;

    library
        .batch_write_metadata(&[write("docs/a.txt", 'f')])
        .await
        .expect("batch failed");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sub = &body["requests"][0];
    assert_eq!(sub["method"], "PATCH");
    assert_eq!(
        sub["url"],
        format!("/drives/{}/root:/docs/a.txt:/listItem/fields", common::DRIVE_ID)
    );
    assert_eq!(sub["body"]["FileHash"], "f".repeat(32));
}

#[tokio::test]
async fn test_batch_rejected_as_a_whole() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "1"))
        .mount(&server)
        .await;

    let err = library
        .batch_write_metadata(&[write("a.txt", 'a')])
        .await
        .unwrap_err();
    assert!(err.is_throttle());
}
