//! Recursive inventory listing

use spsync_core::ports::{IRemoteLibrary, RemoteError};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

const HASH_A: &str = "0123456789abcdef0123456789abcdef";

#[tokio::test]
async fn test_inventory_walks_folders_and_reads_fingerprints() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .and(query_param("$top", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                common::file_item("a.txt", 12, Some(HASH_A)),
                common::folder_item("docs"),
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/root:/docs:/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ common::file_item("b.pdf", 2048, None) ]
        })))
        .mount(&server)
        .await;

    let entries = library.list_inventory().await.expect("inventory failed");
    assert_eq!(entries.len(), 3);

    let a = entries.iter().find(|e| e.relative_path.as_str() == "a.txt").unwrap();
    assert_eq!(a.size_bytes, 12);
    assert_eq!(a.stored_fingerprint.as_ref().map(|f| f.as_str()), Some(HASH_A));

    let docs = entries.iter().find(|e| e.relative_path.as_str() == "docs").unwrap();
    assert!(docs.is_folder);

    let b = entries.iter().find(|e| e.relative_path.as_str() == "docs/b.pdf").unwrap();
    assert_eq!(b.size_bytes, 2048);
    assert!(b.stored_fingerprint.is_none());
}

#[tokio::test]
async fn test_inventory_follows_next_link() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ common::file_item("page1.txt", 1, None) ],
            "@odata.nextLink": format!("{}/next/children-page-2", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/next/children-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ common::file_item("page2.txt", 2, None) ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = library.list_inventory().await.expect("inventory failed");
    let mut names: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["page1.txt", "page2.txt"]);
}

#[tokio::test]
async fn test_inventory_of_missing_root_is_empty() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let entries = library.list_inventory().await.expect("inventory failed");
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_inventory_throttle_carries_retry_after() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = library.list_inventory().await.unwrap_err();
    assert!(err.is_throttle());
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(7)));
}

#[tokio::test]
async fn test_inventory_unauthorized_maps_to_auth() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = library.list_inventory().await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)));
    assert!(!err.is_retryable());
}
