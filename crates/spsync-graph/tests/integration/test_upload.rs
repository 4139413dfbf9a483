//! Direct and chunked uploads, folders and deletes

use spsync_core::domain::RelativePath;
use spsync_core::ports::{ChunkAck, IRemoteLibrary, RemoteError};
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

fn rel(p: &str) -> RelativePath {
    RelativePath::new(p).unwrap()
}

#[tokio::test]
async fn test_upload_direct_replaces_item() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("PUT"))
        .and(path(format!("/drives/{}/root:/docs/a.txt:/content", common::DRIVE_ID)))
        .and(query_param("@microsoft.graph.conflictBehavior", "replace"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "item-001", "name": "a.txt", "size": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    library
        .upload_direct(&rel("docs/a.txt"), b"hello".to_vec())
        .await
        .expect("direct upload failed");
}

#[tokio::test]
async fn test_upload_direct_encodes_names() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("PUT"))
        .and(path(format!("/drives/{}/root:/my%20notes.txt:/content", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "x" })))
        .expect(1)
        .mount(&server)
        .await;

    library
        .upload_direct(&rel("my notes.txt"), b"x".to_vec())
        .await
        .expect("direct upload failed");
}

#[tokio::test]
async fn test_chunked_session_round() {
    let (server, library) = common::setup_library_mock().await;
    let upload_url = format!("{}/upload/session-001", server.uri());

    Mock::given(method("POST"))
        .and(path(format!(
            "/drives/{}/root:/big.bin:/createUploadSession",
            common::DRIVE_ID
        )))
        .and(body_json(serde_json::json!({
            "item": {
                "@microsoft.graph.conflictBehavior": "replace",
                "name": "big.bin"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": upload_url,
            "expirationDateTime": "2030-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/session-001"))
        .and(header("Content-Range", "bytes 0-5/10"))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "nextExpectedRanges": ["6-"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/session-001"))
        .and(header("Content-Range", "bytes 6-9/10"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "item-big", "size": 10
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = library
        .open_chunked_session(&rel("big.bin"), 10)
        .await
        .expect("session failed");
    assert_eq!(session.upload_url, upload_url);
    assert_eq!(session.total_size, 10);

    let first = library.upload_chunk(&session, 0, vec![0u8; 6]).await.unwrap();
    assert_eq!(first, ChunkAck::Accepted);
    let last = library.upload_chunk(&session, 6, vec![1u8; 4]).await.unwrap();
    assert_eq!(last, ChunkAck::Completed);

    // Session URLs are pre-authorized and must not see the bearer token
    let requests = server.received_requests().await.unwrap();
    let chunk_requests: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/upload/session-001")
        .collect();
    assert_eq!(chunk_requests.len(), 2);
    assert!(chunk_requests
        .iter()
        .all(|r| r.headers.get("authorization").is_none()));
}

#[tokio::test]
async fn test_chunk_throttled_with_retry_after() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("PUT"))
        .and(path("/upload/session-002"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let session = spsync_core::ports::SessionHandle {
        upload_url: format!("{}/upload/session-002", server.uri()),
        total_size: 100,
    };
    let err = library.upload_chunk(&session, 0, vec![0u8; 10]).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Throttled {
            retry_after: Some(std::time::Duration::from_secs(3))
        }
    );
}

#[tokio::test]
async fn test_abort_session_tolerates_expired_session() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/upload/session-003"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let session = spsync_core::ports::SessionHandle {
        upload_url: format!("{}/upload/session-003", server.uri()),
        total_size: 100,
    };
    library.abort_session(&session).await.expect("abort failed");
}

#[tokio::test]
async fn test_ensure_folder_existing_is_ok() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": { "code": "nameAlreadyExists" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    library.ensure_folder(&rel("docs")).await.expect("ensure_folder failed");
}

#[tokio::test]
async fn test_ensure_folder_creates_missing_parents() {
    let (server, library) = common::setup_library_mock().await;

    // First attempt at docs/sub finds no parent
    Mock::given(method("POST"))
        .and(path(format!("/drives/{}/root:/docs:/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{}/root/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "f1" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{}/root:/docs:/children", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "f2" })))
        .expect(1)
        .mount(&server)
        .await;

    library
        .ensure_folder(&rel("docs/sub"))
        .await
        .expect("ensure_folder failed");
}

#[tokio::test]
async fn test_delete_missing_item_is_ok() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("DELETE"))
        .and(path(format!("/drives/{}/root:/gone.txt:", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    library.delete(&rel("gone.txt")).await.expect("delete failed");
}

#[tokio::test]
async fn test_delete_forbidden_is_permission_error() {
    let (server, library) = common::setup_library_mock().await;

    Mock::given(method("DELETE"))
        .and(path(format!("/drives/{}/root:/locked.txt:", common::DRIVE_ID)))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = library.delete(&rel("locked.txt")).await.unwrap_err();
    assert!(matches!(err, RemoteError::Permission(_)));
}
