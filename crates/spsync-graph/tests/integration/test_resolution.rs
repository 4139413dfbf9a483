//! Site, drive and list resolution

use spsync_graph::library::RemoteRoot;
use spsync_graph::GraphError;
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use crate::common;

async fn mount_site(server: &wiremock::MockServer) {
    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/Engineering"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": common::SITE_ID,
            "displayName": "Engineering"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{}/drives", common::SITE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                { "id": "drive-other", "name": "Site Assets" },
                { "id": common::DRIVE_ID, "name": "Documents" }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resolve_library_by_name() {
    let (server, client) = common::setup_graph_mock().await;
    mount_site(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{}/list", common::DRIVE_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": common::LIST_ID })),
        )
        .mount(&server)
        .await;

    let root = RemoteRoot::resolve(
        &client,
        "contoso.sharepoint.com",
        "Engineering",
        "documents",
        Some("Reports".to_string()),
    )
    .await
    .expect("resolution failed");

    assert_eq!(root.site_id, common::SITE_ID);
    assert_eq!(root.drive_id, common::DRIVE_ID);
    assert_eq!(root.list_id, common::LIST_ID);
    assert_eq!(root.folder.as_deref(), Some("Reports"));
}

#[tokio::test]
async fn test_resolve_unknown_library() {
    let (server, client) = common::setup_graph_mock().await;
    mount_site(&server).await;

    let result = RemoteRoot::resolve(
        &client,
        "contoso.sharepoint.com",
        "Engineering",
        "Archive",
        None,
    )
    .await;

    assert!(matches!(result, Err(GraphError::NotFound(_))));
}

#[tokio::test]
async fn test_resolve_unknown_site() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/Missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "code": "itemNotFound", "message": "Site not found" }
        })))
        .mount(&server)
        .await;

    let result =
        RemoteRoot::resolve(&client, "contoso.sharepoint.com", "Missing", "Documents", None).await;

    match result {
        Err(GraphError::NotFound(msg)) => assert!(msg.contains("Site not found")),
        other => panic!("expected NotFound, got {other:?}"),
    }
}
