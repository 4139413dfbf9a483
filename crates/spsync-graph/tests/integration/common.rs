//! Shared test helpers for Graph API integration tests
//!
//! Each helper mounts the endpoints a test needs on a wiremock server and
//! returns a client pointing at it.

use spsync_graph::client::GraphClient;
use spsync_graph::library::RemoteRoot;
use spsync_graph::provider::GraphRemoteLibrary;
use wiremock::MockServer;

pub const DRIVE_ID: &str = "drive-test-001";
pub const SITE_ID: &str = "contoso.sharepoint.com,site-guid,web-guid";
pub const LIST_ID: &str = "list-test-001";

/// A library root at the drive root
pub fn library_root() -> RemoteRoot {
    RemoteRoot {
        site_id: SITE_ID.to_string(),
        drive_id: DRIVE_ID.to_string(),
        list_id: LIST_ID.to_string(),
        folder: None,
    }
}

/// Starts a mock server and returns a (MockServer, GraphClient) tuple
pub async fn setup_graph_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client = GraphClient::with_base_url("test-access-token", server.uri());
    (server, client)
}

/// Same as [`setup_graph_mock`] but wrapped in the port adapter
pub async fn setup_library_mock() -> (MockServer, GraphRemoteLibrary) {
    let (server, client) = setup_graph_mock().await;
    let library = GraphRemoteLibrary::new(client, library_root(), "FileHash");
    (server, library)
}

/// A file entry as returned by a `children` listing
pub fn file_item(name: &str, size: u64, hash: Option<&str>) -> serde_json::Value {
    let mut item = serde_json::json!({
        "name": name,
        "size": size,
        "file": { "mimeType": "application/octet-stream" },
    });
    if let Some(hash) = hash {
        item["listItem"] = serde_json::json!({ "fields": { "FileHash": hash } });
    }
    item
}

/// A folder entry as returned by a `children` listing
pub fn folder_item(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "size": 0,
        "folder": { "childCount": 1 },
    })
}
