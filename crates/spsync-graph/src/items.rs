//! Folder creation and deletes

use reqwest::Method;
use serde_json::json;
use spsync_core::domain::RelativePath;
use tracing::debug;

use crate::client::GraphClient;
use crate::library::RemoteRoot;
use crate::GraphError;

/// Creates the folder at `path` (relative to the remote root)
///
/// An existing folder is not an error. If the parent is missing, every
/// folder from the drive root down is created first, including the remote
/// root folder itself.
pub async fn ensure_folder(
    client: &GraphClient,
    root: &RemoteRoot,
    path: &RelativePath,
) -> Result<(), GraphError> {
    let mut segments = root.folder_segments();
    segments.extend(path.segments());

    match create_child_folder(client, root, &segments).await {
        Err(GraphError::NotFound(_)) => {
            debug!(path = %path, "Parent missing, creating folder chain");
            for depth in 1..=segments.len() {
                create_child_folder(client, root, &segments[..depth]).await?;
            }
            Ok(())
        }
        other => other,
    }
}

/// Creates the last segment as a folder under the preceding ones
async fn create_child_folder(
    client: &GraphClient,
    root: &RemoteRoot,
    segments: &[&str],
) -> Result<(), GraphError> {
    let Some((name, parent)) = segments.split_last() else {
        return Ok(());
    };
    let endpoint = format!("{}/children", root.address(parent));
    let body = json!({
        "name": name,
        "folder": {},
        "@microsoft.graph.conflictBehavior": "fail",
    });

    match client
        .send(client.request(Method::POST, &endpoint).json(&body))
        .await
    {
        Ok(_) => {
            debug!(folder = %segments.join("/"), "Folder created");
            Ok(())
        }
        Err(GraphError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Deletes the item at `path`; an already-missing item counts as deleted
pub async fn delete_item(
    client: &GraphClient,
    root: &RemoteRoot,
    path: &RelativePath,
) -> Result<(), GraphError> {
    debug!(path = %path, "Deleting remote item");
    match client
        .send(client.request(Method::DELETE, &root.item(Some(path))))
        .await
    {
        Ok(_) | Err(GraphError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
