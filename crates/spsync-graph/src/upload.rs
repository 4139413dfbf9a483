//! Upload operations for SharePoint document libraries
//!
//! Provides functions for uploading files through Microsoft Graph:
//! - [`upload_small`] - Single-request upload for small files
//! - [`create_upload_session`] - Creates a resumable upload session
//! - [`upload_chunk`] - Uploads a single byte range within a session
//! - [`cancel_upload_session`] - Deletes an unfinished session
//!
//! Uploads address the item by path, which also creates missing parent
//! folders, and always replace an existing item.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use spsync_core::domain::RelativePath;
use spsync_core::ports::ChunkAck;
use tracing::debug;

use crate::client::{parse_json, GraphClient};
use crate::library::RemoteRoot;
use crate::GraphError;

/// Response from creating an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    /// The URL to use for uploading chunks
    upload_url: String,
}

/// Formats the `Content-Range` header for a chunk
///
/// `bytes {first}-{last}/{total}`, with `last` inclusive.
pub fn content_range(offset: u64, len: u64, total: u64) -> String {
    let last = offset + len.saturating_sub(1);
    format!("bytes {offset}-{last}/{total}")
}

// ============================================================================
// upload_small
// ============================================================================

/// Uploads a small file in a single PUT request
///
/// Uses the simple upload API: `PUT /drives/{id}/root:{path}:/content`
/// with the file bytes as the request body.
///
/// # Arguments
/// * `client` - The authenticated GraphClient
/// * `root` - Resolved remote root
/// * `path` - Target path relative to the remote root
/// * `data` - File contents
///
/// # Errors
/// Returns the classified [`GraphError`] if the upload is rejected
pub async fn upload_small(
    client: &GraphClient,
    root: &RemoteRoot,
    path: &RelativePath,
    data: Vec<u8>,
) -> Result<(), GraphError> {
    let endpoint = format!(
        "{}/content?@microsoft.graph.conflictBehavior=replace",
        root.item(Some(path))
    );
    debug!(path = %path, bytes = data.len(), "Uploading small file");

    client
        .send(
            client
                .request(Method::PUT, &endpoint)
                .header("Content-Type", "application/octet-stream")
                .body(data),
        )
        .await?;

    Ok(())
}

// ============================================================================
// create_upload_session
// ============================================================================

/// Creates a resumable upload session
///
/// Uses the upload session API: `POST /drives/{id}/root:{path}:/createUploadSession`
///
/// The returned upload URL is used with [`upload_chunk`]. It is valid for a
/// limited time of inactivity.
///
/// # Returns
/// The upload session URL
pub async fn create_upload_session(
    client: &GraphClient,
    root: &RemoteRoot,
    path: &RelativePath,
) -> Result<String, GraphError> {
    let endpoint = format!("{}/createUploadSession", root.item(Some(path)));
    debug!(path = %path, "Creating upload session");

    let body = json!({
        "item": {
            "@microsoft.graph.conflictBehavior": "replace",
            "name": path.file_name(),
        }
    });
    let response = client
        .send(client.request(Method::POST, &endpoint).json(&body))
        .await?;
    let session: UploadSessionResponse = parse_json(response).await?;

    debug!(path = %path, "Upload session created");
    Ok(session.upload_url)
}

// ============================================================================
// upload_chunk
// ============================================================================

/// Uploads a single chunk of data to a resumable upload session
///
/// Sends a PUT request to the upload session URL with a `Content-Range`
/// header specifying the byte range being uploaded.
///
/// # Arguments
/// * `client` - The GraphClient (the session URL is absolute and pre-authorized)
/// * `upload_url` - The upload session URL from [`create_upload_session`]
/// * `data` - The chunk bytes
/// * `offset` - Byte offset of this chunk within the file
/// * `total` - Total file size in bytes
///
/// # Returns
/// - [`ChunkAck::Accepted`] for intermediate chunks (HTTP 202)
/// - [`ChunkAck::Completed`] once the last chunk commits the file (200/201)
pub async fn upload_chunk(
    client: &GraphClient,
    upload_url: &str,
    data: Vec<u8>,
    offset: u64,
    total: u64,
) -> Result<ChunkAck, GraphError> {
    let len = data.len() as u64;
    let range = content_range(offset, len, total);
    debug!(range = %range, "Uploading chunk");

    let response = client
        .send(
            client
                .request_anonymous(Method::PUT, upload_url)
                .header("Content-Length", len.to_string())
                .header("Content-Range", &range)
                .body(data),
        )
        .await?;

    match response.status() {
        StatusCode::ACCEPTED => Ok(ChunkAck::Accepted),
        StatusCode::OK | StatusCode::CREATED => Ok(ChunkAck::Completed),
        other => Err(GraphError::InvalidResponse(format!(
            "Unexpected status {other} for chunk {range}"
        ))),
    }
}

// ============================================================================
// cancel_upload_session
// ============================================================================

/// Deletes an upload session so the partial upload is discarded
pub async fn cancel_upload_session(client: &GraphClient, upload_url: &str) -> Result<(), GraphError> {
    debug!("Cancelling upload session");
    match client
        .send(client.request_anonymous(Method::DELETE, upload_url))
        .await
    {
        Ok(_) | Err(GraphError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
