//! Fingerprint column management
//!
//! - [`ensure_text_column`] creates the fingerprint column on the library's
//!   list when it is missing.
//! - [`batch_write_fields`] writes column values for up to 20 items in a
//!   single JSON `$batch` request; each sub-request reports its own status.

use std::collections::HashMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use spsync_core::ports::{MetadataWrite, MetadataWriteResult};
use tracing::{debug, info, warn};

use crate::client::{parse_json, GraphClient};
use crate::library::RemoteRoot;
use crate::GraphError;

/// Graph caps a JSON batch at 20 sub-requests
pub const MAX_BATCH_REQUESTS: usize = 20;

/// Maximum length of the fingerprint text column
const COLUMN_MAX_LENGTH: u32 = 255;

#[derive(Debug, Deserialize)]
struct ColumnList {
    value: Vec<ColumnDefinition>,
}

#[derive(Debug, Deserialize)]
struct ColumnDefinition {
    name: String,
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    requests: Vec<BatchItem>,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    id: String,
    method: &'static str,
    url: String,
    body: serde_json::Value,
    headers: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    responses: Vec<BatchItemResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchItemResponse {
    id: String,
    status: u16,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

impl BatchItemResponse {
    fn error_message(&self) -> String {
        let detail = self
            .body
            .as_ref()
            .and_then(|b| b.pointer("/error/message"))
            .and_then(|m| m.as_str())
            .unwrap_or("");
        format!("status {}: {detail}", self.status).trim_end_matches(": ").to_string()
    }
}

fn field_value(column: &str, value: &str) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    fields.insert(column.to_string(), serde_json::Value::from(value));
    serde_json::Value::Object(fields)
}

// ============================================================================
// ensure_text_column
// ============================================================================

/// Makes sure the list has a text column named `column`
///
/// # Returns
/// `true` if the column exists or was created
///
/// # Errors
/// Returns `Forbidden` when the caller may not manage columns
pub async fn ensure_text_column(
    client: &GraphClient,
    root: &RemoteRoot,
    column: &str,
) -> Result<bool, GraphError> {
    let columns_path = format!("/sites/{}/lists/{}/columns", root.site_id, root.list_id);

    let existing: ColumnList = client.get_json(&format!("{columns_path}?$select=name")).await?;
    if existing.value.iter().any(|c| c.name == column) {
        debug!(column, "Fingerprint column already exists");
        return Ok(true);
    }

    info!(column, "Creating fingerprint column");
    let definition = json!({
        "name": column,
        "displayName": column,
        "description": "Content fingerprint used for change detection",
        "enforceUniqueValues": false,
        "hidden": false,
        "indexed": false,
        "text": {
            "allowMultipleLines": false,
            "maxLength": COLUMN_MAX_LENGTH,
        }
    });

    match client
        .send(client.request(Method::POST, &columns_path).json(&definition))
        .await
    {
        Ok(_) => Ok(true),
        // Another run created it between our GET and POST
        Err(GraphError::Conflict(_)) => Ok(true),
        Err(e) => Err(e),
    }
}

// ============================================================================
// batch_write_fields
// ============================================================================

/// Writes fingerprint column values in one `$batch` request
///
/// # Arguments
/// * `client` - The authenticated GraphClient
/// * `root` - Resolved remote root
/// * `column` - Column to write
/// * `writes` - At most [`MAX_BATCH_REQUESTS`] writes
///
/// # Returns
/// One result per write, in input order. Sub-requests missing from the
/// batch response are reported as failed.
pub async fn batch_write_fields(
    client: &GraphClient,
    root: &RemoteRoot,
    column: &str,
    writes: &[MetadataWrite],
) -> Result<Vec<MetadataWriteResult>, GraphError> {
    if writes.is_empty() {
        return Ok(Vec::new());
    }
    if writes.len() > MAX_BATCH_REQUESTS {
        return Err(GraphError::BadRequest(format!(
            "batch of {} exceeds the limit of {MAX_BATCH_REQUESTS}",
            writes.len()
        )));
    }

    let requests = writes
        .iter()
        .enumerate()
        .map(|(idx, w)| BatchItem {
            id: idx.to_string(),
            method: "PATCH",
            url: format!("{}/listItem/fields", root.item(Some(&w.path))),
            body: field_value(column, w.fingerprint.as_str()),
            headers: HashMap::from([("Content-Type", "application/json")]),
        })
        .collect();

    let response = client
        .send(
            client
                .request(Method::POST, "/$batch")
                .json(&BatchRequest { requests }),
        )
        .await?;
    let batch: BatchResponse = parse_json(response).await?;

    let by_id: HashMap<&str, &BatchItemResponse> =
        batch.responses.iter().map(|r| (r.id.as_str(), r)).collect();

    let results: Vec<MetadataWriteResult> = writes
        .iter()
        .enumerate()
        .map(|(idx, w)| match by_id.get(idx.to_string().as_str()) {
            Some(r) if (200..300).contains(&r.status) => MetadataWriteResult::ok(w.path.clone()),
            Some(r) => MetadataWriteResult::failed(w.path.clone(), r.error_message()),
            None => MetadataWriteResult::failed(w.path.clone(), "no response in batch"),
        })
        .collect();

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        warn!(failed, total = writes.len(), "Some fingerprint writes failed");
    } else {
        debug!(total = writes.len(), "Fingerprint batch written");
    }

    Ok(results)
}
