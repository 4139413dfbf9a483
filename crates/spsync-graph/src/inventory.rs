//! Remote inventory listing
//!
//! Walks the remote root breadth-first through `children` collections,
//! following `@odata.nextLink` pagination. Each file's list item fields are
//! expanded so the stored fingerprint arrives with the listing instead of
//! costing one request per file.

use std::collections::{HashMap, VecDeque};

use reqwest::Method;
use serde::Deserialize;
use spsync_core::domain::{Fingerprint, RelativePath, RemoteEntry};
use tracing::{debug, info, warn};

use crate::client::{parse_json, GraphClient};
use crate::library::RemoteRoot;
use crate::GraphError;

/// Page size requested from the children endpoint
const PAGE_SIZE: u32 = 200;

/// A page of a `children` collection
#[derive(Debug, Deserialize)]
struct ChildrenPage {
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// The subset of a DriveItem the listing needs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    name: String,
    size: Option<u64>,
    folder: Option<serde_json::Value>,
    list_item: Option<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    fields: Option<HashMap<String, serde_json::Value>>,
}

impl DriveItem {
    fn fingerprint(&self, column: &str) -> Option<Fingerprint> {
        let value = self.list_item.as_ref()?.fields.as_ref()?.get(column)?;
        let text = value.as_str()?;
        if text.is_empty() {
            return None;
        }
        match Fingerprint::new(text) {
            Ok(fp) => Some(fp),
            Err(e) => {
                debug!(name = %self.name, error = %e, "Ignoring malformed stored fingerprint");
                None
            }
        }
    }
}

/// Lists every file and folder under the remote root
///
/// # Arguments
/// * `client` - The authenticated GraphClient
/// * `root` - Resolved remote root
/// * `column` - Name of the fingerprint column to expand
///
/// # Returns
/// Entries relative to the root. A root folder that does not exist yet
/// yields an empty inventory.
pub async fn list_inventory(
    client: &GraphClient,
    root: &RemoteRoot,
    column: &str,
) -> Result<Vec<RemoteEntry>, GraphError> {
    let mut entries = Vec::new();
    let mut pending: VecDeque<Option<RelativePath>> = VecDeque::from([None]);

    while let Some(folder) = pending.pop_front() {
        let first_page = format!(
            "{}?$top={PAGE_SIZE}&$expand=listItem($expand=fields($select={column}))",
            root.children(folder.as_ref())
        );

        let mut page: ChildrenPage = match client.get_json(&first_page).await {
            Ok(page) => page,
            Err(GraphError::NotFound(_)) if folder.is_none() => {
                info!("Remote root folder does not exist yet; inventory is empty");
                return Ok(entries);
            }
            Err(e) => return Err(e),
        };

        loop {
            for item in &page.value {
                let rel = match &folder {
                    Some(parent) => parent.join(&item.name),
                    None => RelativePath::new(item.name.clone()),
                };
                let rel = match rel {
                    Ok(rel) => rel,
                    Err(e) => {
                        warn!(name = %item.name, error = %e, "Skipping remote item with unusable name");
                        continue;
                    }
                };

                if item.folder.is_some() {
                    pending.push_back(Some(rel.clone()));
                    entries.push(RemoteEntry::folder(rel));
                } else {
                    let fp = item.fingerprint(column);
                    entries.push(RemoteEntry::file(rel, item.size.unwrap_or(0), fp));
                }
            }

            let Some(next) = page.next_link.take() else {
                break;
            };
            let response = client.send(client.request_url(Method::GET, &next)).await?;
            page = parse_json(response).await?;
        }
    }

    debug!(count = entries.len(), "Remote inventory listed");
    Ok(entries)
}
