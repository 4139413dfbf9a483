//! Document library resolution and item addressing
//!
//! A SharePoint document library is reached through three identifiers:
//!
//! ```text
//! GET /sites/{host}:/sites/{site}      -> site id
//! GET /sites/{site-id}/drives          -> drive whose name is the library
//! GET /drives/{drive-id}/list          -> list id (columns live on the list)
//! ```
//!
//! Items are then addressed by path relative to the drive root, with the
//! configured remote root folder prepended: `/drives/{id}/root:/{path}:`.

use serde::Deserialize;
use spsync_core::domain::RelativePath;
use tracing::{debug, info};

use crate::client::GraphClient;
use crate::GraphError;

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DriveSummary {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DriveList {
    value: Vec<DriveSummary>,
}

/// Resolved location of the remote root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRoot {
    pub site_id: String,
    pub drive_id: String,
    pub list_id: String,
    /// Folder inside the library acting as the sync root; `None` for the
    /// library root
    pub folder: Option<String>,
}

impl RemoteRoot {
    /// Resolves the site, drive and list for a library
    ///
    /// # Arguments
    /// * `host` - SharePoint host (`contoso.sharepoint.com`)
    /// * `site` - Site name under `/sites/`
    /// * `library` - Document library display name (`Documents`)
    /// * `folder` - Optional folder inside the library
    ///
    /// # Errors
    /// Returns `NotFound` if no drive of the site is named `library`.
    pub async fn resolve(
        client: &GraphClient,
        host: &str,
        site: &str,
        library: &str,
        folder: Option<String>,
    ) -> Result<Self, GraphError> {
        debug!(host, site, library, "Resolving document library");

        let site_path = format!("/sites/{host}:/sites/{}", encode_segments([site]));
        let site_info: IdResponse = client.get_json(&site_path).await?;

        let drives: DriveList = client
            .get_json(&format!("/sites/{}/drives", site_info.id))
            .await?;
        let drive = drives
            .value
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(library))
            .ok_or_else(|| {
                GraphError::NotFound(format!("Document library '{library}' not found on site '{site}'"))
            })?;

        let list: IdResponse = client
            .get_json(&format!("/drives/{}/list", drive.id))
            .await?;

        info!(site_id = %site_info.id, drive_id = %drive.id, "Resolved document library");

        Ok(Self {
            site_id: site_info.id,
            drive_id: drive.id,
            list_id: list.id,
            folder: folder.filter(|f| !f.trim_matches('/').is_empty()),
        })
    }

    /// Full path of `rel` inside the drive, including the root folder
    fn drive_segments<'a>(&'a self, rel: Option<&'a RelativePath>) -> Vec<&'a str> {
        let mut segments: Vec<&str> = self
            .folder
            .as_deref()
            .map(|f| f.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if let Some(rel) = rel {
            segments.extend(rel.segments());
        }
        segments
    }

    /// Segments of the root folder itself
    pub fn folder_segments(&self) -> Vec<&str> {
        self.drive_segments(None)
    }

    /// Address of an item (or the remote root when `rel` is `None`)
    ///
    /// `/drives/{id}/root` for the drive root, `/drives/{id}/root:/a/b:`
    /// otherwise. Append `/children`, `/content` etc. directly.
    pub fn item(&self, rel: Option<&RelativePath>) -> String {
        let segments = self.drive_segments(rel);
        self.address(&segments)
    }

    /// Address of the item at an explicit drive-relative segment list
    pub fn address(&self, segments: &[&str]) -> String {
        if segments.is_empty() {
            format!("/drives/{}/root", self.drive_id)
        } else {
            format!(
                "/drives/{}/root:{}:",
                self.drive_id,
                encode_segments(segments.iter().copied())
            )
        }
    }

    /// Address of a folder's children collection
    pub fn children(&self, rel: Option<&RelativePath>) -> String {
        format!("{}/children", self.item(rel))
    }
}

/// Percent-encodes path segments, returning `/seg1/seg2`
pub fn encode_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut url = match url::Url::parse("http://localhost/") {
        Ok(u) => u,
        Err(_) => return String::new(),
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().extend(segments);
    }
    url.path().to_string()
}
