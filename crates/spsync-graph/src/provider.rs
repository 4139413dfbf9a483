//! Graph-backed implementation of [`IRemoteLibrary`]
//!
//! [`GraphRemoteLibrary`] binds a [`GraphClient`] to a resolved
//! [`RemoteRoot`] and the fingerprint column name, delegating each port
//! operation to the module that implements it and mapping [`GraphError`]
//! onto the port's [`RemoteError`].

use async_trait::async_trait;
use spsync_core::config::RemoteConfig;
use spsync_core::domain::{RelativePath, RemoteEntry};
use spsync_core::ports::{
    ChunkAck, IRemoteLibrary, MetadataWrite, MetadataWriteResult, RemoteError, SessionHandle,
};
use tracing::{instrument, warn};

use crate::client::GraphClient;
use crate::library::RemoteRoot;
use crate::rate_limit::RateLimitSummary;
use crate::{inventory, items, metadata, upload, GraphError};

/// SharePoint document library reached through Microsoft Graph
pub struct GraphRemoteLibrary {
    client: GraphClient,
    root: RemoteRoot,
    column: String,
}

impl GraphRemoteLibrary {
    /// Creates an adapter for an already-resolved root
    pub fn new(client: GraphClient, root: RemoteRoot, column: impl Into<String>) -> Self {
        Self {
            client,
            root,
            column: column.into(),
        }
    }

    /// Resolves the library named in `config` and creates the adapter
    ///
    /// # Errors
    /// Returns an error if the site or library cannot be resolved
    pub async fn connect(
        client: GraphClient,
        config: &RemoteConfig,
        column: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let root = RemoteRoot::resolve(
            &client,
            &config.host,
            &config.site,
            config.library_name(),
            config.root_folder(),
        )
        .await?;
        Ok(Self::new(client, root, column))
    }

    pub fn root(&self) -> &RemoteRoot {
        &self.root
    }

    /// Rate-limit observations for the end-of-run report
    pub fn rate_limit_summary(&self) -> RateLimitSummary {
        self.client.rate_limit_summary()
    }
}

#[async_trait]
impl IRemoteLibrary for GraphRemoteLibrary {
    #[instrument(skip(self))]
    async fn list_inventory(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        Ok(inventory::list_inventory(&self.client, &self.root, &self.column).await?)
    }

    #[instrument(skip(self, path, bytes), fields(path = %path, len = bytes.len()))]
    async fn upload_direct(&self, path: &RelativePath, bytes: Vec<u8>) -> Result<(), RemoteError> {
        Ok(upload::upload_small(&self.client, &self.root, path, bytes).await?)
    }

    #[instrument(skip(self, path), fields(path = %path))]
    async fn open_chunked_session(
        &self,
        path: &RelativePath,
        total_size: u64,
    ) -> Result<SessionHandle, RemoteError> {
        let upload_url = upload::create_upload_session(&self.client, &self.root, path).await?;
        Ok(SessionHandle {
            upload_url,
            total_size,
        })
    }

    #[instrument(skip(self, session, bytes), fields(len = bytes.len()))]
    async fn upload_chunk(
        &self,
        session: &SessionHandle,
        offset: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck, RemoteError> {
        Ok(upload::upload_chunk(
            &self.client,
            &session.upload_url,
            bytes,
            offset,
            session.total_size,
        )
        .await?)
    }

    #[instrument(skip(self, session))]
    async fn abort_session(&self, session: &SessionHandle) -> Result<(), RemoteError> {
        Ok(upload::cancel_upload_session(&self.client, &session.upload_url).await?)
    }

    #[instrument(skip(self, writes), fields(count = writes.len()))]
    async fn batch_write_metadata(
        &self,
        writes: &[MetadataWrite],
    ) -> Result<Vec<MetadataWriteResult>, RemoteError> {
        Ok(metadata::batch_write_fields(&self.client, &self.root, &self.column, writes).await?)
    }

    #[instrument(skip(self, path), fields(path = %path))]
    async fn delete(&self, path: &RelativePath) -> Result<(), RemoteError> {
        Ok(items::delete_item(&self.client, &self.root, path).await?)
    }

    #[instrument(skip(self, path), fields(path = %path))]
    async fn ensure_folder(&self, path: &RelativePath) -> Result<(), RemoteError> {
        Ok(items::ensure_folder(&self.client, &self.root, path).await?)
    }

    #[instrument(skip(self))]
    async fn try_create_metadata_column(&self) -> bool {
        match metadata::ensure_text_column(&self.client, &self.root, &self.column).await {
            Ok(available) => available,
            Err(GraphError::Forbidden(e)) => {
                warn!(column = %self.column, error = %e, "No permission to create fingerprint column; falling back to size comparison");
                false
            }
            Err(e) => {
                warn!(column = %self.column, error = %e, "Fingerprint column unavailable; falling back to size comparison");
                false
            }
        }
    }
}
