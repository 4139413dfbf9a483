//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteLibrary`] - Remote document library operations (inventory,
//!   uploads, metadata, deletes, folders)
//! - [`IContentTransform`] - Optional content rewriting applied before a
//!   file is hashed and uploaded

pub mod content_transform;
pub mod remote_library;

pub use content_transform::{IContentTransform, TransformOutput};
pub use remote_library::{
    ChunkAck, IRemoteLibrary, MetadataWrite, MetadataWriteResult, RemoteError, SessionHandle,
};
