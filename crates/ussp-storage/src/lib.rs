// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Storage adapter layer for USSP
//!
//! This crate provides a uniform, asynchronous contract for byte-level file
//! operations over several physical backends:
//! - Local filesystem ([`local::LocalAdapter`])
//! - S3-compatible object stores ([`object_store::ObjectStoreAdapter`])
//! - Cloud drive folders ([`cloud_drive::CloudDriveAdapter`])
//!
//! # Architecture
//!
//! Files are addressed by a *namespace key* plus a *file name*. Every adapter
//! maps that pair onto its own addressing scheme (a path, an object key, or a
//! named object inside one drive folder) and reports a [`FileLocation`]
//! carrying the client-side content fingerprint.
//!
//! [`registry::AdapterRegistry`] turns stored adapter descriptors into live
//! adapter instances.
//!
//! # Failure semantics
//!
//! - `NotFound` is always distinguishable from every other failure
//! - Transient backend failures surface as [`StorageError::Io`]
//! - `delete` is idempotent on every backend: removing an absent object succeeds
//!
//! # Examples
//!
//! ```no_run
//! use ussp_storage::{StorageAdapter, mock::MockAdapter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = MockAdapter::new();
//!
//!     let location = storage.upload("ns-1", "hello.txt", b"hi", None).await?;
//!     assert_eq!(location.size, 2);
//!
//!     let data = storage.download("ns-1", "hello.txt").await?;
//!     assert_eq!(data, b"hi");
//!
//!     storage.delete("ns-1", "hello.txt").await?;
//!     Ok(())
//! }
//! ```

pub mod cloud_drive;
pub mod error;
pub mod local;
pub mod mime;
pub mod mock;
pub mod object_store;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Debug};

pub use cloud_drive::CloudDriveAdapter;
pub use error::{StorageError, StorageResult};
pub use local::LocalAdapter;
pub use object_store::ObjectStoreAdapter;
pub use registry::{AdapterConfig, AdapterDescriptor, AdapterRegistry};

/// Physical backend family of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Local filesystem directory
    Local,
    /// S3-compatible object store
    ObjectStore,
    /// Cloud drive folder
    CloudDrive,
    /// In-process memory (tests only, never resolvable from a descriptor)
    Memory,
}

impl AdapterKind {
    /// Stable lowercase name used in logs and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Local => "local",
            AdapterKind::ObjectStore => "object_store",
            AdapterKind::CloudDrive => "cloud_drive",
            AdapterKind::Memory => "memory",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an upload landed and what was stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLocation {
    /// Adapter-specific address (filesystem path, object key, drive file id)
    pub address: String,
    /// Stored size in bytes
    pub size: u64,
    /// Resolved MIME type
    pub mime_type: String,
    /// SHA-256 hex digest of the stored bytes
    pub fingerprint: String,
}

/// Metadata returned by [`StorageAdapter::stat`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    /// Size in bytes
    pub size: u64,
    /// MIME type
    pub mime_type: String,
    /// SHA-256 hex digest
    pub fingerprint: String,
}

/// Compute the content fingerprint used across all adapters
///
/// The fingerprint is always computed client-side and never taken from a
/// backend-reported ETag.
pub fn content_fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Uniform byte-level file contract implemented by every backend
///
/// Implementations must be `Send + Sync + Debug` so they can be shared behind
/// `Arc<dyn StorageAdapter>` by the request handlers and the replication worker.
#[async_trait]
pub trait StorageAdapter: Send + Sync + Debug {
    /// Backend family of this adapter
    fn kind(&self) -> AdapterKind;

    /// Write `data` as `name` inside `namespace`, overwriting any existing object
    ///
    /// `mime_hint` is used when present, otherwise the type is guessed from the
    /// file extension.
    async fn upload(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> StorageResult<FileLocation>;

    /// Read the full contents of an object
    ///
    /// The backend stream is drained completely before returning.
    async fn download(&self, namespace: &str, name: &str) -> StorageResult<Vec<u8>>;

    /// Remove an object. Absent objects are not an error.
    async fn delete(&self, namespace: &str, name: &str) -> StorageResult<()>;

    /// Size, type and fingerprint of an object
    async fn stat(&self, namespace: &str, name: &str) -> StorageResult<FileStat>;

    /// File names stored under `namespace`, sorted
    async fn list(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Check whether an object exists
    async fn exists(&self, namespace: &str, name: &str) -> StorageResult<bool> {
        match self.stat(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort reachability probe. Never mutates backend state.
    async fn test_connection(&self) -> bool;
}

/// Resolve the MIME type for an upload: explicit hint first, then extension
pub(crate) fn resolve_mime(name: &str, hint: Option<&str>) -> String {
    match hint.map(str::trim) {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => mime::guess_from_name(name).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _check_object_safe(_: &dyn StorageAdapter) {}
    }

    #[test]
    fn test_content_fingerprint_is_sha256_hex() {
        assert_eq!(
            content_fingerprint(b"hi"),
            "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
        );
        assert_eq!(content_fingerprint(b"").len(), 64);
    }

    #[test]
    fn test_resolve_mime_prefers_hint() {
        assert_eq!(resolve_mime("a.png", Some("image/webp")), "image/webp");
        assert_eq!(resolve_mime("a.png", Some("  ")), "image/png");
        assert_eq!(resolve_mime("a.png", None), "image/png");
        assert_eq!(resolve_mime("noext", None), "application/octet-stream");
    }

    #[test]
    fn test_adapter_kind_display() {
        assert_eq!(AdapterKind::ObjectStore.to_string(), "object_store");
        assert_eq!(AdapterKind::CloudDrive.as_str(), "cloud_drive");
    }
}
