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

//! Adapter registry
//!
//! Turns a stored [`AdapterDescriptor`] (kind + opaque config map) into a live
//! [`StorageAdapter`]. The config is parsed into a strongly-typed
//! [`AdapterConfig`] variant and validated when the adapter is constructed,
//! not on first use.
//!
//! Live adapters are cached per descriptor id together with a hash of the
//! kind and config, so object store and cloud drive clients are reused until
//! the descriptor changes.

use crate::cloud_drive::{CloudDriveAdapter, CloudDriveConfig};
use crate::error::{StorageError, StorageResult};
use crate::local::{LocalAdapter, LocalConfig};
use crate::object_store::{ObjectStoreAdapter, ObjectStoreConfig};
use crate::{AdapterKind, StorageAdapter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Persisted description of a storage adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterDescriptor {
    /// Unique id
    pub id: String,
    /// Display name
    pub name: String,
    /// Backend kind as stored (`local`, `s3`, `gdrive`, ...)
    pub kind: String,
    /// Backend-specific settings
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Candidate for binding auto-provisioned namespaces
    #[serde(default)]
    pub is_default: bool,
}

/// Parse a stored kind string, accepting the common aliases
pub fn parse_kind(kind: &str) -> StorageResult<AdapterKind> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "local" | "filesystem" => Ok(AdapterKind::Local),
        "s3" | "object_store" | "objectstore" | "minio" => Ok(AdapterKind::ObjectStore),
        "gdrive" | "google_drive" | "cloud_drive" | "clouddrive" => Ok(AdapterKind::CloudDrive),
        _ => Err(StorageError::UnknownAdapterKind(kind.to_string())),
    }
}

/// Strongly-typed adapter configuration, one variant per backend
#[derive(Debug, Clone)]
pub enum AdapterConfig {
    /// Local filesystem
    Local(LocalConfig),
    /// S3-compatible object store
    ObjectStore(ObjectStoreConfig),
    /// Cloud drive folder
    CloudDrive(CloudDriveConfig),
}

impl AdapterConfig {
    /// Parse a descriptor's config map according to its kind
    pub fn from_descriptor(descriptor: &AdapterDescriptor) -> StorageResult<Self> {
        let kind = parse_kind(&descriptor.kind)?;
        let value = Value::Object(descriptor.config.clone());
        match kind {
            AdapterKind::Local => parse_config(kind, value).map(AdapterConfig::Local),
            AdapterKind::ObjectStore => parse_config(kind, value).map(AdapterConfig::ObjectStore),
            AdapterKind::CloudDrive => parse_config(kind, value).map(AdapterConfig::CloudDrive),
            AdapterKind::Memory => Err(StorageError::UnknownAdapterKind(descriptor.kind.clone())),
        }
    }

    /// Backend family of this config
    pub fn kind(&self) -> AdapterKind {
        match self {
            AdapterConfig::Local(_) => AdapterKind::Local,
            AdapterConfig::ObjectStore(_) => AdapterKind::ObjectStore,
            AdapterConfig::CloudDrive(_) => AdapterKind::CloudDrive,
        }
    }

    /// Construct the live adapter
    pub async fn build(self) -> StorageResult<Arc<dyn StorageAdapter>> {
        Ok(match self {
            AdapterConfig::Local(config) => Arc::new(LocalAdapter::from_config(config).await?),
            AdapterConfig::ObjectStore(config) => Arc::new(ObjectStoreAdapter::new(config).await?),
            AdapterConfig::CloudDrive(config) => Arc::new(CloudDriveAdapter::new(config)?),
        })
    }
}

/// Deserialize a config without echoing its values into the error
fn parse_config<T: DeserializeOwned>(kind: AdapterKind, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| {
        let message = e.to_string();
        if message.starts_with("missing field") {
            StorageError::invalid_config(format!("{} adapter config: {}", kind, message))
        } else {
            StorageError::invalid_config(format!("{} adapter config has an invalid value", kind))
        }
    })
}

fn descriptor_hash(descriptor: &AdapterDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(descriptor.kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(Value::Object(descriptor.config.clone()).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

struct CachedAdapter {
    config_hash: String,
    adapter: Arc<dyn StorageAdapter>,
}

/// Resolves descriptors to live adapters, caching them per descriptor
#[derive(Default)]
pub struct AdapterRegistry {
    cache: RwLock<HashMap<String, CachedAdapter>>,
    overrides: RwLock<HashMap<String, Arc<dyn StorageAdapter>>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a descriptor to a live adapter
    ///
    /// Fails with [`StorageError::UnknownAdapterKind`] for kinds outside
    /// local, object store and cloud drive, and with
    /// [`StorageError::InvalidConfig`] when the config does not validate.
    pub async fn resolve(
        &self,
        descriptor: &AdapterDescriptor,
    ) -> StorageResult<Arc<dyn StorageAdapter>> {
        if let Some(adapter) = self.overrides.read().await.get(&descriptor.id) {
            return Ok(Arc::clone(adapter));
        }

        let config_hash = descriptor_hash(descriptor);
        if let Some(cached) = self.cache.read().await.get(&descriptor.id) {
            if cached.config_hash == config_hash {
                return Ok(Arc::clone(&cached.adapter));
            }
        }

        let config = AdapterConfig::from_descriptor(descriptor)?;
        let kind = config.kind();
        let adapter = config.build().await?;

        info!(
            adapter_id = %descriptor.id,
            adapter_name = %descriptor.name,
            kind = %kind,
            "Constructed storage adapter"
        );

        self.cache.write().await.insert(
            descriptor.id.clone(),
            CachedAdapter {
                config_hash,
                adapter: Arc::clone(&adapter),
            },
        );
        Ok(adapter)
    }

    /// Pin a pre-built adapter to a descriptor id, bypassing construction
    pub async fn register(&self, id: impl Into<String>, adapter: Arc<dyn StorageAdapter>) {
        self.overrides.write().await.insert(id.into(), adapter);
    }

    /// Drop any cached or pinned adapter for `id`
    pub async fn evict(&self, id: &str) {
        self.cache.write().await.remove(id);
        self.overrides.write().await.remove(id);
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").finish_non_exhaustive()
    }
}
