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

//! In-memory storage adapter for testing
//!
//! Provides a thread-safe implementation of [`StorageAdapter`](crate::StorageAdapter)
//! backed by `Arc<RwLock<HashMap>>`. Write and read failures can be switched
//! on to exercise error paths in callers.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ussp_storage::{StorageAdapter, mock::MockAdapter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = MockAdapter::new();
//!     storage.upload("ns", "test.bin", b"hello world", None).await?;
//!     assert!(storage.exists("ns", "test.bin").await?);
//!
//!     storage.set_fail_writes(true);
//!     assert!(storage.upload("ns", "other.bin", b"x", None).await.is_err());
//!     Ok(())
//! }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::{content_fingerprint, resolve_mime, AdapterKind, FileLocation, FileStat, StorageAdapter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    mime_type: String,
}

/// In-memory mock storage adapter
#[derive(Clone, Default)]
pub struct MockAdapter {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl MockAdapter {
    /// Create an empty mock adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent download fail with an I/O error
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of stored objects across all namespaces
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn key(namespace: &str, name: &str) -> StorageResult<(String, String)> {
        if namespace.is_empty() || name.is_empty() {
            return Err(StorageError::invalid_name("namespace and name must be non-empty"));
        }
        Ok((namespace.to_string(), name.to_string()))
    }
}

impl fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAdapter")
            .field("fail_writes", &self.fail_writes.load(Ordering::SeqCst))
            .field("fail_reads", &self.fail_reads.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl StorageAdapter for MockAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn upload(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> StorageResult<FileLocation> {
        let key = Self::key(namespace, name)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::io(
                AdapterKind::Memory,
                namespace,
                name,
                "simulated write failure",
            ));
        }

        let mime_type = resolve_mime(name, mime_hint);
        self.objects.write().await.insert(
            key,
            StoredObject {
                data: data.to_vec(),
                mime_type: mime_type.clone(),
            },
        );

        Ok(FileLocation {
            address: format!("memory://{}/{}", namespace, name),
            size: data.len() as u64,
            mime_type,
            fingerprint: content_fingerprint(data),
        })
    }

    async fn download(&self, namespace: &str, name: &str) -> StorageResult<Vec<u8>> {
        let key = Self::key(namespace, name)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::io(
                AdapterKind::Memory,
                namespace,
                name,
                "simulated read failure",
            ));
        }
        self.objects
            .read()
            .await
            .get(&key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(AdapterKind::Memory, namespace, name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> StorageResult<()> {
        let key = Self::key(namespace, name)?;
        self.objects.write().await.remove(&key);
        Ok(())
    }

    async fn stat(&self, namespace: &str, name: &str) -> StorageResult<FileStat> {
        let key = Self::key(namespace, name)?;
        self.objects
            .read()
            .await
            .get(&key)
            .map(|o| FileStat {
                size: o.data.len() as u64,
                mime_type: o.mime_type.clone(),
                fingerprint: content_fingerprint(&o.data),
            })
            .ok_or_else(|| StorageError::not_found(AdapterKind::Memory, namespace, name))
    }

    async fn list(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn test_connection(&self) -> bool {
        true
    }
}
